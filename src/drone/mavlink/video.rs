//! Video feed
//!
//! Reads concatenated PNG images from a TCP video source and yields them one
//! frame at a time.

use anyhow::{anyhow, Result};
use bytes::Bytes;
use drone_relay_shared::limits::READ_BUFFER_SIZE;
use drone_relay_shared::PngSplitter;
use futures::{stream, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::info;

use crate::drone::FrameStream;

/// An open connection to the video source
struct VideoFeed {
    socket: TcpStream,
    splitter: PngSplitter,
    buf: Vec<u8>,
}

enum FeedState {
    Connecting(String),
    Open(VideoFeed),
    Done,
}

/// Subscribe to the PNG frames served at `source`
///
/// Without a source the stream never yields. Codec errors are reported and
/// the feed keeps going; a closed or failed socket ends the stream.
pub fn png_stream(source: Option<String>) -> FrameStream {
    match source {
        Some(address) => stream::unfold(FeedState::Connecting(address), next_frame).boxed(),
        None => stream::pending::<Result<Bytes>>().boxed(),
    }
}

async fn next_frame(state: FeedState) -> Option<(Result<Bytes>, FeedState)> {
    let mut feed = match state {
        FeedState::Connecting(address) => match TcpStream::connect(&address).await {
            Ok(socket) => {
                info!("[VIDEO] Connected to video source at {}", address);
                VideoFeed {
                    socket,
                    splitter: PngSplitter::new(),
                    buf: vec![0u8; READ_BUFFER_SIZE],
                }
            }
            Err(e) => {
                let err = anyhow!("Failed to connect to video source {}: {}", address, e);
                return Some((Err(err), FeedState::Done));
            }
        },
        FeedState::Open(feed) => feed,
        FeedState::Done => return None,
    };

    loop {
        match feed.splitter.decode_next() {
            Ok(Some(frame)) => return Some((Ok(frame), FeedState::Open(feed))),
            Ok(None) => {}
            Err(e) => return Some((Err(e.into()), FeedState::Open(feed))),
        }

        match feed.socket.read(&mut feed.buf).await {
            Ok(0) => {
                info!("[VIDEO] Video source closed");
                return None;
            }
            Ok(n) => feed.splitter.extend(&feed.buf[..n]),
            Err(e) => return Some((Err(e.into()), FeedState::Done)),
        }
    }
}
