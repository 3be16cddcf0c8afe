//! Latest-frame cache and HTTP server
//!
//! The frame pump copies every PNG the drone produces into the shared
//! [`FrameSlot`]. Any HTTP request, whatever its method or path, gets the
//! most recent frame back.

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::context::FrameSlot;
use crate::drone::DroneClient;

/// Body of the reply sent before the first frame arrives
pub const NOT_READY_MESSAGE: &str = "Did not receive any png data yet.";

/// Delay before subscribing again after the video stream ends
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

/// Router answering every request with the latest frame
pub fn frame_router(slot: FrameSlot) -> Router {
    Router::new().fallback(latest_frame).with_state(slot)
}

async fn latest_frame(State(slot): State<FrameSlot>) -> Response {
    match slot.latest().await {
        Some(frame) => ([(header::CONTENT_TYPE, "image/png")], frame).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, NOT_READY_MESSAGE).into_response(),
    }
}

/// Serve the latest frame over HTTP until the listener fails
pub async fn serve_frames(listener: TcpListener, slot: FrameSlot) -> Result<()> {
    info!("Frame server listening on {}", listener.local_addr()?);
    axum::serve(listener, frame_router(slot)).await?;
    Ok(())
}

/// Copy frames from the drone into `slot`, resubscribing whenever the stream ends
pub async fn run_frame_pump(drone: Arc<dyn DroneClient>, slot: FrameSlot) {
    loop {
        let mut frames = drone.png_stream();

        while let Some(item) = frames.next().await {
            match item {
                Ok(frame) => {
                    let len = frame.len();
                    let count = slot.store(frame).await;
                    if count == 1 {
                        info!("Received first video frame ({} bytes)", len);
                    } else {
                        debug!("Frame {} ({} bytes)", count, len);
                    }
                }
                Err(e) => warn!("Video stream error: {:#}", e),
            }
        }

        warn!(
            "Video stream ended, resubscribing in {}s",
            RESUBSCRIBE_DELAY.as_secs()
        );
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}
