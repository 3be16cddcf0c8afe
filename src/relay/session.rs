//! Individual client connection handling

use anyhow::Result;
use drone_relay_shared::limits::READ_BUFFER_SIZE;
use drone_relay_shared::JsonStreamDecoder;
use serde_json::Value;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// A TCP client sending a stream of JSON values
pub struct ClientSession {
    addr: SocketAddr,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    decoder: JsonStreamDecoder,
    read_buf: Vec<u8>,
}

impl ClientSession {
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        let (reader, writer) = stream.into_split();

        Self {
            addr,
            reader,
            writer,
            decoder: JsonStreamDecoder::new(),
            read_buf: vec![0u8; READ_BUFFER_SIZE],
        }
    }

    /// Read the next JSON value from this client
    ///
    /// Malformed input is logged and skipped. Returns None once the
    /// connection is closed.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            // First try to decode from existing buffer
            match self.decoder.decode_next() {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {
                    // Need more data
                }
                Err(e) => {
                    warn!("Discarding malformed input from {}: {}", self.addr, e);
                    continue;
                }
            }

            match self.reader.read(&mut self.read_buf).await {
                Ok(0) => {
                    debug!("Client {} closed the connection", self.addr);
                    return None;
                }
                Ok(n) => {
                    self.decoder.extend(&self.read_buf[..n]);
                }
                Err(e) => {
                    warn!("Read error from {}: {}", self.addr, e);
                    return None;
                }
            }
        }
    }

    /// Write raw bytes back to the client
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data).await?;
        Ok(())
    }

    /// Get the remote address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (ClientSession, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, addr) = listener.accept().await.unwrap();
        (ClientSession::new(server, addr), client)
    }

    #[tokio::test]
    async fn test_recv_skips_malformed_values() {
        let (mut session, mut client) = pair().await;

        client
            .write_all(b"{not json\n{\"X\": 0.5}\n\"GET\"")
            .await
            .unwrap();
        drop(client);

        assert_eq!(session.recv().await, Some(serde_json::json!({"X": 0.5})));
        assert_eq!(session.recv().await, Some(serde_json::json!("GET")));
        assert_eq!(session.recv().await, None);
    }

    #[tokio::test]
    async fn test_recv_joins_split_values() {
        let (mut session, mut client) = pair().await;

        client.write_all(b"{\"T\":").await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        client.write_all(b" true}").await.unwrap();

        assert_eq!(session.recv().await, Some(serde_json::json!({"T": true})));
    }

    #[tokio::test]
    async fn test_send_writes_to_client() {
        let (mut session, mut client) = pair().await;

        session.send(b"navdata").await.unwrap();

        let mut buf = [0u8; 7];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"navdata");
    }
}
