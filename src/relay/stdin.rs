//! Interactive command input
//!
//! Reads JSON commands line by line, typically from stdin. When the input
//! closes the drone is landed.

use drone_relay_shared::{Command, JsonStreamDecoder};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info, warn};

use crate::command::CommandExecutor;

/// Execute commands from `reader` until it closes, then land
pub async fn run_stdin<R>(reader: R, executor: &CommandExecutor)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut decoder = JsonStreamDecoder::new();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                decoder.extend(line.as_bytes());
                decoder.extend(b"\n");
                loop {
                    match decoder.decode_next() {
                        Ok(Some(value)) => {
                            executor.execute(&Command::from_json(&value)).await;
                        }
                        Ok(None) => break,
                        Err(e) => warn!("Discarding malformed input: {}", e),
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        }
    }

    info!("Exiting application.");
    if let Err(e) = executor.drone().land().await {
        error!("Failed to land: {:#}", e);
    }
}
