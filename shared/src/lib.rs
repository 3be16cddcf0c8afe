//! Drone Relay Shared Types
//!
//! This crate provides the command model, camera channel and stream codecs
//! used by the relay's listeners and drone backends.

pub mod camera;
pub mod codec;
pub mod command;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use camera::CameraChannel;
pub use codec::{CodecError, JsonStreamDecoder, PngSplitter};
pub use command::{plan, Command, CommandField, DroneAction, FieldSet, PlannedAction};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Size limits for inbound streams
pub mod limits {
    /// Largest unfinished JSON value kept while waiting for more bytes
    pub const MAX_JSON_MESSAGE_SIZE: usize = 64 * 1024;

    /// Largest PNG chunk accepted from a video source (10 MB)
    pub const MAX_PNG_CHUNK_SIZE: u32 = 10 * 1024 * 1024;

    /// Read buffer size for socket loops
    pub const READ_BUFFER_SIZE: usize = 4096;
}
