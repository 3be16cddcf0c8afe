//! Process-wide relay state shared by every listener.
//!
//! Holds the active camera channel and the latest video frame. The frame pump
//! is the only writer of the frame slot; HTTP handlers only read it.

use bytes::Bytes;
use drone_relay_shared::CameraChannel;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// State shared between the command relay and the frame server
#[derive(Debug, Default)]
pub struct RelayContext {
    camera: RwLock<CameraChannel>,
    frames: FrameSlot,
}

impl RelayContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the active camera channel
    pub async fn camera(&self) -> CameraChannel {
        *self.camera.read().await
    }

    /// Flip the camera channel and return the new one
    pub async fn toggle_camera(&self) -> CameraChannel {
        let mut camera = self.camera.write().await;
        *camera = camera.toggle();
        *camera
    }

    pub fn frames(&self) -> &FrameSlot {
        &self.frames
    }
}

/// Single slot holding the most recent frame
///
/// Each store replaces the previous frame; nothing is queued.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    latest: Arc<RwLock<Option<Bytes>>>,
    received: Arc<AtomicU64>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest frame, returning how many frames have been stored so far
    pub async fn store(&self, frame: Bytes) -> u64 {
        *self.latest.write().await = Some(frame);
        self.received.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Get the latest frame, if any has arrived
    pub async fn latest(&self) -> Option<Bytes> {
        self.latest.read().await.clone()
    }

    /// Total number of frames stored
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_camera_starts_front_and_toggles() {
        let ctx = RelayContext::new();
        assert_eq!(ctx.camera().await, CameraChannel::Front);

        assert_eq!(ctx.toggle_camera().await, CameraChannel::Bottom);
        assert_eq!(ctx.camera().await, CameraChannel::Bottom);

        assert_eq!(ctx.toggle_camera().await, CameraChannel::Front);
    }

    #[tokio::test]
    async fn test_frame_slot_overwrites() {
        let slot = FrameSlot::new();
        assert!(slot.latest().await.is_none());
        assert_eq!(slot.received(), 0);

        assert_eq!(slot.store(Bytes::from_static(b"first")).await, 1);
        assert_eq!(slot.store(Bytes::from_static(b"second")).await, 2);

        assert_eq!(slot.latest().await, Some(Bytes::from_static(b"second")));
        assert_eq!(slot.received(), 2);
    }

    #[tokio::test]
    async fn test_frame_slot_clones_share_state() {
        let slot = FrameSlot::new();
        let reader = slot.clone();

        slot.store(Bytes::from_static(b"png")).await;
        assert_eq!(reader.latest().await, Some(Bytes::from_static(b"png")));
    }
}
