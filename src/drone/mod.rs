//! Drone client abstraction
//!
//! The relay never speaks a drone protocol itself. It calls a [`DroneClient`]
//! and leaves flight control, video and telemetry to the backend:
//! - [`mavlink::MavlinkDrone`] drives an ArduPilot/PX4 flight controller
//! - [`simulated::SimulatedDrone`] records calls without any hardware

pub mod mavlink;
pub mod simulated;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use drone_relay_shared::DroneAction;
use futures::stream::BoxStream;

pub use self::mavlink::MavlinkDrone;
pub use simulated::SimulatedDrone;

/// Stream of PNG-encoded frames from the drone's active camera
pub type FrameStream = BoxStream<'static, Result<Bytes>>;

/// Capability surface of a drone
///
/// Speeds are magnitudes; direction is carried by the method.
#[async_trait]
pub trait DroneClient: Send + Sync {
    async fn right(&self, speed: f64) -> Result<()>;
    async fn left(&self, speed: f64) -> Result<()>;
    async fn front(&self, speed: f64) -> Result<()>;
    async fn back(&self, speed: f64) -> Result<()>;
    async fn up(&self, speed: f64) -> Result<()>;
    async fn down(&self, speed: f64) -> Result<()>;
    async fn clockwise(&self, speed: f64) -> Result<()>;
    async fn counter_clockwise(&self, speed: f64) -> Result<()>;
    async fn takeoff(&self) -> Result<()>;
    async fn land(&self) -> Result<()>;
    /// Hover in place
    async fn stop(&self) -> Result<()>;
    async fn config(&self, key: &str, value: &str) -> Result<()>;

    /// Current navigation data snapshot, in the backend's own representation
    async fn navdata(&self) -> Result<Bytes>;

    /// Subscribe to the video feed. The stream ends when the source goes away.
    fn png_stream(&self) -> FrameStream;

    /// Human-readable name for this backend
    fn name(&self) -> &'static str;

    /// Wait until queued commands have been handed to the drone
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Dispatch one action to the matching call
    async fn perform(&self, action: &DroneAction) -> Result<()> {
        match action {
            DroneAction::Right(speed) => self.right(*speed).await,
            DroneAction::Left(speed) => self.left(*speed).await,
            DroneAction::Front(speed) => self.front(*speed).await,
            DroneAction::Back(speed) => self.back(*speed).await,
            DroneAction::Up(speed) => self.up(*speed).await,
            DroneAction::Down(speed) => self.down(*speed).await,
            DroneAction::Clockwise(speed) => self.clockwise(*speed).await,
            DroneAction::CounterClockwise(speed) => self.counter_clockwise(*speed).await,
            DroneAction::Takeoff => self.takeoff().await,
            DroneAction::Land => self.land().await,
            DroneAction::Stop => self.stop().await,
            DroneAction::Config { key, value } => self.config(key, value).await,
        }
    }
}
