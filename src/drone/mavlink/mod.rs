//! MAVLink drone backend
//!
//! Drives an ArduPilot/PX4 flight controller. Movement calls become body-frame
//! velocity targets, navigation data comes from the telemetry stream and the
//! video feed is read from a separate TCP source.

mod commands;
mod connection;
mod telemetry;
mod video;

pub use connection::FcConfig;

use commands::{MavCommandSender, Setpoint};
use connection::{FcEvent, FcEventReceiver, FlightController};
use telemetry::TelemetryReader;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use drone_relay_shared::CameraChannel;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{DroneClient, FrameStream};

/// Velocity targets time out on the autopilot, so active ones are resent
const SETPOINT_REFRESH: Duration = Duration::from_millis(250);

/// How long `flush` waits for queued messages
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct MavlinkConfig {
    pub fc: FcConfig,
    /// host:port of a TCP source emitting concatenated PNG frames
    pub video_source: Option<String>,
    /// Velocity for a speed of 1.0
    pub max_speed_mps: f32,
    /// Yaw rate for a rotation speed of 1.0
    pub max_yaw_rate_deg: f32,
    pub takeoff_altitude_m: f32,
}

impl Default for MavlinkConfig {
    fn default() -> Self {
        Self {
            fc: FcConfig::default(),
            video_source: None,
            max_speed_mps: 5.0,
            max_yaw_rate_deg: 90.0,
            takeoff_altitude_m: 2.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum DroneError {
    #[error("unsupported config key: {0}")]
    UnsupportedConfig(String),
    #[error("invalid value {value:?} for config key {key}")]
    InvalidConfigValue { key: String, value: String },
}

/// Which setpoint component a movement call drives
#[derive(Debug, Clone, Copy)]
enum Axis {
    Forward,
    Right,
    Down,
    Yaw,
}

/// Drone client backed by a MAVLink flight controller
pub struct MavlinkDrone {
    fc: FlightController,
    commands: Arc<MavCommandSender>,
    telemetry: Arc<TelemetryReader>,
    setpoint: Arc<Mutex<Setpoint>>,
    config: MavlinkConfig,
}

impl MavlinkDrone {
    /// Open the flight controller link and start the background tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: MavlinkConfig) -> Self {
        let (fc, events) = FlightController::connect(config.fc.clone());
        let commands = Arc::new(MavCommandSender::new(
            config.fc.target_system,
            config.fc.target_component,
        ));
        let telemetry = Arc::new(TelemetryReader::new());
        let setpoint = Arc::new(Mutex::new(Setpoint::HOLD));

        tokio::spawn(handle_fc_events(events, telemetry.clone()));
        tokio::spawn(refresh_setpoint(
            fc.clone(),
            commands.clone(),
            setpoint.clone(),
        ));

        info!(
            "[MAVLink] Drone bridge initialized ({}, target {}/{})",
            config.fc.address, config.fc.target_system, config.fc.target_component
        );

        Self {
            fc,
            commands,
            telemetry,
            setpoint,
            config,
        }
    }

    /// Set one setpoint component, leaving the others as they are, and send it
    ///
    /// `speed` is signed along the axis and clamped to [-1, 1].
    async fn drive(&self, axis: Axis, speed: f64) -> Result<()> {
        let scale = speed.clamp(-1.0, 1.0) as f32;
        let linear = scale * self.config.max_speed_mps;

        let target = {
            let mut setpoint = self.setpoint.lock().await;
            match axis {
                Axis::Forward => setpoint.vx = linear,
                Axis::Right => setpoint.vy = linear,
                Axis::Down => setpoint.vz = linear,
                Axis::Yaw => {
                    setpoint.yaw_rate = (scale * self.config.max_yaw_rate_deg).to_radians()
                }
            }
            *setpoint
        };

        debug!("[MAVLink] Setpoint {:?}", target);
        self.commands.send_setpoint(&self.fc, &target).await
    }
}

#[async_trait]
impl DroneClient for MavlinkDrone {
    async fn right(&self, speed: f64) -> Result<()> {
        self.drive(Axis::Right, speed).await
    }

    async fn left(&self, speed: f64) -> Result<()> {
        self.drive(Axis::Right, -speed).await
    }

    async fn front(&self, speed: f64) -> Result<()> {
        self.drive(Axis::Forward, speed).await
    }

    async fn back(&self, speed: f64) -> Result<()> {
        self.drive(Axis::Forward, -speed).await
    }

    async fn up(&self, speed: f64) -> Result<()> {
        // NED: negative z is up
        self.drive(Axis::Down, -speed).await
    }

    async fn down(&self, speed: f64) -> Result<()> {
        self.drive(Axis::Down, speed).await
    }

    async fn clockwise(&self, speed: f64) -> Result<()> {
        self.drive(Axis::Yaw, speed).await
    }

    async fn counter_clockwise(&self, speed: f64) -> Result<()> {
        self.drive(Axis::Yaw, -speed).await
    }

    async fn takeoff(&self) -> Result<()> {
        *self.setpoint.lock().await = Setpoint::HOLD;
        self.commands
            .takeoff(&self.fc, self.config.takeoff_altitude_m)
            .await
    }

    async fn land(&self) -> Result<()> {
        *self.setpoint.lock().await = Setpoint::HOLD;
        self.commands.land(&self.fc).await
    }

    async fn stop(&self) -> Result<()> {
        *self.setpoint.lock().await = Setpoint::HOLD;
        self.commands.send_setpoint(&self.fc, &Setpoint::HOLD).await
    }

    async fn config(&self, key: &str, value: &str) -> Result<()> {
        if key != CameraChannel::CONFIG_KEY {
            return Err(DroneError::UnsupportedConfig(key.to_string()).into());
        }

        let camera = value
            .parse::<u8>()
            .ok()
            .and_then(CameraChannel::from_id)
            .ok_or_else(|| DroneError::InvalidConfigValue {
                key: key.to_string(),
                value: value.to_string(),
            })?;
        self.commands.select_camera(&self.fc, camera.id()).await
    }

    async fn navdata(&self) -> Result<Bytes> {
        let snapshot = self.telemetry.snapshot().await;
        Ok(Bytes::from(serde_json::to_vec(&snapshot)?))
    }

    fn png_stream(&self) -> FrameStream {
        video::png_stream(self.config.video_source.clone())
    }

    fn name(&self) -> &'static str {
        "mavlink"
    }

    async fn flush(&self) -> Result<()> {
        if !self.fc.drain(FLUSH_TIMEOUT).await {
            warn!("[MAVLink] Timed out flushing queued commands");
        }
        Ok(())
    }
}

/// Feed flight controller messages into the telemetry reader
async fn handle_fc_events(mut events: FcEventReceiver, telemetry: Arc<TelemetryReader>) {
    loop {
        match events.recv().await {
            Some(FcEvent::Connected) => {
                info!("[FC] Connected to flight controller");
            }
            Some(FcEvent::Disconnected { reason }) => {
                warn!("[FC] Disconnected: {}", reason);
            }
            Some(FcEvent::Message(msg)) => {
                telemetry.process_message(&msg).await;
            }
            None => {
                error!("[FC] Flight controller channel closed");
                break;
            }
        }
    }
}

/// Resend the active velocity target until the drone is told to hold
async fn refresh_setpoint(
    fc: FlightController,
    commands: Arc<MavCommandSender>,
    setpoint: Arc<Mutex<Setpoint>>,
) {
    let mut ticker = tokio::time::interval(SETPOINT_REFRESH);
    loop {
        ticker.tick().await;
        let target = *setpoint.lock().await;
        if target.is_hold() || !fc.is_connected().await {
            continue;
        }
        if let Err(e) = commands.send_setpoint(&fc, &target).await {
            error!("[MAVLink] Failed to refresh setpoint: {}", e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandExecutor;
    use crate::context::RelayContext;
    use crate::relay::run_stdin;
    use drone_relay_shared::FieldSet;

    fn offline_config() -> MavlinkConfig {
        MavlinkConfig {
            fc: FcConfig {
                // Nothing listens here; messages stay queued
                address: "tcpout:127.0.0.1:1".into(),
                ..Default::default()
            },
            max_speed_mps: 4.0,
            max_yaw_rate_deg: 180.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = MavlinkConfig::default();
        assert_eq!(config.max_speed_mps, 5.0);
        assert_eq!(config.max_yaw_rate_deg, 90.0);
        assert!(config.video_source.is_none());
    }

    #[tokio::test]
    async fn test_movement_updates_single_axis() {
        let drone = MavlinkDrone::connect(offline_config());

        drone.front(0.5).await.unwrap();
        drone.left(0.25).await.unwrap();
        drone.up(2.0).await.unwrap();
        drone.clockwise(0.5).await.unwrap();

        let setpoint = *drone.setpoint.lock().await;
        assert_eq!(setpoint.vx, 2.0);
        assert_eq!(setpoint.vy, -1.0);
        assert_eq!(setpoint.vz, -4.0); // clamped to full speed
        assert!((setpoint.yaw_rate - std::f32::consts::FRAC_PI_2).abs() < 1e-6);

        drone.stop().await.unwrap();
        assert!(drone.setpoint.lock().await.is_hold());
    }

    #[tokio::test]
    async fn test_config_accepts_video_channel_only() {
        let drone = MavlinkDrone::connect(offline_config());

        assert!(drone.config(CameraChannel::CONFIG_KEY, "3").await.is_ok());

        let err = drone.config("general:navdata_demo", "TRUE").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DroneError>(),
            Some(DroneError::UnsupportedConfig(_))
        ));

        let err = drone.config(CameraChannel::CONFIG_KEY, "front").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DroneError>(),
            Some(DroneError::InvalidConfigValue { .. })
        ));

        // Only the two known channel ids are accepted
        let err = drone.config(CameraChannel::CONFIG_KEY, "7").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DroneError>(),
            Some(DroneError::InvalidConfigValue { .. })
        ));
        assert!(drone.config(CameraChannel::CONFIG_KEY, "0").await.is_ok());
    }

    #[tokio::test]
    async fn test_calls_fail_fast_while_link_is_down() {
        let drone = Arc::new(MavlinkDrone::connect(offline_config()));

        // Fill the outbound queue; nothing drains it without a link
        let mut queued = 0;
        while drone.front(0.1).await.is_ok() {
            queued += 1;
            assert!(queued <= 100, "queue should be bounded");
        }

        let front = tokio::time::timeout(Duration::from_secs(1), drone.front(0.1))
            .await
            .expect("front must not block");
        assert!(front.is_err());

        // Closing input still lands (and fails) instead of hanging
        let executor = CommandExecutor::new(
            drone.clone(),
            Arc::new(RelayContext::new()),
            FieldSet::ALL,
        );
        let input: &[u8] = b"{\"T\": true}\n";
        tokio::time::timeout(Duration::from_secs(1), run_stdin(input, &executor))
            .await
            .expect("stdin mode must finish");
    }

    #[tokio::test]
    async fn test_navdata_is_json_snapshot() {
        let drone = MavlinkDrone::connect(offline_config());
        let navdata: serde_json::Value =
            serde_json::from_slice(&drone.navdata().await.unwrap()).unwrap();
        assert_eq!(navdata["armed"], false);
        assert!(navdata.get("uptime_seconds").is_some());
        assert_eq!(drone.name(), "mavlink");
    }
}
