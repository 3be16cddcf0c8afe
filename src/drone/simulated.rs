//! Simulated drone backend
//!
//! Records every call instead of flying. Used for running the relay without
//! hardware and as the drone in tests.

use super::{DroneClient, FrameStream};
use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use drone_relay_shared::DroneAction;
use futures::{stream, StreamExt};
use serde_json::json;
use std::mem::{discriminant, Discriminant};
use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

/// A drone that only remembers what it was told
pub struct SimulatedDrone {
    actions: Mutex<Vec<DroneAction>>,
    failing: Mutex<Vec<Discriminant<DroneAction>>>,
    flying: Mutex<bool>,
    navdata: Mutex<Option<Bytes>>,
    frame_tx: mpsc::UnboundedSender<Bytes>,
    frame_rx: StdMutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
}

impl SimulatedDrone {
    pub fn new() -> Self {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        Self {
            actions: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
            flying: Mutex::new(false),
            navdata: Mutex::new(None),
            frame_tx,
            frame_rx: StdMutex::new(Some(frame_rx)),
        }
    }

    /// All calls received so far, in order
    pub async fn actions(&self) -> Vec<DroneAction> {
        self.actions.lock().await.clone()
    }

    /// Make every call of the same kind as `action` fail
    pub async fn fail_on(&self, action: DroneAction) {
        self.failing.lock().await.push(discriminant(&action));
    }

    /// Replace the generated navigation data with a fixed payload
    pub async fn set_navdata(&self, navdata: impl Into<Bytes>) {
        *self.navdata.lock().await = Some(navdata.into());
    }

    /// Feed a frame into the video stream
    pub fn push_frame(&self, frame: impl Into<Bytes>) {
        // The receiver lives as long as the drone, so this cannot fail
        let _ = self.frame_tx.send(frame.into());
    }

    async fn record(&self, action: DroneAction) -> Result<()> {
        if self.failing.lock().await.contains(&discriminant(&action)) {
            bail!("simulated failure: {}", action);
        }

        info!("[SIM] {}", action);
        match action {
            DroneAction::Takeoff => *self.flying.lock().await = true,
            DroneAction::Land => *self.flying.lock().await = false,
            _ => {}
        }
        self.actions.lock().await.push(action);
        Ok(())
    }
}

impl Default for SimulatedDrone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DroneClient for SimulatedDrone {
    async fn right(&self, speed: f64) -> Result<()> {
        self.record(DroneAction::Right(speed)).await
    }

    async fn left(&self, speed: f64) -> Result<()> {
        self.record(DroneAction::Left(speed)).await
    }

    async fn front(&self, speed: f64) -> Result<()> {
        self.record(DroneAction::Front(speed)).await
    }

    async fn back(&self, speed: f64) -> Result<()> {
        self.record(DroneAction::Back(speed)).await
    }

    async fn up(&self, speed: f64) -> Result<()> {
        self.record(DroneAction::Up(speed)).await
    }

    async fn down(&self, speed: f64) -> Result<()> {
        self.record(DroneAction::Down(speed)).await
    }

    async fn clockwise(&self, speed: f64) -> Result<()> {
        self.record(DroneAction::Clockwise(speed)).await
    }

    async fn counter_clockwise(&self, speed: f64) -> Result<()> {
        self.record(DroneAction::CounterClockwise(speed)).await
    }

    async fn takeoff(&self) -> Result<()> {
        self.record(DroneAction::Takeoff).await
    }

    async fn land(&self) -> Result<()> {
        self.record(DroneAction::Land).await
    }

    async fn stop(&self) -> Result<()> {
        self.record(DroneAction::Stop).await
    }

    async fn config(&self, key: &str, value: &str) -> Result<()> {
        self.record(DroneAction::Config {
            key: key.into(),
            value: value.into(),
        })
        .await
    }

    async fn navdata(&self) -> Result<Bytes> {
        if let Some(fixed) = self.navdata.lock().await.clone() {
            return Ok(fixed);
        }

        let state = if *self.flying.lock().await { "flying" } else { "landed" };
        let (actions, camera_commands) = {
            let actions = self.actions.lock().await;
            let camera = actions
                .iter()
                .filter(|a| matches!(a, DroneAction::Config { .. }))
                .count();
            (actions.len(), camera)
        };
        let snapshot = json!({
            "state": state,
            "camera_commands": camera_commands,
            "actions": actions,
        });
        Ok(Bytes::from(serde_json::to_vec(&snapshot)?))
    }

    fn png_stream(&self) -> FrameStream {
        let receiver = self.frame_rx.lock().ok().and_then(|mut rx| rx.take());

        match receiver {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|frame| (Ok::<_, anyhow::Error>(frame), rx))
            })
            .boxed(),
            // Only one subscriber gets the pushed frames
            None => stream::pending::<Result<Bytes>>().boxed(),
        }
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_actions_in_order() {
        let drone = SimulatedDrone::new();
        drone.takeoff().await.unwrap();
        drone.right(0.5).await.unwrap();
        drone.config("video:video_channel", "3").await.unwrap();

        assert_eq!(
            drone.actions().await,
            vec![
                DroneAction::Takeoff,
                DroneAction::Right(0.5),
                DroneAction::Config {
                    key: "video:video_channel".into(),
                    value: "3".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_fail_on_matches_action_kind() {
        let drone = SimulatedDrone::new();
        drone.fail_on(DroneAction::Left(0.0)).await;

        assert!(drone.left(0.7).await.is_err());
        assert!(drone.right(0.7).await.is_ok());
        assert_eq!(drone.actions().await, vec![DroneAction::Right(0.7)]);
    }

    #[tokio::test]
    async fn test_navdata_tracks_flight_state() {
        let drone = SimulatedDrone::new();
        drone.perform(&DroneAction::Takeoff).await.unwrap();

        let navdata: serde_json::Value =
            serde_json::from_slice(&drone.navdata().await.unwrap()).unwrap();
        assert_eq!(navdata["state"], "flying");
        assert_eq!(navdata["actions"], 1);
        assert_eq!(navdata["camera_commands"], 0);

        drone.set_navdata("raw navdata").await;
        assert_eq!(drone.navdata().await.unwrap(), Bytes::from("raw navdata"));
    }

    #[tokio::test]
    async fn test_png_stream_yields_pushed_frames() {
        let drone = SimulatedDrone::new();
        drone.push_frame(Bytes::from_static(b"frame-1"));
        drone.push_frame(Bytes::from_static(b"frame-2"));

        let mut frames = drone.png_stream();
        assert_eq!(frames.next().await.unwrap().unwrap(), Bytes::from_static(b"frame-1"));
        assert_eq!(frames.next().await.unwrap().unwrap(), Bytes::from_static(b"frame-2"));
    }
}
