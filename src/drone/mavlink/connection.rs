//! Flight Controller Connection
//!
//! Manages the link to an ArduPilot/PX4 flight controller over serial, UDP or TCP.
//! The link is opened in the background and reopened after any failure.

use anyhow::{anyhow, Result};
use mavlink::ardupilotmega::MavMessage;
use mavlink::{MavConnection, MavHeader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

type SharedConnection = Arc<Box<dyn MavConnection<MavMessage> + Send + Sync>>;

/// Delay between reconnection attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Outbound messages held while the link is busy or down
const OUTBOUND_QUEUE_SIZE: usize = 100;

/// Configuration for flight controller connection
#[derive(Debug, Clone)]
pub struct FcConfig {
    /// MAVLink connection string, e.g. "udpin:0.0.0.0:14550" or "serial:/dev/ttyACM0:57600"
    pub address: String,
    /// System ID for this companion computer
    pub system_id: u8,
    /// Component ID for this companion computer
    pub component_id: u8,
    /// Target system ID (flight controller)
    pub target_system: u8,
    /// Target component ID (autopilot)
    pub target_component: u8,
}

impl Default for FcConfig {
    fn default() -> Self {
        Self {
            // SITL default
            address: "udpin:0.0.0.0:14550".into(),
            system_id: 255,      // Companion computer
            component_id: 190,   // MAV_COMP_ID_ONBOARD_COMPUTER
            target_system: 1,    // Autopilot
            target_component: 1, // MAV_COMP_ID_AUTOPILOT1
        }
    }
}

/// Events from the flight controller
#[derive(Debug, Clone)]
pub enum FcEvent {
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected { reason: String },
    /// Received a MAVLink message
    Message(MavMessage),
}

pub type FcEventReceiver = mpsc::Receiver<FcEvent>;

/// Handle to the flight controller link
#[derive(Clone)]
pub struct FlightController {
    /// Channel for outgoing messages
    outbound_tx: mpsc::Sender<MavMessage>,
    /// Flag indicating if connected
    connected: Arc<RwLock<bool>>,
}

impl FlightController {
    /// Start the connection loop and return a handle plus its event stream
    pub fn connect(config: FcConfig) -> (Self, FcEventReceiver) {
        let (outbound_tx, outbound_rx) = mpsc::channel::<MavMessage>(OUTBOUND_QUEUE_SIZE);
        let (event_tx, event_rx) = mpsc::channel::<FcEvent>(100);
        let connected = Arc::new(RwLock::new(false));

        let fc = Self {
            outbound_tx,
            connected: connected.clone(),
        };

        tokio::spawn(async move {
            connection_loop(config, outbound_rx, event_tx, connected).await;
        });

        (fc, event_rx)
    }

    /// Check if connected to flight controller
    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Queue a MAVLink message for the flight controller
    ///
    /// Fails instead of waiting when the queue is full, which happens while
    /// the link is down.
    pub async fn send(&self, msg: MavMessage) -> Result<()> {
        self.outbound_tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => anyhow!("FC outbound queue full, link down?"),
            TrySendError::Closed(_) => anyhow!("FC connection closed"),
        })
    }

    /// Wait until every queued message has been picked up by the connection loop
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.outbound_tx.capacity() < self.outbound_tx.max_capacity() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

/// Main connection loop
async fn connection_loop(
    config: FcConfig,
    mut outbound_rx: mpsc::Receiver<MavMessage>,
    event_tx: mpsc::Sender<FcEvent>,
    connected: Arc<RwLock<bool>>,
) {
    loop {
        info!("[MAVLink] Connecting to flight controller at {}", config.address);

        let address = config.address.clone();
        let conn_result = tokio::task::spawn_blocking(move || {
            mavlink::connect::<MavMessage>(&address)
        })
        .await;

        match conn_result {
            Ok(Ok(conn)) => {
                info!("[MAVLink] Connected to flight controller");

                // Commands queued while the link was down are stale by now
                let mut stale = 0;
                while outbound_rx.try_recv().is_ok() {
                    stale += 1;
                }
                if stale > 0 {
                    warn!("[MAVLink] Dropped {} commands queued while disconnected", stale);
                }

                *connected.write().await = true;
                let _ = event_tx.send(FcEvent::Connected).await;

                let conn: SharedConnection = Arc::new(conn);
                let result = handle_connection(conn, &config, &mut outbound_rx, &event_tx).await;

                *connected.write().await = false;

                match result {
                    Ok(()) => {
                        info!("[MAVLink] Command channel closed, stopping connection loop");
                        return;
                    }
                    Err(e) => {
                        error!("[MAVLink] Connection error: {}", e);
                        let _ = event_tx
                            .send(FcEvent::Disconnected {
                                reason: e.to_string(),
                            })
                            .await;
                    }
                }
            }
            Ok(Err(e)) => {
                warn!("[MAVLink] Failed to connect: {}", e);
            }
            Err(e) => {
                error!("[MAVLink] Connect task failed: {}", e);
            }
        }

        // Wait before reconnecting
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Handle an active connection
///
/// Returns `Ok(())` only when every sender handle has been dropped.
async fn handle_connection(
    conn: SharedConnection,
    config: &FcConfig,
    outbound_rx: &mut mpsc::Receiver<MavMessage>,
    event_tx: &mpsc::Sender<FcEvent>,
) -> Result<()> {
    let header = MavHeader {
        system_id: config.system_id,
        component_id: config.component_id,
        sequence: 0,
    };

    // MAVLink reads block, so they get their own thread. The guard tells it
    // to stop once this connection is abandoned.
    let stop = StopOnDrop::default();
    let reader_conn = conn.clone();
    let reader_tx = event_tx.clone();
    let reader_stop = stop.flag();
    let mut reader =
        tokio::task::spawn_blocking(move || read_loop(reader_conn, reader_tx, reader_stop));

    loop {
        tokio::select! {
            result = &mut reader => {
                return match result {
                    Ok(Ok(())) => Err(anyhow!("Event channel closed")),
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(anyhow!("Reader task failed: {}", e)),
                };
            }

            msg = outbound_rx.recv() => {
                match msg {
                    Some(msg) => {
                        conn.send(&header, &msg)
                            .map_err(|e| anyhow!("Write error: {}", e))?;
                    }
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Sets the shared stop flag when dropped
#[derive(Default)]
struct StopOnDrop(Arc<AtomicBool>);

impl StopOnDrop {
    fn flag(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Blocking receive loop, forwarding every message as an event
///
/// Returns once `stop` is set. A read already blocked in `recv` finishes
/// first, and whatever it returns is dropped.
fn read_loop(
    conn: SharedConnection,
    event_tx: mpsc::Sender<FcEvent>,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if stop.load(Ordering::SeqCst) {
            debug!("[MAVLink] Reader stopped");
            return Ok(());
        }

        let received = conn.recv();
        if stop.load(Ordering::SeqCst) {
            debug!("[MAVLink] Reader stopped");
            return Ok(());
        }

        match received {
            Ok((_header, msg)) => {
                if let MavMessage::HEARTBEAT(hb) = &msg {
                    debug!(
                        "[FC] Heartbeat: type={:?} autopilot={:?} status={:?} mode={}",
                        hb.mavtype, hb.autopilot, hb.system_status, hb.custom_mode
                    );
                }

                if event_tx.blocking_send(FcEvent::Message(msg)).is_err() {
                    return Ok(());
                }
            }
            Err(mavlink::error::MessageReadError::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                // No data available yet
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                return Err(anyhow!("Read error: {}", e));
            }
        }
    }
}
