//! MAVLink Telemetry Reader
//!
//! Folds flight controller telemetry into the navigation data snapshot the
//! relay hands out on request.

use mavlink::ardupilotmega::MavMessage;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::commands::ArduPilotMode;

/// MAV_MODE_FLAG_SAFETY_ARMED
const SAFETY_ARMED_FLAG: u8 = 0x80;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f32,
    pub relative_altitude_m: f32,
    pub heading_deg: f32,
    pub ground_speed_mps: f32,
    pub satellites: u32,
    pub gps_fix: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Attitude {
    pub roll_rad: f32,
    pub pitch_rad: f32,
    pub yaw_rad: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Battery {
    pub voltage: f32,
    pub current: f32,
    pub remaining_percent: i8,
}

/// Navigation data snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Navdata {
    pub armed: bool,
    pub mode: String,
    pub position: Option<Position>,
    pub attitude: Option<Attitude>,
    pub battery: Option<Battery>,
    pub uptime_seconds: u64,
}

/// Reads and converts MAVLink telemetry into a [`Navdata`] snapshot
pub struct TelemetryReader {
    snapshot: Arc<RwLock<Navdata>>,
    /// Start time for calculating uptime
    start_time: std::time::Instant,
}

impl TelemetryReader {
    /// Create a new telemetry reader
    pub fn new() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(Navdata::default())),
            start_time: std::time::Instant::now(),
        }
    }

    /// Process a MAVLink message and update telemetry
    pub async fn process_message(&self, msg: &MavMessage) {
        let mut nav = self.snapshot.write().await;

        match msg {
            MavMessage::HEARTBEAT(hb) => {
                nav.armed = hb.base_mode.bits() & SAFETY_ARMED_FLAG != 0;
                nav.mode = mode_to_string(hb.custom_mode);
            }

            MavMessage::GLOBAL_POSITION_INT(pos) => {
                let vx = pos.vx as f32;
                let vy = pos.vy as f32;
                let position = nav.position.get_or_insert_with(Position::default);
                position.latitude = pos.lat as f64 / 1e7;
                position.longitude = pos.lon as f64 / 1e7;
                position.altitude_m = pos.alt as f32 / 1000.0; // mm to m
                position.relative_altitude_m = pos.relative_alt as f32 / 1000.0;
                position.heading_deg = pos.hdg as f32 / 100.0; // cdeg to deg
                position.ground_speed_mps = (vx * vx + vy * vy).sqrt() / 100.0;
            }

            MavMessage::GPS_RAW_INT(gps) => {
                let position = nav.position.get_or_insert_with(Position::default);
                position.satellites = gps.satellites_visible as u32;
                position.gps_fix = gps.fix_type as u8 >= 3; // 3D fix or better
            }

            MavMessage::VFR_HUD(hud) => {
                if let Some(ref mut position) = nav.position {
                    position.ground_speed_mps = hud.groundspeed;
                    position.heading_deg = hud.heading as f32;
                }
            }

            MavMessage::ATTITUDE(att) => {
                nav.attitude = Some(Attitude {
                    roll_rad: att.roll,
                    pitch_rad: att.pitch,
                    yaw_rad: att.yaw,
                });
            }

            MavMessage::SYS_STATUS(sys) => {
                nav.battery = Some(Battery {
                    voltage: sys.voltage_battery as f32 / 1000.0, // mV to V
                    current: sys.current_battery as f32 / 100.0,  // cA to A
                    remaining_percent: sys.battery_remaining,
                });
            }

            _ => {}
        }
    }

    /// Get the current navigation data
    pub async fn snapshot(&self) -> Navdata {
        let mut nav = self.snapshot.read().await.clone();
        nav.uptime_seconds = self.start_time.elapsed().as_secs();
        nav
    }
}

impl Default for TelemetryReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert ArduPilot mode number to string
fn mode_to_string(mode: u32) -> String {
    match ArduPilotMode::from_custom_mode(mode) {
        Some(m) => m.name().to_string(),
        None => format!("UNKNOWN({})", mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::ardupilotmega::{ATTITUDE_DATA, GLOBAL_POSITION_INT_DATA};

    #[tokio::test]
    async fn test_telemetry_reader_creation() {
        let reader = TelemetryReader::new();
        let nav = reader.snapshot().await;
        assert!(!nav.armed);
        assert!(nav.position.is_none());
        assert!(nav.battery.is_none());
    }

    #[tokio::test]
    async fn test_position_and_attitude() {
        let reader = TelemetryReader::new();

        reader
            .process_message(&MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
                time_boot_ms: 0,
                lat: 337_000_000,
                lon: -1_178_000_000,
                alt: 120_000,
                relative_alt: 15_000,
                vx: 300,
                vy: 400,
                vz: 0,
                hdg: 9_000,
            }))
            .await;
        reader
            .process_message(&MavMessage::ATTITUDE(ATTITUDE_DATA {
                time_boot_ms: 0,
                roll: 0.1,
                pitch: -0.2,
                yaw: 1.5,
                rollspeed: 0.0,
                pitchspeed: 0.0,
                yawspeed: 0.0,
            }))
            .await;

        let nav = reader.snapshot().await;
        let position = nav.position.expect("position");
        assert!((position.latitude - 33.7).abs() < 1e-9);
        assert_eq!(position.altitude_m, 120.0);
        assert_eq!(position.relative_altitude_m, 15.0);
        assert_eq!(position.heading_deg, 90.0);
        assert_eq!(position.ground_speed_mps, 5.0);

        let attitude = nav.attitude.expect("attitude");
        assert_eq!(attitude.yaw_rad, 1.5);
    }

    #[test]
    fn test_mode_to_string() {
        assert_eq!(mode_to_string(0), "STABILIZE");
        assert_eq!(mode_to_string(4), "GUIDED");
        assert_eq!(mode_to_string(6), "RTL");
        assert_eq!(mode_to_string(99), "UNKNOWN(99)");
    }

    #[test]
    fn test_navdata_serializes_as_json() {
        let nav = Navdata {
            armed: true,
            mode: "GUIDED".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&nav).unwrap();
        assert_eq!(value["armed"], true);
        assert_eq!(value["mode"], "GUIDED");
        assert!(value["position"].is_null());
    }
}
