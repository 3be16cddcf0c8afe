//! MAVLink Command Translation
//!
//! Builds the MAVLink messages behind each drone call.

use anyhow::Result;
use mavlink::ardupilotmega::{
    MavCmd, MavFrame, MavMessage, PositionTargetTypemask, COMMAND_LONG_DATA,
    SET_POSITION_TARGET_LOCAL_NED_DATA,
};
use tracing::info;

use super::connection::FlightController;

/// Type mask keeping only the velocity and yaw-rate fields of a position target
const VELOCITY_ONLY_MASK: u16 = 0b0000_0101_1100_0111;

/// Body-frame velocity target (NED: x forward, y right, z down)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Setpoint {
    /// Forward velocity in m/s
    pub vx: f32,
    /// Rightward velocity in m/s
    pub vy: f32,
    /// Downward velocity in m/s
    pub vz: f32,
    /// Yaw rate in rad/s, positive clockwise
    pub yaw_rate: f32,
}

impl Setpoint {
    /// Hover in place
    pub const HOLD: Setpoint = Setpoint {
        vx: 0.0,
        vy: 0.0,
        vz: 0.0,
        yaw_rate: 0.0,
    };

    pub fn is_hold(&self) -> bool {
        *self == Self::HOLD
    }
}

/// Sends commands to the flight controller via MAVLink
pub struct MavCommandSender {
    target_system: u8,
    target_component: u8,
}

impl MavCommandSender {
    /// Create a new command sender
    pub fn new(target_system: u8, target_component: u8) -> Self {
        Self {
            target_system,
            target_component,
        }
    }

    fn command_long(&self, command: MavCmd, params: [f32; 7]) -> MavMessage {
        MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        })
    }

    pub fn arm_message(&self) -> MavMessage {
        // param1: 1 = arm
        self.command_long(
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }

    pub fn set_mode_message(&self, mode: ArduPilotMode) -> MavMessage {
        // param1: MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
        self.command_long(
            MavCmd::MAV_CMD_DO_SET_MODE,
            [1.0, mode as u32 as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }

    pub fn takeoff_message(&self, altitude_m: f32) -> MavMessage {
        // Yaw, latitude and longitude NAN = keep current
        self.command_long(
            MavCmd::MAV_CMD_NAV_TAKEOFF,
            [0.0, 0.0, 0.0, f32::NAN, f32::NAN, f32::NAN, altitude_m],
        )
    }

    pub fn land_message(&self) -> MavMessage {
        self.command_long(
            MavCmd::MAV_CMD_NAV_LAND,
            [0.0, 0.0, 0.0, f32::NAN, f32::NAN, f32::NAN, 0.0],
        )
    }

    /// Select the camera that feeds the video stream
    pub fn control_video_message(&self, camera_id: u8) -> MavMessage {
        // param2: 1 = enabled, compressed
        self.command_long(
            MavCmd::MAV_CMD_DO_CONTROL_VIDEO,
            [camera_id as f32, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }

    pub fn velocity_message(&self, setpoint: &Setpoint) -> MavMessage {
        MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
            time_boot_ms: 0,
            target_system: self.target_system,
            target_component: self.target_component,
            coordinate_frame: MavFrame::MAV_FRAME_BODY_NED,
            type_mask: PositionTargetTypemask::from_bits_truncate(VELOCITY_ONLY_MASK),
            x: 0.0,
            y: 0.0,
            z: 0.0,
            vx: setpoint.vx,
            vy: setpoint.vy,
            vz: setpoint.vz,
            afx: 0.0,
            afy: 0.0,
            afz: 0.0,
            yaw: 0.0,
            yaw_rate: setpoint.yaw_rate,
        })
    }

    /// Switch to GUIDED, arm, then climb to `altitude_m`
    pub async fn takeoff(&self, fc: &FlightController, altitude_m: f32) -> Result<()> {
        info!("[MAVLink] Sending TAKEOFF to {}m", altitude_m);

        fc.send(self.set_mode_message(ArduPilotMode::Guided)).await?;
        fc.send(self.arm_message()).await?;
        fc.send(self.takeoff_message(altitude_m)).await
    }

    /// Land at current position
    pub async fn land(&self, fc: &FlightController) -> Result<()> {
        info!("[MAVLink] Sending LAND command");
        fc.send(self.land_message()).await
    }

    /// Send a body-frame velocity target
    pub async fn send_setpoint(&self, fc: &FlightController, setpoint: &Setpoint) -> Result<()> {
        fc.send(self.velocity_message(setpoint)).await
    }

    /// Switch the streaming camera
    pub async fn select_camera(&self, fc: &FlightController, camera_id: u8) -> Result<()> {
        info!("[MAVLink] Selecting camera {}", camera_id);
        fc.send(self.control_video_message(camera_id)).await
    }
}

/// ArduPilot Copter flight modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ArduPilotMode {
    Stabilize = 0,
    Acro = 1,
    AltHold = 2,
    Auto = 3,
    Guided = 4,
    Loiter = 5,
    Rtl = 6,
    Circle = 7,
    Land = 9,
    Drift = 11,
    Sport = 13,
    Flip = 14,
    AutoTune = 15,
    PosHold = 16,
    Brake = 17,
    Throw = 18,
    AvoidAdsb = 19,
    GuidedNoGps = 20,
    SmartRtl = 21,
}

impl ArduPilotMode {
    /// Decode the HEARTBEAT custom_mode field
    pub fn from_custom_mode(mode: u32) -> Option<Self> {
        use ArduPilotMode::*;
        let mode = match mode {
            0 => Stabilize,
            1 => Acro,
            2 => AltHold,
            3 => Auto,
            4 => Guided,
            5 => Loiter,
            6 => Rtl,
            7 => Circle,
            9 => Land,
            11 => Drift,
            13 => Sport,
            14 => Flip,
            15 => AutoTune,
            16 => PosHold,
            17 => Brake,
            18 => Throw,
            19 => AvoidAdsb,
            20 => GuidedNoGps,
            21 => SmartRtl,
            _ => return None,
        };
        Some(mode)
    }

    pub fn name(self) -> &'static str {
        match self {
            ArduPilotMode::Stabilize => "STABILIZE",
            ArduPilotMode::Acro => "ACRO",
            ArduPilotMode::AltHold => "ALT_HOLD",
            ArduPilotMode::Auto => "AUTO",
            ArduPilotMode::Guided => "GUIDED",
            ArduPilotMode::Loiter => "LOITER",
            ArduPilotMode::Rtl => "RTL",
            ArduPilotMode::Circle => "CIRCLE",
            ArduPilotMode::Land => "LAND",
            ArduPilotMode::Drift => "DRIFT",
            ArduPilotMode::Sport => "SPORT",
            ArduPilotMode::Flip => "FLIP",
            ArduPilotMode::AutoTune => "AUTOTUNE",
            ArduPilotMode::PosHold => "POSHOLD",
            ArduPilotMode::Brake => "BRAKE",
            ArduPilotMode::Throw => "THROW",
            ArduPilotMode::AvoidAdsb => "AVOID_ADSB",
            ArduPilotMode::GuidedNoGps => "GUIDED_NOGPS",
            ArduPilotMode::SmartRtl => "SMART_RTL",
        }
    }
}
