//! Camera channel selection
//!
//! The drone streams video from one of two cameras. Each `C` command flips
//! the active channel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which physical camera feeds the video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraChannel {
    #[default]
    Front,
    Bottom,
}

impl CameraChannel {
    /// Drone configuration key that selects the video channel
    pub const CONFIG_KEY: &'static str = "video:video_channel";

    /// Numeric channel id understood by the drone
    pub fn id(self) -> u8 {
        match self {
            CameraChannel::Front => 0,
            CameraChannel::Bottom => 3,
        }
    }

    /// Look up a channel by its numeric id
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(CameraChannel::Front),
            3 => Some(CameraChannel::Bottom),
            _ => None,
        }
    }

    /// The other channel
    pub fn toggle(self) -> Self {
        match self {
            CameraChannel::Front => CameraChannel::Bottom,
            CameraChannel::Bottom => CameraChannel::Front,
        }
    }
}

impl fmt::Display for CameraChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraChannel::Front => write!(f, "front"),
            CameraChannel::Bottom => write!(f, "bottom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_channel_is_front() {
        assert_eq!(CameraChannel::default(), CameraChannel::Front);
    }

    #[test]
    fn test_toggle_twice_restores_channel() {
        let first = CameraChannel::Front.toggle();
        assert_eq!(first, CameraChannel::Bottom);
        assert_eq!(first.id(), 3);

        let second = first.toggle();
        assert_eq!(second, CameraChannel::Front);
        assert_eq!(second.id(), 0);
    }

    #[test]
    fn test_from_id() {
        assert_eq!(CameraChannel::from_id(0), Some(CameraChannel::Front));
        assert_eq!(CameraChannel::from_id(3), Some(CameraChannel::Bottom));
        assert_eq!(CameraChannel::from_id(4), None);
    }
}
