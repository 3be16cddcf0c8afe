//! Relay configuration from the command line and environment.
//!
//! A preset picks the ports, listeners and honored command fields of one of
//! the historical relay layouts. Explicit flags override the preset; a port
//! of 0 disables that listener.

use clap::{Parser, ValueEnum};
use drone_relay_shared::{CommandField, FieldSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::drone::mavlink::{FcConfig, MavlinkConfig};

/// Named bundles of ports, listeners and command fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Preset {
    /// Commands on 9001, latest frame over HTTP on 9000
    #[default]
    Default,
    /// Commands on 9000, navigation data on 9001
    Parrot,
    /// Commands from stdin (X, Y, T, L only), latest frame over HTTP on 9000
    Stream,
    /// Commands on 5432, navigation data on 5433
    Basic,
}

struct PresetLayout {
    command_port: Option<u16>,
    navdata_port: Option<u16>,
    http_port: Option<u16>,
    stdin: bool,
    fields: FieldSet,
}

impl Preset {
    fn layout(self) -> PresetLayout {
        match self {
            Preset::Default => PresetLayout {
                command_port: Some(9001),
                navdata_port: None,
                http_port: Some(9000),
                stdin: false,
                fields: FieldSet::ALL,
            },
            Preset::Parrot => PresetLayout {
                command_port: Some(9000),
                navdata_port: Some(9001),
                http_port: None,
                stdin: false,
                fields: FieldSet::ALL,
            },
            Preset::Stream => PresetLayout {
                command_port: None,
                navdata_port: None,
                http_port: Some(9000),
                stdin: true,
                fields: FieldSet::of(&[
                    CommandField::X,
                    CommandField::Y,
                    CommandField::Takeoff,
                    CommandField::Land,
                ]),
            },
            Preset::Basic => PresetLayout {
                command_port: Some(5432),
                navdata_port: Some(5433),
                http_port: None,
                stdin: false,
                fields: FieldSet::ALL,
            },
        }
    }
}

/// Which drone client to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DroneBackend {
    /// ArduPilot/PX4 flight controller over MAVLink
    #[default]
    Mavlink,
    /// Log and record calls without a drone
    Simulated,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay JSON commands to a drone and serve its latest video frame")]
pub struct Args {
    /// Listener layout to start from
    #[arg(long, value_enum, default_value = "default", env = "DRONE_RELAY_PRESET")]
    pub preset: Preset,

    /// Address all listeners bind to
    #[arg(long, default_value = "0.0.0.0", env = "DRONE_RELAY_BIND")]
    pub bind: IpAddr,

    /// TCP port for JSON commands (0 disables)
    #[arg(long, env = "DRONE_RELAY_COMMAND_PORT")]
    pub command_port: Option<u16>,

    /// HTTP port for the latest frame (0 disables)
    #[arg(long, env = "DRONE_RELAY_HTTP_PORT")]
    pub http_port: Option<u16>,

    /// TCP port for navigation data queries (0 disables)
    #[arg(long, env = "DRONE_RELAY_NAVDATA_PORT")]
    pub navdata_port: Option<u16>,

    /// Do not serve frames over HTTP
    #[arg(long)]
    pub no_http: bool,

    /// Also read commands from stdin; land and exit when it closes
    #[arg(long)]
    pub stdin: bool,

    /// Drone client backend
    #[arg(long, value_enum, default_value = "mavlink", env = "DRONE_RELAY_DRONE")]
    pub drone: DroneBackend,

    /// MAVLink connection string (udpin:, udpout:, tcpin:, tcpout:, serial:)
    #[arg(long, default_value = "udpin:0.0.0.0:14550", env = "DRONE_RELAY_FC_ADDRESS")]
    pub fc_address: String,

    /// host:port of a TCP source emitting concatenated PNG frames
    #[arg(long, env = "DRONE_RELAY_VIDEO_SOURCE")]
    pub video_source: Option<String>,

    /// Velocity in m/s for a speed of 1.0
    #[arg(long, default_value_t = 5.0)]
    pub max_speed: f32,

    /// Yaw rate in deg/s for a rotation speed of 1.0
    #[arg(long, default_value_t = 90.0)]
    pub max_yaw_rate: f32,

    /// Takeoff altitude in meters
    #[arg(long, default_value_t = 2.0)]
    pub takeoff_altitude: f32,
}

/// Resolved relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub preset: Preset,
    pub bind: IpAddr,
    pub command_port: Option<u16>,
    pub navdata_port: Option<u16>,
    pub http_port: Option<u16>,
    pub stdin: bool,
    pub fields: FieldSet,
    pub drone: DroneBackend,
    pub mavlink: MavlinkConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::for_preset(Preset::Default)
    }
}

impl RelayConfig {
    /// Configuration for a preset with default drone settings
    pub fn for_preset(preset: Preset) -> Self {
        let layout = preset.layout();
        Self {
            preset,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            command_port: layout.command_port,
            navdata_port: layout.navdata_port,
            http_port: layout.http_port,
            stdin: layout.stdin,
            fields: layout.fields,
            drone: DroneBackend::default(),
            mavlink: MavlinkConfig::default(),
        }
    }

    /// Apply command-line flags on top of their preset
    pub fn from_args(args: Args) -> Self {
        let mut config = Self::for_preset(args.preset);

        config.bind = args.bind;
        config.command_port = port_override(args.command_port, config.command_port);
        config.navdata_port = port_override(args.navdata_port, config.navdata_port);
        config.http_port = port_override(args.http_port, config.http_port);
        if args.no_http {
            config.http_port = None;
        }
        config.stdin |= args.stdin;
        config.drone = args.drone;
        config.mavlink = MavlinkConfig {
            fc: FcConfig {
                address: args.fc_address,
                ..Default::default()
            },
            video_source: args.video_source,
            max_speed_mps: args.max_speed,
            max_yaw_rate_deg: args.max_yaw_rate,
            takeoff_altitude_m: args.takeoff_altitude,
        };

        config
    }

    pub fn command_addr(&self) -> Option<SocketAddr> {
        self.command_port.map(|port| SocketAddr::new(self.bind, port))
    }

    pub fn navdata_addr(&self) -> Option<SocketAddr> {
        self.navdata_port.map(|port| SocketAddr::new(self.bind, port))
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_port.map(|port| SocketAddr::new(self.bind, port))
    }

    /// True when at least one command or frame path is enabled
    pub fn has_work(&self) -> bool {
        self.command_port.is_some()
            || self.navdata_port.is_some()
            || self.http_port.is_some()
            || self.stdin
    }
}

fn port_override(flag: Option<u16>, preset: Option<u16>) -> Option<u16> {
    match flag {
        Some(0) => None,
        Some(port) => Some(port),
        None => preset,
    }
}
