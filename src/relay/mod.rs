//! Network and console front ends of the relay
//!
//! - [`command`]: TCP listener for JSON commands
//! - [`frames`]: frame pump and HTTP latest-frame server
//! - [`navdata`]: TCP navigation data echo
//! - [`stdin`]: line-oriented commands from standard input

pub mod command;
pub mod frames;
pub mod navdata;
mod session;
pub mod stdin;

pub use command::serve_commands;
pub use frames::{run_frame_pump, serve_frames};
pub use navdata::serve_navdata;
pub use stdin::run_stdin;
