//! Command execution for the relay
//!
//! Decoded commands are planned into drone calls by the shared crate and
//! applied here, one call at a time, against the active drone client.

mod executor;

pub use executor::CommandExecutor;
