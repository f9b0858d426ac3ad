//! CLI command implementations
//!
//! Every command takes an already-connected [`MibController`] so it works the
//! same over a serial port or a TCP bridge.
//!
//! [`MibController`]: mibctl_core::MibController

pub mod alarm;
pub mod bus;
pub mod firmware;
pub mod flash;
mod progress;

pub use progress::BarProgress;

use thiserror::Error;

/// Failures detected by the CLI itself, before the controller is involved
#[derive(Debug, Error)]
pub enum CliError {
    #[error("input file {0:?} is empty")]
    EmptyInput(std::path::PathBuf),

    #[error("bucket {index} is not loaded: {reason}")]
    BucketNotLoaded { index: u8, reason: String },

    #[error("specify a module --name or --address")]
    NoModuleQuery,
}
