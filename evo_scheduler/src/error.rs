//! Error types for scheduler operations

use crate::event::AxisId;
use evo_common::config::ConfigError;
use thiserror::Error;

/// Errors that can occur while setting up or driving the scheduler
#[derive(Error, Debug)]
pub enum SchedError {
    /// Exit handler registered beyond the configured number of levels
    #[error("Exit handler level {level} out of range (levels = {levels})")]
    ExitLevel {
        /// Requested level
        level: usize,
        /// Configured number of levels
        levels: usize,
    },

    /// Axis index has no PWM slot
    #[error("Axis {axis} out of range (max_axes = {max_axes})")]
    AxisOutOfRange {
        /// Requested axis
        axis: AxisId,
        /// Configured number of axes
        max_axes: usize,
    },

    /// A fault guard is already active in this process
    #[error("Fault guard already installed")]
    FaultGuardInstalled,

    /// RT system call failed
    #[error("RT setup error: {0}")]
    RtSetup(String),

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },

    /// Configuration error
    #[error("Configuration error: {source}")]
    Config {
        /// Source config error
        #[from]
        source: ConfigError,
    },
}

/// Result type for scheduler operations
pub type SchedResult<T> = Result<T, SchedError>;
