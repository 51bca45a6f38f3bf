//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load the scheduler's TOML
//! configuration and validate it before any thread is started.
//!
//! # Usage
//!
//! ```rust,no_run
//! use evo_common::config::{ConfigLoader, SchedulerFileConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = SchedulerFileConfig::load(Path::new("scheduler.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::consts::{
    DEFAULT_AXES, DEFAULT_CAPACITY, DEFAULT_EXIT_LEVELS, DEFAULT_RT_PRIORITY,
    DEFAULT_SHUTDOWN_TIMEOUT_MS, MAX_AXES, MAX_EXIT_LEVELS, RT_PRIORITY_MAX, RT_PRIORITY_MIN,
};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, per-event tracing.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages (e.g. degraded RT priority).
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across all EVO applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "evo-scheduler-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[scheduler]` section: queue and exit cascade sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    /// Backpressure threshold. Producers block while this many events are queued.
    pub capacity: usize,
    /// Number of axes with a PWM slot.
    pub max_axes: usize,
    /// Number of exit handler levels.
    pub exit_levels: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_axes: DEFAULT_AXES,
            exit_levels: DEFAULT_EXIT_LEVELS,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.capacity must be > 0".to_string(),
            ));
        }
        if self.max_axes == 0 || self.max_axes > MAX_AXES {
            return Err(ConfigError::ValidationError(format!(
                "scheduler.max_axes must be in 1..={MAX_AXES}, got {}",
                self.max_axes
            )));
        }
        if self.exit_levels == 0 || self.exit_levels > MAX_EXIT_LEVELS {
            return Err(ConfigError::ValidationError(format!(
                "scheduler.exit_levels must be in 1..={MAX_EXIT_LEVELS}, got {}",
                self.exit_levels
            )));
        }
        Ok(())
    }
}

/// `[rt]` section: consumer thread real-time setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RtConfig {
    /// `SCHED_FIFO` priority.
    pub priority: i32,
    /// CPU core to pin the consumer thread to.
    pub cpu_core: Option<usize>,
    /// Lock all memory pages (`mlockall`). Only honoured with the `rt` feature.
    pub lock_memory: bool,
}

impl Default for RtConfig {
    fn default() -> Self {
        Self {
            priority: DEFAULT_RT_PRIORITY,
            cpu_core: None,
            lock_memory: false,
        }
    }
}

impl RtConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(RT_PRIORITY_MIN..=RT_PRIORITY_MAX).contains(&self.priority) {
            return Err(ConfigError::ValidationError(format!(
                "rt.priority must be in {RT_PRIORITY_MIN}..={RT_PRIORITY_MAX}, got {}",
                self.priority
            )));
        }
        Ok(())
    }
}

/// `[fault]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FaultConfig {
    /// Upper bound a fatal-signal context waits for the exit cascade [ms].
    pub shutdown_timeout_ms: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl FaultConfig {
    /// `shutdown_timeout_ms` must be non-zero: a fatal-signal context parks
    /// at most that long before `_exit`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "fault.shutdown_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// One `[[pwm]]` channel started at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PwmChannelConfig {
    /// Axis index.
    pub axis: u8,
    /// High phase duration [ns].
    pub high_ns: u64,
    /// Low phase duration [ns].
    pub low_ns: u64,
}

/// Full scheduler configuration file.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "evo-scheduler"
///
/// [scheduler]
/// capacity = 256
///
/// [rt]
/// priority = 70
///
/// [[pwm]]
/// axis = 3
/// high_ns = 100000
/// low_ns = 50000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerFileConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub scheduler: QueueConfig,
    #[serde(default)]
    pub rt: RtConfig,
    #[serde(default)]
    pub fault: FaultConfig,
    #[serde(default)]
    pub pwm: Vec<PwmChannelConfig>,
}

impl SchedulerFileConfig {
    /// Validate every section, including boot PWM channels against `max_axes`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.scheduler.validate()?;
        self.rt.validate()?;
        self.fault.validate()?;
        for ch in &self.pwm {
            if ch.axis as usize >= self.scheduler.max_axes {
                return Err(ConfigError::ValidationError(format!(
                    "pwm channel axis {} out of range (max_axes = {})",
                    ch.axis, self.scheduler.max_axes
                )));
            }
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> SchedulerFileConfig {
        SchedulerFileConfig::from_toml("[shared]\nservice_name = \"sched\"\n").unwrap()
    }

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_directive(), "warn");
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"trace\"").unwrap().level,
            LogLevel::Trace
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"error\"").unwrap().level,
            LogLevel::Error
        );
    }

    #[test]
    fn test_defaults_applied() {
        let cfg = minimal();
        assert_eq!(cfg.scheduler, QueueConfig::default());
        assert_eq!(cfg.rt, RtConfig::default());
        assert_eq!(cfg.fault.shutdown_timeout_ms, DEFAULT_SHUTDOWN_TIMEOUT_MS);
        assert!(cfg.pwm.is_empty());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut cfg = minimal();
        cfg.scheduler.capacity = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_priority_out_of_range_rejected() {
        let mut cfg = minimal();
        cfg.rt.priority = 120;
        assert!(matches!(cfg.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_zero_shutdown_timeout_rejected() {
        let mut cfg = minimal();
        cfg.fault.shutdown_timeout_ms = 0;
        match cfg.validate() {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("shutdown_timeout_ms")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_pwm_axis_checked_against_max_axes() {
        let mut cfg = minimal();
        cfg.scheduler.max_axes = 4;
        cfg.pwm.push(PwmChannelConfig {
            axis: 4,
            high_ns: 10,
            low_ns: 10,
        });
        assert!(matches!(cfg.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
