//! EVO Common Library
//!
//! Shared constants and configuration loading for the EVO event scheduler
//! workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - System-wide limits and defaults
//! - [`config`] - TOML configuration types and the `ConfigLoader` trait
//! - [`prelude`] - Common re-exports for convenience

pub mod config;
pub mod consts;
pub mod prelude;
