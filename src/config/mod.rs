//! Configuration management for regfind.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables (`REGFIND_*`)
//! - Built-in defaults (lowest priority)

mod settings;

pub use settings::{Config, DEFAULT_LOG_LEVEL, DEFAULT_QUIET_PERIOD, DEFAULT_REFRESH_INTERVAL};
