//! Configuration settings and validation.

use std::time::Duration;

use crate::pipeline::KeyMatch;
use crate::store::DEFAULT_ROOTS;
use crate::{Error, Result};

/// Default debounce window after the last search change.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(250);

/// Default period of the catch-up recompute.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// Default log level for both the CLI and [`Config::default`].
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Upper bound for per-source channel capacity.
const MAX_CHANNEL_CAPACITY: usize = 4096;

/// Session configuration for regfind.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root containers to enumerate, in order.
    pub roots: Vec<String>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Quiet period before a keyword change is applied.
    pub quiet_period: Duration,

    /// Period of the catch-up recompute.
    pub refresh_interval: Duration,

    /// Capacity of each enumerator channel and of the merged channel.
    pub channel_capacity: usize,

    /// Size of the first buffer offered for a value read.
    pub initial_read_buffer: usize,

    /// How the key filter is matched against entry paths.
    pub key_match: KeyMatch,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roots: DEFAULT_ROOTS.iter().map(|r| (*r).to_string()).collect(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            quiet_period: DEFAULT_QUIET_PERIOD,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            channel_capacity: 1,
            initial_read_buffer: 1024,
            key_match: KeyMatch::Prefix,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.roots.is_empty() {
            return Err(Error::config("at least one root is required"));
        }

        if let Some(dup) = self
            .roots
            .iter()
            .enumerate()
            .find(|(i, r)| self.roots[..*i].contains(r))
            .map(|(_, r)| r)
        {
            return Err(Error::config(format!("root '{dup}' listed twice")));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.quiet_period.is_zero() {
            return Err(Error::config("quiet_period cannot be 0"));
        }

        if self.refresh_interval.is_zero() {
            return Err(Error::config("refresh_interval cannot be 0"));
        }

        if self.channel_capacity == 0 {
            return Err(Error::config("channel_capacity cannot be 0"));
        }

        if self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(Error::config(format!(
                "channel_capacity cannot exceed {MAX_CHANNEL_CAPACITY}"
            )));
        }

        if self.initial_read_buffer == 0 {
            return Err(Error::config("initial_read_buffer cannot be 0"));
        }

        Ok(())
    }
}
