//! Configuration management for vanguard-helper

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_SERVICE_NAME: &str = "vgk";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name of the driver service to watch and stop
    pub service_name: String,

    /// Arguments passed to the elevated instance
    pub relaunch_arguments: Vec<String>,

    /// Delay between status polls (in milliseconds)
    pub poll_interval_ms: u64,

    /// How long to wait for the service to stop (in seconds)
    pub timeout_secs: u64,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            relaunch_arguments: vec!["disable".to_string(), "vanguard".to_string()],
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load defaults, then apply `VANGUARD_HELPER_*` environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate_and_fix();
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = var("VANGUARD_HELPER_SERVICE") {
            info!("Service name override from environment: {}", name);
            self.service_name = name;
        }

        if let Some(value) = var("VANGUARD_HELPER_POLL_INTERVAL_MS") {
            self.poll_interval_ms = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid VANGUARD_HELPER_POLL_INTERVAL_MS: {}", value))?;
        }

        if let Some(value) = var("VANGUARD_HELPER_TIMEOUT_SECS") {
            self.timeout_secs = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid VANGUARD_HELPER_TIMEOUT_SECS: {}", value))?;
        }

        if let Some(level) = var("VANGUARD_HELPER_LOG_LEVEL") {
            self.log_level = level;
        }

        Ok(())
    }

    /// Replace values that would make polling meaningless with defaults
    pub fn validate_and_fix(&mut self) {
        if self.service_name.trim().is_empty() {
            warn!("Empty service name, using '{}'", DEFAULT_SERVICE_NAME);
            self.service_name = DEFAULT_SERVICE_NAME.to_string();
        }

        if self.poll_interval_ms == 0 {
            warn!("Poll interval must be positive, using {}ms", DEFAULT_POLL_INTERVAL_MS);
            self.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        }

        if self.timeout_secs == 0 {
            warn!("Timeout must be positive, using {}s", DEFAULT_TIMEOUT_SECS);
            self.timeout_secs = DEFAULT_TIMEOUT_SECS;
        }

        if self.poll_interval() > self.timeout() {
            warn!(
                "Poll interval ({}ms) exceeds timeout ({}s), using {}ms",
                self.poll_interval_ms, self.timeout_secs, DEFAULT_POLL_INTERVAL_MS
            );
            self.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS.min(self.timeout_secs * 1000);
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
