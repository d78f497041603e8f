//! Detection tuning. The app's hardcoded trigger radius, cache TTL, and
//! poll interval live here as configurable parameters.
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised when detection configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive (got {value})")]
    NonPositive { field: &'static str, value: f64 },
}

/// Tuning for proximity detection and course syncing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Default trigger radius applied to projected missions, in meters.
    #[serde(default = "DetectionConfig::default_trigger_radius_m")]
    pub trigger_radius_m: f64,
    /// How long a fetched spot list stays fresh.
    #[serde(default = "DetectionConfig::default_spot_cache_ttl_secs")]
    pub spot_cache_ttl_secs: u64,
    /// Pause between detection ticks while the app is foregrounded.
    #[serde(default = "DetectionConfig::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Emit at most one arrival notice per mission.
    #[serde(default = "DetectionConfig::default_notify_once")]
    pub notify_once: bool,
}

impl DetectionConfig {
    #[must_use]
    pub const fn default_trigger_radius_m() -> f64 {
        100.0
    }

    #[must_use]
    pub const fn default_spot_cache_ttl_secs() -> u64 {
        300
    }

    #[must_use]
    pub const fn default_poll_interval_secs() -> u64 {
        30
    }

    #[must_use]
    pub const fn default_notify_once() -> bool {
        true
    }

    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.spot_cache_ttl_secs)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when any field violates the documented bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.trigger_radius_m.is_finite() || self.trigger_radius_m <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "trigger_radius_m",
                value: self.trigger_radius_m,
            });
        }
        if self.spot_cache_ttl_secs == 0 {
            return Err(ConfigError::NonPositive {
                field: "spot_cache_ttl_secs",
                value: 0.0,
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::NonPositive {
                field: "poll_interval_secs",
                value: 0.0,
            });
        }
        Ok(())
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            trigger_radius_m: Self::default_trigger_radius_m(),
            spot_cache_ttl_secs: Self::default_spot_cache_ttl_secs(),
            poll_interval_secs: Self::default_poll_interval_secs(),
            notify_once: Self::default_notify_once(),
        }
    }
}
