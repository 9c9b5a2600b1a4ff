//! Session configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [session]
//! principal_ttl = "1h"
//! token_lifetime = "7d"
//! reaper_interval = "5m"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifetimes used by authentication and the session cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long an authenticated principal stays cached under its
    /// `(email, token)` key. Zero caches without expiry.
    #[serde(with = "humantime_serde")]
    pub principal_ttl: Duration,

    /// Lifetime of access tokens issued at login.
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,

    /// Interval of the background sweep of expired cache entries.
    /// Zero disables the sweep; entries then only expire on read.
    #[serde(with = "humantime_serde")]
    pub reaper_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            principal_ttl: Duration::from_secs(3600),           // 1 hour
            token_lifetime: Duration::from_secs(7 * 24 * 3600), // 7 days
            reaper_interval: Duration::from_secs(300),          // 5 minutes
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl SessionConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `token_lifetime` is zero
    /// - `principal_ttl` outlives `token_lifetime`, which would keep
    ///   accepting a token after it expired
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "session.token_lifetime must be > 0".to_string(),
            ));
        }

        if self.principal_ttl > self.token_lifetime {
            return Err(ConfigError::InvalidValue(format!(
                "session.principal_ttl ({:?}) must not exceed session.token_lifetime ({:?})",
                self.principal_ttl, self.token_lifetime
            )));
        }

        Ok(())
    }

    /// Returns the reaper interval, or `None` when the sweep is disabled.
    #[must_use]
    pub fn reaper(&self) -> Option<Duration> {
        (!self.reaper_interval.is_zero()).then_some(self.reaper_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.principal_ttl, Duration::from_secs(3600));
        assert_eq!(config.token_lifetime, Duration::from_secs(604_800));
        assert_eq!(config.reaper(), Some(Duration::from_secs(300)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_token_lifetime_fails_validation() {
        let config = SessionConfig {
            token_lifetime: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_principal_ttl_longer_than_token_fails_validation() {
        let config = SessionConfig {
            principal_ttl: Duration::from_secs(8 * 24 * 3600),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_reaper_interval_disables_sweep() {
        let config = SessionConfig {
            reaper_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.reaper(), None);
    }

    #[test]
    fn test_humantime_durations() {
        let json = r#"{"principal_ttl":"30m","token_lifetime":"2days","reaper_interval":"0s"}"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.principal_ttl, Duration::from_secs(1800));
        assert_eq!(config.token_lifetime, Duration::from_secs(172_800));
        assert_eq!(config.reaper(), None);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue("test error".to_string());
        assert_eq!(err.to_string(), "Invalid configuration value: test error");
    }
}
