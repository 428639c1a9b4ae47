//! Configuration Module
//!
//! Handles loading cache and churn-host configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::cache::{DEFAULT_ALIGNMENT, MAX_ALIGNMENT, MIN_ALIGNMENT};
use crate::error::{CacheError, Result};

/// Cache and host configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Alignment boundary every copied payload must satisfy, in bytes
    pub alignment: usize,
    /// Upper bound on live cache-owned bytes, None = unbounded
    pub memory_limit: Option<usize>,
    /// Number of concurrent churn workers spawned by the host binary
    pub churn_workers: usize,
    /// Size of the key space each churn worker cycles through
    pub churn_keys: usize,
    /// TTL in milliseconds applied to churn inserts
    pub churn_ttl_ms: u64,
    /// Interval in seconds between stats reports
    pub report_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_ALIGNMENT` - Payload alignment in bytes (default: 64)
    /// - `CACHE_MEMORY_LIMIT` - Live byte limit (default: unbounded)
    /// - `CHURN_WORKERS` - Churn worker count (default: 4)
    /// - `CHURN_KEYS` - Keys per worker (default: 256)
    /// - `CHURN_TTL_MS` - TTL for churn inserts in milliseconds (default: 50)
    /// - `REPORT_INTERVAL` - Stats report frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            alignment: env_or("CACHE_ALIGNMENT", defaults.alignment),
            memory_limit: env::var("CACHE_MEMORY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok()),
            churn_workers: env_or("CHURN_WORKERS", defaults.churn_workers),
            churn_keys: env_or("CHURN_KEYS", defaults.churn_keys),
            churn_ttl_ms: env_or("CHURN_TTL_MS", defaults.churn_ttl_ms),
            report_interval: env_or("REPORT_INTERVAL", defaults.report_interval),
        }
    }

    /// Checks the values a cache can actually be built with.
    ///
    /// Host-only settings are not looked at; see [`validate_host`](Self::validate_host).
    pub fn validate(&self) -> Result<()> {
        if !self.alignment.is_power_of_two()
            || self.alignment < MIN_ALIGNMENT
            || self.alignment > MAX_ALIGNMENT
        {
            return Err(CacheError::InvalidConfig(format!(
                "alignment must be a power of two between {} and {}, got {}",
                MIN_ALIGNMENT, MAX_ALIGNMENT, self.alignment
            )));
        }

        Ok(())
    }

    /// Checks the cache settings plus the churn host's own knobs.
    pub fn validate_host(&self) -> Result<()> {
        self.validate()?;

        if self.churn_workers == 0 || self.churn_keys == 0 {
            return Err(CacheError::InvalidConfig(
                "churn workers and keys must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            memory_limit: None,
            churn_workers: 4,
            churn_keys: 256,
            churn_ttl_ms: 50,
            report_interval: 1,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.alignment, 64);
        assert_eq!(config.memory_limit, None);
        assert_eq!(config.churn_workers, 4);
        assert_eq!(config.churn_keys, 256);
        assert_eq!(config.churn_ttl_ms, 50);
        assert_eq!(config.report_interval, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CACHE_ALIGNMENT");
        env::remove_var("CACHE_MEMORY_LIMIT");
        env::remove_var("CHURN_WORKERS");
        env::remove_var("CHURN_KEYS");
        env::remove_var("CHURN_TTL_MS");
        env::remove_var("REPORT_INTERVAL");

        let config = Config::from_env();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_rejects_bad_alignment() {
        for alignment in [0, 4, 48, 256] {
            let config = Config {
                alignment,
                ..Config::default()
            };
            assert!(
                matches!(config.validate(), Err(CacheError::InvalidConfig(_))),
                "alignment {} should be rejected",
                alignment
            );
        }
    }

    #[test]
    fn test_config_rejects_zero_workers() {
        let config = Config {
            churn_workers: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate_host(),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_host_knobs_do_not_affect_cache_validation() {
        let config = Config {
            churn_workers: 0,
            churn_keys: 0,
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        let config = Config {
            alignment: 3,
            ..Config::default()
        };
        assert!(config.validate_host().is_err());
    }
}
