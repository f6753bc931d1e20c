//! Balance configuration
//!
//! Configuration loaded from environment variables and command line.

use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Balance task configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceConfig {
    /// Whether the streaming service (and WAL-aware placement) is on
    pub streaming_enabled: bool,

    /// Execution timeout for segment tasks in milliseconds
    pub segment_task_timeout_ms: u64,

    /// Execution timeout for channel tasks in milliseconds
    pub channel_task_timeout_ms: u64,

    /// Log the plan report for every balance round
    pub print_plans: bool,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            streaming_enabled: false,
            segment_task_timeout_ms: 120_000,
            channel_task_timeout_ms: 60_000,
            print_plans: true,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string(), value.to_string())),
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), value.to_string()))
}

impl BalanceConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup
    ///
    /// Missing keys fall back to defaults; present but malformed keys fail.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("QUERYCOORD_STREAMING_ENABLED") {
            config.streaming_enabled = parse_bool("QUERYCOORD_STREAMING_ENABLED", &v)?;
        }

        if let Some(v) = lookup("QUERYCOORD_SEGMENT_TASK_TIMEOUT_MS") {
            config.segment_task_timeout_ms =
                parse_millis("QUERYCOORD_SEGMENT_TASK_TIMEOUT_MS", &v)?;
        }

        if let Some(v) = lookup("QUERYCOORD_CHANNEL_TASK_TIMEOUT_MS") {
            config.channel_task_timeout_ms =
                parse_millis("QUERYCOORD_CHANNEL_TASK_TIMEOUT_MS", &v)?;
        }

        if let Some(v) = lookup("QUERYCOORD_PRINT_PLANS") {
            config.print_plans = parse_bool("QUERYCOORD_PRINT_PLANS", &v)?;
        }

        Ok(config)
    }

    /// Get segment task timeout as Duration
    pub fn segment_task_timeout(&self) -> Duration {
        Duration::from_millis(self.segment_task_timeout_ms)
    }

    /// Get channel task timeout as Duration
    pub fn channel_task_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_task_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = BalanceConfig::default();
        assert!(!config.streaming_enabled);
        assert_eq!(config.segment_task_timeout(), Duration::from_secs(120));
        assert_eq!(config.channel_task_timeout(), Duration::from_secs(60));
        assert!(config.print_plans);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = BalanceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, BalanceConfig::default());
    }

    #[test]
    fn test_lookup_overrides() {
        let config = BalanceConfig::from_lookup(lookup(&[
            ("QUERYCOORD_STREAMING_ENABLED", "1"),
            ("QUERYCOORD_SEGMENT_TASK_TIMEOUT_MS", "5000"),
            ("QUERYCOORD_PRINT_PLANS", "false"),
        ]))
        .unwrap();
        assert!(config.streaming_enabled);
        assert_eq!(config.segment_task_timeout(), Duration::from_secs(5));
        assert_eq!(config.channel_task_timeout_ms, 60_000);
        assert!(!config.print_plans);
    }

    #[test]
    fn test_invalid_value() {
        let bad_timeout = lookup(&[("QUERYCOORD_CHANNEL_TASK_TIMEOUT_MS", "soon")]);
        let err = BalanceConfig::from_lookup(bad_timeout).unwrap_err();
        assert!(err.to_string().contains("QUERYCOORD_CHANNEL_TASK_TIMEOUT_MS"));

        let bad_flag = lookup(&[("QUERYCOORD_STREAMING_ENABLED", "maybe")]);
        assert!(BalanceConfig::from_lookup(bad_flag).is_err());
    }
}
