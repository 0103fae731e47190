//! Configuration types for dns-proxy
//!
//! These structures mirror the YAML schema. Duration values are written
//! as strings (`"2s"`, `"50ms"`, `"5m"`). Defaults are applied for every
//! optional field; `primary.host` and a non-empty `fallback` list are the
//! only hard requirements.

use std::time::Duration;

use serde::Deserialize;

use super::duration;
use crate::error::ConfigError;

fn default_listen() -> String {
    "0.0.0.0:53".to_string()
}

fn default_read_deadline() -> Duration {
    Duration::from_secs(2)
}

fn default_down_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_failure_threshold() -> u32 {
    3
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Local address to bind, `host:port`
    #[serde(default = "default_listen")]
    pub listen: String,

    /// How long to wait for an upstream response before charging a failure
    #[serde(
        default = "default_read_deadline",
        deserialize_with = "duration::deserialize"
    )]
    pub read_deadline: Duration,

    /// Preferred upstream resolver
    pub primary: PrimaryConfig,

    /// Alternative resolvers, consulted only while the primary is down
    #[serde(default)]
    pub fallback: Vec<FallbackConfig>,

    /// Fallback scoring parameters
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl Config {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if a required field is
    /// missing or a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.is_empty() {
            return Err(ConfigError::validation("listen address must not be empty"));
        }
        if self.primary.host.is_empty() {
            return Err(ConfigError::validation("primary.host is required"));
        }
        if self.primary.failure_threshold == 0 {
            return Err(ConfigError::validation(
                "primary.failure_threshold must be at least 1",
            ));
        }
        if self.fallback.is_empty() {
            return Err(ConfigError::validation(
                "at least one fallback server is required",
            ));
        }
        for (i, fb) in self.fallback.iter().enumerate() {
            if fb.host.is_empty() {
                return Err(ConfigError::validation(format!(
                    "fallback[{i}].host must not be empty"
                )));
            }
        }
        self.scoring.validate()
    }
}

/// Primary upstream configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryConfig {
    /// Upstream endpoint, `host:port` (port defaults to 53)
    pub host: String,

    /// How long the primary stays bypassed once marked down
    #[serde(
        default = "default_down_ttl",
        deserialize_with = "duration::deserialize"
    )]
    pub down_ttl: Duration,

    /// Consecutive failures required before the primary is marked down
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

/// A single fallback upstream
#[derive(Debug, Clone, Deserialize)]
pub struct FallbackConfig {
    /// Upstream endpoint, `host:port` (port defaults to 53)
    pub host: String,
}

/// Fallback scoring parameters
///
/// Scores are `smoothed_rtt + decayed_penalty`, lower is better. The
/// penalty decays exponentially with the configured half-life; a half-life
/// of zero disables decay entirely.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// RTT estimate assigned to every fallback at startup
    #[serde(deserialize_with = "duration::deserialize")]
    pub initial_rtt: Duration,

    /// Penalty installed on a fallback when a forwarding attempt fails
    #[serde(deserialize_with = "duration::deserialize")]
    pub penalty_add: Duration,

    /// Half-life of the penalty decay; zero means the penalty never decays
    #[serde(deserialize_with = "duration::deserialize")]
    pub penalty_half_life: Duration,

    /// EMA smoothing factor: `new = old * alpha + sample * (1 - alpha)`
    pub rtt_ema_alpha: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            initial_rtt: Duration::from_millis(50),
            penalty_add: Duration::from_secs(1),
            penalty_half_life: Duration::from_secs(30),
            rtt_ema_alpha: 0.5,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rtt_ema_alpha > 0.0 && self.rtt_ema_alpha < 1.0) {
            return Err(ConfigError::validation(format!(
                "scoring.rtt_ema_alpha must be in (0, 1), got {}",
                self.rtt_ema_alpha
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> Config {
        Config {
            listen: default_listen(),
            read_deadline: default_read_deadline(),
            primary: PrimaryConfig {
                host: "1.1.1.1:53".into(),
                down_ttl: default_down_ttl(),
                failure_threshold: default_failure_threshold(),
            },
            fallback: vec![FallbackConfig {
                host: "8.8.8.8:53".into(),
            }],
            scoring: ScoringConfig::default(),
        }
    }

    #[test]
    fn test_defaults() {
        let config = minimal_config();
        assert_eq!(config.listen, "0.0.0.0:53");
        assert_eq!(config.read_deadline, Duration::from_secs(2));
        assert_eq!(config.primary.down_ttl, Duration::from_secs(300));
        assert_eq!(config.primary.failure_threshold, 3);
        assert_eq!(config.scoring.initial_rtt, Duration::from_millis(50));
        assert_eq!(config.scoring.penalty_add, Duration::from_secs(1));
        assert_eq!(config.scoring.penalty_half_life, Duration::from_secs(30));
        assert!((config.scoring.rtt_ema_alpha - 0.5).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_primary_host() {
        let mut config = minimal_config();
        config.primary.host = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("primary.host"));
    }

    #[test]
    fn test_validate_empty_fallback() {
        let mut config = minimal_config();
        config.fallback.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fallback"));
    }

    #[test]
    fn test_validate_alpha_range() {
        let mut config = minimal_config();
        config.scoring.rtt_ema_alpha = 1.0;
        assert!(config.validate().is_err());

        config.scoring.rtt_ema_alpha = 0.0;
        assert!(config.validate().is_err());

        config.scoring.rtt_ema_alpha = 0.99;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_failure_threshold() {
        let mut config = minimal_config();
        config.primary.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_half_life_is_valid() {
        // Zero half-life is meaningful: the penalty never decays.
        let mut config = minimal_config();
        config.scoring.penalty_half_life = Duration::ZERO;
        assert!(config.validate().is_ok());
    }
}
