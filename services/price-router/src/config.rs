//! Router configuration
//!
//! Tunable thresholds consumed by the failover and publication logic, plus
//! the optional candidate list used by the binary at startup. Defaults match
//! the production settings; every value can be overridden from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};
use types::ids::{InstrumentId, StreamId};
use types::tick::NANOS_PER_MILLI;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// How the publication rate rule is keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationScope {
    /// One rate window per instrument.
    #[default]
    PerInstrument,
    /// A single rate window shared by every instrument (legacy behaviour).
    Global,
}

/// A candidate stream declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub instrument: InstrumentId,
    pub stream: StreamId,
    pub rank: i32,
}

/// Configuration for the price router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum spacing between two publications for the same key.
    pub min_publish_interval_ms: u64,
    /// Gap between consecutive ticks on the active stream that marks it stale.
    pub stale_threshold_ms: u64,
    /// Statistics retention window. Informational only.
    pub statistics_retention_window_ms: u64,
    /// Tick-to-tick move on the active stream, in percent, that marks it divergent.
    pub divergence_threshold_percent: u32,
    /// Keying of the publication rate rule.
    pub publication_scope: PublicationScope,
    /// Bounded capacity of each per-stream worker queue.
    pub stream_channel_capacity: usize,
    /// Candidates registered at startup.
    pub candidates: Vec<CandidateConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_publish_interval_ms: 50,
            stale_threshold_ms: 150,
            statistics_retention_window_ms: 60_000,
            divergence_threshold_percent: 20,
            publication_scope: PublicationScope::PerInstrument,
            stream_channel_capacity: 1024,
            candidates: Vec::new(),
        }
    }
}

impl RouterConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stale_threshold_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "stale_threshold_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.divergence_threshold_percent == 0 {
            return Err(ConfigError::Invalid {
                field: "divergence_threshold_percent",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.stream_channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "stream_channel_capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        for field in [
            ("min_publish_interval_ms", self.min_publish_interval_ms),
            ("stale_threshold_ms", self.stale_threshold_ms),
            ("statistics_retention_window_ms", self.statistics_retention_window_ms),
        ] {
            if field.1 > (i64::MAX / NANOS_PER_MILLI) as u64 {
                return Err(ConfigError::Invalid {
                    field: field.0,
                    reason: format!("{} ms overflows the nanosecond clock", field.1),
                });
            }
        }
        Ok(())
    }

    /// Minimum publish interval in nanoseconds.
    pub fn min_publish_interval_ns(&self) -> i64 {
        millis_to_nanos(self.min_publish_interval_ms)
    }

    /// Stale threshold in nanoseconds.
    pub fn stale_threshold_ns(&self) -> i64 {
        millis_to_nanos(self.stale_threshold_ms)
    }

    /// Failover thresholds derived from this configuration.
    pub fn failover_policy(&self) -> crate::failover::FailoverPolicy {
        crate::failover::FailoverPolicy {
            stale_threshold_ns: self.stale_threshold_ns(),
            divergence_threshold_percent: self.divergence_threshold_percent,
        }
    }
}

fn millis_to_nanos(ms: u64) -> i64 {
    i64::try_from(ms)
        .ok()
        .and_then(|ms| ms.checked_mul(NANOS_PER_MILLI))
        .unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.min_publish_interval_ms, 50);
        assert_eq!(config.stale_threshold_ms, 150);
        assert_eq!(config.statistics_retention_window_ms, 60_000);
        assert_eq!(config.divergence_threshold_percent, 20);
        assert_eq!(config.publication_scope, PublicationScope::PerInstrument);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nanosecond_conversion() {
        let config = RouterConfig::default();
        assert_eq!(config.min_publish_interval_ns(), 50_000_000);
        assert_eq!(config.stale_threshold_ns(), 150_000_000);
    }

    #[test]
    fn test_from_toml_partial_override() {
        let config = RouterConfig::from_toml_str(
            r#"
            stale_threshold_ms = 300
            publication_scope = "global"

            [[candidates]]
            instrument = "AAPL"
            stream = "feed-a"
            rank = 1

            [[candidates]]
            instrument = "AAPL"
            stream = "feed-b"
            rank = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.stale_threshold_ms, 300);
        assert_eq!(config.min_publish_interval_ms, 50);
        assert_eq!(config.publication_scope, PublicationScope::Global);
        assert_eq!(config.candidates.len(), 2);
        assert_eq!(config.candidates[1].stream.as_str(), "feed-b");
    }

    #[test]
    fn test_zero_stale_threshold_rejected() {
        let result = RouterConfig::from_toml_str("stale_threshold_ms = 0");
        match result {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "stale_threshold_ms"),
            other => panic!("Expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(matches!(
            RouterConfig::from_toml_str("stale_threshold_ms = \"fast\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = RouterConfig::load("/nonexistent/price-router.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
