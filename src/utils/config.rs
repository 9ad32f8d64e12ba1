//! Engine configuration
//!
//! Layered configuration: built-in defaults, an optional
//! `replay-engine.toml` file, then `REPLAY_ENGINE__*` environment variables.

use crate::storage::store::StorageConfig;
use crate::utils::errors::Result;
use serde::{Deserialize, Serialize};

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Session buffer thresholds
    pub buffer: BufferConfig,

    /// Compression relay tuning
    pub relay: RelayConfig,

    /// Stream delivery tuning
    pub stream: StreamConfig,

    /// Segment/session storage
    pub storage: StorageConfig,
}

/// Session buffer flush thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Flush threshold while an error session is recording
    pub low_threshold: usize,

    /// Flush threshold for normal sessions
    pub high_threshold: usize,

    /// Capture ingress channel capacity
    pub ingress_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            low_threshold: 8,
            high_threshold: 20,
            ingress_capacity: 1024,
        }
    }
}

/// Compression relay tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Queued batches that force a delivery
    pub queue_threshold: usize,

    /// Background flush/retry timer (milliseconds)
    pub flush_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            queue_threshold: 3,
            flush_interval_ms: 10_000,
        }
    }
}

/// Stream delivery tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Look-ahead window target (milliseconds of playable time)
    pub lookahead_ms: u64,

    /// Output channel capacity (segments in flight)
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 10_000,
            channel_capacity: 8,
        }
    }
}

impl EngineConfig {
    /// Load configuration from file + environment on top of defaults
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("replay-engine").required(false))
            .add_source(
                config::Environment::with_prefix("REPLAY_ENGINE")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_flush_rules() {
        let config = EngineConfig::default();
        assert_eq!(config.buffer.low_threshold, 8);
        assert_eq!(config.buffer.high_threshold, 20);
        assert_eq!(config.relay.queue_threshold, 3);
        assert_eq!(config.relay.flush_interval_ms, 10_000);
        assert_eq!(config.stream.lookahead_ms, 10_000);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = EngineConfig::load().unwrap();
        assert_eq!(config.buffer.high_threshold, 20);
    }
}
