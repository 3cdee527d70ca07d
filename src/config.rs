//! Control-plane configuration: the knobs named in spec.md §6 (chunk size
//! policy, concurrency limits, retry/FEC parameters, scheduler/announce
//! cadence), grounded on the reference engine's `ConnectionConfig` +
//! `MetricsBuilder` builder idiom.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::{FecConfig, RetryPolicy};
use crate::transport::TransportMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkSizePolicy {
    /// Chunk size is derived from the transport's step table (spec.md §4.7).
    Adaptive,
    /// Always use the given size, ignoring transport/quality.
    Fixed(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub chunk_size_policy: ChunkSizePolicy,
    pub max_concurrent_transfers: usize,
    pub max_lanes_per_transfer: usize,
    pub default_mode: TransportMode,
    pub retry_policy: RetryPolicy,
    pub fec_config: FecConfig,
    pub scheduler_tick_interval: Duration,
    pub announce_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size_policy: ChunkSizePolicy::Adaptive,
            max_concurrent_transfers: 16,
            max_lanes_per_transfer: 4,
            default_mode: TransportMode::Hybrid,
            retry_policy: RetryPolicy::default(),
            fec_config: FecConfig::default(),
            scheduler_tick_interval: Duration::from_millis(50),
            announce_interval: Duration::from_secs(60),
        }
    }
}

/// Builder mirroring the metrics exporter's fluent config style.
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self { config: EngineConfig::default() }
    }

    pub fn chunk_size_policy(mut self, policy: ChunkSizePolicy) -> Self {
        self.config.chunk_size_policy = policy;
        self
    }

    pub fn max_concurrent_transfers(mut self, n: usize) -> Self {
        self.config.max_concurrent_transfers = n;
        self
    }

    pub fn max_lanes_per_transfer(mut self, n: usize) -> Self {
        self.config.max_lanes_per_transfer = n;
        self
    }

    pub fn default_mode(mut self, mode: TransportMode) -> Self {
        self.config.default_mode = mode;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    pub fn fec_config(mut self, fec: FecConfig) -> Self {
        self.config.fec_config = fec;
        self
    }

    pub fn scheduler_tick_interval(mut self, interval: Duration) -> Self {
        self.config.scheduler_tick_interval = interval;
        self
    }

    pub fn announce_interval(mut self, interval: Duration) -> Self {
        self.config.announce_interval = interval;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = EngineConfigBuilder::new()
            .max_concurrent_transfers(4)
            .default_mode(TransportMode::Rf)
            .build();
        assert_eq!(config.max_concurrent_transfers, 4);
        assert_eq!(config.default_mode, TransportMode::Rf);
        assert_eq!(config.max_lanes_per_transfer, 4);
    }
}
