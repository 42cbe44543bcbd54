//! Server Configuration

use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of shard stores
    pub shard_count: u32,

    /// Max TTL index entries enqueued per scanner pass
    pub scan_batch: usize,

    /// Scanner pool size (0 = auto-detect)
    pub scan_pool_size: usize,

    /// Max deletions per deleter pass
    pub del_batch: usize,

    /// Deleter pool size (0 = auto-detect)
    pub del_pool_size: usize,

    /// Dispatch-loop sleep between expiration ticks
    pub pause_time: Duration,

    /// Whether cluster mode (and the migrate-task gate) is enabled
    pub cluster_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shard_count: 10,
            scan_batch: 1000,
            scan_pool_size: 4,
            del_batch: 1000,
            del_pool_size: 4,
            pause_time: Duration::from_secs(10),
            cluster_enabled: false,
        }
    }
}

impl Config {
    pub fn with_shard_count(mut self, count: u32) -> Self {
        self.shard_count = count;
        self
    }

    pub fn with_scan_batch(mut self, batch: usize) -> Self {
        self.scan_batch = batch;
        self
    }

    pub fn with_del_batch(mut self, batch: usize) -> Self {
        self.del_batch = batch;
        self
    }

    pub fn with_pause_secs(mut self, secs: u64) -> Self {
        self.pause_time = Duration::from_secs(secs);
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause_time = pause;
        self
    }

    pub fn with_cluster_enabled(mut self, enabled: bool) -> Self {
        self.cluster_enabled = enabled;
        self
    }

    /// Resolve a pool-size setting, auto-detecting from CPU count when 0.
    pub fn resolve_pool_size(configured: usize) -> usize {
        if configured == 0 {
            num_cpus::get().clamp(4, 12)
        } else {
            configured
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let config = Config::default()
            .with_shard_count(2)
            .with_scan_batch(3)
            .with_pause(Duration::from_millis(25))
            .with_cluster_enabled(true);
        assert_eq!(config.shard_count, 2);
        assert_eq!(config.scan_batch, 3);
        assert_eq!(config.pause_time, Duration::from_millis(25));
        assert!(config.cluster_enabled);
    }

    #[test]
    fn pool_size_auto_detects_when_zero() {
        assert!(Config::resolve_pool_size(0) >= 4);
        assert_eq!(Config::resolve_pool_size(6), 6);
    }
}
