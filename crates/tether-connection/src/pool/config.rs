//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a connection pool
///
/// Controls pool sizing, idle expiration, and release behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of connections opened by `Pool::warm`
    min_size: usize,
    /// Maximum number of live connections allowed in the pool
    max_size: usize,
    /// Age in milliseconds after which an idle connection is expired
    expiration_ms: u64,
    /// Interval in milliseconds between background eviction sweeps
    ///
    /// `None` disables the background sweeper; expired connections are
    /// then only evicted by explicit `evict_expired` calls.
    sweep_interval_ms: Option<u64>,
    /// Close connections on release instead of parking them idle
    close_on_release: bool,
}

impl PoolConfig {
    /// Create a new pool configuration with the given min and max sizes
    ///
    /// # Panics
    ///
    /// Panics if `min_size > max_size` or if `max_size` is 0.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        assert!(
            max_size > 0,
            "max_size must be greater than 0, got {}",
            max_size
        );
        assert!(
            min_size <= max_size,
            "min_size ({}) cannot exceed max_size ({})",
            min_size,
            max_size
        );

        Self {
            min_size,
            max_size,
            expiration_ms: 300_000, // 5 minutes default
            sweep_interval_ms: Some(60_000),
            close_on_release: false,
        }
    }

    /// Set the idle expiration in milliseconds
    pub fn with_expiration_ms(mut self, expiration_ms: u64) -> Self {
        self.expiration_ms = expiration_ms;
        self
    }

    /// Set the background sweep interval in milliseconds
    pub fn with_sweep_interval_ms(mut self, interval_ms: u64) -> Self {
        self.sweep_interval_ms = Some(interval_ms);
        self
    }

    /// Disable the background eviction sweeper
    pub fn without_sweeper(mut self) -> Self {
        self.sweep_interval_ms = None;
        self
    }

    /// Close connections on release instead of recycling them
    pub fn with_close_on_release(mut self, close_on_release: bool) -> Self {
        self.close_on_release = close_on_release;
        self
    }

    /// Get the minimum pool size
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Get the maximum pool size
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the idle expiration as a Duration
    pub fn expiration(&self) -> Duration {
        Duration::from_millis(self.expiration_ms)
    }

    /// Get the sweep interval as a Duration if the sweeper is enabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_ms.map(Duration::from_millis)
    }

    /// Whether released connections are closed instead of recycled
    pub fn close_on_release(&self) -> bool {
        self.close_on_release
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - min_size: 1
    /// - max_size: 5
    /// - expiration: 5 minutes
    /// - sweep_interval: 1 minute
    /// - close_on_release: false
    fn default() -> Self {
        Self::new(1, 5)
    }
}
