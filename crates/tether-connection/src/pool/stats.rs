//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Statistics about a connection pool's current state
///
/// Provides insight into pool utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Total number of live connections (idle + leased + keyed)
    live: usize,
    /// Number of idle connections available for reuse
    idle: usize,
    /// Number of anonymous leases outstanding
    leased: usize,
    /// Number of keyed bindings
    keyed: usize,
    /// Configured ceiling on live connections
    max_size: usize,
}

impl PoolStats {
    /// Create new pool statistics
    pub fn new(live: usize, idle: usize, leased: usize, keyed: usize, max_size: usize) -> Self {
        Self {
            live,
            idle,
            leased,
            keyed,
            max_size,
        }
    }

    /// Get the total number of live connections
    pub fn live(&self) -> usize {
        self.live
    }

    /// Get the number of idle connections
    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Get the number of anonymous leases outstanding
    pub fn leased(&self) -> usize {
        self.leased
    }

    /// Get the number of keyed bindings
    pub fn keyed(&self) -> usize {
        self.keyed
    }

    /// Get the configured connection ceiling
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Calculate pool utilization as a fraction (0.0 to 1.0)
    ///
    /// Returns 0.0 if max_size is 0 to avoid division by zero.
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.live as f64 / self.max_size as f64
        }
    }

    /// Check if the pool is at its connection ceiling
    pub fn is_full(&self) -> bool {
        self.live >= self.max_size && self.max_size > 0
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new(0, 0, 0, 0, 0)
    }
}
