//! Process-wide pool accessor
//!
//! A thin layer over an owned [`Pool`] for applications that want one
//! shared pool without threading the handle everywhere. `configure`
//! replaces the installed pool wholesale; there is no in-place
//! reconfiguration.

use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tether_core::{Result, TetherError};

use crate::pool::{Connector, Pool, PoolConfig};

static POOL: LazyLock<RwLock<Option<Arc<Pool>>>> = LazyLock::new(|| RwLock::new(None));

/// Build a pool from `config` and `connector` and install it as the
/// process-wide pool, returning the handle.
///
/// Any previously installed pool is replaced wholesale. The accessor
/// never shuts the old pool down implicitly; call [`deconfigure`] first
/// and shut it down yourself if its connections matter.
pub fn configure<C: Connector>(config: PoolConfig, connector: C) -> Arc<Pool> {
    let pool = Pool::new(config, connector);
    let previous = POOL.write().replace(pool.clone());
    if let Some(previous) = previous {
        if !previous.is_closed() {
            tracing::warn!(
                live = previous.stats().live(),
                "process-wide pool replaced without shutdown"
            );
        }
    }
    tracing::info!("process-wide pool configured");
    pool
}

/// Get the process-wide pool.
///
/// Fails with `Closed` when no pool has been configured.
pub fn get_pool() -> Result<Arc<Pool>> {
    POOL.read().clone().ok_or(TetherError::Closed)
}

/// Remove and return the process-wide pool, if any.
///
/// The caller owns the returned pool and is responsible for shutting it
/// down.
pub fn deconfigure() -> Option<Arc<Pool>> {
    POOL.write().take()
}
