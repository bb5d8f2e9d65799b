//! Session scope helper for keyed acquisition
//!
//! A `SessionScope` owns a session key for a unit of work: every acquire
//! through the scope observes the same physical connection, and
//! `finish` ends the affinity in one place.

use std::sync::Arc;

use tether_core::Result;

use crate::pool::{KeyedConnection, Pool, SessionKey};

/// A scoped session key bound to a pool.
///
/// The key is generated up front; no connection is opened until the
/// first acquire. Call [`SessionScope::finish`] when the unit of work is
/// done, which finalizes the key and disposes of the bound connection.
pub struct SessionScope {
    pool: Arc<Pool>,
    key: SessionKey,
    finished: bool,
}

impl SessionScope {
    /// Begin a scope with a freshly generated key
    pub fn begin(pool: Arc<Pool>) -> Self {
        Self::with_key(pool, SessionKey::generate())
    }

    /// Begin a scope over an existing key, e.g. to resume a session
    pub fn with_key(pool: Arc<Pool>, key: SessionKey) -> Self {
        tracing::debug!(key = %key, "session scope started");
        Self {
            pool,
            key,
            finished: false,
        }
    }

    /// Get the scope's session key
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Acquire the scope's connection
    pub async fn acquire(&self) -> Result<KeyedConnection> {
        self.pool.acquire_keyed(&self.key).await
    }

    /// Finalize the scope's key, disposing of the bound connection.
    ///
    /// Returns `Ok(false)` when the scope never acquired a connection.
    pub async fn finish(mut self, force_close: bool) -> Result<bool> {
        self.finished = true;
        self.pool.finalize_key(&self.key, force_close).await
    }
}

impl Drop for SessionScope {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                key = %self.key,
                "session scope dropped without finish, key stays bound"
            );
        }
    }
}
