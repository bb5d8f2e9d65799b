//! Connection pool implementation

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_core::{Connection, Result, TetherError};

use super::affinity::{KeyAffinityTable, SessionKey};
use super::config::PoolConfig;
use super::idle::IdleRegistry;
use super::stats::PoolStats;

/// Connector trait for dialing new connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection
    async fn connect(&self) -> Result<Arc<dyn Connection>>;

    /// Validate that a connection is still usable
    ///
    /// Default implementation checks the closed flag only.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: Connector> Connector for Arc<T> {
    async fn connect(&self) -> Result<Arc<dyn Connection>> {
        (**self).connect().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// Mutable pool state, guarded by a single mutex.
///
/// `live_count` covers every open connection the pool knows of: idle
/// entries, anonymous leases, and keyed bindings. Capacity decisions and
/// the bookkeeping they imply happen atomically under this lock; driver
/// I/O never does.
struct PoolState {
    closed: bool,
    live_count: usize,
    idle: IdleRegistry,
    affinity: KeyAffinityTable,
    leases: HashMap<u64, Arc<dyn Connection>>,
}

impl PoolState {
    fn new() -> Self {
        Self {
            closed: false,
            live_count: 0,
            idle: IdleRegistry::new(),
            affinity: KeyAffinityTable::new(),
            leases: HashMap::new(),
        }
    }
}

/// A bounded, non-blocking connection pool with keyed session affinity
///
/// Acquisition never waits: when every slot is in use the caller gets
/// `TetherError::Exhausted` immediately. Connections are returned with
/// explicit release calls rather than on drop, because returning a
/// connection may involve closing it.
pub struct Pool {
    /// Pool configuration
    config: PoolConfig,
    /// Connector used to dial new connections
    connector: Arc<dyn Connector>,
    /// All mutable state behind one lock
    state: Mutex<PoolState>,
    /// Source of anonymous lease identifiers
    next_lease_id: AtomicU64,
}

impl Pool {
    /// Create a new pool with the given configuration and connector.
    ///
    /// When the configuration enables the background sweeper and a tokio
    /// runtime is available, a periodic eviction task is spawned. The
    /// task holds only a weak reference and exits once the pool is shut
    /// down or dropped.
    pub fn new<C: Connector>(config: PoolConfig, connector: C) -> Arc<Self> {
        let pool = Arc::new(Self {
            config,
            connector: Arc::new(connector),
            state: Mutex::new(PoolState::new()),
            next_lease_id: AtomicU64::new(1),
        });

        if let Some(interval) = pool.config.sweep_interval() {
            if tokio::runtime::Handle::try_current().is_ok() {
                Self::spawn_sweeper(&pool, interval);
            } else {
                tracing::warn!(
                    "pool created outside a tokio runtime, background sweeper disabled"
                );
            }
        }

        pool
    }

    fn spawn_sweeper(pool: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(pool);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = weak.upgrade() else { break };
                if pool.is_closed() {
                    break;
                }
                let evicted = pool.evict_expired().await;
                if evicted > 0 {
                    tracing::debug!(evicted, "sweeper evicted expired idle connections");
                }
            }
        });
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether the pool has been shut down
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Acquire a connection without key affinity.
    ///
    /// Reuses an idle connection when a valid one exists, dials a new one
    /// while under `max_size`, and fails immediately with `Exhausted`
    /// otherwise. The returned handle must be given back with
    /// [`Pool::release`].
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let connection = self.checkout_or_dial().await?;
        let lease_id = self.next_lease_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut state = self.state.lock();
            if !state.closed {
                state.leases.insert(lease_id, connection.clone());
                tracing::debug!(lease_id, "connection leased");
                return Ok(PooledConnection {
                    lease_id,
                    connection,
                    released: false,
                });
            }
            // Shut down while we were dialing; give the slot back.
            state.live_count = state.live_count.saturating_sub(1);
        }
        if let Err(e) = connection.close().await {
            tracing::debug!(error = %e, "error closing connection dialed during shutdown");
        }
        Err(TetherError::Closed)
    }

    /// Acquire the connection bound to `key`, binding one first if needed.
    ///
    /// Re-acquiring a bound key returns the same physical connection and
    /// performs no capacity check; the connection is already counted.
    /// Serializing use of a shared keyed connection is the caller's
    /// contract, not the pool's.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn acquire_keyed(&self, key: &SessionKey) -> Result<KeyedConnection> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TetherError::Closed);
            }
            if let Some(connection) = state.affinity.checkout(key) {
                tracing::debug!("reusing bound connection");
                return Ok(KeyedConnection {
                    key: key.clone(),
                    connection,
                    released: false,
                });
            }
        }

        let connection = self.checkout_or_dial().await?;

        {
            let mut state = self.state.lock();
            if !state.closed {
                // Another task may have bound the key while we dialed.
                // The existing binding wins; our dial is parked idle.
                if let Some(existing) = state.affinity.checkout(key) {
                    state.idle.push(connection);
                    return Ok(KeyedConnection {
                        key: key.clone(),
                        connection: existing,
                        released: false,
                    });
                }
                state.affinity.bind(key.clone(), connection.clone());
                tracing::debug!("connection bound to key");
                return Ok(KeyedConnection {
                    key: key.clone(),
                    connection,
                    released: false,
                });
            }
            state.live_count = state.live_count.saturating_sub(1);
        }
        if let Err(e) = connection.close().await {
            tracing::debug!(error = %e, "error closing connection dialed during shutdown");
        }
        Err(TetherError::Closed)
    }

    /// Reuse a valid idle connection or dial a new one.
    ///
    /// Capacity is reserved under the lock before the dial; a failed dial
    /// releases the reservation and propagates the driver error.
    async fn checkout_or_dial(&self) -> Result<Arc<dyn Connection>> {
        if !self.config.close_on_release() {
            loop {
                let candidate = {
                    let mut state = self.state.lock();
                    if state.closed {
                        return Err(TetherError::Closed);
                    }
                    state.idle.pop()
                };
                let Some(entry) = candidate else { break };

                if entry.is_expired(self.config.expiration()) {
                    self.discard_stale(entry.connection, "expired").await;
                    continue;
                }
                if !self.connector.validate(entry.connection.as_ref()).await {
                    self.discard_stale(entry.connection, "failed validation").await;
                    continue;
                }
                return Ok(entry.connection);
            }
        }

        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TetherError::Closed);
            }
            if state.live_count >= self.config.max_size() {
                return Err(TetherError::Exhausted {
                    limit: self.config.max_size(),
                });
            }
            state.live_count += 1;
        }

        match self.connector.connect().await {
            Ok(connection) => {
                tracing::debug!(driver = connection.driver_name(), "new connection dialed");
                Ok(connection)
            }
            Err(e) => {
                self.state.lock().live_count -= 1;
                Err(e)
            }
        }
    }

    /// Close a stale idle connection and release its slot.
    ///
    /// Stale discards never surface to the caller; acquisition simply
    /// moves on to the next candidate.
    async fn discard_stale(&self, connection: Arc<dyn Connection>, reason: &str) {
        tracing::warn!(
            driver = connection.driver_name(),
            reason,
            "stale idle connection discarded"
        );
        self.state.lock().live_count -= 1;
        if let Err(e) = connection.close().await {
            tracing::debug!(error = %e, "error closing stale connection");
        }
    }

    /// Return an anonymously acquired connection to the pool.
    ///
    /// With `force_close` (or when the pool is configured with
    /// `close_on_release`, or the connection is already dead) the
    /// connection is physically closed; otherwise it is parked idle.
    ///
    /// # Panics
    ///
    /// Panics if the handle's lease is unknown to the pool. That means
    /// the handle was released twice or came from another pool, which is
    /// a caller bug.
    pub async fn release(&self, handle: PooledConnection, force_close: bool) -> Result<()> {
        let mut handle = handle;
        handle.released = true;
        let lease_id = handle.lease_id;
        let connection = handle.connection.clone();

        let close = {
            let mut state = self.state.lock();
            if state.closed {
                state.leases.remove(&lease_id);
                None
            } else {
                assert!(
                    state.leases.remove(&lease_id).is_some(),
                    "release of unknown lease {}: handle does not belong to this pool",
                    lease_id
                );
                if force_close || self.config.close_on_release() || connection.is_closed() {
                    state.live_count -= 1;
                    Some(true)
                } else {
                    state.idle.push(connection.clone());
                    Some(false)
                }
            }
        };

        match close {
            None => {
                // Late release after shutdown. The connection was already
                // closed by shutdown, but close is idempotent.
                if let Err(e) = connection.close().await {
                    tracing::debug!(error = %e, "error closing connection after shutdown");
                }
                Err(TetherError::Closed)
            }
            Some(true) => {
                if let Err(e) = connection.close().await {
                    tracing::debug!(error = %e, "error closing released connection");
                }
                tracing::debug!(lease_id, "connection closed on release");
                Ok(())
            }
            Some(false) => {
                tracing::debug!(lease_id, "connection parked idle");
                Ok(())
            }
        }
    }

    /// Check a keyed handle back in, decrementing the key's refcount.
    ///
    /// The binding and its connection stay in place until
    /// [`Pool::finalize_key`].
    ///
    /// # Panics
    ///
    /// Panics if the key is unbound or its refcount is already 0.
    pub fn release_keyed(&self, handle: KeyedConnection) -> Result<()> {
        let mut handle = handle;
        handle.released = true;

        let mut state = self.state.lock();
        if state.closed {
            return Err(TetherError::Closed);
        }
        state.affinity.checkin(&handle.key);
        Ok(())
    }

    /// Remove the binding for `key` and dispose of its connection.
    ///
    /// This is the only operation that ends key affinity. Returns
    /// `Ok(false)` when the key was never bound, which is a benign no-op
    /// (a session that never acquired). Finalizing while handles are
    /// still checked out logs a warning and proceeds.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn finalize_key(&self, key: &SessionKey, force_close: bool) -> Result<bool> {
        let (to_close, refcount, age) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TetherError::Closed);
            }
            let Some(entry) = state.affinity.remove(key) else {
                return Ok(false);
            };
            let age = entry.bound_at.elapsed();
            if force_close || self.config.close_on_release() || entry.connection.is_closed() {
                state.live_count -= 1;
                (Some(entry.connection), entry.refcount, age)
            } else {
                state.idle.push(entry.connection);
                (None, entry.refcount, age)
            }
        };

        if refcount > 0 {
            tracing::warn!(refcount, "session key finalized with handles still out");
        }
        tracing::debug!(age_ms = age.as_millis() as u64, "session key finalized");

        if let Some(connection) = to_close {
            if let Err(e) = connection.close().await {
                tracing::debug!(error = %e, "error closing finalized connection");
            }
        }
        Ok(true)
    }

    /// Evict every idle connection older than the configured expiration.
    ///
    /// Returns the number of connections evicted. This call and the
    /// optional background sweeper are the only eviction triggers;
    /// release never sweeps.
    pub async fn evict_expired(&self) -> usize {
        let expired = {
            let mut state = self.state.lock();
            let expired = state.idle.sweep(self.config.expiration());
            state.live_count -= expired.len();
            expired
        };

        let count = expired.len();
        for entry in expired {
            if let Err(e) = entry.connection.close().await {
                tracing::debug!(error = %e, "error closing expired connection");
            }
        }
        if count > 0 {
            tracing::debug!(evicted = count, "expired idle connections evicted");
        }
        count
    }

    /// Dial connections until `min_size` are live, parking them idle.
    ///
    /// Returns how many connections were opened.
    pub async fn warm(&self) -> Result<usize> {
        let mut opened = 0;
        loop {
            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(TetherError::Closed);
                }
                if state.live_count >= self.config.min_size() {
                    break;
                }
                state.live_count += 1;
            }
            match self.connector.connect().await {
                Ok(connection) => {
                    self.state.lock().idle.push(connection);
                    opened += 1;
                }
                Err(e) => {
                    self.state.lock().live_count -= 1;
                    return Err(e);
                }
            }
        }
        if opened > 0 {
            tracing::info!(opened, "pool warmed");
        }
        Ok(opened)
    }

    /// Shut the pool down, closing every connection it knows of.
    ///
    /// Idempotent. Idle entries, keyed bindings, and outstanding
    /// anonymous leases are all closed; subsequent operations fail with
    /// `Closed`.
    pub async fn shutdown(&self) {
        let connections = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let mut connections: Vec<Arc<dyn Connection>> = Vec::new();
            connections.extend(state.idle.drain().into_iter().map(|e| e.connection));
            connections.extend(state.affinity.drain().into_iter().map(|e| e.connection));
            connections.extend(state.leases.drain().map(|(_, c)| c));
            state.live_count = 0;
            connections
        };

        let count = connections.len();
        for connection in connections {
            if let Err(e) = connection.close().await {
                tracing::debug!(error = %e, "error closing connection during shutdown");
            }
        }
        tracing::info!(closed = count, "connection pool shut down");
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats::new(
            state.live_count,
            state.idle.len(),
            state.leases.len(),
            state.affinity.len(),
            self.config.max_size(),
        )
    }
}

/// A connection leased anonymously from the pool
///
/// Must be returned with [`Pool::release`]. Dropping the handle without
/// releasing it leaks the slot; the pool logs a warning when that
/// happens.
pub struct PooledConnection {
    lease_id: u64,
    connection: Arc<dyn Connection>,
    released: bool,
}

impl PooledConnection {
    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.connection
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                lease_id = self.lease_id,
                "pooled connection dropped without release, slot still counted as leased"
            );
        }
    }
}

/// A connection checked out against a session key
///
/// Must be returned with [`Pool::release_keyed`]; the binding itself
/// ends only via [`Pool::finalize_key`].
pub struct KeyedConnection {
    key: SessionKey,
    connection: Arc<dyn Connection>,
    released: bool,
}

impl KeyedConnection {
    /// Get the session key this handle belongs to
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.connection
    }
}

impl Deref for KeyedConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl Drop for KeyedConnection {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                key = %self.key,
                "keyed connection dropped without checkin"
            );
        }
    }
}
