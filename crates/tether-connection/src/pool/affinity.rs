//! Session keys and the key-to-connection affinity table

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tether_core::Connection;

/// Opaque identifier for a logical session.
///
/// All keyed acquisitions presenting the same key observe the same
/// physical connection until the key is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A keyed binding: the connection, how many handles are out, and when
/// the binding was created
pub(crate) struct AffinityEntry {
    pub connection: Arc<dyn Connection>,
    pub refcount: u32,
    pub bound_at: Instant,
}

/// Maps session keys to their bound connections.
///
/// A binding is created by the first keyed acquisition and removed only
/// by an explicit finalize (or pool shutdown). Checkouts and checkins
/// adjust the refcount; they never remove the binding.
pub(crate) struct KeyAffinityTable {
    entries: HashMap<SessionKey, AffinityEntry>,
}

impl KeyAffinityTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Bind a connection to a key with an initial refcount of 1.
    ///
    /// The caller must have verified under the same lock that the key is
    /// unbound.
    pub fn bind(&mut self, key: SessionKey, connection: Arc<dyn Connection>) {
        let previous = self.entries.insert(
            key,
            AffinityEntry {
                connection,
                refcount: 1,
                bound_at: Instant::now(),
            },
        );
        debug_assert!(previous.is_none(), "rebinding an already bound session key");
    }

    /// Check out the connection bound to `key`, incrementing its refcount.
    ///
    /// Returns `None` when the key is unbound.
    pub fn checkout(&mut self, key: &SessionKey) -> Option<Arc<dyn Connection>> {
        let entry = self.entries.get_mut(key)?;
        entry.refcount += 1;
        Some(entry.connection.clone())
    }

    /// Check a keyed handle back in, decrementing the refcount.
    ///
    /// # Panics
    ///
    /// Panics if the key is unbound or the refcount is already 0. Both
    /// indicate a handle that does not belong to this table.
    pub fn checkin(&mut self, key: &SessionKey) {
        let entry = self
            .entries
            .get_mut(key)
            .unwrap_or_else(|| panic!("checkin for unknown session key '{}'", key));
        assert!(
            entry.refcount > 0,
            "refcount underflow for session key '{}'",
            key
        );
        entry.refcount -= 1;
    }

    /// Remove the binding for `key`, if any
    pub fn remove(&mut self, key: &SessionKey) -> Option<AffinityEntry> {
        self.entries.remove(key)
    }

    /// Remove and return every binding
    pub fn drain(&mut self) -> Vec<AffinityEntry> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
