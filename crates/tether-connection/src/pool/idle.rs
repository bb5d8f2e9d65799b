//! Registry of idle connections awaiting reuse

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tether_core::Connection;

/// An idle connection together with the time it was parked
pub(crate) struct IdleEntry {
    pub connection: Arc<dyn Connection>,
    pub parked_at: Instant,
}

impl IdleEntry {
    fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            parked_at: Instant::now(),
        }
    }

    /// Whether this entry has outlived the given expiration window
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.parked_at.elapsed() >= ttl
    }
}

/// Holds connections that are open but not leased to anyone.
///
/// Entries are reused most-recently-parked first, so long-idle
/// connections age toward expiration instead of being kept warm.
pub(crate) struct IdleRegistry {
    entries: VecDeque<IdleEntry>,
}

impl IdleRegistry {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Park a connection with a fresh timestamp
    pub fn push(&mut self, connection: Arc<dyn Connection>) {
        self.entries.push_back(IdleEntry::new(connection));
    }

    /// Take the most recently parked entry
    pub fn pop(&mut self) -> Option<IdleEntry> {
        self.entries.pop_back()
    }

    /// Remove and return every entry older than `ttl`.
    ///
    /// The caller is responsible for closing the returned connections;
    /// no I/O happens here.
    pub fn sweep(&mut self, ttl: Duration) -> Vec<IdleEntry> {
        let mut expired = Vec::new();
        let drained: Vec<IdleEntry> = self.entries.drain(..).collect();
        for entry in drained {
            if entry.is_expired(ttl) {
                expired.push(entry);
            } else {
                self.entries.push_back(entry);
            }
        }
        expired
    }

    /// Remove and return every entry
    pub fn drain(&mut self) -> Vec<IdleEntry> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
