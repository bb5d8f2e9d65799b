//! Tether Connection - Connection pooling with keyed session affinity
//!
//! This crate provides the pool itself, the session-scope helper, and the
//! optional process-wide accessor.

mod global;
pub mod pool;
mod session;

pub use global::{configure, deconfigure, get_pool};
pub use pool::{Connector, KeyedConnection, Pool, PoolConfig, PoolStats, PooledConnection, SessionKey};
pub use session::SessionScope;
