//! Connection pooling with keyed session affinity
//!
//! This module provides a bounded, non-blocking connection pool. Callers
//! either acquire any available connection, or acquire against a
//! `SessionKey` so that repeated acquisitions observe the same physical
//! connection until the key is finalized.
//!
//! # Example
//!
//! ```ignore
//! use tether_connection::pool::{Pool, PoolConfig, SessionKey};
//!
//! let config = PoolConfig::new(1, 5)
//!     .with_expiration_ms(300_000);
//!
//! let pool = Pool::new(config, connector);
//!
//! let conn = pool.acquire().await?;
//! // Use connection...
//! pool.release(conn, false).await?;
//!
//! let key = SessionKey::generate();
//! let conn = pool.acquire_keyed(&key).await?;
//! // Same physical connection for every acquire_keyed(&key) until:
//! pool.finalize_key(&key, false).await?;
//! ```

mod affinity;
mod config;
mod idle;
mod pool;
mod stats;


pub use affinity::SessionKey;
pub use config::PoolConfig;
pub use pool::{Connector, KeyedConnection, Pool, PooledConnection};
pub use stats::PoolStats;
