//! Error types for Tether

use thiserror::Error;

/// Core error type for pool and driver operations
#[derive(Error, Debug)]
pub enum TetherError {
    #[error("Connection pool exhausted: all {limit} connections are in use")]
    Exhausted { limit: usize },

    #[error("Connection pool is closed")]
    Closed,

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Tether operations
pub type Result<T> = std::result::Result<T, TetherError>;
