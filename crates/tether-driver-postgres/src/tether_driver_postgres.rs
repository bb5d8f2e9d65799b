//! PostgreSQL connector implementation

mod connection;
mod connector;

pub use connection::PgConnection;
pub use connector::PgConnector;
