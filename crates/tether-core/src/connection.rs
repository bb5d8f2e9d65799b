//! Connection trait for live database connections

use async_trait::async_trait;

use crate::Result;

/// A live database connection managed by the pool.
///
/// Drivers implement this trait over their native client type. The pool
/// only needs lifecycle operations; statement execution stays on the
/// driver's own surface.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Name of the driver that produced this connection (e.g. "postgres").
    fn driver_name(&self) -> &str;

    /// Cheap liveness probe, typically `SELECT 1`.
    ///
    /// Used by the pool to validate idle connections before reuse.
    async fn ping(&self) -> Result<()>;

    /// Close the connection. Idempotent.
    async fn close(&self) -> Result<()>;

    /// Whether the connection is known to be closed.
    fn is_closed(&self) -> bool;
}
