//! The low-level connection/cursor driver is an external collaborator
//! (§1); this module specifies only the `Executor` seam the engine drives
//! it through.

use crate::sql::SQL;
use crate::value::SQLParam;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use indexmap::IndexMap;
use std::sync::Arc;

/// One result row: column name to decoded value, in column order.
pub type Row<V> = IndexMap<String, V>;

/// A streaming result set. Backed by a server-side cursor on the
/// `tokio-postgres` implementation; dropping the stream releases it (§5).
pub type RowStream<'a, V> = BoxStream<'a, Result<Row<V>, ExecutorError>>;

/// Dialect- or driver-specific rendering quirks the synthesizer consults.
/// Carries the `%`-escaping contract from §4.2/§9: a legacy driver that
/// performs its own `%`-style interpolation over the rendered SQL text
/// needs literal `%` doubled, but the reference `tokio-postgres` executor
/// (which binds parameters out-of-band) does not.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorQuirks {
    pub escape_percent: bool,
}

/// A failure raised by the executor. `Disconnected` is the one kind the
/// engine itself interprets (§4.9's single-retry policy); everything else
/// passes straight through to the caller as `Error::Executor`.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("connection disconnected: {0}")]
    Disconnected(String),
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Runs parameterized SQL against a PostgreSQL connection and yields
/// decoded rows. The only implementation this workspace ships is
/// `relquery-postgres`'s `tokio-postgres`-backed one; the core operates
/// purely against this trait so it never depends on a concrete driver.
#[async_trait]
pub trait Executor<V: SQLParam>: Send + Sync {
    fn quirks(&self) -> ExecutorQuirks {
        ExecutorQuirks::default()
    }

    /// Runs a statement and streams its result rows (`SELECT`). `sql`'s
    /// borrow is independent of `'a`: the returned stream outlives the
    /// caller's local `SQL` value, since genuine server-side streaming (§5)
    /// means rows keep arriving long after the statement text itself is no
    /// longer needed.
    async fn query<'a>(&'a self, sql: &SQL<'_, V>) -> Result<RowStream<'a, V>, ExecutorError>;

    /// Runs a statement that returns at most a handful of rows in one
    /// round trip (`INSERT ... RETURNING`, `UPDATE ... RETURNING`, `DELETE
    /// ... RETURNING`).
    async fn execute(&self, sql: &SQL<'_, V>) -> Result<Vec<Row<V>>, ExecutorError>;

    /// Pings the connection and, if necessary, reconnects. Used by the
    /// engine's single-retry policy (§4.9) after a `Disconnected` error.
    async fn reconnect(&self) -> Result<(), ExecutorError>;
}

pub type SharedExecutor<V> = Arc<dyn Executor<V>>;
