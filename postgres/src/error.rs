//! Error conversion from `tokio-postgres` into the engine's `ExecutorError`.

use relquery_core::executor::ExecutorError;

/// Classifies a raw `tokio-postgres::Error` for the engine's single-retry
/// policy (§4.9): a connection-level failure reports `Disconnected` so the
/// caller's one permitted reconnect attempt fires; everything else (a
/// constraint violation, a syntax error) passes through untouched since
/// retrying it would not help.
///
/// `tokio-postgres` does not expose a structured "connection is dead"
/// variant, so this falls back to the same substring heuristic the
/// connection-pooling ecosystem (e.g. `deadpool-postgres`) uses: a missing
/// SQLSTATE code paired with wording that names the socket/connection as
/// the failure.
pub fn classify(err: tokio_postgres::Error) -> ExecutorError {
    let looks_disconnected = err.code().is_none()
        && {
            let text = err.to_string();
            text.contains("closed") || text.contains("connection") || text.contains("broken pipe")
        };
    if looks_disconnected {
        ExecutorError::Disconnected(err.to_string())
    } else {
        ExecutorError::Other(Box::new(err))
    }
}
