//! Re-entrant scoped transaction/savepoint acquisition (§4.8, §5, §7),
//! grounded in the teacher's `Transaction::savepoint` depth-counter pattern
//! and its `PostgresTransactionType` isolation-level enum.

use crate::executor::{ExecutorError, SharedExecutor};
use crate::sql::SQL;
use crate::value::SQLParam;
use std::sync::atomic::{AtomicU32, Ordering};

/// PostgreSQL transaction isolation level (`BEGIN ISOLATION LEVEL ...`),
/// mirroring the teacher's `PostgresTransactionType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PgTransactionType {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl core::fmt::Display for PgTransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            PgTransactionType::ReadUncommitted => "READ UNCOMMITTED",
            PgTransactionType::ReadCommitted => "READ COMMITTED",
            PgTransactionType::RepeatableRead => "REPEATABLE READ",
            PgTransactionType::Serializable => "SERIALIZABLE",
        })
    }
}

/// A re-entrant scoped transaction (§4.8). The outermost `enter()` issues a
/// real `BEGIN`; any nested `enter()` opens a savepoint instead, named
/// deterministically (`relquery_sp_{depth}`, 0-indexed at the first nested
/// scope). Re-entry is counted per `Transaction` handle, and only the
/// outermost `exit` touches the underlying connection's transaction state.
pub struct Transaction<V: SQLParam> {
    executor: SharedExecutor<V>,
    isolation: PgTransactionType,
    depth: AtomicU32,
}

impl<V: SQLParam + Send + Sync + 'static> Transaction<V> {
    pub fn new(executor: SharedExecutor<V>, isolation: PgTransactionType) -> Self {
        Self {
            executor,
            isolation,
            depth: AtomicU32::new(0),
        }
    }

    fn savepoint_name(depth: u32) -> String {
        format!("relquery_sp_{depth}")
    }

    async fn run(&self, text: String) -> Result<(), ExecutorError> {
        self.executor.execute(&SQL::raw(text)).await.map(|_| ())
    }

    /// Opens one scope. Returns the depth this call entered at (0 for the
    /// outermost), which the caller has no need to track itself — `exit`
    /// closes scopes in strict LIFO order against this same handle.
    pub async fn enter(&self) -> Result<u32, ExecutorError> {
        let prior = self.depth.fetch_add(1, Ordering::SeqCst);
        if prior == 0 {
            self.run(format!("BEGIN ISOLATION LEVEL {}", self.isolation)).await?;
        } else {
            self.run(format!("SAVEPOINT {}", Self::savepoint_name(prior - 1))).await?;
        }
        Ok(prior)
    }

    /// Closes the scope opened by the matching `enter()`. `success` decides
    /// `COMMIT`/`RELEASE SAVEPOINT` versus `ROLLBACK`/`ROLLBACK TO
    /// SAVEPOINT` (followed by releasing that savepoint, since PostgreSQL
    /// leaves a rolled-back-to savepoint open for further use otherwise).
    pub async fn exit(&self, success: bool) -> Result<(), ExecutorError> {
        let prior = self.depth.fetch_sub(1, Ordering::SeqCst);
        let depth = prior - 1;
        if depth == 0 {
            self.run(if success { "COMMIT".to_string() } else { "ROLLBACK".to_string() }).await
        } else {
            let name = Self::savepoint_name(depth - 1);
            if success {
                self.run(format!("RELEASE SAVEPOINT {name}")).await
            } else {
                self.run(format!("ROLLBACK TO SAVEPOINT {name}")).await?;
                self.run(format!("RELEASE SAVEPOINT {name}")).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Executor, ExecutorQuirks, Row, RowStream};
    use crate::value::Dialect;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, PartialEq)]
    struct V(i64);
    impl SQLParam for V {
        const DIALECT: Dialect = Dialect::PostgreSQL;
        fn null() -> Self {
            V(i64::MIN)
        }
        fn array(values: Vec<Self>) -> Self {
            values.into_iter().next().unwrap_or(V(0))
        }
        fn as_i64(&self) -> Option<i64> {
            Some(self.0)
        }
    }

    struct RecordingExecutor {
        statements: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl Executor<V> for RecordingExecutor {
        async fn query<'a>(&'a self, _sql: &SQL<'_, V>) -> Result<RowStream<'a, V>, ExecutorError> {
            Ok(Box::pin(futures_util::stream::iter(Vec::<Result<Row<V>, ExecutorError>>::new())))
        }

        async fn execute(&self, sql: &SQL<'_, V>) -> Result<Vec<Row<V>>, ExecutorError> {
            self.statements.lock().unwrap().push(sql.sql());
            Ok(Vec::new())
        }

        async fn reconnect(&self) -> Result<(), ExecutorError> {
            Ok(())
        }

        fn quirks(&self) -> ExecutorQuirks {
            ExecutorQuirks::default()
        }
    }

    #[tokio::test]
    async fn nested_enter_opens_a_named_savepoint() {
        let executor = std::sync::Arc::new(RecordingExecutor {
            statements: StdMutex::new(Vec::new()),
        });
        let txn: Transaction<V> = Transaction::new(executor.clone(), PgTransactionType::Serializable);

        txn.enter().await.unwrap();
        txn.enter().await.unwrap();
        txn.exit(true).await.unwrap();
        txn.exit(true).await.unwrap();

        let statements = executor.statements.lock().unwrap().clone();
        assert_eq!(
            statements,
            vec![
                "BEGIN ISOLATION LEVEL SERIALIZABLE".to_string(),
                "SAVEPOINT relquery_sp_0".to_string(),
                "RELEASE SAVEPOINT relquery_sp_0".to_string(),
                "COMMIT".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn failed_nested_scope_rolls_back_to_its_savepoint() {
        let executor = std::sync::Arc::new(RecordingExecutor {
            statements: StdMutex::new(Vec::new()),
        });
        let txn: Transaction<V> = Transaction::new(executor.clone(), PgTransactionType::default());

        txn.enter().await.unwrap();
        txn.enter().await.unwrap();
        txn.exit(false).await.unwrap();
        txn.exit(true).await.unwrap();

        let statements = executor.statements.lock().unwrap().clone();
        assert_eq!(
            statements,
            vec![
                "BEGIN ISOLATION LEVEL READ COMMITTED".to_string(),
                "SAVEPOINT relquery_sp_0".to_string(),
                "ROLLBACK TO SAVEPOINT relquery_sp_0".to_string(),
                "RELEASE SAVEPOINT relquery_sp_0".to_string(),
                "COMMIT".to_string(),
            ]
        );
    }
}
