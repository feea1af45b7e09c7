//! The `tokio-postgres`-backed [`Executor`] implementation: the one
//! concrete driver binding this workspace ships.

use crate::error::classify;
use crate::value::PostgresValue;
use async_trait::async_trait;
use futures_util::StreamExt;
use indexmap::IndexMap;
use relquery_core::executor::{Executor, ExecutorError, ExecutorQuirks, Row, RowStream};
use relquery_core::sql::SQL;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::{Client, Config, NoTls};

/// Holds the live client plus what's needed to rebuild it after a dropped
/// connection (§4.9, §5): a `tokio::sync::Mutex` rather than a `RwLock`
/// since reconnecting must exclude concurrent queries entirely, not just
/// other reconnect attempts.
pub struct PostgresExecutor {
    client: Mutex<Arc<Client>>,
    config: Config,
}

impl PostgresExecutor {
    /// Connects with `tokio_postgres::NoTls`. A TLS-enabled constructor is
    /// not provided: wiring in `tokio-postgres-rustls` or
    /// `postgres-native-tls` is an application-level choice left to the
    /// caller, who can implement `Executor` directly against whichever TLS
    /// connector they've picked.
    pub async fn connect(config: Config) -> Result<Self, ExecutorError> {
        let client = connect_with(&config).await?;
        Ok(Self {
            client: Mutex::new(Arc::new(client)),
            config,
        })
    }

    async fn client(&self) -> Arc<Client> {
        self.client.lock().await.clone()
    }
}

async fn connect_with(config: &Config) -> Result<Client, ExecutorError> {
    let (client, connection) = config.connect(NoTls).await.map_err(classify)?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %err, "relquery-postgres: connection task ended");
            #[cfg(not(feature = "tracing"))]
            let _ = err;
        }
    });
    Ok(client)
}

fn bind(sql: &SQL<'_, PostgresValue>) -> (String, Vec<&PostgresValue>) {
    (sql.sql(), sql.params().collect())
}

fn decode_row(row: tokio_postgres::Row) -> Row<PostgresValue> {
    let mut out = IndexMap::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        let value: PostgresValue = row.get(i);
        out.insert(column.name().to_string(), value);
    }
    out
}

#[async_trait]
impl Executor<PostgresValue> for PostgresExecutor {
    fn quirks(&self) -> ExecutorQuirks {
        // tokio-postgres binds parameters out-of-band; the rendered SQL
        // text never carries a literal `%`, so no driver-side escaping is
        // needed (§4.2, §9).
        ExecutorQuirks { escape_percent: false }
    }

    async fn query<'a>(&'a self, sql: &SQL<'_, PostgresValue>) -> Result<RowStream<'a, PostgresValue>, ExecutorError> {
        let client = self.client().await;
        let (text, params) = bind(sql);
        let params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = params
            .into_iter()
            .map(|v| v as &(dyn tokio_postgres::types::ToSql + Sync))
            .collect();
        // `query_raw` streams rows off the wire as the caller consumes them,
        // rather than buffering the whole result set the way `query` does
        // (§4.5, §9) — the client is kept alive by the stream via the `Arc`
        // captured in this closure's environment, not by any borrow of `self`.
        let row_stream = client.query_raw(text.as_str(), params).await.map_err(classify)?;
        let decoded = row_stream.map(move |result| {
            let _keep_alive = &client;
            result.map(decode_row).map_err(classify)
        });
        Ok(Box::pin(decoded))
    }

    async fn execute(&self, sql: &SQL<'_, PostgresValue>) -> Result<Vec<Row<PostgresValue>>, ExecutorError> {
        let client = self.client().await;
        let (text, params) = bind(sql);
        let params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = params
            .into_iter()
            .map(|v| v as &(dyn tokio_postgres::types::ToSql + Sync))
            .collect();
        let rows = client.query(&text, &params).await.map_err(classify)?;
        Ok(rows.into_iter().map(decode_row).collect())
    }

    async fn reconnect(&self) -> Result<(), ExecutorError> {
        let mut guard = self.client.lock().await;
        let client = connect_with(&self.config).await?;
        *guard = Arc::new(client);
        Ok(())
    }
}
