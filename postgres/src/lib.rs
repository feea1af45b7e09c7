//! PostgreSQL backend for the relation query engine: the concrete
//! [`PostgresValue`] parameter type and the `tokio-postgres`-backed
//! [`PostgresExecutor`].

mod error;
mod executor;
mod json;
mod value;

pub use executor::PostgresExecutor;
pub use json::joined_row_to_json;
pub use value::{PgInterval, PostgresValue};
