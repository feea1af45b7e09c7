//! Facade crate re-exporting the relation query engine: [`relquery_core`]'s
//! dialect-agnostic data model and [`relquery_postgres`]'s `tokio-postgres`
//! binding, under one dependency.

pub use relquery_core::*;
pub use relquery_postgres::{PostgresExecutor, PostgresValue};

pub mod prelude {
    pub use relquery_core::prelude::*;
    pub use relquery_postgres::{PostgresExecutor, PostgresValue};
}
