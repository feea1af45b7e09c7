//! Relation-object query engine core: dialect-agnostic data model, SQL
//! synthesis, and the `Metadata`/`Executor` seams a backend implements.
//!
//! Grounded throughout in halfORM (`half_orm/relation.py`, `field.py`), with
//! the chunk-based SQL builder carried over from this workspace's Postgres
//! query-building heritage.

pub mod error;
pub mod executor;
pub mod field;
pub mod foreign_key;
pub mod metadata;
pub mod relation;
pub mod set_op;
pub mod sql;
mod synth;
pub mod transaction;
pub mod value;

pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::executor::{Executor, ExecutorError, ExecutorQuirks, Row, SharedExecutor};
    pub use crate::field::{Comparator, QueryKind};
    pub use crate::foreign_key::Fkeys;
    pub use crate::metadata::{
        FieldDescriptor, FkDirection, ForeignKeyDescriptor, Fqrn, Metadata, RelationDescriptor,
        RelationKind, StaticMetadata,
    };
    pub use crate::relation::{Attached, JoinEdge, JoinSpec, JoinedRow, Relation};
    pub use crate::set_op::{Leaf, Node, SetOp};
    pub use crate::transaction::{PgTransactionType, Transaction};
    pub use crate::value::{Dialect, SQLParam};
}
