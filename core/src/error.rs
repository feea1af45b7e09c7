//! Error taxonomy (§7). One `thiserror`-derived enum, mirroring the
//! teacher's `DrizzleError`: named variants for every caller-distinguishable
//! failure, `#[from]` wherever the upstream error converts losslessly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Constructor/field assignment named a column that does not exist on
    /// the relation.
    #[error("unknown attribute {attribute:?} on relation {relation}")]
    UnknownAttribute { relation: String, attribute: String },

    /// Assignment to a non-column attribute after construction.
    #[error("relation {relation} is frozen: cannot assign {attribute:?}")]
    Frozen { relation: String, attribute: String },

    /// Comparator outside the closed set, or NULL constrained without
    /// `is`/`is not`.
    #[error("invalid comparator {comparator:?} for field {field}")]
    InvalidComparator { field: String, comparator: String },

    /// E.g. a sequence containing the NULL sentinel, or `(comp, None)`.
    #[error("invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// `get()` when cardinality was not exactly one.
    #[error("expected exactly one row, found {count}")]
    ExpectedOne { count: u64 },

    /// A singleton-shaped call observed non-unique cardinality.
    #[error("relation is not a singleton")]
    NotASingleton,

    /// An `Fkeys` alias named a foreign key absent from the relation.
    #[error("no such foreign key {name:?} on relation {relation}")]
    WrongForeignKey { relation: String, name: String },

    /// `update`/`delete` without a constraint and without the explicit
    /// all-rows flag.
    #[error("refusing unconstrained {operation} without an explicit all-rows flag")]
    SafetyBarrier { operation: &'static str },

    /// The set-operator tree would introduce a cycle (`right` transitively
    /// reaches `left`).
    #[error("set-operator tree is cyclic")]
    CyclicComposition,

    /// Metadata lookup failed (unknown relation, malformed descriptor).
    #[error("metadata error: {0}")]
    Metadata(String),

    /// Surfaced from the `Executor` after the permitted single reconnect
    /// retry (§4.9) has also failed.
    #[error("executor error: {0}")]
    Executor(#[from] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = core::result::Result<T, Error>;
