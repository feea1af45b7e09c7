//! Passive relation/field/foreign-key descriptors, and the `Metadata`
//! service that supplies them.
//!
//! The database-catalog introspector that produces these descriptors is an
//! external collaborator (out of scope, §1); this module only specifies the
//! shape it hands to the engine, grounded in halfORM's `__set_fields`/
//! `__set_fkeys` (`half_orm/relation.py`), which populate a relation from a
//! metadata dict keyed the same way.

use async_trait::async_trait;
use indexmap::IndexMap;

/// Relation kind tag, mirroring halfORM's `r`/`p`/`v`/`m`/`f` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Table,
    PartitionedTable,
    View,
    MaterializedView,
    ForeignTable,
}

/// Fully-qualified relation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fqrn {
    pub database: String,
    pub schema: String,
    pub name: String,
}

impl Fqrn {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// `"schema"."name"` — the form used in `FROM`/`JOIN` clauses.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl core::fmt::Display for Fqrn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}/{}", self.database, self.schema, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub sql_type: String,
    pub is_pk: bool,
    pub is_unique: bool,
    pub not_null: bool,
    /// True when `sql_type` names a PostgreSQL array type (leading `_` in
    /// the catalog's `typname`, per `field.py`'s `type_[0] != '_'` check).
    pub is_array: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FkDirection {
    Forward,
    Reverse,
}

#[derive(Debug, Clone)]
pub struct ForeignKeyDescriptor {
    pub name: String,
    pub source_fields: Vec<String>,
    pub target_relation: Fqrn,
    pub target_fields: Vec<String>,
    pub direction: FkDirection,
}

#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    pub fqrn: Fqrn,
    pub kind: RelationKind,
    /// Ordered the same way the underlying table's columns are ordered.
    pub fields: IndexMap<String, FieldDescriptor>,
    pub foreign_keys: IndexMap<String, ForeignKeyDescriptor>,
}

impl RelationDescriptor {
    pub fn pkey_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values().filter(|f| f.is_pk)
    }
}

/// Catalog lookup service, consumed but not implemented by this crate: the
/// metadata loader that inspects `pg_catalog` is an external collaborator
/// (§1, §6).
#[async_trait]
pub trait Metadata: Send + Sync {
    async fn describe(&self, fqrn: &Fqrn) -> crate::error::Result<RelationDescriptor>;
}

/// In-memory `Metadata` backed by descriptors supplied up front — what a
/// code generator's output, or a test, hands the engine when there is no
/// live catalog to query.
#[derive(Debug, Default, Clone)]
pub struct StaticMetadata {
    relations: IndexMap<Fqrn, RelationDescriptor>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relation(mut self, descriptor: RelationDescriptor) -> Self {
        self.relations.insert(descriptor.fqrn.clone(), descriptor);
        self
    }
}

#[async_trait]
impl Metadata for StaticMetadata {
    async fn describe(&self, fqrn: &Fqrn) -> crate::error::Result<RelationDescriptor> {
        self.relations
            .get(fqrn)
            .cloned()
            .ok_or_else(|| crate::error::Error::Metadata(format!("no descriptor for {fqrn}")))
    }
}
