//! The Relation object model (§3, §4.1), grounded in halfORM's `Relation`
//! class (`half_orm/relation.py`).

use crate::error::{Error, Result};
use crate::executor::{Executor, Row, SharedExecutor};
use crate::field::{Comparator, Field, QueryKind};
use crate::foreign_key::{self, Fkeys};
use crate::metadata::{ForeignKeyDescriptor, Fqrn, Metadata, RelationDescriptor};
use crate::set_op::{Leaf, Node, SetOp};
use crate::sql::SQL;
use crate::synth;
use crate::value::SQLParam;
use futures_util::StreamExt;
use indexmap::IndexMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ALIAS_ID: AtomicU64 = AtomicU64::new(1);

fn next_alias_id() -> u64 {
    NEXT_ALIAS_ID.fetch_add(1, Ordering::Relaxed)
}

/// One relation reached through `join_to`: the foreign key that links it to
/// its parent, and the (possibly further-joined, possibly constrained)
/// relation it points at.
#[derive(Debug, Clone)]
pub struct JoinEdge<V: SQLParam> {
    pub fk: ForeignKeyDescriptor,
    pub target: Box<Relation<V>>,
}

/// One requested attachment for `Relation::join` (§4.7): rows pulled from
/// `other` are grouped by the foreign key linking it to `self` and attached
/// under `result_key`. `fields` narrows what's read from `other`; naming
/// exactly one field attaches a bare scalar per match, anything else (no
/// narrowing, or more than one field) attaches a full row.
pub struct JoinSpec<V: SQLParam> {
    pub other: Relation<V>,
    pub result_key: String,
    pub fields: Option<Vec<String>>,
}

impl<V: SQLParam> JoinSpec<V> {
    pub fn new(other: Relation<V>, result_key: impl Into<String>) -> Self {
        Self {
            other,
            result_key: result_key.into(),
            fields: None,
        }
    }

    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// A value attached under a join's `result_key` (§4.7 point 4).
#[derive(Debug, Clone)]
pub enum Attached<V: SQLParam> {
    Scalar(V),
    Row(Row<V>),
}

/// One of `self`'s rows from `Relation::join`, carrying whatever `specs`
/// matched under their `result_key`.
#[derive(Debug, Clone)]
pub struct JoinedRow<V: SQLParam> {
    pub row: Row<V>,
    pub attachments: IndexMap<String, Vec<Attached<V>>>,
}

/// Chainable query modifiers (§4.1), grounded in halfORM's
/// `_ho_distinct`/`_ho_order_by`/`_ho_limit`/`_ho_offset`/`_ho_mogrify`.
#[derive(Debug, Clone, Default)]
pub struct SelectParams {
    pub distinct: bool,
    pub order_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Logs the rendered SQL at `tracing::debug!` on the next execution
    /// (`_ho_mogrify`).
    pub mogrify: bool,
}

/// A composable query object over one database relation (§3).
#[derive(Clone)]
pub struct Relation<V: SQLParam> {
    pub(crate) id: u64,
    pub(crate) fqrn: Fqrn,
    pub(crate) descriptor: Arc<RelationDescriptor>,
    pub(crate) fields: IndexMap<String, Field<V>>,
    pub(crate) join_to: IndexMap<String, JoinEdge<V>>,
    pub(crate) composition: Option<Box<Node<V>>>,
    pub(crate) only: bool,
    pub(crate) select_params: SelectParams,
    pub(crate) id_cast: Option<u64>,
    pub(crate) is_singleton: bool,
    pub(crate) fkeys: Fkeys,
    pub(crate) executor: SharedExecutor<V>,
}

impl<V: SQLParam> Relation<V> {
    /// Looks up `fqrn` through `metadata` and returns an unconstrained
    /// relation over it (`Relation::new` + halfORM's metaclass-driven
    /// `__set_fields`/`__set_fkeys`, collapsed into one async call since the
    /// metadata service is itself async, §6).
    pub async fn new(
        fqrn: Fqrn,
        metadata: &(dyn Metadata + Send + Sync),
        executor: SharedExecutor<V>,
    ) -> Result<Self> {
        let descriptor = metadata.describe(&fqrn).await?;
        let fields = descriptor
            .fields
            .values()
            .map(|fd| (fd.name.clone(), Field::new(fd.clone())))
            .collect();
        Ok(Self {
            id: next_alias_id(),
            fqrn,
            descriptor: Arc::new(descriptor),
            fields,
            join_to: IndexMap::new(),
            composition: None,
            only: false,
            select_params: SelectParams::default(),
            id_cast: None,
            is_singleton: false,
            fkeys: Fkeys::default(),
            executor,
        })
    }

    pub fn with_fkeys(mut self, fkeys: Fkeys) -> Self {
        self.fkeys = fkeys;
        self
    }

    pub fn alias_id(&self) -> u64 {
        self.id_cast.unwrap_or(self.id)
    }

    pub fn fqrn(&self) -> &Fqrn {
        &self.fqrn
    }

    pub fn descriptor(&self) -> &RelationDescriptor {
        &self.descriptor
    }

    pub fn is_singleton(&self) -> bool {
        self.is_singleton
    }

    /// How many relations this one reaches directly through `join_to`.
    pub fn join_count(&self) -> usize {
        self.join_to.len()
    }

    fn field_mut(&mut self, name: &str) -> Result<&mut Field<V>> {
        self.fields.get_mut(name).ok_or_else(|| Error::UnknownAttribute {
            relation: self.fqrn.name.clone(),
            attribute: name.to_string(),
        })
    }

    // ==================== field constraints (§4.1) ====================

    /// `rel.set(col, value)` — comparator defaults to `=`, or `is` if
    /// `value` is the NULL sentinel.
    pub fn set(&mut self, column: &str, value: V) -> Result<&mut Self> {
        self.is_singleton = false;
        self.field_mut(column)?.set(value)?;
        Ok(self)
    }

    /// `rel.set_cmp(col, comparator, value)` — explicit comparator.
    pub fn set_cmp(&mut self, column: &str, comparator: Comparator, value: V) -> Result<&mut Self> {
        self.is_singleton = false;
        self.field_mut(column)?.set_cmp(comparator, value)?;
        Ok(self)
    }

    pub fn set_null(&mut self, column: &str) -> Result<&mut Self> {
        self.is_singleton = false;
        self.field_mut(column)?.set_null();
        Ok(self)
    }

    pub fn set_sequence(
        &mut self,
        column: &str,
        values: Vec<V>,
        comparator: Comparator,
    ) -> Result<&mut Self> {
        self.is_singleton = false;
        self.field_mut(column)?.set_sequence(values, comparator)?;
        Ok(self)
    }

    pub fn unset(&mut self, column: &str) -> Result<&mut Self> {
        self.field_mut(column)?.unset();
        Ok(self)
    }

    pub fn unaccent(&mut self, columns: &[&str]) -> Result<&mut Self> {
        for col in columns {
            self.field_mut(col)?.unaccent(true);
        }
        Ok(self)
    }

    /// Field-to-field assignment (`field.py`'s Field-value branch of
    /// `__set__`): links `column` on `self` to `other_column` on `other` via
    /// a synthetic single-column foreign key, registered in `join_to`.
    pub fn join_on_field(&mut self, column: &str, other: Relation<V>, other_column: &str) -> Result<&mut Self> {
        if !self.fields.contains_key(column) {
            return Err(Error::UnknownAttribute {
                relation: self.fqrn.name.clone(),
                attribute: column.to_string(),
            });
        }
        if !other.fields.contains_key(other_column) {
            return Err(Error::UnknownAttribute {
                relation: other.fqrn.name.clone(),
                attribute: other_column.to_string(),
            });
        }
        let fk = foreign_key::synthetic(column, other.fqrn.clone(), other_column);
        let name = fk.name.clone();
        self.join_to.insert(name, JoinEdge { fk, target: Box::new(other) });
        Ok(self)
    }

    /// `rel.fkey(name).set(other)` — joins through a named, metadata-known
    /// foreign key rather than an ad hoc field pair.
    pub fn join_fkey(&mut self, fk_name: &str, other: Relation<V>) -> Result<&mut Self> {
        let fk = self
            .descriptor
            .foreign_keys
            .get(fk_name)
            .cloned()
            .ok_or_else(|| Error::WrongForeignKey {
                relation: self.fqrn.name.clone(),
                name: fk_name.to_string(),
            })?;
        self.join_to.insert(
            fk_name.to_string(),
            JoinEdge { fk, target: Box::new(other) },
        );
        Ok(self)
    }

    /// Joins through an `Fkeys`-declared alias (§6).
    pub fn join_alias(&mut self, alias: &str, other: Relation<V>) -> Result<&mut Self> {
        let fk = self
            .fkeys
            .resolve(&self.fqrn.name, alias, &self.descriptor.foreign_keys)?
            .clone();
        self.join_to.insert(fk.name.clone(), JoinEdge { fk, target: Box::new(other) });
        Ok(self)
    }

    // ==================== chainable modifiers ====================

    pub fn distinct(&mut self) -> &mut Self {
        self.select_params.distinct = true;
        self
    }

    pub fn order_by(&mut self, clause: impl Into<String>) -> &mut Self {
        self.select_params.order_by = Some(clause.into());
        self
    }

    pub fn limit(&mut self, n: i64) -> &mut Self {
        self.select_params.limit = Some(n.max(0));
        self
    }

    pub fn offset(&mut self, n: i64) -> &mut Self {
        self.select_params.offset = Some(n.max(0));
        self
    }

    pub fn only(&mut self, only: bool) -> &mut Self {
        self.only = only;
        self
    }

    pub fn mogrify(&mut self) -> &mut Self {
        self.select_params.mogrify = true;
        self
    }

    /// Is any part of this relation constrained — own fields, a joined-to
    /// relation, or a set-operator composition? (`_ho_is_set`).
    pub fn is_set(&self) -> bool {
        self.composition.is_some()
            || self.fields.values().any(Field::is_set)
            || self.join_to.values().any(|edge| edge.target.is_set())
    }

    fn leaf(&self) -> Leaf<V> {
        Leaf {
            fields: self.fields.clone(),
        }
    }

    pub(crate) fn node(&self) -> Node<V> {
        match &self.composition {
            Some(node) => (**node).clone(),
            None => Node::Leaf(self.leaf()),
        }
    }

    // ==================== set algebra (§4.4, §9) ====================

    fn combine(mut self, op: SetOp, mut other: Relation<V>) -> Self {
        let left_node = self.node();
        let right_node = other.node();
        for (name, edge) in other.join_to.drain(..) {
            self.join_to.entry(name).or_insert(edge);
        }
        self.composition = Some(Box::new(Node::Bin(op, Box::new(left_node), Box::new(right_node))));
        self
    }

    pub fn intersect(self, other: Relation<V>) -> Self {
        self.combine(SetOp::And, other)
    }

    pub fn union(self, other: Relation<V>) -> Self {
        self.combine(SetOp::Or, other)
    }

    pub fn difference(self, other: Relation<V>) -> Self {
        self.combine(SetOp::AndNot, other)
    }

    pub fn complement(mut self) -> Self {
        let node = self.node();
        self.composition = Some(Box::new(Node::Not(Box::new(node))));
        self
    }

    pub fn symmetric_difference(self, other: Relation<V>) -> Self
    where
        V: 'static,
    {
        // (a | b) - (a & b), per halfORM's `__xor__`.
        let a = self.clone();
        let b = other.clone();
        self.union(other).difference(a.intersect(b))
    }

    // ==================== casting and join (§4.6, §4.7) ====================

    /// `rel.cast(other)`: reinterprets the constraints built up on `self` as
    /// a relation of `other`'s class, preserving `self`'s alias so joins
    /// wired up before the cast remain resolvable (`_ho_cast`'s
    /// `__id_cast = id(self)`).
    pub fn cast(&self, mut other: Relation<V>) -> Self {
        other.id_cast = Some(self.alias_id());
        other.fields = self.fields.clone();
        other.join_to = self.join_to.clone();
        other.composition = self.composition.clone();
        other
    }
}

impl<V: SQLParam> std::fmt::Debug for Relation<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation")
            .field("fqrn", &self.fqrn)
            .field("alias_id", &self.alias_id())
            .field("is_singleton", &self.is_singleton)
            .finish()
    }
}

// ==================== terminal operations (§4.1, §4.9) ====================

impl<V: SQLParam + Send + Sync + 'static> Relation<V> {
    async fn run_with_retry<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, crate::executor::ExecutorError>>,
    {
        match f().await {
            Ok(value) => Ok(value),
            Err(crate::executor::ExecutorError::Disconnected(_)) => {
                self.executor.reconnect().await.map_err(box_err)?;
                f().await.map_err(box_err)
            }
            Err(other) => Err(box_err(other)),
        }
    }

    fn maybe_mogrify(&self, sql: &SQL<'_, V>) {
        #[cfg(feature = "tracing")]
        if self.select_params.mogrify {
            tracing::debug!(sql = %sql.sql(), "relquery: synthesized statement");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = sql;
    }

    pub async fn count(&self) -> Result<u64> {
        let sql = synth::synth_count(self);
        self.maybe_mogrify(&sql);
        let rows = self.run_with_retry(|| self.executor.execute(&sql)).await?;
        let count = rows
            .first()
            .and_then(|row| row.values().next())
            .and_then(SQLParam::as_i64)
            .ok_or_else(|| Error::Metadata("count query returned no readable count column".into()))?;
        Ok(count.max(0) as u64)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        let sql = synth::synth_is_empty(self);
        self.maybe_mogrify(&sql);
        let rows = self.run_with_retry(|| self.executor.execute(&sql)).await?;
        Ok(rows.is_empty())
    }

    /// Runs the `SELECT` and yields a lazy, forward-only stream of rows
    /// (§4.1, §4.9): rows are decoded as the driver delivers them rather
    /// than buffered up front, so a caller that aborts iteration early
    /// drops the underlying server-side cursor instead of paying for the
    /// whole result set regardless.
    pub async fn select(
        &self,
        columns: Option<&[&str]>,
    ) -> Result<impl futures_core::Stream<Item = Result<Row<V>>>> {
        let sql = synth::synth_select(self, columns);
        self.maybe_mogrify(&sql);
        let stream = match self.executor.query(&sql).await {
            Ok(stream) => stream,
            Err(crate::executor::ExecutorError::Disconnected(_)) => {
                self.executor.reconnect().await.map_err(box_err)?;
                self.executor.query(&sql).await.map_err(box_err)?
            }
            Err(other) => return Err(box_err(other)),
        };
        Ok(stream.map(|row| row.map_err(box_err)))
    }

    /// Count-then-select, requiring exactly one row (`_ho_get`).
    pub async fn get(&mut self, columns: Option<&[&str]>) -> Result<Relation<V>> {
        let count = self.count().await?;
        if count != 1 {
            return Err(Error::ExpectedOne { count });
        }
        let mut stream = self.select(columns).await?;
        let row = stream
            .next()
            .await
            .ok_or_else(|| Error::ExpectedOne { count: 0 })??;
        let mut result = self.clone();
        for (name, value) in row {
            if let Some(field) = result.fields.get_mut(&name) {
                field.set(value)?;
            }
        }
        result.is_singleton = true;
        Ok(result)
    }

    /// `INSERT ... RETURNING` over every *set* field (§4.1).
    pub async fn insert(&self, returning: Option<&[&str]>) -> Result<Row<V>> {
        let sql = synth::synth_insert(self, returning)?;
        self.maybe_mogrify(&sql);
        let rows = self.run_with_retry(|| self.executor.execute(&sql)).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::Metadata("insert returned no row".into()))
    }

    /// `UPDATE`, gated by the safety barrier (§4.1, §7) unless
    /// `update_all` is set — checked unconditionally, before `None`-valued
    /// pairs are dropped, so an unconstrained update can't slip past the
    /// barrier just because every value it passed happened to be `None`
    /// (`_ho_update` raises its `RuntimeError` before filtering `None` out).
    pub async fn update(
        &self,
        update_all: bool,
        returning: Option<&[&str]>,
        values: Vec<(String, Option<V>)>,
    ) -> Result<Vec<Row<V>>> {
        if !update_all && !self.is_set() {
            return Err(Error::SafetyBarrier { operation: "update" });
        }
        let values: Vec<(String, V)> = values.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect();
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let sql = synth::synth_update(self, &values, returning)?;
        self.maybe_mogrify(&sql);
        self.run_with_retry(|| self.executor.execute(&sql)).await
    }

    /// `DELETE`, gated by the same safety barrier as `update` (§4.1, §7).
    pub async fn delete(&self, delete_all: bool, returning: Option<&[&str]>) -> Result<Vec<Row<V>>> {
        if !delete_all && !self.is_set() {
            return Err(Error::SafetyBarrier { operation: "delete" });
        }
        let sql = synth::synth_delete(self, returning);
        self.maybe_mogrify(&sql);
        self.run_with_retry(|| self.executor.execute(&sql)).await
    }

    /// `rel.join(specs)` (§4.7): materializes `self` distinct, and for each
    /// spec materializes `other` constrained to the foreign-key values
    /// observed in `self`'s rows, grouping matches under `result_key`. A
    /// parent row with no match under a given spec simply carries no
    /// attachment for that key — this is the non-matching-row drop the
    /// spec describes, on the child side rather than the parent.
    pub async fn join(&self, specs: Vec<JoinSpec<V>>) -> Result<Vec<JoinedRow<V>>> {
        let mut root = self.clone();
        root.distinct();
        let mut parent_rows: Vec<Row<V>> = {
            let mut stream = root.select(None).await?;
            let mut rows = Vec::new();
            while let Some(row) = stream.next().await {
                rows.push(row?);
            }
            rows
        };

        let mut attachments_per_row: Vec<IndexMap<String, Vec<Attached<V>>>> =
            (0..parent_rows.len()).map(|_| IndexMap::new()).collect();

        for spec in specs {
            let fk = self
                .descriptor
                .foreign_keys
                .values()
                .find(|fk| fk.target_relation == *spec.other.fqrn())
                .cloned()
                .ok_or_else(|| Error::WrongForeignKey {
                    relation: self.fqrn.name.clone(),
                    name: spec.other.fqrn().name.clone(),
                })?;
            let (parent_cols, child_cols) = synth::fk_sides(&fk);
            let parent_cols = parent_cols.to_vec();
            let child_cols = child_cols.to_vec();

            let mut child = spec.other.clone();
            for (parent_col, child_col) in parent_cols.iter().zip(child_cols.iter()) {
                let values: Vec<V> = parent_rows
                    .iter()
                    .filter_map(|row| row.get(parent_col).cloned())
                    .collect();
                if values.is_empty() {
                    continue;
                }
                child.set_sequence(child_col, values, Comparator::Eq)?;
            }

            let select_cols: Option<Vec<String>> = spec.fields.as_ref().map(|fields| {
                let mut cols = fields.clone();
                for c in &child_cols {
                    if !cols.iter().any(|f| f == c) {
                        cols.push(c.clone());
                    }
                }
                cols
            });
            let select_cols_ref: Option<Vec<&str>> =
                select_cols.as_ref().map(|cols| cols.iter().map(String::as_str).collect());

            let child_rows: Vec<Row<V>> = {
                let mut stream = child.select(select_cols_ref.as_deref()).await?;
                let mut rows = Vec::new();
                while let Some(row) = stream.next().await {
                    rows.push(row?);
                }
                rows
            };

            let single_field = match &spec.fields {
                Some(fields) if fields.len() == 1 => Some(fields[0].clone()),
                _ => None,
            };

            for (parent_row, attachments) in parent_rows.iter().zip(attachments_per_row.iter_mut()) {
                let matched: Vec<&Row<V>> = child_rows
                    .iter()
                    .filter(|child_row| {
                        parent_cols
                            .iter()
                            .zip(child_cols.iter())
                            .all(|(pc, cc)| parent_row.get(pc) == child_row.get(cc))
                    })
                    .collect();
                if matched.is_empty() {
                    continue;
                }
                let values: Vec<Attached<V>> = match &single_field {
                    Some(field) => matched
                        .iter()
                        .filter_map(|row| row.get(field).cloned())
                        .map(Attached::Scalar)
                        .collect(),
                    None => matched.into_iter().cloned().map(Attached::Row).collect(),
                };
                attachments.insert(spec.result_key.clone(), values);
            }
        }

        Ok(parent_rows
            .drain(..)
            .zip(attachments_per_row)
            .map(|(row, attachments)| JoinedRow { row, attachments })
            .collect())
    }

    // ==================== set-algebra derived queries (§4.1, §8) ====================

    pub async fn contained_in(&self, other: &Relation<V>) -> Result<bool>
    where
        V: 'static,
    {
        Ok(self.clone().difference(other.clone()).count().await? == 0)
    }

    pub async fn equivalent(&self, other: &Relation<V>) -> Result<bool>
    where
        V: 'static,
    {
        Ok(self.contained_in(other).await? && other.contained_in(self).await?)
    }
}

fn box_err(e: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::Executor(Box::new(e))
}
