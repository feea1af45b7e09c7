//! SQL synthesis (§4.3–§4.5): join-graph planning, predicate-tree
//! integration, and statement template assembly for every terminal
//! operation. Grounded in halfORM's query-building walk over
//! `self._ho_joined_tables`/`_praf` (`half_orm/relation.py`).

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::field::QueryKind;
use crate::metadata::FkDirection;
use crate::relation::Relation;
use crate::sql::{SQL, Token};
use crate::value::SQLParam;
use std::collections::HashSet;

/// One relation reached by walking `join_to`, flattened out of the tree so
/// the synthesizer can emit a single flat chain of `JOIN`s rather than
/// recursing through nested `FROM` clauses.
struct JoinSite<'a, V: SQLParam> {
    parent_alias: u64,
    fk: &'a crate::metadata::ForeignKeyDescriptor,
    relation: &'a Relation<V>,
}

/// Depth-first walk of the join graph. `visited` guards against the cycle
/// a set-operator composition could otherwise introduce by merging two
/// graphs that both reach the same alias (§3 invariant, §7
/// `CyclicComposition`).
fn collect_joins<'a, V: SQLParam>(
    rel: &'a Relation<V>,
    visited: &mut HashSet<u64>,
    out: &mut Vec<JoinSite<'a, V>>,
) -> Result<()> {
    if !visited.insert(rel.alias_id()) {
        return Err(Error::CyclicComposition);
    }
    for edge in rel.join_to.values() {
        out.push(JoinSite {
            parent_alias: rel.alias_id(),
            fk: &edge.fk,
            relation: &edge.target,
        });
        collect_joins(&edge.target, visited, out)?;
    }
    Ok(())
}

fn table_name<V: SQLParam>(rel: &Relation<V>) -> String {
    format!("\"{}\".\"{}\"", rel.fqrn().schema, rel.fqrn().name)
}

fn table_ref<V: SQLParam>(rel: &Relation<V>) -> SQL<'static, V> {
    SQL::raw(table_name(rel)).alias(format!("r{}", rel.alias_id()))
}

/// The join condition for one [`JoinSite`]. `Forward` means the parent
/// relation holds the referencing columns (the common case, e.g. a post
/// joined to its author); `Reverse` flips which side supplies which
/// column, for a foreign key discovered from the referenced end (e.g. a
/// person joined out to their posts).
/// Which of a foreign key's two column lists belongs to the relation that
/// owns the `join_to` edge ("parent") versus the relation it points at
/// ("child"), given the descriptor's direction relative to that owner.
pub(crate) fn fk_sides(fk: &crate::metadata::ForeignKeyDescriptor) -> (&[String], &[String]) {
    match fk.direction {
        FkDirection::Forward => (&fk.source_fields, &fk.target_fields),
        FkDirection::Reverse => (&fk.target_fields, &fk.source_fields),
    }
}

fn on_clause<'a, V: SQLParam>(site: &JoinSite<'a, V>) -> SQL<'static, V> {
    let (parent_cols, child_cols) = fk_sides(site.fk);
    let parts: Vec<SQL<'static, V>> = parent_cols
        .iter()
        .zip(child_cols.iter())
        .map(|(parent_col, child_col)| {
            SQL::raw(format!("r{}.\"{}\"", site.parent_alias, parent_col))
                .push(Token::Eq)
                .append(SQL::raw(format!(
                    "r{}.\"{}\"",
                    site.relation.alias_id(),
                    child_col
                )))
        })
        .collect();
    SQL::join(parts, Token::And)
}

fn from_clause<'a, V: SQLParam>(rel: &'a Relation<V>, joins: &[JoinSite<'a, V>]) -> SQL<'static, V> {
    let mut sql = SQL::token(Token::From);
    if rel.only {
        sql = sql.push(Token::Only);
    }
    sql = sql.append(table_ref(rel));
    for site in joins {
        sql = sql
            .push(Token::Join)
            .append(table_ref(site.relation))
            .push(Token::On)
            .append(on_clause(site));
    }
    sql
}

/// Combines `rel`'s own predicate tree with every joined relation's,
/// AND-ing them together (halfORM joins constrain the whole statement, not
/// just their own table). Joined relations always render alias-qualified
/// (`QueryKind::Select`) regardless of the top-level `kind`, since a join
/// only ever appears in a `SELECT`/`count`/`is_empty` statement.
fn where_clause<'a, V: SQLParam>(
    rel: &'a Relation<V>,
    joins: &[JoinSite<'a, V>],
    kind: QueryKind,
) -> SQL<'static, V> {
    let mut parts = vec![rel.node().walk(kind, rel.alias_id(), rel.executor.quirks())];
    for site in joins {
        parts.push(site.relation.node().walk(
            QueryKind::Select,
            site.relation.alias_id(),
            site.relation.executor.quirks(),
        ));
    }
    SQL::token(Token::Where).append(SQL::join(parts, Token::And))
}

fn returning_clause<V: SQLParam>(columns: &[&str]) -> SQL<'static, V> {
    if columns.is_empty() {
        SQL::token(Token::Star)
    } else {
        SQL::join(
            columns.iter().map(|c| SQL::ident(c.to_string())).collect::<Vec<_>>(),
            Token::Comma,
        )
    }
}

fn planned_joins<'a, V: SQLParam>(rel: &'a Relation<V>) -> Result<Vec<JoinSite<'a, V>>> {
    let mut joins = Vec::new();
    let mut visited = HashSet::new();
    collect_joins(rel, &mut visited, &mut joins)?;
    Ok(joins)
}

pub fn synth_select<V: SQLParam>(rel: &Relation<V>, columns: Option<&[&str]>) -> SQL<'static, V> {
    let joins = planned_joins(rel).unwrap_or_default();

    let select_cols = match columns {
        Some(cols) if !cols.is_empty() => SQL::join(
            cols.iter()
                .map(|c| SQL::raw(format!("r{}.\"{}\"", rel.alias_id(), c)))
                .collect::<Vec<_>>(),
            Token::Comma,
        ),
        _ => SQL::token(Token::Star),
    };

    let mut sql = SQL::token(Token::Select);
    if rel.select_params.distinct {
        sql = sql.push(Token::Distinct);
    }
    sql = sql
        .append(select_cols)
        .append(from_clause(rel, &joins))
        .append(where_clause(rel, &joins, QueryKind::Select));
    if let Some(order_by) = &rel.select_params.order_by {
        sql = sql.push(Token::OrderBy).append(SQL::raw(order_by.clone()));
    }
    if let Some(limit) = rel.select_params.limit {
        sql = sql.push(Token::Limit).append(SQL::raw(limit.to_string()));
    }
    if let Some(offset) = rel.select_params.offset {
        sql = sql.push(Token::Offset).append(SQL::raw(offset.to_string()));
    }
    sql
}

pub fn synth_count<V: SQLParam>(rel: &Relation<V>) -> SQL<'static, V> {
    let joins = planned_joins(rel).unwrap_or_default();
    SQL::token(Token::Select)
        .append(SQL::func("count", SQL::token(Token::Star)))
        .append(from_clause(rel, &joins))
        .append(where_clause(rel, &joins, QueryKind::Select))
}

pub fn synth_is_empty<V: SQLParam>(rel: &Relation<V>) -> SQL<'static, V> {
    let joins = planned_joins(rel).unwrap_or_default();
    SQL::token(Token::Select)
        .push(Token::Star)
        .append(from_clause(rel, &joins))
        .append(where_clause(rel, &joins, QueryKind::Select))
        .push(Token::Limit)
        .append(SQL::raw("1"))
}

pub fn synth_insert<V: SQLParam>(rel: &Relation<V>, returning: Option<&[&str]>) -> Result<SQL<'static, V>> {
    let mut cols = Vec::new();
    let mut vals = Vec::new();
    for field in rel.fields.values() {
        if let Some(value) = field.bind_value() {
            cols.push(SQL::ident(field.name().to_string()));
            vals.push(SQL::param(value));
        }
    }
    // Columns reachable only through a joined foreign key (not explicitly
    // set on `rel` itself) are filled by a scalar subquery selecting the
    // joined relation's own side of the key, constrained by whatever
    // predicate was built up on it — halfORM's `__what()` folding
    // `fk_fields`/`fk_values` into the insert's column/value lists.
    for edge in rel.join_to.values() {
        let (parent_cols, child_cols) = fk_sides(&edge.fk);
        for (parent_col, child_col) in parent_cols.iter().zip(child_cols.iter()) {
            let already_set = rel
                .fields
                .get(parent_col)
                .map(|f| f.bind_value().is_some())
                .unwrap_or(false);
            if already_set {
                continue;
            }
            let subquery = SQL::token(Token::Select)
                .append(SQL::ident(child_col.clone()))
                .push(Token::From)
                .append(SQL::raw(table_name(&edge.target)))
                .push(Token::Where)
                .append(edge.target.node().walk(
                    QueryKind::Mutating,
                    edge.target.alias_id(),
                    edge.target.executor.quirks(),
                ));
            cols.push(SQL::ident(parent_col.clone()));
            vals.push(subquery.parens());
        }
    }
    if cols.is_empty() {
        return Err(Error::InvalidValue {
            field: rel.fqrn().name.clone(),
            reason: "insert requires at least one set field".into(),
        });
    }
    let mut sql = SQL::token(Token::Insert)
        .push(Token::Into)
        .append(SQL::raw(table_name(rel)))
        .push(Token::LParen)
        .append(SQL::join(cols, Token::Comma))
        .push(Token::RParen)
        .push(Token::Values)
        .push(Token::LParen)
        .append(SQL::join(vals, Token::Comma))
        .push(Token::RParen);
    if let Some(columns) = returning {
        sql = sql.push(Token::Returning).append(returning_clause(columns));
    }
    Ok(sql)
}

pub fn synth_update<V: SQLParam>(
    rel: &Relation<V>,
    values: &[(String, V)],
    returning: Option<&[&str]>,
) -> Result<SQL<'static, V>> {
    let sets: Vec<SQL<'static, V>> = values
        .iter()
        .map(|(name, value)| {
            SQL::ident(name.clone())
                .push(Token::Eq)
                .append(SQL::param(value.clone()))
        })
        .collect();
    let mut sql = SQL::token(Token::Update)
        .append(SQL::raw(table_name(rel)))
        .push(Token::Set)
        .append(SQL::join(sets, Token::Comma))
        .push(Token::Where)
        .append(rel.node().walk(QueryKind::Mutating, rel.alias_id(), rel.executor.quirks()));
    if let Some(columns) = returning {
        sql = sql.push(Token::Returning).append(returning_clause(columns));
    }
    Ok(sql)
}

pub fn synth_delete<V: SQLParam>(rel: &Relation<V>, returning: Option<&[&str]>) -> SQL<'static, V> {
    let mut sql = SQL::token(Token::Delete)
        .push(Token::From)
        .append(SQL::raw(table_name(rel)))
        .push(Token::Where)
        .append(rel.node().walk(QueryKind::Mutating, rel.alias_id(), rel.executor.quirks()));
    if let Some(columns) = returning {
        sql = sql.push(Token::Returning).append(returning_clause(columns));
    }
    sql
}
