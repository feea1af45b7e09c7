//! The set-operator composition tree (§3, §4.4), grounded in halfORM's
//! `_SetOperators`/`__walk_op` (`half_orm/relation.py`).
//!
//! Redesigned per the spec's explicit guidance (§9): a tagged `enum Node`
//! replaces the original's mutable `left`/`operator`/`right` triple living
//! on every relation, and boolean algebra is exposed through named methods
//! rather than `__and__`/`__or__`/`__sub__`/`__neg__`.

use crate::executor::ExecutorQuirks;
use crate::field::{Field, QueryKind};
use crate::sql::{SQL, Token};
use crate::value::SQLParam;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    And,
    Or,
    AndNot,
}

/// The field constraints contributed by one operand of a composition, all
/// rendered against the single alias the composition shares (§9: operands
/// combined by a set operator constrain the same table occurrence, so they
/// render through one alias rather than a self-join).
#[derive(Debug, Clone)]
pub struct Leaf<V: SQLParam> {
    pub fields: IndexMap<String, Field<V>>,
}

impl<V: SQLParam> Leaf<V> {
    pub fn where_repr(&self, kind: QueryKind, alias_id: u64, quirks: ExecutorQuirks) -> SQL<'static, V> {
        let parts: Vec<_> = self
            .fields
            .values()
            .filter_map(|f| f.where_repr(kind, alias_id, quirks))
            .collect();
        if parts.is_empty() {
            SQL::raw("1 = 1")
        } else {
            SQL::join(parts, Token::And)
        }
    }
}

#[derive(Debug, Clone)]
pub enum Node<V: SQLParam> {
    Leaf(Leaf<V>),
    Not(Box<Node<V>>),
    Bin(SetOp, Box<Node<V>>, Box<Node<V>>),
}

impl<V: SQLParam> Node<V> {
    pub fn walk(&self, kind: QueryKind, alias_id: u64, quirks: ExecutorQuirks) -> SQL<'static, V> {
        match self {
            Node::Leaf(leaf) => leaf.where_repr(kind, alias_id, quirks),
            Node::Not(inner) => SQL::token(Token::Not).append(inner.walk(kind, alias_id, quirks).parens()),
            Node::Bin(op, left, right) => {
                let sep = match op {
                    SetOp::And => Token::And,
                    SetOp::Or => Token::Or,
                    SetOp::AndNot => Token::AndNot,
                };
                left.walk(kind, alias_id, quirks)
                    .parens()
                    .push(sep)
                    .append(right.walk(kind, alias_id, quirks).parens())
            }
        }
    }
}
