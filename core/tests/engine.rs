//! End-to-end scenarios over a small person/post schema, driven by an
//! in-memory `Metadata`/`Executor` pair instead of a live database.

use async_trait::async_trait;
use indexmap::IndexMap;
use relquery_core::executor::{ExecutorError, Row, RowStream};
use relquery_core::prelude::*;
use relquery_core::sql::SQL;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
enum V {
    Int(i64),
    Text(String),
    Array(Vec<V>),
    Null,
}

impl SQLParam for V {
    const DIALECT: Dialect = Dialect::PostgreSQL;
    fn null() -> Self {
        V::Null
    }
    fn array(values: Vec<Self>) -> Self {
        V::Array(values)
    }
    fn as_i64(&self) -> Option<i64> {
        match self {
            V::Int(n) => Some(*n),
            _ => None,
        }
    }
}

/// Hands back a fixed batch of rows to every `query`/`execute` call,
/// regardless of the statement text — enough to exercise the engine's own
/// logic (safety barriers, cardinality checks, set algebra) without a real
/// planner on the other end.
struct MockExecutor {
    rows: Mutex<Vec<Row<V>>>,
}

impl MockExecutor {
    fn with_rows(rows: Vec<Row<V>>) -> Self {
        Self { rows: Mutex::new(rows) }
    }
}

#[async_trait]
impl Executor<V> for MockExecutor {
    async fn query<'a>(&'a self, _sql: &SQL<'_, V>) -> Result<RowStream<'a, V>, ExecutorError> {
        let rows = self.rows.lock().unwrap().clone();
        Ok(Box::pin(futures_util::stream::iter(rows.into_iter().map(Ok))))
    }

    async fn execute(&self, _sql: &SQL<'_, V>) -> Result<Vec<Row<V>>, ExecutorError> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn reconnect(&self) -> Result<(), ExecutorError> {
        Ok(())
    }
}

fn field(name: &str, is_pk: bool, is_array: bool) -> FieldDescriptor {
    FieldDescriptor {
        name: name.to_string(),
        sql_type: if is_array { "_text".into() } else { "text".into() },
        is_pk,
        is_unique: is_pk,
        not_null: is_pk,
        is_array,
    }
}

fn person_descriptor() -> RelationDescriptor {
    let mut fields = IndexMap::new();
    fields.insert("id".to_string(), field("id", true, false));
    fields.insert("first_name".to_string(), field("first_name", false, false));
    fields.insert("last_name".to_string(), field("last_name", false, false));

    RelationDescriptor {
        fqrn: Fqrn::new("db", "public", "person"),
        kind: RelationKind::Table,
        fields,
        foreign_keys: IndexMap::new(),
    }
}

fn post_descriptor() -> RelationDescriptor {
    let mut fields = IndexMap::new();
    fields.insert("id".to_string(), field("id", true, false));
    fields.insert("author_id".to_string(), field("author_id", false, false));
    fields.insert("title".to_string(), field("title", false, false));
    fields.insert("tags".to_string(), field("tags", false, true));

    let mut foreign_keys = IndexMap::new();
    foreign_keys.insert(
        "post_person_fk".to_string(),
        ForeignKeyDescriptor {
            name: "post_person_fk".into(),
            source_fields: vec!["author_id".into()],
            target_relation: Fqrn::new("db", "public", "person"),
            target_fields: vec!["id".into()],
            direction: FkDirection::Forward,
        },
    );

    RelationDescriptor {
        fqrn: Fqrn::new("db", "public", "post"),
        kind: RelationKind::Table,
        fields,
        foreign_keys,
    }
}

fn metadata() -> StaticMetadata {
    StaticMetadata::new()
        .with_relation(person_descriptor())
        .with_relation(post_descriptor())
}

#[tokio::test]
async fn count_decodes_from_the_first_row() {
    let executor: SharedExecutor<V> = std::sync::Arc::new(MockExecutor::with_rows(vec![IndexMap::from([(
        "count".to_string(),
        V::Int(3),
    )])]));
    let meta = metadata();
    let rel = Relation::new(Fqrn::new("db", "public", "person"), &meta, executor)
        .await
        .unwrap();
    assert_eq!(rel.count().await.unwrap(), 3);
}

#[tokio::test]
async fn update_without_a_constraint_hits_the_safety_barrier() {
    let executor: SharedExecutor<V> = std::sync::Arc::new(MockExecutor::with_rows(vec![]));
    let meta = metadata();
    let rel = Relation::new(Fqrn::new("db", "public", "person"), &meta, executor)
        .await
        .unwrap();
    let result = rel
        .update(false, None, vec![("first_name".to_string(), Some(V::Text("Gaston".into())))])
        .await;
    assert!(matches!(result, Err(Error::SafetyBarrier { operation: "update" })));
}

#[tokio::test]
async fn update_with_only_nil_values_still_hits_the_safety_barrier() {
    let executor: SharedExecutor<V> = std::sync::Arc::new(MockExecutor::with_rows(vec![]));
    let meta = metadata();
    let rel = Relation::new(Fqrn::new("db", "public", "person"), &meta, executor)
        .await
        .unwrap();
    let result = rel.update(false, None, vec![("first_name".to_string(), None)]).await;
    assert!(matches!(result, Err(Error::SafetyBarrier { operation: "update" })));
}

#[tokio::test]
async fn update_all_bypasses_the_safety_barrier() {
    let executor: SharedExecutor<V> = std::sync::Arc::new(MockExecutor::with_rows(vec![IndexMap::from([(
        "id".to_string(),
        V::Int(1),
    )])]));
    let meta = metadata();
    let rel = Relation::new(Fqrn::new("db", "public", "person"), &meta, executor)
        .await
        .unwrap();
    let rows = rel
        .update(true, None, vec![("first_name".to_string(), Some(V::Text("Gaston".into())))])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn get_rejects_non_unique_cardinality() {
    let executor: SharedExecutor<V> = std::sync::Arc::new(MockExecutor::with_rows(vec![IndexMap::from([(
        "count".to_string(),
        V::Int(2),
    )])]));
    let meta = metadata();
    let mut rel = Relation::new(Fqrn::new("db", "public", "person"), &meta, executor)
        .await
        .unwrap();
    let result = rel.get(None).await;
    assert!(matches!(result, Err(Error::ExpectedOne { count: 2 })));
}

#[tokio::test]
async fn join_on_field_registers_a_synthetic_foreign_key() {
    let executor: SharedExecutor<V> = std::sync::Arc::new(MockExecutor::with_rows(vec![]));
    let meta = metadata();
    let person = Relation::new(Fqrn::new("db", "public", "person"), &meta, executor.clone())
        .await
        .unwrap();
    let mut post = Relation::new(Fqrn::new("db", "public", "post"), &meta, executor)
        .await
        .unwrap();
    post.join_on_field("author_id", person, "id").unwrap();
    assert_eq!(post.join_count(), 1);
}

#[tokio::test]
async fn join_attaches_matching_rows_under_the_result_key() {
    let rows = vec![IndexMap::from([
        ("id".to_string(), V::Int(1)),
        ("author_id".to_string(), V::Int(1)),
    ])];
    let executor: SharedExecutor<V> = std::sync::Arc::new(MockExecutor::with_rows(rows));
    let meta = metadata();
    let person = Relation::new(Fqrn::new("db", "public", "person"), &meta, executor.clone())
        .await
        .unwrap();
    let post = Relation::new(Fqrn::new("db", "public", "post"), &meta, executor)
        .await
        .unwrap();
    let joined = post
        .join(vec![JoinSpec::new(person, "author")])
        .await
        .unwrap();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].attachments.get("author").unwrap().len(), 1);
}

#[tokio::test]
async fn sequence_constraint_on_scalar_column_requires_no_null() {
    let executor: SharedExecutor<V> = std::sync::Arc::new(MockExecutor::with_rows(vec![]));
    let meta = metadata();
    let mut rel = Relation::new(Fqrn::new("db", "public", "person"), &meta, executor)
        .await
        .unwrap();
    let result = rel.set_sequence("last_name", vec![V::Null], Comparator::Eq);
    assert!(result.is_err());
}
