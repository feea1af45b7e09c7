//! JSON-shaped projection of a `Relation::join` result (§4.7.1). Kept
//! separate from the value-generic `core::relation::join` algorithm itself
//! since the scalar-to-string conversion it applies is specific to
//! [`PostgresValue`]'s non-JSON-native variants.

use crate::value::PostgresValue;
use relquery_core::relation::{Attached, JoinedRow};

fn attached_to_json(attached: &Attached<PostgresValue>) -> serde_json::Value {
    match attached {
        Attached::Scalar(value) => value.json_scalar(),
        Attached::Row(row) => serde_json::Value::Object(
            row.iter()
                .map(|(name, value)| (name.clone(), value.json_scalar()))
                .collect(),
        ),
    }
}

/// Renders one `JoinedRow` as a JSON object: the row's own columns plus one
/// array-valued key per attachment.
pub fn joined_row_to_json(joined: &JoinedRow<PostgresValue>) -> serde_json::Value {
    let mut object: serde_json::Map<String, serde_json::Value> = joined
        .row
        .iter()
        .map(|(name, value)| (name.clone(), value.json_scalar()))
        .collect();
    for (result_key, attached) in &joined.attachments {
        object.insert(
            result_key.clone(),
            serde_json::Value::Array(attached.iter().map(attached_to_json).collect()),
        );
    }
    serde_json::Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn scalar_attachment_renders_as_an_array_of_strings() {
        let mut row = IndexMap::new();
        row.insert("id".to_string(), PostgresValue::Int(1));
        let mut attachments = IndexMap::new();
        attachments.insert(
            "tags".to_string(),
            vec![
                Attached::Scalar(PostgresValue::Text("a".into())),
                Attached::Scalar(PostgresValue::Text("b".into())),
            ],
        );
        let joined = JoinedRow { row, attachments };
        let json = joined_row_to_json(&joined);
        assert_eq!(json["id"], serde_json::json!(1));
        assert_eq!(json["tags"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn uuid_and_timestamp_attachments_render_as_strings() {
        let uuid = uuid::Uuid::nil();
        let mut row = IndexMap::new();
        row.insert("uuid".to_string(), PostgresValue::Uuid(uuid));
        let joined: JoinedRow<PostgresValue> = JoinedRow {
            row,
            attachments: IndexMap::new(),
        };
        let json = joined_row_to_json(&joined);
        assert_eq!(json["uuid"], serde_json::json!(uuid.to_string()));
    }
}
