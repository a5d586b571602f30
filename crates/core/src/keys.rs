//! Physical key encoding.
//!
//! Pure functions deriving the store's partition and sort keys from a
//! document type and its primary-key field values, following the
//! single-table layout:
//!
//! - canonical item: `<DocName>/<pk1>=<v1>/<pk2>=<v2>/...` with the fixed
//!   sort-key sentinel `_`
//! - index item: the owner's canonical partition key with sort key
//!   `<ItemDocName>#<firstPkValue>`
//!
//! Key field values containing the separator characters `/` or `=` are
//! rejected so the encoding stays injective.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::item::{Document, ItemKey};
use crate::schema::DocumentDefinition;

/// Sort key of every canonical item.
pub const CANONICAL_SORT_KEY: &str = "_";

/// Encodes the physical key of a canonical item from the primary-key field
/// values found in `fields`.
pub fn encode_key(document: &DocumentDefinition, fields: &Document) -> Result<ItemKey> {
    let mut partition_key = document.name.clone();
    let mut has_key_field = false;
    for field in document.primary_key_fields() {
        has_key_field = true;
        let value = fields.get(&field.name).ok_or_else(|| {
            Error::KeyEncoding(format!(
                "missing primary key field {} on {}",
                field.name, document.name
            ))
        })?;
        let encoded = key_field_value(&field.name, value)?;
        partition_key.push('/');
        partition_key.push_str(&field.name);
        partition_key.push('=');
        partition_key.push_str(&encoded);
    }
    if !has_key_field {
        // Schema validation resolves a primary key for every document, so
        // this only fires for definitions built outside a Schema.
        return Err(Error::KeyEncoding(format!(
            "document {} has no primary key fields",
            document.name
        )));
    }
    Ok(ItemKey::new(partition_key, CANONICAL_SORT_KEY))
}

/// Sort key of an index item: `<ItemDocName>#<firstPkValue>`.
pub fn index_sort_key(item_document: &str, first_pk_value: &str) -> String {
    format!("{item_document}#{first_pk_value}")
}

/// Sort-key prefix selecting every index item of one item document under an
/// owner's partition.
pub fn index_sort_key_prefix(item_document: &str) -> String {
    format!("{item_document}#")
}

/// Renders a primary-key field value as its key-string form. Only strings
/// and numbers are accepted, and the separator characters are rejected.
pub fn key_field_value(field: &str, value: &Value) -> Result<String> {
    let rendered = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(Error::KeyEncoding(format!(
                "primary key field {field} must be a string or number, got {other}"
            )))
        }
    };
    if rendered.contains(['/', '=']) {
        return Err(Error::KeyEncoding(format!(
            "primary key field {field} contains a reserved separator: {rendered}"
        )));
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDefinition, FieldType};
    use serde_json::json;

    fn doc(fields: Vec<FieldDefinition>) -> DocumentDefinition {
        DocumentDefinition::new("ArtworkDoc", fields)
    }

    fn to_map(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_single_field_key() {
        let doc = doc(vec![FieldDefinition::primary_key("id", FieldType::String)]);
        let key = encode_key(&doc, &to_map(json!({"id": "a1", "title": "T1"}))).unwrap();
        assert_eq!(key.partition_key, "ArtworkDoc/id=a1");
        assert_eq!(key.sort_key, "_");
    }

    #[test]
    fn test_composite_key_preserves_declaration_order() {
        let doc = doc(vec![
            FieldDefinition::primary_key("orderId", FieldType::String),
            FieldDefinition::primary_key("line", FieldType::Number),
        ]);
        let key = encode_key(&doc, &to_map(json!({"line": 2, "orderId": "o1"}))).unwrap();
        assert_eq!(key.partition_key, "ArtworkDoc/orderId=o1/line=2");
    }

    #[test]
    fn test_missing_key_field_is_rejected() {
        let doc = doc(vec![FieldDefinition::primary_key("id", FieldType::String)]);
        let err = encode_key(&doc, &to_map(json!({"title": "T1"}))).unwrap_err();
        assert!(matches!(err, Error::KeyEncoding(_)));
    }

    #[test]
    fn test_separator_characters_are_rejected() {
        let doc = doc(vec![FieldDefinition::primary_key("id", FieldType::String)]);
        for bad in ["a/1", "a=1"] {
            let err = encode_key(&doc, &to_map(json!({"id": bad}))).unwrap_err();
            assert!(matches!(err, Error::KeyEncoding(_)), "accepted {bad}");
        }
    }

    #[test]
    fn test_non_scalar_key_value_is_rejected() {
        let doc = doc(vec![FieldDefinition::primary_key("id", FieldType::String)]);
        let err = encode_key(&doc, &to_map(json!({"id": ["a1"]}))).unwrap_err();
        assert!(matches!(err, Error::KeyEncoding(_)));
    }

    #[test]
    fn test_index_sort_key_shape() {
        assert_eq!(index_sort_key("ArtworkDoc", "a1"), "ArtworkDoc#a1");
        assert_eq!(index_sort_key_prefix("ArtworkDoc"), "ArtworkDoc#");
    }
}
