//! DynamoDB attribute conversion functions.
//!
//! Pure functions converting between DynamoDB `AttributeValue` maps and the
//! stored-item wire shape. Testable in isolation without DynamoDB access.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::Value;

use artsync_core::error::{Error, Result};
use artsync_core::item::StoredItem;

/// Convert a JSON value to an AttributeValue.
pub fn value_to_attribute(value: &Value) -> Result<AttributeValue> {
    match value {
        Value::Null => Ok(AttributeValue::Null(true)),
        Value::Bool(b) => Ok(AttributeValue::Bool(*b)),
        Value::Number(n) => Ok(AttributeValue::N(n.to_string())),
        Value::String(s) => Ok(AttributeValue::S(s.clone())),
        Value::Array(items) => Ok(AttributeValue::L(
            items.iter().map(value_to_attribute).collect::<Result<_>>()?,
        )),
        Value::Object(map) => Ok(AttributeValue::M(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), value_to_attribute(v)?)))
                .collect::<Result<_>>()?,
        )),
    }
}

/// Convert an AttributeValue back to a JSON value.
pub fn attribute_to_value(attribute: &AttributeValue) -> Result<Value> {
    match attribute {
        AttributeValue::Null(_) => Ok(Value::Null),
        AttributeValue::Bool(b) => Ok(Value::Bool(*b)),
        AttributeValue::N(n) => n
            .parse::<serde_json::Number>()
            .map(Value::Number)
            .map_err(|e| Error::Serialization(format!("Invalid number attribute {n}: {e}"))),
        AttributeValue::S(s) => Ok(Value::String(s.clone())),
        AttributeValue::L(items) => Ok(Value::Array(
            items.iter().map(attribute_to_value).collect::<Result<_>>()?,
        )),
        AttributeValue::M(map) => Ok(Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), attribute_to_value(v)?)))
                .collect::<Result<_>>()?,
        )),
        other => Err(Error::Serialization(format!(
            "Unsupported attribute type: {other:?}"
        ))),
    }
}

/// Convert a stored item to a DynamoDB item.
pub fn item_to_attributes(item: &StoredItem) -> Result<HashMap<String, AttributeValue>> {
    let value = serde_json::to_value(item).map_err(|e| Error::Serialization(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(Error::Serialization(
            "stored item did not serialize to an object".to_string(),
        ));
    };
    map.iter()
        .map(|(k, v)| Ok((k.clone(), value_to_attribute(v)?)))
        .collect()
}

/// Convert a DynamoDB item to a stored item.
pub fn attributes_to_item(attributes: &HashMap<String, AttributeValue>) -> Result<StoredItem> {
    let map: serde_json::Map<String, Value> = attributes
        .iter()
        .map(|(k, v)| Ok((k.clone(), attribute_to_value(v)?)))
        .collect::<Result<_>>()?;
    serde_json::from_value(Value::Object(map)).map_err(|e| Error::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use artsync_core::item::ItemKey;
    use serde_json::json;

    fn sample_item() -> StoredItem {
        let Value::Object(fields) = json!({
            "id": "a1",
            "ownerId": "u1",
            "title": "T1",
            "priceCents": 120000,
            "tags": ["oil", "canvas"],
            "framed": true,
        }) else {
            unreachable!()
        };
        StoredItem::canonical(ItemKey::new("ArtworkDoc/id=a1", "_"), 2, fields)
    }

    #[test]
    fn test_item_round_trip() {
        let item = sample_item();
        let attributes = item_to_attributes(&item).unwrap();
        let parsed = attributes_to_item(&attributes).unwrap();
        assert_eq!(parsed, item);
    }

    #[test]
    fn test_item_has_physical_key_attributes() {
        let attributes = item_to_attributes(&sample_item()).unwrap();
        assert_eq!(attributes["$p"].as_s().unwrap(), "ArtworkDoc/id=a1");
        assert_eq!(attributes["$s"].as_s().unwrap(), "_");
        assert_eq!(attributes["$v"].as_n().unwrap(), "2");
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(
            value_to_attribute(&json!("x")).unwrap(),
            AttributeValue::S("x".to_string())
        );
        assert_eq!(
            value_to_attribute(&json!(42)).unwrap(),
            AttributeValue::N("42".to_string())
        );
        assert_eq!(
            value_to_attribute(&json!(true)).unwrap(),
            AttributeValue::Bool(true)
        );
        assert_eq!(attribute_to_value(&AttributeValue::Null(true)).unwrap(), Value::Null);
    }

    #[test]
    fn test_binary_attribute_is_rejected() {
        let attribute = AttributeValue::Ss(vec!["a".to_string()]);
        assert!(matches!(
            attribute_to_value(&attribute),
            Err(Error::Serialization(_))
        ));
    }
}
