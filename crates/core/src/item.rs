//! Physical item representation.
//!
//! Every stored item carries the two-part physical key (`$p`/`$s`), the
//! optimistic-concurrency version `$v` for canonical items, and the document
//! fields flattened alongside them:
//!
//! ```json
//! { "$p": "ArtworkDoc/id=a1", "$s": "_", "$v": 1, "id": "a1", "title": "T1" }
//! ```
//!
//! Index items use the owner's partition key, a `<ItemDoc>#<firstPkValue>`
//! sort key, and carry no `$v` (they are derived, not independently
//! versioned).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A domain document: field name to JSON value.
pub type Document = serde_json::Map<String, Value>;

/// Attribute name of the partition key.
pub const PARTITION_KEY_ATTR: &str = "$p";
/// Attribute name of the sort key.
pub const SORT_KEY_ATTR: &str = "$s";
/// Attribute name of the optimistic-concurrency version.
pub const VERSION_ATTR: &str = "$v";

/// The two-part physical key of a stored item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    #[serde(rename = "$p")]
    pub partition_key: String,
    #[serde(rename = "$s")]
    pub sort_key: String,
}

impl ItemKey {
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }
}

/// A stored item in its wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    #[serde(rename = "$p")]
    pub partition_key: String,
    #[serde(rename = "$s")]
    pub sort_key: String,
    #[serde(rename = "$v", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(flatten)]
    pub fields: Document,
}

impl StoredItem {
    /// Assembles a canonical (versioned) item.
    pub fn canonical(key: ItemKey, version: u64, fields: Document) -> Self {
        Self {
            partition_key: key.partition_key,
            sort_key: key.sort_key,
            version: Some(version),
            fields,
        }
    }

    /// Assembles an unversioned index item.
    pub fn index(key: ItemKey, fields: Document) -> Self {
        Self {
            partition_key: key.partition_key,
            sort_key: key.sort_key,
            version: None,
            fields,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.partition_key.clone(), self.sort_key.clone())
    }

    /// Converts back to a clean domain document: the physical key attributes
    /// are stripped, `$v` is kept for canonical items.
    pub fn into_document(self) -> Document {
        let mut fields = self.fields;
        if let Some(version) = self.version {
            fields.insert(VERSION_ATTR.to_string(), Value::from(version));
        }
        fields
    }
}

/// Removes the reserved `$p`/`$s`/`$v` attributes from a caller-supplied
/// document, returning the stripped copy. Callers cannot smuggle physical
/// attributes into the stored payload.
pub fn strip_system_attributes(mut fields: Document) -> Document {
    fields.remove(PARTITION_KEY_ATTR);
    fields.remove(SORT_KEY_ATTR);
    fields.remove(VERSION_ATTR);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Document {
        let Value::Object(map) = json!({"id": "a1", "title": "T1"}) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn test_canonical_wire_shape() {
        let item = StoredItem::canonical(ItemKey::new("ArtworkDoc/id=a1", "_"), 1, fields());
        let wire = serde_json::to_value(&item).unwrap();
        assert_eq!(
            wire,
            json!({
                "$p": "ArtworkDoc/id=a1",
                "$s": "_",
                "$v": 1,
                "id": "a1",
                "title": "T1"
            })
        );
    }

    #[test]
    fn test_index_item_has_no_version_attribute() {
        let item = StoredItem::index(ItemKey::new("UserDoc/id=u1", "ArtworkDoc#a1"), fields());
        let wire = serde_json::to_value(&item).unwrap();
        assert!(wire.get("$v").is_none());
        assert_eq!(wire["$s"], "ArtworkDoc#a1");
    }

    #[test]
    fn test_wire_round_trip() {
        let item = StoredItem::canonical(ItemKey::new("ArtworkDoc/id=a1", "_"), 3, fields());
        let wire = serde_json::to_string(&item).unwrap();
        let parsed: StoredItem = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed, item);
    }

    #[test]
    fn test_into_document_strips_key_attributes() {
        let item = StoredItem::canonical(ItemKey::new("ArtworkDoc/id=a1", "_"), 2, fields());
        let doc = item.into_document();
        assert!(doc.get("$p").is_none());
        assert!(doc.get("$s").is_none());
        assert_eq!(doc["$v"], json!(2));
        assert_eq!(doc["title"], json!("T1"));
    }

    #[test]
    fn test_strip_system_attributes() {
        let mut fields = fields();
        fields.insert("$p".to_string(), json!("forged"));
        fields.insert("$v".to_string(), json!(99));
        let stripped = strip_system_attributes(fields);
        assert!(stripped.get("$p").is_none());
        assert!(stripped.get("$v").is_none());
        assert_eq!(stripped["id"], json!("a1"));
    }
}
