//! Abstract operation protocol.
//!
//! [`Operation`] is the tagged batch entry handed to the transaction
//! compiler, either directly through `Datastore::write` or accumulated by
//! the fluent builder. The serialized form is a discriminated union on a
//! `kind` tag and round-trips exactly, so batches can cross a process
//! boundary for batching or logging. The one exception is
//! [`Operation::UpdateWith`], which carries an in-process closure and is
//! excluded from the wire form.
//!
//! [`WritePrimitive`] is the concrete conditional-write shape the compiler
//! lowers operations into; the `Raw*` operation variants pass primitives
//! through untouched for callers that want to bypass the tagged sugar.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::item::{Document, ItemKey, StoredItem};

/// Maximum number of operations accepted in one batch.
pub const MAX_WRITE_BATCH: usize = 100;

/// Condition attached to a conditional write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteCondition {
    /// The item must not already exist.
    NotExists,
    /// The item must exist with exactly this `$v`.
    VersionEquals(u64),
}

/// A concrete store-level write, the unit submitted to
/// [`Store::transact_write`](crate::store::Store::transact_write).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum WritePrimitive {
    Put {
        item: StoredItem,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<WriteCondition>,
    },
    Delete {
        key: ItemKey,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<WriteCondition>,
    },
    /// Sets the named attributes on an existing item, leaving the rest.
    Update {
        key: ItemKey,
        set: Document,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<WriteCondition>,
    },
    /// Asserts a condition without writing. Only meaningful inside a
    /// transaction.
    ConditionCheck { key: ItemKey, condition: WriteCondition },
}

/// Updater applied by [`Operation::UpdateWith`]: current document fields in,
/// next document fields out.
pub type UpdateFn = Arc<dyn Fn(Document) -> Document + Send + Sync>;

/// A tagged, document-level batch operation.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Operation {
    Create {
        document: String,
        data: Document,
    },
    Update {
        document: String,
        data: Document,
        expected_version: u64,
    },
    /// Read-modify-write: the compiler reads the current item, applies the
    /// updater, and writes gated on the version observed at read time.
    /// Carries a closure, so it never appears in the wire form.
    #[serde(skip)]
    UpdateWith {
        document: String,
        key: Document,
        updater: UpdateFn,
    },
    Delete {
        document: String,
        key: Document,
        /// Owner-field value of the deleted item, letting the compiler skip
        /// the prerequisite read when the document participates in an index.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner_field_value: Option<String>,
    },
    RawPut {
        item: StoredItem,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<WriteCondition>,
    },
    RawDelete {
        key: ItemKey,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<WriteCondition>,
    },
    RawUpdate {
        key: ItemKey,
        set: Document,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<WriteCondition>,
    },
    RawConditionCheck {
        key: ItemKey,
        condition: WriteCondition,
    },
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create { document, data } => f
                .debug_struct("Create")
                .field("document", document)
                .field("data", data)
                .finish(),
            Self::Update {
                document,
                data,
                expected_version,
            } => f
                .debug_struct("Update")
                .field("document", document)
                .field("data", data)
                .field("expected_version", expected_version)
                .finish(),
            Self::UpdateWith { document, key, .. } => f
                .debug_struct("UpdateWith")
                .field("document", document)
                .field("key", key)
                .finish_non_exhaustive(),
            Self::Delete {
                document,
                key,
                owner_field_value,
            } => f
                .debug_struct("Delete")
                .field("document", document)
                .field("key", key)
                .field("owner_field_value", owner_field_value)
                .finish(),
            Self::RawPut { item, condition } => f
                .debug_struct("RawPut")
                .field("item", item)
                .field("condition", condition)
                .finish(),
            Self::RawDelete { key, condition } => f
                .debug_struct("RawDelete")
                .field("key", key)
                .field("condition", condition)
                .finish(),
            Self::RawUpdate {
                key,
                set,
                condition,
            } => f
                .debug_struct("RawUpdate")
                .field("key", key)
                .field("set", set)
                .field("condition", condition)
                .finish(),
            Self::RawConditionCheck { key, condition } => f
                .debug_struct("RawConditionCheck")
                .field("key", key)
                .field("condition", condition)
                .finish(),
        }
    }
}

/// Serializes a batch for transport or logging.
///
/// Fails with [`Error::Serialization`] if the batch contains an
/// [`Operation::UpdateWith`], whose updater cannot cross a process boundary.
pub fn encode_batch(ops: &[Operation]) -> Result<String> {
    serde_json::to_string(ops).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decodes a serialized batch. An unrecognized `kind` tag is a fatal
/// [`Error::UnknownOperation`]; batch validation like this happens before
/// any store I/O.
pub fn decode_batch(json: &str) -> Result<Vec<Operation>> {
    serde_json::from_str(json).map_err(|e| {
        let message = e.to_string();
        if message.contains("unknown variant") {
            Error::UnknownOperation(message)
        } else {
            Error::Serialization(message)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn to_map(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn sample_batch() -> Vec<Operation> {
        vec![
            Operation::Create {
                document: "ArtworkDoc".to_string(),
                data: to_map(json!({"id": "a1", "title": "T1"})),
            },
            Operation::Update {
                document: "ArtworkDoc".to_string(),
                data: to_map(json!({"id": "a1", "title": "T2"})),
                expected_version: 1,
            },
            Operation::Delete {
                document: "ArtworkDoc".to_string(),
                key: to_map(json!({"id": "a1"})),
                owner_field_value: Some("u1".to_string()),
            },
            Operation::RawConditionCheck {
                key: ItemKey::new("UserDoc/id=u1", "_"),
                condition: WriteCondition::VersionEquals(3),
            },
        ]
    }

    #[test]
    fn test_batch_round_trips_exactly() {
        let batch = sample_batch();
        let wire = encode_batch(&batch).unwrap();
        let decoded = decode_batch(&wire).unwrap();
        assert_eq!(encode_batch(&decoded).unwrap(), wire);
    }

    #[test]
    fn test_kind_tags_are_stable() {
        let wire = encode_batch(&sample_batch()).unwrap();
        let value: Value = serde_json::from_str(&wire).unwrap();
        let kinds: Vec<&str> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|op| op["kind"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, ["create", "update", "delete", "rawConditionCheck"]);
    }

    #[test]
    fn test_unknown_kind_is_fatal() {
        let err = decode_batch(r#"[{"kind": "truncateTable", "document": "ArtworkDoc"}]"#)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownOperation(_)), "got {err:?}");
    }

    #[test]
    fn test_update_with_cannot_be_serialized() {
        let batch = vec![Operation::UpdateWith {
            document: "ArtworkDoc".to_string(),
            key: to_map(json!({"id": "a1"})),
            updater: Arc::new(|fields| fields),
        }];
        assert!(matches!(
            encode_batch(&batch),
            Err(Error::Serialization(_))
        ));
    }
}
