//! Transaction compiler.
//!
//! [`Datastore::write`] lowers a bounded batch of tagged [`Operation`]s onto
//! the store's concrete write primitives: batch-level validation first (so a
//! malformed batch never reaches the network), then per-operation schema
//! expansion, then a single atomic `transact_write` when two or more
//! primitives come out — or a standalone conditional write when exactly one
//! does, since single-item transactions are refused by most stores. A lone
//! condition check has no standalone equivalent and is rejected outright
//! rather than downgraded to a read.

use serde_json::Value;
use tracing::debug;

use artsync_core::error::{Error, Result};
use artsync_core::item::{strip_system_attributes, Document, StoredItem};
use artsync_core::keys;
use artsync_core::ops::{Operation, WriteCondition, WritePrimitive, MAX_WRITE_BATCH};

use crate::datastore::{canonical_version, not_found, Datastore};

/// Which tagged operation a compiled primitive came from, used to map a
/// positional condition failure back onto a domain error.
#[derive(Debug, Clone)]
enum Origin {
    Create { document: String, key: String },
    Update { document: String, key: String },
    /// Deletes, index mirror writes and raw pass-throughs: a condition
    /// failure here keeps its store-level shape.
    Passthrough,
}

impl Origin {
    fn condition_error(&self) -> Option<Error> {
        match self {
            Self::Create { document, key } => Some(Error::AlreadyExists {
                document: document.clone(),
                key: key.clone(),
            }),
            Self::Update { document, key } => Some(Error::OptimisticConflict {
                document: document.clone(),
                key: key.clone(),
            }),
            Self::Passthrough => None,
        }
    }
}

impl Datastore {
    /// Compiles and executes a batch of tagged operations, all-or-nothing.
    ///
    /// An empty batch is a no-op success; more than
    /// [`MAX_WRITE_BATCH`] operations fail with [`Error::BatchTooLarge`]
    /// before any I/O. `UpdateWith` operations perform their prerequisite
    /// read during compilation and fail the whole batch with
    /// [`Error::NotFound`] on a miss.
    pub async fn write(&self, ops: Vec<Operation>) -> Result<()> {
        if ops.len() > MAX_WRITE_BATCH {
            return Err(Error::BatchTooLarge {
                len: ops.len(),
                max: MAX_WRITE_BATCH,
            });
        }
        let mut plan: Vec<(WritePrimitive, Origin)> = Vec::new();
        for op in ops {
            self.expand(op, &mut plan).await?;
        }
        debug!(primitives = plan.len(), "write batch compiled");
        match plan.len() {
            0 => Ok(()),
            1 => {
                let (primitive, origin) = plan.remove(0);
                self.execute_single(primitive, origin).await
            }
            _ => {
                let (primitives, origins): (Vec<_>, Vec<_>) = plan.into_iter().unzip();
                self.store()
                    .transact_write(primitives)
                    .await
                    .map_err(|e| remap_transaction_failure(e, &origins))
            }
        }
    }

    async fn expand(&self, op: Operation, plan: &mut Vec<(WritePrimitive, Origin)>) -> Result<()> {
        match op {
            Operation::Create { document, data } => {
                let definition = self.schema().document(&document)?;
                let fields = strip_system_attributes(data);
                let key = keys::encode_key(definition, &fields)?;
                plan.push((
                    WritePrimitive::Put {
                        item: StoredItem::canonical(key.clone(), 1, fields.clone()),
                        condition: Some(WriteCondition::NotExists),
                    },
                    Origin::Create {
                        document: document.clone(),
                        key: key.partition_key,
                    },
                ));
                for item in self.index_items(definition, &fields)? {
                    plan.push((
                        WritePrimitive::Put {
                            item,
                            condition: None,
                        },
                        Origin::Passthrough,
                    ));
                }
            }
            Operation::Update {
                document,
                data,
                expected_version,
            } => self.expand_update(&document, data, expected_version, plan)?,
            Operation::UpdateWith {
                document,
                key,
                updater,
            } => {
                let definition = self.schema().document(&document)?;
                let item_key = keys::encode_key(definition, &key)?;
                let current = self
                    .store()
                    .get(&item_key)
                    .await?
                    .ok_or_else(|| not_found(&document, &item_key))?;
                let observed = canonical_version(&current, &item_key)?;
                let next = updater(current.fields);
                self.expand_update(&document, next, observed, plan)?;
            }
            Operation::Delete {
                document,
                key,
                owner_field_value,
            } => {
                let definition = self.schema().document(&document)?;
                let item_key = keys::encode_key(definition, &key)?;
                let indexed = self.schema().indexes_for_item(&document).next().is_some();
                let owner_value: Option<Value> = if !indexed {
                    None
                } else if let Some(value) = owner_field_value {
                    Some(Value::String(value))
                } else {
                    // The caller did not supply the owner reference, so read
                    // the canonical item to discover it. A miss leaves only
                    // the idempotent canonical delete.
                    self.store()
                        .get(&item_key)
                        .await?
                        .and_then(|item| self.owner_field_value(&document, &item.fields).cloned())
                };
                plan.push((
                    WritePrimitive::Delete {
                        key: item_key,
                        condition: None,
                    },
                    Origin::Passthrough,
                ));
                if let Some(owner_value) = owner_value {
                    for target in self.index_targets(definition, &owner_value, &key)? {
                        plan.push((
                            WritePrimitive::Delete {
                                key: target,
                                condition: None,
                            },
                            Origin::Passthrough,
                        ));
                    }
                }
            }
            Operation::RawPut { item, condition } => {
                plan.push((WritePrimitive::Put { item, condition }, Origin::Passthrough));
            }
            Operation::RawDelete { key, condition } => {
                plan.push((
                    WritePrimitive::Delete { key, condition },
                    Origin::Passthrough,
                ));
            }
            Operation::RawUpdate {
                key,
                set,
                condition,
            } => {
                plan.push((
                    WritePrimitive::Update {
                        key,
                        set,
                        condition,
                    },
                    Origin::Passthrough,
                ));
            }
            Operation::RawConditionCheck { key, condition } => {
                plan.push((
                    WritePrimitive::ConditionCheck { key, condition },
                    Origin::Passthrough,
                ));
            }
        }
        Ok(())
    }

    fn expand_update(
        &self,
        document: &str,
        data: Document,
        expected_version: u64,
        plan: &mut Vec<(WritePrimitive, Origin)>,
    ) -> Result<()> {
        let definition = self.schema().document(document)?;
        let fields = strip_system_attributes(data);
        let key = keys::encode_key(definition, &fields)?;
        plan.push((
            WritePrimitive::Put {
                item: StoredItem::canonical(key.clone(), expected_version + 1, fields.clone()),
                condition: Some(WriteCondition::VersionEquals(expected_version)),
            },
            Origin::Update {
                document: document.to_string(),
                key: key.partition_key,
            },
        ));
        for item in self.index_items(definition, &fields)? {
            plan.push((
                WritePrimitive::Put {
                    item,
                    condition: None,
                },
                Origin::Passthrough,
            ));
        }
        Ok(())
    }

    async fn execute_single(&self, primitive: WritePrimitive, origin: Origin) -> Result<()> {
        let result = match primitive {
            WritePrimitive::Put { item, condition } => self.store().put(item, condition).await,
            WritePrimitive::Delete { key, condition } => {
                self.store().delete(&key, condition).await
            }
            WritePrimitive::Update {
                key,
                set,
                condition,
            } => self.store().update(&key, set, condition).await,
            WritePrimitive::ConditionCheck { .. } => return Err(Error::LoneConditionCheck),
        };
        result.map_err(|e| match e {
            Error::ConditionFailed { .. } => origin.condition_error().unwrap_or(e),
            other => other,
        })
    }
}

fn remap_transaction_failure(error: Error, origins: &[Origin]) -> Error {
    let Error::ConditionFailed { index } = &error else {
        return error;
    };
    let index = *index;
    index
        .and_then(|i| origins.get(i))
        .and_then(Origin::condition_error)
        .unwrap_or(error)
}
