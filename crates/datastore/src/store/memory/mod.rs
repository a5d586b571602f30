//! In-memory store backend.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use artsync_core::error::{Error, Result};
use artsync_core::item::{Document, ItemKey, StoredItem};
use artsync_core::ops::{WriteCondition, WritePrimitive};
use artsync_core::page::ContinuationKey;
use artsync_core::store::{Store, StorePage};

#[derive(Debug, Default)]
struct Inner {
    items: BTreeMap<(String, String), StoredItem>,
    /// Remaining writes before the injected failure fires, when armed.
    fail_after_writes: Option<u32>,
}

/// In-memory store backend for testing.
///
/// Items live in a `BTreeMap` keyed by (partition key, sort key), so range
/// queries come back in sort-key order for free. Data is not persisted and
/// is lost when the store is dropped.
///
/// [`MemoryStore::fail_after_writes`] injects a failure after a fixed number
/// of writes, which is how tests observe the documented non-atomic window
/// between a canonical write and its sequential index mirror write.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms fault injection: the next `writes` write calls succeed, every
    /// write after that fails with `StoreUnavailable`. A transaction counts
    /// as a single write and fails as a whole, applying nothing.
    pub async fn fail_after_writes(&self, writes: u32) {
        self.inner.write().await.fail_after_writes = Some(writes);
    }

    /// Disarms fault injection.
    pub async fn heal(&self) {
        self.inner.write().await.fail_after_writes = None;
    }

    /// Number of stored items, canonical and index entries alike.
    pub async fn item_count(&self) -> usize {
        self.inner.read().await.items.len()
    }
}

fn consume_write_budget(inner: &mut Inner) -> Result<()> {
    if let Some(remaining) = inner.fail_after_writes.as_mut() {
        if *remaining == 0 {
            return Err(Error::StoreUnavailable("injected write failure".to_string()));
        }
        *remaining -= 1;
    }
    Ok(())
}

fn condition_holds(existing: Option<&StoredItem>, condition: &WriteCondition) -> bool {
    match condition {
        WriteCondition::NotExists => existing.is_none(),
        WriteCondition::VersionEquals(version) => {
            existing.is_some_and(|item| item.version == Some(*version))
        }
    }
}

fn tuple_key(key: &ItemKey) -> (String, String) {
    (key.partition_key.clone(), key.sort_key.clone())
}

fn apply_put(inner: &mut Inner, item: StoredItem) {
    inner.items.insert(tuple_key(&item.key()), item);
}

fn apply_delete(inner: &mut Inner, key: &ItemKey) {
    inner.items.remove(&tuple_key(key));
}

/// Upsert semantics, matching DynamoDB's UpdateItem: a missing item is
/// created from the key plus the set attributes.
fn apply_update(inner: &mut Inner, key: &ItemKey, set: Document) {
    let item = inner
        .items
        .entry(tuple_key(key))
        .or_insert_with(|| StoredItem {
            partition_key: key.partition_key.clone(),
            sort_key: key.sort_key.clone(),
            version: None,
            fields: Document::new(),
        });
    for (name, value) in set {
        item.fields.insert(name, value);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &ItemKey) -> Result<Option<StoredItem>> {
        let inner = self.inner.read().await;
        Ok(inner.items.get(&tuple_key(key)).cloned())
    }

    async fn put(&self, item: StoredItem, condition: Option<WriteCondition>) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(condition) = &condition {
            let existing = inner.items.get(&tuple_key(&item.key()));
            if !condition_holds(existing, condition) {
                return Err(Error::ConditionFailed { index: None });
            }
        }
        consume_write_budget(&mut inner)?;
        apply_put(&mut inner, item);
        Ok(())
    }

    async fn delete(&self, key: &ItemKey, condition: Option<WriteCondition>) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(condition) = &condition {
            let existing = inner.items.get(&tuple_key(key));
            if !condition_holds(existing, condition) {
                return Err(Error::ConditionFailed { index: None });
            }
        }
        consume_write_budget(&mut inner)?;
        apply_delete(&mut inner, key);
        Ok(())
    }

    async fn update(
        &self,
        key: &ItemKey,
        set: Document,
        condition: Option<WriteCondition>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(condition) = &condition {
            let existing = inner.items.get(&tuple_key(key));
            if !condition_holds(existing, condition) {
                return Err(Error::ConditionFailed { index: None });
            }
        }
        consume_write_budget(&mut inner)?;
        apply_update(&mut inner, key, set);
        Ok(())
    }

    async fn query(
        &self,
        partition_key: &str,
        sort_key_prefix: &str,
        start_after: Option<&ContinuationKey>,
        limit: Option<u32>,
    ) -> Result<StorePage> {
        let inner = self.inner.read().await;
        let begin = match start_after {
            Some(key) => Bound::Excluded((partition_key.to_string(), key.sort_key.clone())),
            None => Bound::Included((partition_key.to_string(), sort_key_prefix.to_string())),
        };
        let matching = inner
            .items
            .range((begin, Bound::Unbounded))
            .take_while(|((p, _), _)| p == partition_key)
            .filter(|((_, s), _)| s.starts_with(sort_key_prefix))
            .map(|(_, item)| item.clone());

        match limit {
            Some(limit) => {
                // A page holds at least one item; fetching one extra tells
                // us whether a continuation key is needed.
                let limit = (limit as usize).max(1);
                let mut items: Vec<StoredItem> = matching.take(limit + 1).collect();
                let mut last_key = None;
                if items.len() > limit {
                    items.truncate(limit);
                    if let Some(last) = items.last() {
                        last_key = Some(ContinuationKey {
                            partition_key: last.partition_key.clone(),
                            sort_key: last.sort_key.clone(),
                        });
                    }
                }
                Ok(StorePage { items, last_key })
            }
            None => Ok(StorePage {
                items: matching.collect(),
                last_key: None,
            }),
        }
    }

    async fn transact_write(&self, primitives: Vec<WritePrimitive>) -> Result<()> {
        let mut inner = self.inner.write().await;
        consume_write_budget(&mut inner)?;
        // Validate every condition before touching anything, so the batch
        // applies all-or-nothing.
        for (index, primitive) in primitives.iter().enumerate() {
            let (key, condition) = match primitive {
                WritePrimitive::Put { item, condition } => (item.key(), condition.as_ref()),
                WritePrimitive::Delete { key, condition } => (key.clone(), condition.as_ref()),
                WritePrimitive::Update { key, condition, .. } => (key.clone(), condition.as_ref()),
                WritePrimitive::ConditionCheck { key, condition } => (key.clone(), Some(condition)),
            };
            if let Some(condition) = condition {
                let existing = inner.items.get(&tuple_key(&key));
                if !condition_holds(existing, condition) {
                    return Err(Error::ConditionFailed { index: Some(index) });
                }
            }
        }
        for primitive in primitives {
            match primitive {
                WritePrimitive::Put { item, .. } => apply_put(&mut inner, item),
                WritePrimitive::Delete { key, .. } => apply_delete(&mut inner, &key),
                WritePrimitive::Update { key, set, .. } => apply_update(&mut inner, &key, set),
                WritePrimitive::ConditionCheck { .. } => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn canonical(pk: &str, version: u64) -> StoredItem {
        StoredItem::canonical(ItemKey::new(pk, "_"), version, fields(json!({"id": "x"})))
    }

    #[tokio::test]
    async fn test_conditional_put_not_exists() {
        let store = MemoryStore::new();
        store
            .put(canonical("ArtworkDoc/id=a1", 1), Some(WriteCondition::NotExists))
            .await
            .unwrap();
        let err = store
            .put(canonical("ArtworkDoc/id=a1", 1), Some(WriteCondition::NotExists))
            .await
            .unwrap_err();
        assert_eq!(err, Error::ConditionFailed { index: None });
    }

    #[tokio::test]
    async fn test_conditional_put_version_equals() {
        let store = MemoryStore::new();
        store.put(canonical("ArtworkDoc/id=a1", 1), None).await.unwrap();
        let err = store
            .put(
                canonical("ArtworkDoc/id=a1", 3),
                Some(WriteCondition::VersionEquals(2)),
            )
            .await
            .unwrap_err();
        assert_eq!(err, Error::ConditionFailed { index: None });
        store
            .put(
                canonical("ArtworkDoc/id=a1", 2),
                Some(WriteCondition::VersionEquals(1)),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_query_is_prefix_scoped_and_ordered() {
        let store = MemoryStore::new();
        for sk in ["ArtworkDoc#a3", "ArtworkDoc#a1", "PrintDoc#p1", "_"] {
            store
                .put(
                    StoredItem::index(ItemKey::new("UserDoc/id=u1", sk), Document::new()),
                    None,
                )
                .await
                .unwrap();
        }
        let page = store
            .query("UserDoc/id=u1", "ArtworkDoc#", None, None)
            .await
            .unwrap();
        let sort_keys: Vec<&str> = page.items.iter().map(|i| i.sort_key.as_str()).collect();
        assert_eq!(sort_keys, ["ArtworkDoc#a1", "ArtworkDoc#a3"]);
        assert!(page.last_key.is_none());
    }

    #[tokio::test]
    async fn test_query_pagination_resumes_exactly() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .put(
                    StoredItem::index(
                        ItemKey::new("UserDoc/id=u1", format!("ArtworkDoc#a{i}")),
                        Document::new(),
                    ),
                    None,
                )
                .await
                .unwrap();
        }
        let first = store
            .query("UserDoc/id=u1", "ArtworkDoc#", None, Some(2))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        let last_key = first.last_key.unwrap();
        assert_eq!(last_key.sort_key, "ArtworkDoc#a1");

        let second = store
            .query("UserDoc/id=u1", "ArtworkDoc#", Some(&last_key), Some(10))
            .await
            .unwrap();
        let sort_keys: Vec<&str> = second.items.iter().map(|i| i.sort_key.as_str()).collect();
        assert_eq!(sort_keys, ["ArtworkDoc#a2", "ArtworkDoc#a3", "ArtworkDoc#a4"]);
        assert!(second.last_key.is_none());
    }

    #[tokio::test]
    async fn test_transaction_applies_all_or_nothing() {
        let store = MemoryStore::new();
        store.put(canonical("ArtworkDoc/id=a1", 1), None).await.unwrap();
        let err = store
            .transact_write(vec![
                WritePrimitive::Put {
                    item: canonical("ArtworkDoc/id=a2", 1),
                    condition: Some(WriteCondition::NotExists),
                },
                WritePrimitive::Put {
                    item: canonical("ArtworkDoc/id=a1", 1),
                    condition: Some(WriteCondition::NotExists),
                },
            ])
            .await
            .unwrap_err();
        assert_eq!(err, Error::ConditionFailed { index: Some(1) });
        assert!(store.get(&ItemKey::new("ArtworkDoc/id=a2", "_")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fault_injection_counts_writes() {
        let store = MemoryStore::new();
        store.fail_after_writes(1).await;
        store.put(canonical("ArtworkDoc/id=a1", 1), None).await.unwrap();
        let err = store
            .put(canonical("ArtworkDoc/id=a2", 1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        store.heal().await;
        store.put(canonical("ArtworkDoc/id=a2", 1), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_is_an_upsert() {
        let store = MemoryStore::new();
        let key = ItemKey::new("ArtworkDoc/id=a1", "_");
        store
            .update(&key, fields(json!({"title": "T1"})), None)
            .await
            .unwrap();
        let item = store.get(&key).await.unwrap().unwrap();
        assert_eq!(item.fields["title"], json!("T1"));
        assert_eq!(item.version, None);
    }
}
