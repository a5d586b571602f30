//! Per-document CRUD, index maintenance and ownership-based creation.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use artsync_core::error::{Error, Result, SchemaError};
use artsync_core::item::{strip_system_attributes, Document, ItemKey, StoredItem};
use artsync_core::keys;
use artsync_core::ops::{WriteCondition, WritePrimitive};
use artsync_core::page::PageToken;
use artsync_core::schema::{DocumentDefinition, FieldDefinition, Schema};
use artsync_core::store::Store;

/// One page of an index query: clean item documents plus the resumption
/// token when more remain.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    pub items: Vec<Document>,
    pub next_token: Option<PageToken>,
}

/// The schema-driven data-access layer over an abstract single-table store.
///
/// Both the store handle and the schema are injected; the datastore owns no
/// global state and can be cloned cheaply.
#[derive(Clone)]
pub struct Datastore {
    store: Arc<dyn Store>,
    schema: Arc<Schema>,
}

impl Datastore {
    pub fn new(store: Arc<dyn Store>, schema: Arc<Schema>) -> Self {
        Self { store, schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Reads a document by primary key. Returns the domain fields plus `$v`,
    /// with the physical key attributes stripped.
    pub async fn get(&self, document: &str, key: &Document) -> Result<Option<Document>> {
        let definition = self.schema.document(document)?;
        let item_key = keys::encode_key(definition, key)?;
        debug!(document, key = %item_key.partition_key, "get");
        Ok(self
            .store
            .get(&item_key)
            .await?
            .map(StoredItem::into_document))
    }

    /// Creates a document with `$v = 1`, conditioned on the key not already
    /// existing. Fails with [`Error::AlreadyExists`] when it does. No index
    /// side effect; the atomic creation path for owned documents is
    /// [`Datastore::create_owned`].
    pub async fn create(&self, document: &str, data: Document) -> Result<()> {
        let definition = self.schema.document(document)?;
        let fields = strip_system_attributes(data);
        let key = keys::encode_key(definition, &fields)?;
        debug!(document, key = %key.partition_key, "create");
        let item = StoredItem::canonical(key.clone(), 1, fields);
        self.store
            .put(item, Some(WriteCondition::NotExists))
            .await
            .map_err(|e| remap_condition(e, already_exists(document, &key)))
    }

    /// Replaces a document, conditioned on the stored `$v` matching
    /// `expected_version`; on success the stored version becomes
    /// `expected_version + 1`. A stale version fails with
    /// [`Error::OptimisticConflict`] (which also covers "not found";
    /// callers distinguish by re-reading).
    ///
    /// If the document participates in an index, the index item is
    /// refreshed as a second, sequential write. The two writes are not
    /// atomic: a crash in between leaves the index entry stale until the
    /// next write touching this item.
    pub async fn update(
        &self,
        document: &str,
        data: Document,
        expected_version: u64,
    ) -> Result<()> {
        let definition = self.schema.document(document)?;
        let fields = strip_system_attributes(data);
        let key = keys::encode_key(definition, &fields)?;
        debug!(document, key = %key.partition_key, expected_version, "update");
        let item = StoredItem::canonical(key.clone(), expected_version + 1, fields.clone());
        self.store
            .put(item, Some(WriteCondition::VersionEquals(expected_version)))
            .await
            .map_err(|e| remap_condition(e, optimistic_conflict(document, &key)))?;
        for index_item in self.index_items(definition, &fields)? {
            self.store.put(index_item, None).await?;
        }
        Ok(())
    }

    /// Read-modify-write: reads the current document (failing with
    /// [`Error::NotFound`] on a miss), applies `updater`, and writes through
    /// [`Datastore::update`] gated on the version observed at read time, so
    /// the version is re-validated at commit, not just trusted from the
    /// earlier read.
    pub async fn update_with<F>(&self, document: &str, key: &Document, updater: F) -> Result<()>
    where
        F: FnOnce(Document) -> Document,
    {
        let definition = self.schema.document(document)?;
        let item_key = keys::encode_key(definition, key)?;
        let current = self
            .store
            .get(&item_key)
            .await?
            .ok_or_else(|| not_found(document, &item_key))?;
        let observed = canonical_version(&current, &item_key)?;
        let next = updater(current.fields);
        self.update(document, next, observed).await
    }

    /// Deletes a document by primary key. Deleting a missing document is a
    /// no-op success.
    ///
    /// The canonical item is read first to discover the owner-field value,
    /// which locates the index entry to cascade onto. Canonical delete and
    /// index delete are sequential, not atomic: a crash in between leaves an
    /// orphaned index entry.
    pub async fn delete(&self, document: &str, key: &Document) -> Result<()> {
        let definition = self.schema.document(document)?;
        let item_key = keys::encode_key(definition, key)?;
        debug!(document, key = %item_key.partition_key, "delete");
        let Some(existing) = self.store.get(&item_key).await? else {
            return Ok(());
        };
        self.store.delete(&item_key, None).await?;
        if let Some(owner_value) = self.owner_field_value(document, &existing.fields) {
            let owner_value = owner_value.clone();
            for target in self.index_targets(definition, &owner_value, &existing.fields)? {
                self.store.delete(&target, None).await?;
            }
        }
        Ok(())
    }

    /// Atomically creates an owned document together with its index entry:
    /// either both land or neither does. The owner reference is stamped
    /// onto the owned document's owner field, overwriting any
    /// caller-supplied value. Fails with [`Error::AlreadyExists`] when the
    /// key is taken.
    pub async fn create_owned(
        &self,
        document: &str,
        data: Document,
        owner_key: &Document,
    ) -> Result<()> {
        let definition = self.schema.document(document)?;
        let relation = self
            .schema
            .ownership_for(document)
            .ok_or_else(|| SchemaError::NotOwned(document.to_string()))?;
        let owner_definition = self.schema.document(&relation.owner_document)?;
        let owner_pk_field = first_primary_key(owner_definition)?;
        let owner_value = owner_key
            .get(&owner_pk_field.name)
            .ok_or_else(|| {
                Error::KeyEncoding(format!(
                    "missing primary key field {} on {}",
                    owner_pk_field.name, owner_definition.name
                ))
            })?
            .clone();

        let mut fields = strip_system_attributes(data);
        fields.insert(relation.owner_field.clone(), owner_value);

        let key = keys::encode_key(definition, &fields)?;
        let owner_partition = keys::encode_key(owner_definition, owner_key)?;
        let sort_key = keys::index_sort_key(document, &first_pk_value(definition, &fields)?);
        debug!(document, key = %key.partition_key, owner = %owner_partition.partition_key, "create_owned");

        let canonical = StoredItem::canonical(key.clone(), 1, fields.clone());
        let index_item = StoredItem::index(
            ItemKey::new(owner_partition.partition_key, sort_key),
            fields,
        );
        self.store
            .transact_write(vec![
                WritePrimitive::Put {
                    item: canonical,
                    condition: Some(WriteCondition::NotExists),
                },
                WritePrimitive::Put {
                    item: index_item,
                    condition: None,
                },
            ])
            .await
            .map_err(|e| remap_condition(e, already_exists(document, &key)))
    }

    /// Queries a one-to-many index: the owner's children in primary-key
    /// sort order, paginated through an opaque resumable token. Each page
    /// is one store round trip; no consistency is guaranteed across page
    /// boundaries.
    pub async fn query(
        &self,
        index: &str,
        owner_key: &Document,
        token: Option<&PageToken>,
        limit: Option<u32>,
    ) -> Result<QueryPage> {
        let index_definition = self.schema.index(index)?;
        let owner_definition = self.schema.document(&index_definition.owner_document)?;
        let owner_partition = keys::encode_key(owner_definition, owner_key)?;
        let prefix = keys::index_sort_key_prefix(&index_definition.item_document);
        let start_after = token.map(PageToken::decode).transpose()?;
        debug!(index, owner = %owner_partition.partition_key, "query");
        let page = self
            .store
            .query(
                &owner_partition.partition_key,
                &prefix,
                start_after.as_ref(),
                limit,
            )
            .await?;
        Ok(QueryPage {
            items: page
                .items
                .into_iter()
                .map(StoredItem::into_document)
                .collect(),
            next_token: page
                .last_key
                .as_ref()
                .map(PageToken::encode)
                .transpose()?,
        })
    }

    /// The owner-field value on `fields`, when `document` participates in an
    /// ownership relation.
    pub(crate) fn owner_field_value<'a>(
        &self,
        document: &str,
        fields: &'a Document,
    ) -> Option<&'a Value> {
        let relation = self.schema.ownership_for(document)?;
        fields.get(&relation.owner_field)
    }

    /// Physical keys of the index entries mirroring an item with the given
    /// owner reference.
    pub(crate) fn index_targets(
        &self,
        definition: &DocumentDefinition,
        owner_value: &Value,
        fields: &Document,
    ) -> Result<Vec<ItemKey>> {
        let mut targets = Vec::new();
        if self.schema.indexes_for_item(&definition.name).next().is_none() {
            return Ok(targets);
        }
        let sort_key =
            keys::index_sort_key(&definition.name, &first_pk_value(definition, fields)?);
        for index in self.schema.indexes_for_item(&definition.name) {
            let owner_definition = self.schema.document(&index.owner_document)?;
            let owner_pk_field = first_primary_key(owner_definition)?;
            let mut owner_key_fields = Document::new();
            owner_key_fields.insert(owner_pk_field.name.clone(), owner_value.clone());
            let owner_key = keys::encode_key(owner_definition, &owner_key_fields)?;
            targets.push(ItemKey::new(owner_key.partition_key, sort_key.clone()));
        }
        Ok(targets)
    }

    /// Denormalized index items mirroring `fields`. Empty when the document
    /// is not indexed or the owner field is absent (the latter is logged,
    /// not an error: the index simply stays untouched).
    pub(crate) fn index_items(
        &self,
        definition: &DocumentDefinition,
        fields: &Document,
    ) -> Result<Vec<StoredItem>> {
        let Some(owner_value) = self.owner_field_value(&definition.name, fields) else {
            if self.schema.indexes_for_item(&definition.name).next().is_some() {
                warn!(
                    document = %definition.name,
                    "owner field missing, index entry not mirrored"
                );
            }
            return Ok(Vec::new());
        };
        let owner_value = owner_value.clone();
        Ok(self
            .index_targets(definition, &owner_value, fields)?
            .into_iter()
            .map(|key| StoredItem::index(key, fields.clone()))
            .collect())
    }
}

pub(crate) fn first_primary_key(definition: &DocumentDefinition) -> Result<&FieldDefinition> {
    definition.first_primary_key_field().ok_or_else(|| {
        Error::KeyEncoding(format!(
            "document {} has no primary key fields",
            definition.name
        ))
    })
}

pub(crate) fn first_pk_value(definition: &DocumentDefinition, fields: &Document) -> Result<String> {
    let field = first_primary_key(definition)?;
    let value = fields.get(&field.name).ok_or_else(|| {
        Error::KeyEncoding(format!(
            "missing primary key field {} on {}",
            field.name, definition.name
        ))
    })?;
    keys::key_field_value(&field.name, value)
}

pub(crate) fn canonical_version(item: &StoredItem, key: &ItemKey) -> Result<u64> {
    item.version.ok_or_else(|| {
        Error::Serialization(format!(
            "canonical item {} is missing its version attribute",
            key.partition_key
        ))
    })
}

pub(crate) fn not_found(document: &str, key: &ItemKey) -> Error {
    Error::NotFound {
        document: document.to_string(),
        key: key.partition_key.clone(),
    }
}

pub(crate) fn already_exists(document: &str, key: &ItemKey) -> Error {
    Error::AlreadyExists {
        document: document.to_string(),
        key: key.partition_key.clone(),
    }
}

pub(crate) fn optimistic_conflict(document: &str, key: &ItemKey) -> Error {
    Error::OptimisticConflict {
        document: document.to_string(),
        key: key.partition_key.clone(),
    }
}

/// Rewrites a store-level condition failure into the operation's domain
/// error; everything else passes through unmodified.
pub(crate) fn remap_condition(error: Error, replacement: Error) -> Error {
    match error {
        Error::ConditionFailed { .. } => replacement,
        other => other,
    }
}
