//! Abstract key-value store contract.
//!
//! Backends (in-memory for tests, DynamoDB in production) implement
//! [`Store`]; the data layer is written entirely against it. The contract
//! mirrors what a single-table store natively offers: keyed get/put/delete
//! with an optional write condition, a sort-key-prefix range query with
//! continuation, and a bounded atomic multi-item transaction.
//!
//! A refused write condition surfaces as
//! [`Error::ConditionFailed`](crate::error::Error::ConditionFailed); for a
//! transaction the failing primitive's position is reported when the backend
//! knows it. Every call is one blocking round trip; the layer adds no
//! queuing, backpressure, retry or timeout of its own.

use async_trait::async_trait;

use crate::error::Result;
use crate::item::{Document, ItemKey, StoredItem};
use crate::ops::{WriteCondition, WritePrimitive};
use crate::page::ContinuationKey;

/// One page of a prefix-range query, in sort-key order.
#[derive(Debug, Clone, PartialEq)]
pub struct StorePage {
    pub items: Vec<StoredItem>,
    /// Present when more items remain past this page.
    pub last_key: Option<ContinuationKey>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &ItemKey) -> Result<Option<StoredItem>>;

    async fn put(&self, item: StoredItem, condition: Option<WriteCondition>) -> Result<()>;

    async fn delete(&self, key: &ItemKey, condition: Option<WriteCondition>) -> Result<()>;

    /// Sets the named attributes on an existing item.
    async fn update(
        &self,
        key: &ItemKey,
        set: Document,
        condition: Option<WriteCondition>,
    ) -> Result<()>;

    /// Range-reads the partition for sort keys starting with `prefix`,
    /// resuming after `start_after` when given. Items come back in
    /// ascending sort-key order.
    async fn query(
        &self,
        partition_key: &str,
        sort_key_prefix: &str,
        start_after: Option<&ContinuationKey>,
        limit: Option<u32>,
    ) -> Result<StorePage>;

    /// Applies all primitives atomically: either every one lands or none
    /// does.
    async fn transact_write(&self, primitives: Vec<WritePrimitive>) -> Result<()>;
}
