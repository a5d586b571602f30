//! Schema-driven single-table data-access layer.
//!
//! [`Datastore`] is the public surface: per-document CRUD with optimistic
//! concurrency, denormalized one-to-many index maintenance, atomic
//! ownership-based creation, and a transaction compiler that lowers a batch
//! of tagged operations onto the store's conditional-write and
//! atomic-transaction primitives. [`TxBuilder`] is the fluent accumulator
//! feeding that compiler.
//!
//! Concurrency is purely optimistic: conflicting writers get
//! [`Error::OptimisticConflict`](artsync_core::Error::OptimisticConflict)
//! and are never blocked or retried by this layer; retry policy belongs to
//! the caller.

mod datastore;
pub mod store;
mod tx;
mod write;

pub use datastore::{Datastore, QueryPage};
pub use tx::TxBuilder;

pub use artsync_core::{
    Document, DocumentDefinition, Error, FieldDefinition, FieldType, IndexDefinition, ItemKey,
    Operation, OwnershipRelation, PageToken, Result, Schema, SchemaError, Store, StoredItem,
    WriteCondition, WritePrimitive,
};
