//! Core types for the artsync single-table data layer.
//!
//! This crate holds everything that is independent of a concrete storage
//! backend: the declarative schema model, the physical key encoding, the
//! stored-item wire shape, the abstract operation protocol handed to the
//! transaction compiler, pagination tokens, and the [`Store`] trait that
//! backends implement.

pub mod error;
pub mod item;
pub mod keys;
pub mod ops;
pub mod page;
pub mod schema;
pub mod store;

pub use error::{Error, Result, SchemaError};
pub use item::{Document, ItemKey, StoredItem};
pub use ops::{Operation, WriteCondition, WritePrimitive};
pub use page::{ContinuationKey, PageToken};
pub use schema::{
    DocumentDefinition, FieldDefinition, FieldType, IndexDefinition, OwnershipRelation, Schema,
    SchemaBuilder,
};
pub use store::{Store, StorePage};
