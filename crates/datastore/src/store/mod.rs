//! Store backend implementations.
//!
//! Concrete implementations of the [`Store`](artsync_core::Store) trait,
//! selected at compile time via feature flags:
//!
//! - `inmemory` (default): in-memory backend for tests and local
//!   development
//! - `dynamodb`: AWS DynamoDB backend using `aws-sdk-dynamodb`
//!
//! The backend is injected into [`Datastore`](crate::Datastore) by the
//! caller, so both can coexist in one build.

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

#[cfg(feature = "inmemory")]
pub mod memory;

#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoStore;

#[cfg(feature = "inmemory")]
pub use memory::MemoryStore;
