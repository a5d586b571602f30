//! Fluent transaction builder.

use artsync_core::item::Document;
use artsync_core::ops::{Operation, UpdateFn};
use artsync_core::Result;

use crate::datastore::Datastore;

/// Chainable accumulator of tagged operations.
///
/// Each call consumes the builder and returns the extended one, so there is
/// never shared mutable list state; nothing executes until [`commit`]
/// finalizes the list and hands it to the transaction compiler.
///
/// [`commit`]: TxBuilder::commit
///
/// ```no_run
/// # async fn example(datastore: artsync_datastore::Datastore) -> artsync_datastore::Result<()> {
/// # let (artwork, fixed) = (artsync_datastore::Document::new(), artsync_datastore::Document::new());
/// datastore
///     .tx()
///     .create("ArtworkDoc", artwork)
///     .update("ListingDoc", fixed, 3)
///     .commit()
///     .await
/// # }
/// ```
#[must_use = "operations are only queued; call commit() to execute them"]
pub struct TxBuilder<'a> {
    datastore: &'a Datastore,
    ops: Vec<Operation>,
}

impl Datastore {
    /// Starts an empty transaction builder.
    pub fn tx(&self) -> TxBuilder<'_> {
        TxBuilder {
            datastore: self,
            ops: Vec::new(),
        }
    }
}

impl TxBuilder<'_> {
    pub fn create(mut self, document: impl Into<String>, data: Document) -> Self {
        self.ops.push(Operation::Create {
            document: document.into(),
            data,
        });
        self
    }

    pub fn update(
        mut self,
        document: impl Into<String>,
        data: Document,
        expected_version: u64,
    ) -> Self {
        self.ops.push(Operation::Update {
            document: document.into(),
            data,
            expected_version,
        });
        self
    }

    pub fn update_with(
        mut self,
        document: impl Into<String>,
        key: Document,
        updater: UpdateFn,
    ) -> Self {
        self.ops.push(Operation::UpdateWith {
            document: document.into(),
            key,
            updater,
        });
        self
    }

    pub fn delete(mut self, document: impl Into<String>, key: Document) -> Self {
        self.ops.push(Operation::Delete {
            document: document.into(),
            key,
            owner_field_value: None,
        });
        self
    }

    /// Deletes an indexed document, supplying the owner reference up front
    /// so the compiler can skip the prerequisite read.
    pub fn delete_owned(
        mut self,
        document: impl Into<String>,
        key: Document,
        owner_field_value: impl Into<String>,
    ) -> Self {
        self.ops.push(Operation::Delete {
            document: document.into(),
            key,
            owner_field_value: Some(owner_field_value.into()),
        });
        self
    }

    /// Appends a pre-built operation, typically one of the raw
    /// pass-through variants.
    pub fn push(mut self, op: Operation) -> Self {
        self.ops.push(op);
        self
    }

    /// The queued operations, in order.
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Finalizes the list without executing it.
    pub fn into_operations(self) -> Vec<Operation> {
        self.ops
    }

    /// Finalizes the list and submits it to the transaction compiler.
    pub async fn commit(self) -> Result<()> {
        self.datastore.write(self.ops).await
    }
}
