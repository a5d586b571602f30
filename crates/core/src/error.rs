use thiserror::Error;

/// Errors raised while assembling a [`Schema`](crate::schema::Schema).
///
/// The builder validates eagerly so that every heuristic the layer relies on
/// (primary-key inference, first-component index sort keys) is an explicit
/// opt-in rather than a silent fallback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Document {0} declares no primary key field (enable infer_primary_keys to fall back)")]
    NoPrimaryKey(String),
    #[error("Document {0} declares no fields")]
    NoFields(String),
    #[error("Duplicate document definition: {0}")]
    DuplicateDocument(String),
    #[error("Duplicate field {field} on document {document}")]
    DuplicateField { document: String, field: String },
    #[error("Duplicate index definition: {0}")]
    DuplicateIndex(String),
    #[error("Invalid document name {0}: must not contain '/', '=' or '#'")]
    InvalidDocumentName(String),
    #[error("Primary key field {field} on document {document} must be a string or number")]
    NonScalarPrimaryKey { document: String, field: String },
    #[error("Unknown document referenced: {0}")]
    UnknownDocument(String),
    #[error("Unknown index: {0}")]
    UnknownIndex(String),
    #[error("Unknown field {field} on document {document}")]
    UnknownField { document: String, field: String },
    #[error(
        "Index {index} uses item document {document} with a composite primary key \
        (enable allow_composite_index_keys to use its first component)"
    )]
    CompositeIndexKey { index: String, document: String },
    #[error("Owner document {document} must have a single-field primary key")]
    CompositeOwnerKey { document: String },
    #[error("Index {0} has no matching ownership relation")]
    IndexWithoutOwnership(String),
    #[error("Document {0} has multiple ownership relations")]
    MultipleOwners(String),
    #[error("Document {0} has no ownership relation")]
    NotOwned(String),
}

/// Errors that can occur during data-layer operations.
///
/// All variants are surfaced to the caller unmodified; the layer performs no
/// local recovery or retry. Retrying an [`Error::OptimisticConflict`] is the
/// caller's responsibility.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{document} not found: {key}")]
    NotFound { document: String, key: String },
    #[error("{document} already exists: {key}")]
    AlreadyExists { document: String, key: String },
    #[error("Optimistic conflict on {document}: {key}")]
    OptimisticConflict { document: String, key: String },
    #[error("Batch too large: {len} operations (max {max})")]
    BatchTooLarge { len: usize, max: usize },
    #[error("Unknown operation kind: {0}")]
    UnknownOperation(String),
    #[error("A lone condition check cannot be executed outside a transaction")]
    LoneConditionCheck,
    /// A conditional write was refused by the store. For transactions,
    /// `index` is the position of the failing primitive when the store
    /// reports it. Normally remapped to [`Error::AlreadyExists`] or
    /// [`Error::OptimisticConflict`] before reaching callers.
    #[error("Write condition failed")]
    ConditionFailed { index: Option<usize> },
    #[error("Key encoding error: {0}")]
    KeyEncoding(String),
    #[error("Invalid page token: {0}")]
    InvalidPageToken(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Result type for data-layer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let error = Error::NotFound {
            document: "ArtworkDoc".to_string(),
            key: "ArtworkDoc/id=a1".to_string(),
        };
        assert_eq!(error.to_string(), "ArtworkDoc not found: ArtworkDoc/id=a1");
    }

    #[test]
    fn test_batch_too_large_display() {
        let error = Error::BatchTooLarge { len: 150, max: 100 };
        assert_eq!(
            error.to_string(),
            "Batch too large: 150 operations (max 100)"
        );
    }

    #[test]
    fn test_schema_error_is_transparent() {
        let error: Error = SchemaError::NoPrimaryKey("ArtworkDoc".to_string()).into();
        assert_eq!(
            error.to_string(),
            "Document ArtworkDoc declares no primary key field (enable infer_primary_keys to fall back)"
        );
    }
}
