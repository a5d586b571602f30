//! Declarative schema model.
//!
//! A [`Schema`] is an immutable registry of document types, their primary
//! keys, the one-to-many indexes kept for them and the ownership relations
//! between them. It is assembled once through [`SchemaBuilder`], validated
//! eagerly, and then consulted at call time by the data layer (a runtime
//! registry, not generated code).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// The declared type of a document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    /// Arbitrary nested JSON. Not usable as a primary key component.
    Json,
}

/// A single field on a document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub is_primary_key: bool,
}

impl FieldDefinition {
    /// Creates a non-key field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            is_primary_key: false,
        }
    }

    /// Creates a primary-key field.
    pub fn primary_key(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            is_primary_key: true,
        }
    }
}

/// A document type: a unique name plus its ordered field list.
///
/// Fixed at schema-definition time and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDefinition {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
}

impl DocumentDefinition {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The primary-key fields in declaration order.
    ///
    /// After [`SchemaBuilder::build`] every document has at least one.
    pub fn primary_key_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.is_primary_key)
    }

    /// The first primary-key field, which forms the index sort key for
    /// documents that participate in a one-to-many index.
    pub fn first_primary_key_field(&self) -> Option<&FieldDefinition> {
        self.primary_key_fields().next()
    }
}

/// A one-to-many index: items of `item_document` queryable by the key of
/// `owner_document`. Exactly one index exists per ownership relation that
/// needs querying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    pub name: String,
    pub owner_document: String,
    pub item_document: String,
}

/// A declared one-to-many ownership: each `owned_document` belongs to exactly
/// one `owner_document`, referenced through `owner_field` on the owned side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipRelation {
    pub owner_document: String,
    pub owned_document: String,
    pub owner_field: String,
}

/// Builder for [`Schema`]. All validation happens in [`SchemaBuilder::build`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    documents: Vec<DocumentDefinition>,
    indexes: Vec<IndexDefinition>,
    ownerships: Vec<OwnershipRelation>,
    infer_primary_keys: bool,
    allow_composite_index_keys: bool,
}

impl SchemaBuilder {
    pub fn document(mut self, document: DocumentDefinition) -> Self {
        self.documents.push(document);
        self
    }

    pub fn index(
        mut self,
        name: impl Into<String>,
        owner_document: impl Into<String>,
        item_document: impl Into<String>,
    ) -> Self {
        self.indexes.push(IndexDefinition {
            name: name.into(),
            owner_document: owner_document.into(),
            item_document: item_document.into(),
        });
        self
    }

    pub fn ownership(
        mut self,
        owner_document: impl Into<String>,
        owned_document: impl Into<String>,
        owner_field: impl Into<String>,
    ) -> Self {
        self.ownerships.push(OwnershipRelation {
            owner_document: owner_document.into(),
            owned_document: owned_document.into(),
            owner_field: owner_field.into(),
        });
        self
    }

    /// Opt in to primary-key inference for documents with no explicit key
    /// field: a field literally named `id` wins, else the first declared
    /// field. Without this, such documents fail validation.
    pub fn infer_primary_keys(mut self) -> Self {
        self.infer_primary_keys = true;
        self
    }

    /// Opt in to indexing documents with composite primary keys. Only the
    /// first key component forms the index sort key, so collisions are
    /// possible when that component alone is not unique within an owner.
    pub fn allow_composite_index_keys(mut self) -> Self {
        self.allow_composite_index_keys = true;
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut documents: HashMap<String, DocumentDefinition> = HashMap::new();

        for mut document in self.documents {
            validate_document_name(&document.name)?;
            if document.fields.is_empty() {
                return Err(SchemaError::NoFields(document.name));
            }
            for (i, field) in document.fields.iter().enumerate() {
                if document.fields[..i].iter().any(|f| f.name == field.name) {
                    return Err(SchemaError::DuplicateField {
                        document: document.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
            resolve_primary_key(&mut document, self.infer_primary_keys)?;
            for field in document.primary_key_fields() {
                match field.field_type {
                    FieldType::String | FieldType::Number => {}
                    _ => {
                        return Err(SchemaError::NonScalarPrimaryKey {
                            document: document.name.clone(),
                            field: field.name.clone(),
                        })
                    }
                }
            }
            if documents.contains_key(&document.name) {
                return Err(SchemaError::DuplicateDocument(document.name));
            }
            documents.insert(document.name.clone(), document);
        }

        for relation in &self.ownerships {
            let owner = documents
                .get(&relation.owner_document)
                .ok_or_else(|| SchemaError::UnknownDocument(relation.owner_document.clone()))?;
            let owned = documents
                .get(&relation.owned_document)
                .ok_or_else(|| SchemaError::UnknownDocument(relation.owned_document.clone()))?;
            if owned.field(&relation.owner_field).is_none() {
                return Err(SchemaError::UnknownField {
                    document: relation.owned_document.clone(),
                    field: relation.owner_field.clone(),
                });
            }
            // The owner field holds a single value, so the owner's key must
            // be a single field.
            if owner.primary_key_fields().count() != 1 {
                return Err(SchemaError::CompositeOwnerKey {
                    document: relation.owner_document.clone(),
                });
            }
            if self
                .ownerships
                .iter()
                .filter(|r| r.owned_document == relation.owned_document)
                .count()
                > 1
            {
                return Err(SchemaError::MultipleOwners(relation.owned_document.clone()));
            }
        }

        let mut indexes: HashMap<String, IndexDefinition> = HashMap::new();
        for index in self.indexes {
            documents
                .get(&index.owner_document)
                .ok_or_else(|| SchemaError::UnknownDocument(index.owner_document.clone()))?;
            let item = documents
                .get(&index.item_document)
                .ok_or_else(|| SchemaError::UnknownDocument(index.item_document.clone()))?;
            let matching_ownership = self.ownerships.iter().any(|r| {
                r.owner_document == index.owner_document && r.owned_document == index.item_document
            });
            if !matching_ownership {
                return Err(SchemaError::IndexWithoutOwnership(index.name));
            }
            if item.primary_key_fields().count() > 1 && !self.allow_composite_index_keys {
                return Err(SchemaError::CompositeIndexKey {
                    index: index.name,
                    document: index.item_document,
                });
            }
            if indexes.contains_key(&index.name) {
                return Err(SchemaError::DuplicateIndex(index.name));
            }
            indexes.insert(index.name.clone(), index);
        }

        Ok(Schema {
            documents,
            indexes,
            ownerships: self.ownerships,
        })
    }
}

fn validate_document_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.contains(['/', '=', '#']) {
        return Err(SchemaError::InvalidDocumentName(name.to_string()));
    }
    Ok(())
}

fn resolve_primary_key(
    document: &mut DocumentDefinition,
    infer: bool,
) -> Result<(), SchemaError> {
    if document.fields.iter().any(|f| f.is_primary_key) {
        return Ok(());
    }
    if !infer {
        return Err(SchemaError::NoPrimaryKey(document.name.clone()));
    }
    let position = document
        .fields
        .iter()
        .position(|f| f.name == "id")
        .unwrap_or(0);
    document.fields[position].is_primary_key = true;
    Ok(())
}

/// Immutable schema registry consulted by the data layer.
#[derive(Debug, Clone)]
pub struct Schema {
    documents: HashMap<String, DocumentDefinition>,
    indexes: HashMap<String, IndexDefinition>,
    ownerships: Vec<OwnershipRelation>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn document(&self, name: &str) -> Result<&DocumentDefinition, SchemaError> {
        self.documents
            .get(name)
            .ok_or_else(|| SchemaError::UnknownDocument(name.to_string()))
    }

    pub fn index(&self, name: &str) -> Result<&IndexDefinition, SchemaError> {
        self.indexes
            .get(name)
            .ok_or_else(|| SchemaError::UnknownIndex(name.to_string()))
    }

    /// All indexes whose item document is `document`.
    pub fn indexes_for_item<'a>(
        &'a self,
        document: &'a str,
    ) -> impl Iterator<Item = &'a IndexDefinition> + 'a {
        self.indexes
            .values()
            .filter(move |i| i.item_document == document)
    }

    /// The ownership relation an owned document participates in, if any.
    /// Validation guarantees at most one.
    pub fn ownership_for(&self, owned_document: &str) -> Option<&OwnershipRelation> {
        self.ownerships
            .iter()
            .find(|r| r.owned_document == owned_document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artwork() -> DocumentDefinition {
        DocumentDefinition::new(
            "ArtworkDoc",
            vec![
                FieldDefinition::primary_key("id", FieldType::String),
                FieldDefinition::new("ownerId", FieldType::String),
                FieldDefinition::new("title", FieldType::String),
            ],
        )
    }

    fn user() -> DocumentDefinition {
        DocumentDefinition::new(
            "UserDoc",
            vec![FieldDefinition::primary_key("id", FieldType::String)],
        )
    }

    fn gallery_schema() -> Schema {
        Schema::builder()
            .document(user())
            .document(artwork())
            .ownership("UserDoc", "ArtworkDoc", "ownerId")
            .index("ArtworksOfUserIndex", "UserDoc", "ArtworkDoc")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builds_valid_schema() {
        let schema = gallery_schema();
        assert_eq!(schema.document("ArtworkDoc").unwrap().name, "ArtworkDoc");
        assert_eq!(
            schema.index("ArtworksOfUserIndex").unwrap().item_document,
            "ArtworkDoc"
        );
        assert_eq!(
            schema.ownership_for("ArtworkDoc").unwrap().owner_field,
            "ownerId"
        );
        assert_eq!(schema.indexes_for_item("ArtworkDoc").count(), 1);
        assert_eq!(schema.indexes_for_item("UserDoc").count(), 0);
    }

    #[test]
    fn test_missing_primary_key_is_rejected_by_default() {
        let doc = DocumentDefinition::new(
            "NoteDoc",
            vec![FieldDefinition::new("text", FieldType::String)],
        );
        let err = Schema::builder().document(doc).build().unwrap_err();
        assert_eq!(err, SchemaError::NoPrimaryKey("NoteDoc".to_string()));
    }

    #[test]
    fn test_primary_key_inference_prefers_id_field() {
        let doc = DocumentDefinition::new(
            "NoteDoc",
            vec![
                FieldDefinition::new("text", FieldType::String),
                FieldDefinition::new("id", FieldType::String),
            ],
        );
        let schema = Schema::builder()
            .document(doc)
            .infer_primary_keys()
            .build()
            .unwrap();
        let doc = schema.document("NoteDoc").unwrap();
        assert_eq!(doc.first_primary_key_field().unwrap().name, "id");
    }

    #[test]
    fn test_primary_key_inference_falls_back_to_first_field() {
        let doc = DocumentDefinition::new(
            "NoteDoc",
            vec![
                FieldDefinition::new("slug", FieldType::String),
                FieldDefinition::new("text", FieldType::String),
            ],
        );
        let schema = Schema::builder()
            .document(doc)
            .infer_primary_keys()
            .build()
            .unwrap();
        let doc = schema.document("NoteDoc").unwrap();
        assert_eq!(doc.first_primary_key_field().unwrap().name, "slug");
    }

    #[test]
    fn test_composite_index_key_needs_opt_in() {
        let line = DocumentDefinition::new(
            "OrderLineDoc",
            vec![
                FieldDefinition::primary_key("orderId", FieldType::String),
                FieldDefinition::primary_key("line", FieldType::Number),
                FieldDefinition::new("userId", FieldType::String),
            ],
        );
        let builder = || {
            Schema::builder()
                .document(user())
                .document(line.clone())
                .ownership("UserDoc", "OrderLineDoc", "userId")
                .index("LinesOfUserIndex", "UserDoc", "OrderLineDoc")
        };

        let err = builder().build().unwrap_err();
        assert_eq!(
            err,
            SchemaError::CompositeIndexKey {
                index: "LinesOfUserIndex".to_string(),
                document: "OrderLineDoc".to_string(),
            }
        );
        assert!(builder().allow_composite_index_keys().build().is_ok());
    }

    #[test]
    fn test_index_requires_matching_ownership() {
        let err = Schema::builder()
            .document(user())
            .document(artwork())
            .index("ArtworksOfUserIndex", "UserDoc", "ArtworkDoc")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::IndexWithoutOwnership("ArtworksOfUserIndex".to_string())
        );
    }

    #[test]
    fn test_ownership_owner_field_must_exist() {
        let err = Schema::builder()
            .document(user())
            .document(artwork())
            .ownership("UserDoc", "ArtworkDoc", "missingField")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownField {
                document: "ArtworkDoc".to_string(),
                field: "missingField".to_string(),
            }
        );
    }

    #[test]
    fn test_document_name_cannot_contain_separators() {
        let doc = DocumentDefinition::new(
            "Bad/Name",
            vec![FieldDefinition::primary_key("id", FieldType::String)],
        );
        let err = Schema::builder().document(doc).build().unwrap_err();
        assert_eq!(err, SchemaError::InvalidDocumentName("Bad/Name".to_string()));
    }

    #[test]
    fn test_duplicate_document_is_rejected() {
        let err = Schema::builder()
            .document(user())
            .document(user())
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateDocument("UserDoc".to_string()));
    }
}
