//! Document-store collaborator seam.
//!
//! The pipeline only needs five primitives: get, set (with merge), an
//! equality-filtered query, a single-document update, and an all-or-nothing
//! batch of updates. `firebase::Firestore` satisfies this against the
//! production backend; `memory::MemoryStore` satisfies it for dev seeding
//! and tests.
//!
//! Documents are untyped field maps at this boundary; `fields_of` /
//! `parse_doc` bridge to the typed shapes in `models`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

/// JSON object holding a document's fields.
pub type FieldMap = serde_json::Map<String, Value>;

/// A document read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: FieldMap,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Field accessor; missing fields read as JSON null.
    pub fn field(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&Value::Null)
    }
}

/// Reference to one document: collection + id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for DocRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Equality filter on one field. The pipeline's queries never need more.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True when the document's field equals the filter value.
    pub fn matches(&self, fields: &FieldMap) -> bool {
        fields.get(&self.field).unwrap_or(&Value::Null) == &self.value
    }
}

/// One update inside an atomic batch.
#[derive(Debug, Clone)]
pub struct BatchUpdate {
    pub doc: DocRef,
    pub fields: FieldMap,
}

impl BatchUpdate {
    pub fn new(doc: DocRef, fields: FieldMap) -> Self {
        Self { doc, fields }
    }
}

/// Async document-store primitives consumed by the pipeline.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document, `None` if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Create or overwrite a document. With `merge` only the given fields
    /// change; without it the document is replaced wholesale.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: FieldMap,
        merge: bool,
    ) -> Result<(), StoreError>;

    /// All documents in `collection` matching every filter.
    async fn query(&self, collection: &str, filters: &[Filter]) -> Result<Vec<Document>, StoreError>;

    /// Merge fields into one existing document. Fails if it does not exist.
    async fn update(&self, doc: &DocRef, fields: FieldMap) -> Result<(), StoreError>;

    /// Apply every update or none of them.
    async fn batch_update(&self, writes: Vec<BatchUpdate>) -> Result<(), StoreError>;
}

/// Serialize a model into a document field map.
pub fn fields_of<T: Serialize>(value: &T) -> Result<FieldMap, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Malformed(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(StoreError::Malformed(e.to_string())),
    }
}

/// Deserialize a document into a typed model.
pub fn parse_doc<T: DeserializeOwned>(doc: &Document) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(doc.fields.clone()))
        .map_err(|e| StoreError::Malformed(format!("{}: {}", doc.id, e)))
}
