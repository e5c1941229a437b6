//! Domain models and the raw document representation.
//!
//! Documents are what a source returns: an id plus a schemaless JSON object.
//! Entities are the typed view callers page through. Every entity decodes
//! from a [`Document`] through the [`Entity`] trait, so the paging machinery
//! never needs per-entity code.

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DomainError, DomainResult};
use crate::query::PlannerConfig;

mod customer;
mod inventory;

pub use customer::{Customer, CustomerType};
pub use inventory::InventoryItem;

/// Reserved field name addressing the document id in filters and sorts.
///
/// Document stores order by the id implicitly after every named key; the
/// planner makes that ordering explicit so cursors are never ambiguous.
pub const DOCUMENT_ID_FIELD: &str = "__name__";

// =============================================================================
// Scope
// =============================================================================

/// The shop every query is scoped to.
///
/// Passed explicitly into every fetch instead of being looked up from
/// ambient session state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShopScope {
    pub shop_id: String,
}

impl ShopScope {
    pub fn new(shop_id: impl Into<String>) -> Self {
        Self {
            shop_id: shop_id.into(),
        }
    }

    /// Path of a collection inside this shop (`shops/{shop}/{collection}`).
    pub fn collection_path(&self, collection: &str) -> String {
        format!("shops/{}/{}", self.shop_id, collection)
    }
}

// =============================================================================
// Documents
// =============================================================================

/// A raw record as stored in a document collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id, unique within its collection.
    pub id: String,
    /// Stored fields.
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build a document from a JSON object. An `id` key inside the object is
    /// dropped; the explicit id wins.
    pub fn from_value(id: impl Into<String>, value: Value) -> DomainResult<Self> {
        let id = id.into();
        match value {
            Value::Object(mut fields) => {
                fields.remove("id");
                Ok(Self { id, fields })
            }
            other => Err(DomainError::ValidationError(format!(
                "document {} must be a JSON object, got {}",
                id,
                json_type_name(&other)
            ))),
        }
    }

    /// Look up a field, resolving [`DOCUMENT_ID_FIELD`] to the id.
    pub fn field(&self, name: &str) -> Option<Cow<'_, Value>> {
        if name == DOCUMENT_ID_FIELD {
            return Some(Cow::Owned(Value::String(self.id.clone())));
        }
        self.fields.get(name).map(Cow::Borrowed)
    }

    /// Decode into a typed value, exposing the id as an `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        let mut object = self.fields.clone();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(object))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A typed business entity stored in one collection.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection name inside a shop.
    const COLLECTION: &'static str;

    /// Document id.
    fn id(&self) -> &str;

    /// Search fields, default ordering and tie-breaks for this collection.
    fn planner_config() -> PlannerConfig;

    /// Text fields scanned by substring search.
    fn text_fields() -> &'static [&'static str] {
        &[]
    }

    fn from_document(doc: &Document) -> DomainResult<Self> {
        doc.decode().map_err(|e| DomainError::DecodingError {
            collection: Self::COLLECTION,
            id: doc.id.clone(),
            message: e.to_string(),
        })
    }

    fn to_document(&self) -> DomainResult<Document> {
        let value =
            serde_json::to_value(self).map_err(|e| DomainError::ValidationError(e.to_string()))?;
        Document::from_value(self.id(), value)
    }
}

// =============================================================================
// Tests
// =============================================================================
