//! In-memory document store.
//!
//! Plays the local cache in front of the remote store, and stands in for
//! the remote store when no database is configured. Queries run through
//! the same evaluator as every other source so results match the remote
//! ordering exactly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use shopbook_core::error::{StorageError, StorageResult};
use shopbook_core::models::{Document, Entity, ShopScope};
use shopbook_core::ports::{DocumentSource, FetchRequest};
use shopbook_core::query::evaluate;

/// Collections keyed by `shops/{shop}/{collection}`.
pub struct MemoryDocumentStore {
    name: String,
    collections: RwLock<HashMap<String, Vec<Document>>>,
    available: AtomicBool,
    fetches: AtomicUsize,
}

impl MemoryDocumentStore {
    /// An empty, available store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            fetches: AtomicUsize::new(0),
        }
    }

    /// An empty store that refuses every fetch until marked available.
    pub fn cold(name: impl Into<String>) -> Self {
        let store = Self::new(name);
        store.set_available(false);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of fetches served or refused so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Insert or replace documents by id.
    pub async fn insert(&self, scope: &ShopScope, collection: &str, documents: Vec<Document>) {
        let path = scope.collection_path(collection);
        let mut collections = self.collections.write().await;
        let stored = collections.entry(path).or_default();

        for doc in documents {
            match stored.iter_mut().find(|d| d.id == doc.id) {
                Some(existing) => *existing = doc,
                None => stored.push(doc),
            }
        }
    }

    /// Insert typed entities into their collection.
    pub async fn insert_entities<E: Entity>(
        &self,
        scope: &ShopScope,
        entities: &[E],
    ) -> StorageResult<usize> {
        let documents = entities
            .iter()
            .map(|e| {
                e.to_document()
                    .map_err(|err| StorageError::SerializationError(err.to_string()))
            })
            .collect::<StorageResult<Vec<_>>>()?;
        let count = documents.len();
        self.insert(scope, E::COLLECTION, documents).await;
        Ok(count)
    }

    /// Load a JSON array of objects, each carrying a string `id`.
    pub async fn load_json(
        &self,
        scope: &ShopScope,
        collection: &str,
        value: Value,
    ) -> StorageResult<usize> {
        let Value::Array(items) = value else {
            return Err(StorageError::SerializationError(format!(
                "seed for {collection} must be an array"
            )));
        };

        let mut documents = Vec::with_capacity(items.len());
        for item in items {
            let id = item
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    StorageError::SerializationError(format!(
                        "seed record in {collection} has no string id"
                    ))
                })?;
            let doc = Document::from_value(id, item)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            documents.push(doc);
        }

        let count = documents.len();
        self.insert(scope, collection, documents).await;
        debug!(collection, count, "Seed loaded");
        Ok(count)
    }

    /// Every document of a collection, in insertion order.
    pub async fn documents(&self, scope: &ShopScope, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(&scope.collection_path(collection))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> StorageResult<Vec<Document>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("{} is cold", self.name)));
        }

        let path = request.scope.collection_path(request.collection);
        let collections = self.collections.read().await;
        let documents = collections.get(&path).map(Vec::as_slice).unwrap_or(&[]);

        let page = evaluate(
            documents,
            request.query,
            request.limit,
            request.start_after,
        );
        trace!(path = %path, returned = page.len(), "Memory fetch");
        Ok(page)
    }
}
