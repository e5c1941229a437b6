//! Port trait for document sources.
//!
//! A source executes a [`ResolvedQuery`] against one collection of one shop.
//! The application pairs a fast local cache with the authoritative remote
//! store; both implement this trait. Implementations live in the
//! infrastructure layer (e.g., `shopbook-storage`).

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::{Document, ShopScope};
use crate::query::ResolvedQuery;

/// Which source a fetch attempt targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SourcePreference {
    /// Local cache, low latency, possibly cold or stale.
    #[default]
    Cache,
    /// Authoritative remote store.
    Remote,
}

impl SourcePreference {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Remote => "remote",
        }
    }
}

/// Everything a source needs to run one page fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub scope: &'a ShopScope,
    pub collection: &'a str,
    pub query: &'a ResolvedQuery,
    /// Maximum number of raw records to return.
    pub limit: usize,
    /// Resume strictly after this record in query order.
    pub start_after: Option<&'a Document>,
}

impl<'a> FetchRequest<'a> {
    /// Same request, resuming after another record.
    pub fn after(self, document: &'a Document) -> Self {
        Self {
            start_after: Some(document),
            ..self
        }
    }
}

/// Port trait for a document collection backend.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Execute the query and return at most `limit` raw records in query
    /// order.
    async fn fetch(&self, request: &FetchRequest<'_>) -> StorageResult<Vec<Document>>;
}
