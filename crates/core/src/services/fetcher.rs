//! Source-fallback fetcher.
//!
//! Runs a query against the preferred source, normally the local cache. Any
//! failure there, including a cold cache, is retried exactly once against the
//! authoritative remote source with the same query and cursor. A remote
//! failure is terminal: there is no further retry and no backoff at this
//! layer.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::{LoadError, LoadResult, StorageResult};
use crate::metrics::{FetchTimer, record_fetch, record_source_fallback};
use crate::models::Document;
use crate::ports::{DocumentSource, FetchRequest, SourcePreference};

/// Raw records returned by one successful fetch.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub documents: Vec<Document>,
    /// Source that served the records.
    pub served_by: SourcePreference,
}

/// Cache-first fetcher with a single remote fallback.
pub struct SourceFallbackFetcher {
    cache: Arc<dyn DocumentSource>,
    remote: Arc<dyn DocumentSource>,
}

impl SourceFallbackFetcher {
    pub fn new(cache: Arc<dyn DocumentSource>, remote: Arc<dyn DocumentSource>) -> Self {
        Self { cache, remote }
    }

    /// Execute one page fetch.
    ///
    /// At most two attempts are made. When `preferred` is already the remote
    /// source there is nothing more authoritative to fall back to, so a single
    /// attempt is made.
    #[instrument(skip_all, fields(collection = request.collection, preferred = preferred.as_str()))]
    pub async fn execute(
        &self,
        request: &FetchRequest<'_>,
        preferred: SourcePreference,
    ) -> LoadResult<RawPage> {
        if preferred == SourcePreference::Remote {
            return self
                .attempt(SourcePreference::Remote, request)
                .await
                .map_err(LoadError::from_terminal);
        }

        match self.attempt(SourcePreference::Cache, request).await {
            Ok(page) => Ok(page),
            Err(e) => {
                warn!(
                    error = %e,
                    source = self.cache.name(),
                    "⚠️  Cache fetch failed, retrying against remote"
                );
                record_source_fallback(request.collection);
                self.attempt(SourcePreference::Remote, request)
                    .await
                    .map_err(LoadError::from_terminal)
            }
        }
    }

    async fn attempt(
        &self,
        target: SourcePreference,
        request: &FetchRequest<'_>,
    ) -> StorageResult<RawPage> {
        let source = match target {
            SourcePreference::Cache => &self.cache,
            SourcePreference::Remote => &self.remote,
        };

        let _timer = FetchTimer::new(target.as_str());
        let result = source.fetch(request).await;

        match &result {
            Ok(documents) => {
                record_fetch(target.as_str(), "ok");
                debug!(
                    source = source.name(),
                    records = documents.len(),
                    after = request.start_after.map(|d| d.id.as_str()),
                    "Fetched raw page"
                );
            }
            Err(_) => record_fetch(target.as_str(), "error"),
        }

        result.map(|mut documents| {
            documents.truncate(request.limit);
            RawPage {
                documents,
                served_by: target,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::models::{Customer, ShopScope};
    use crate::query::{PredicateSet, QueryPlanner};
    use crate::services::testing::{ScriptedSource, customers_fixture};

    fn query() -> crate::query::ResolvedQuery {
        QueryPlanner::for_entity::<Customer>()
            .plan(&PredicateSet::new())
            .unwrap()
    }

    // Test critique: le cache échoue, le serveur répond, l'appelant ne voit
    // jamais l'erreur intermédiaire
    #[tokio::test]
    async fn test_cache_failure_falls_back_to_remote() {
        let cache = Arc::new(ScriptedSource::failing("cache", || {
            StorageError::Unavailable("cold".into())
        }));
        let remote = Arc::new(ScriptedSource::new("remote", customers_fixture()));
        let fetcher = SourceFallbackFetcher::new(cache.clone(), remote.clone());

        let scope = ShopScope::new("shop-1");
        let query = query();
        let request = FetchRequest {
            scope: &scope,
            collection: "customers",
            query: &query,
            limit: 3,
            start_after: None,
        };

        let page = fetcher
            .execute(&request, SourcePreference::Cache)
            .await
            .unwrap();
        assert_eq!(page.documents.len(), 3);
        assert_eq!(page.served_by, SourcePreference::Remote);
        assert_eq!(cache.calls(), 1);
        assert_eq!(remote.calls(), 1);
    }

    // Test critique: jamais plus de deux tentatives, l'erreur du serveur est
    // terminale et conserve sa cause
    #[tokio::test]
    async fn test_remote_failure_is_terminal() {
        let cache = Arc::new(ScriptedSource::failing("cache", || {
            StorageError::Unavailable("cold".into())
        }));
        let remote = Arc::new(ScriptedSource::failing("remote", || {
            StorageError::QueryError("index missing".into())
        }));
        let fetcher = SourceFallbackFetcher::new(cache.clone(), remote.clone());

        let scope = ShopScope::new("shop-1");
        let query = query();
        let request = FetchRequest {
            scope: &scope,
            collection: "customers",
            query: &query,
            limit: 3,
            start_after: None,
        };

        let err = fetcher
            .execute(&request, SourcePreference::Cache)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Backend(_)));
        assert!(err.to_string().contains("index missing"));
        assert_eq!(cache.calls(), 1);
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn test_remote_preference_makes_single_attempt() {
        let cache = Arc::new(ScriptedSource::new("cache", customers_fixture()));
        let remote = Arc::new(ScriptedSource::failing("remote", || {
            StorageError::Unavailable("offline".into())
        }));
        let fetcher = SourceFallbackFetcher::new(cache.clone(), remote.clone());

        let scope = ShopScope::new("shop-1");
        let query = query();
        let request = FetchRequest {
            scope: &scope,
            collection: "customers",
            query: &query,
            limit: 3,
            start_after: None,
        };

        let err = fetcher
            .execute(&request, SourcePreference::Remote)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::SourceUnavailable(_)));
        assert_eq!(cache.calls(), 0);
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn test_warm_cache_skips_remote() {
        let cache = Arc::new(ScriptedSource::new("cache", customers_fixture()));
        let remote = Arc::new(ScriptedSource::new("remote", customers_fixture()));
        let fetcher = SourceFallbackFetcher::new(cache.clone(), remote.clone());

        let scope = ShopScope::new("shop-1");
        let query = query();
        let request = FetchRequest {
            scope: &scope,
            collection: "customers",
            query: &query,
            limit: 2,
            start_after: None,
        };

        let page = fetcher
            .execute(&request, SourcePreference::Cache)
            .await
            .unwrap();
        assert_eq!(page.served_by, SourcePreference::Cache);
        assert_eq!(page.documents.len(), 2);
        assert_eq!(remote.calls(), 0);
    }
}
