//! Paged sequence producer.
//!
//! Plans a predicate set, fetches raw pages through the fallback fetcher,
//! applies client-side filters and hands back pages with a cursor for the
//! next one.
//!
//! # Flow
//!
//! 1. Plan the predicate set into a [`ResolvedQuery`]
//! 2. Fetch `page_size` raw records, after the cursor's record if there is one
//! 3. Apply client-side filters and decode the survivors
//! 4. If the raw page was full, fetch the next `page_size` records right away
//! 5. Attach a cursor only when that lookahead found something
//!
//! Step 4 costs an extra read per page but gives callers an exact "is there
//! more" answer: after client-side filtering, emptiness of the lookahead is
//! the only reliable end marker. The lookahead result is only used for that
//! answer; the next page is always fetched fresh from the cursor.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use futures::Stream;
use tracing::{debug, instrument, trace};

use super::fetcher::SourceFallbackFetcher;
use crate::error::{LoadError, LoadResult};
use crate::metrics::{record_lookahead, record_page_loaded};
use crate::models::{Document, Entity, ShopScope};
use crate::ports::{FetchRequest, Page, PageCursor, SourcePreference};
use crate::query::{PostFilter, PredicateSet, QueryPlanner, ResolvedQuery};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for paged loading.
#[derive(Debug, Clone)]
pub struct PagingConfig {
    /// Page size when the caller does not pick one.
    pub default_page_size: usize,
    /// Upper bound applied to requested page sizes.
    pub max_page_size: usize,
    /// Source tried first for every fetch.
    pub preferred_source: SourcePreference,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            preferred_source: SourcePreference::Cache,
        }
    }
}

impl PagingConfig {
    /// Normalize a requested page size into `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

// =============================================================================
// Producer
// =============================================================================

/// Generic paged loader for one entity type.
pub struct PagedSequenceProducer<E: Entity> {
    planner: QueryPlanner,
    fetcher: Arc<SourceFallbackFetcher>,
    config: PagingConfig,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> PagedSequenceProducer<E> {
    pub fn new(fetcher: Arc<SourceFallbackFetcher>) -> Self {
        Self {
            planner: QueryPlanner::for_entity::<E>(),
            fetcher,
            config: PagingConfig::default(),
            _entity: PhantomData,
        }
    }

    pub fn with_planner(mut self, planner: QueryPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_config(mut self, config: PagingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn planner(&self) -> &QueryPlanner {
        &self.planner
    }

    pub fn config(&self) -> &PagingConfig {
        &self.config
    }

    /// Load one page.
    ///
    /// Without a cursor this is the first page of the query. A cursor must
    /// come from an earlier page of the same scope, predicate set and page
    /// size; anything else is rejected with [`LoadError::InvalidCursor`].
    #[instrument(skip_all, fields(collection = E::COLLECTION, shop = %scope.shop_id, page_size = page_size))]
    pub async fn load(
        &self,
        scope: &ShopScope,
        predicates: &PredicateSet,
        page_size: usize,
        cursor: Option<PageCursor>,
    ) -> LoadResult<Page<E>> {
        let query = self.planner.plan(predicates)?;
        self.load_page(scope, &query, predicates, page_size, cursor.as_ref())
            .await
    }

    /// Start a stateful session over one fixed query.
    pub fn session(
        &self,
        scope: ShopScope,
        predicates: PredicateSet,
        page_size: usize,
    ) -> LoadResult<PagingSession<'_, E>> {
        check_page_size(page_size)?;
        let query = self.planner.plan(&predicates)?;
        Ok(PagingSession {
            producer: self,
            scope,
            predicates,
            query,
            page_size,
            state: SessionState::Fresh,
        })
    }

    /// Load a page of an already planned query. The cursor is only borrowed,
    /// so a cancelled load leaves the caller's state untouched.
    pub(crate) async fn load_page(
        &self,
        scope: &ShopScope,
        query: &ResolvedQuery,
        predicates: &PredicateSet,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> LoadResult<Page<E>> {
        check_page_size(page_size)?;

        let key = session_key(scope, E::COLLECTION, query, page_size);
        let preferred = self.config.preferred_source;
        let request = FetchRequest {
            scope,
            collection: E::COLLECTION,
            query,
            limit: page_size,
            start_after: None,
        };

        let mut raw = match cursor {
            None => self.fetcher.execute(&request, preferred).await?.documents,
            Some(cursor) => {
                if cursor.session_key() != key {
                    return Err(LoadError::InvalidCursor(format!(
                        "cursor after {} belongs to a different query",
                        cursor.last_document_id()
                    )));
                }
                trace!(after = cursor.last_document_id(), "Resuming from cursor");
                self.fetcher
                    .execute(&request.after(cursor.after()), preferred)
                    .await?
                    .documents
            }
        };
        raw.truncate(page_size);

        let Some(last) = raw.last() else {
            record_page_loaded(E::COLLECTION, 0);
            return Ok(Page::empty());
        };

        let items = decode::<E>(PostFilter::apply(&raw, predicates))?;

        if raw.len() < page_size {
            debug!(items = items.len(), raw = raw.len(), "Short raw page, sequence ends");
            record_page_loaded(E::COLLECTION, items.len());
            return Ok(Page::last(items));
        }

        record_lookahead(E::COLLECTION);
        let lookahead = self
            .fetcher
            .execute(&request.after(last), preferred)
            .await?
            .documents;

        let page = if lookahead.is_empty() {
            Page::last(items)
        } else {
            Page {
                items,
                cursor: Some(PageCursor::new(key, last.clone())),
                is_last: false,
            }
        };

        debug!(
            items = page.items.len(),
            raw = raw.len(),
            is_last = page.is_last,
            "Page loaded"
        );
        record_page_loaded(E::COLLECTION, page.items.len());
        Ok(page)
    }
}

fn check_page_size(page_size: usize) -> LoadResult<()> {
    if page_size == 0 {
        return Err(LoadError::InvalidPageSize(page_size));
    }
    Ok(())
}

fn decode<E: Entity>(documents: Vec<&Document>) -> LoadResult<Vec<E>> {
    documents
        .into_iter()
        .map(|doc| E::from_document(doc).map_err(LoadError::from))
        .collect()
}

/// Identity of a logical query session: scope, collection, query and page
/// size. Cursors only resume sessions with the same key.
fn session_key(scope: &ShopScope, collection: &str, query: &ResolvedQuery, page_size: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    scope.hash(&mut hasher);
    collection.hash(&mut hasher);
    query.fingerprint().hash(&mut hasher);
    page_size.hash(&mut hasher);
    hasher.finish()
}

// =============================================================================
// Session
// =============================================================================

/// Where a session stands.
#[derive(Debug)]
pub enum SessionState {
    /// Nothing loaded yet.
    Fresh,
    /// Holding the unconsumed cursor for the next page.
    Advancing(PageCursor),
    /// The last page was returned; further loads do not fetch.
    Exhausted,
}

/// A lazy page sequence over one fixed predicate set and page size.
///
/// The session keeps the cursor itself, so pages it returns carry no cursor;
/// use `is_last` to decide whether to continue. The sequence restarts only on
/// [`refresh`](Self::refresh) or [`replan`](Self::replan).
pub struct PagingSession<'p, E: Entity> {
    producer: &'p PagedSequenceProducer<E>,
    scope: ShopScope,
    predicates: PredicateSet,
    query: ResolvedQuery,
    page_size: usize,
    state: SessionState,
}

impl<'p, E: Entity> PagingSession<'p, E> {
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, SessionState::Exhausted)
    }

    pub fn query(&self) -> &ResolvedQuery {
        &self.query
    }

    /// Load the next page. Once exhausted, returns an empty last page
    /// without fetching.
    ///
    /// The session state only changes after the load succeeds; dropping the
    /// future midway leaves the session where it was.
    #[instrument(skip_all, fields(collection = E::COLLECTION, shop = %self.scope.shop_id))]
    pub async fn next_page(&mut self) -> LoadResult<Page<E>> {
        let cursor = match &self.state {
            SessionState::Exhausted => {
                trace!("Session exhausted, skipping fetch");
                return Ok(Page::empty());
            }
            SessionState::Fresh => None,
            SessionState::Advancing(cursor) => Some(cursor),
        };

        let mut page = self
            .producer
            .load_page(
                &self.scope,
                &self.query,
                &self.predicates,
                self.page_size,
                cursor,
            )
            .await?;

        self.state = match page.cursor.take() {
            Some(next) => SessionState::Advancing(next),
            None => SessionState::Exhausted,
        };
        Ok(page)
    }

    /// Drop the cursor and start again from the first page.
    pub fn refresh(&mut self) {
        debug!("Session refreshed");
        self.state = SessionState::Fresh;
    }

    /// Switch to a new predicate set. Always starts from the first page.
    pub fn replan(&mut self, predicates: PredicateSet) -> LoadResult<()> {
        let query = self.producer.planner().plan(&predicates)?;
        self.predicates = predicates;
        self.query = query;
        self.state = SessionState::Fresh;
        Ok(())
    }

    /// Turn the session into a stream of pages ending after the last page
    /// or the first error.
    pub fn into_stream(self) -> impl Stream<Item = LoadResult<Page<E>>> + 'p {
        futures::stream::unfold(Some(self), |session| async move {
            let mut session = session?;
            if session.is_exhausted() {
                return None;
            }
            match session.next_page().await {
                Ok(page) => Some((Ok(page), Some(session))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
