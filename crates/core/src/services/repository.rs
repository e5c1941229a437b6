//! Stateful paged repository.
//!
//! Wraps a [`PagedSequenceProducer`] for screens that ask for "the first
//! page" or "the next page" of whatever the current filters are, and keep
//! the cursor between calls.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::producer::PagedSequenceProducer;
use crate::error::LoadResult;
use crate::models::{Entity, ShopScope};
use crate::ports::PageCursor;
use crate::query::PredicateSet;

/// Per-screen paging state for one entity type.
pub struct PagedRepository<E: Entity> {
    producer: Arc<PagedSequenceProducer<E>>,
    page_size: usize,
    last_cursor: Option<PageCursor>,
    is_last_page: bool,
}

impl<E: Entity> PagedRepository<E> {
    pub fn new(producer: Arc<PagedSequenceProducer<E>>, page_size: usize) -> Self {
        Self {
            producer,
            page_size,
            last_cursor: None,
            is_last_page: false,
        }
    }

    /// Whether the previous fetch returned the last page.
    pub fn is_last_page(&self) -> bool {
        self.is_last_page
    }

    /// Forget the cursor; the next fetch starts from the first page.
    pub fn reset(&mut self) {
        self.last_cursor = None;
        self.is_last_page = false;
    }

    /// Fetch the first page (`load_next_page == false`) or the page after
    /// the previous one.
    ///
    /// Asking for the next page after the last one returns an empty list
    /// without touching any source. Callers must pass the same predicates
    /// while advancing; a changed predicate set fails with
    /// [`LoadError::InvalidCursor`](crate::error::LoadError::InvalidCursor).
    /// State is only updated when the fetch succeeds.
    #[instrument(skip_all, fields(collection = E::COLLECTION, shop = %scope.shop_id, load_next_page = load_next_page))]
    pub async fn fetch_page(
        &mut self,
        scope: &ShopScope,
        predicates: &PredicateSet,
        load_next_page: bool,
    ) -> LoadResult<Vec<E>> {
        let cursor = if load_next_page {
            if self.is_last_page {
                debug!("Already on the last page");
                return Ok(Vec::new());
            }
            self.last_cursor.as_ref()
        } else {
            None
        };

        let query = self.producer.planner().plan(predicates)?;
        let page = self
            .producer
            .load_page(scope, &query, predicates, self.page_size, cursor)
            .await?;

        self.is_last_page = page.is_last;
        self.last_cursor = page.cursor;
        Ok(page.items)
    }
}
