//! Pagination types for list queries.
//!
//! Pagination is forward-only. A [`PageCursor`] marks the last raw record of
//! a page and can be handed back exactly once to continue after it.

use std::fmt;

use crate::models::Document;

/// Opaque, forward-only continuation token.
///
/// The cursor is bound to the last raw (pre-filter) record of the page that
/// produced it, so resuming from it always continues upstream iteration at
/// the right place however many items client-side filtering dropped. The next
/// load fetches again from that record.
///
/// Cursors are not `Clone`: loading from one consumes it.
pub struct PageCursor {
    session_key: u64,
    after: Document,
}

impl PageCursor {
    pub(crate) fn new(session_key: u64, after: Document) -> Self {
        Self { session_key, after }
    }

    pub(crate) fn session_key(&self) -> u64 {
        self.session_key
    }

    pub(crate) fn after(&self) -> &Document {
        &self.after
    }

    /// Id of the raw record this cursor resumes after.
    pub fn last_document_id(&self) -> &str {
        &self.after.id
    }
}

impl fmt::Debug for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCursor")
            .field("after", &self.after.id)
            .finish_non_exhaustive()
    }
}

/// One page of results.
///
/// `items` may be shorter than the page size, or empty, while `is_last` is
/// still false: client-side filtering removes items without exhausting the
/// upstream source. Keep paging until `is_last`.
#[derive(Debug)]
pub struct Page<T> {
    /// Items left after client-side filtering, in query order.
    pub items: Vec<T>,
    /// Cursor for the next page; `None` on the last page.
    pub cursor: Option<PageCursor>,
    /// Whether no further raw records exist.
    pub is_last: bool,
}

impl<T> Page<T> {
    /// Final page with the given items.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: None,
            is_last: true,
        }
    }

    /// Empty final page, returned once a sequence is exhausted.
    pub fn empty() -> Self {
        Self::last(Vec::new())
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            cursor: self.cursor,
            is_last: self.is_last,
        }
    }
}
