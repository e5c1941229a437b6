//! Query execution services.
//!
//! - [`SourceFallbackFetcher`] - Cache-first fetch with one remote retry
//! - [`PagedSequenceProducer`] - Plans, fetches, filters and pages results
//! - [`PagingSession`] - Stateful sequence over one fixed query
//! - [`PagedRepository`] - Manual `fetch_page(load_next_page)` pagination

mod fetcher;
mod producer;
mod repository;

pub use fetcher::{RawPage, SourceFallbackFetcher};
pub use producer::{PagedSequenceProducer, PagingConfig, PagingSession, SessionState};
pub use repository::PagedRepository;

#[cfg(test)]
pub(crate) mod testing;
