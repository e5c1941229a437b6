//! Storage layer for Shopbook.
//!
//! This crate provides the document sources behind the `DocumentSource`
//! port defined in `shopbook-core`:
//!
//! - [`MemoryDocumentStore`] - Local cache, and the remote stand-in when no
//!   database is configured
//! - [`postgres::PgDocumentSource`] - Authoritative store on PostgreSQL (JSONB)
//!
//! # Usage
//!
//! ```ignore
//! use shopbook_storage::{Database, DatabaseConfig, MemoryDocumentStore, PgDocumentSource};
//!
//! let db = Database::connect(&DatabaseConfig::for_browsing(&database_url)).await?;
//! db.migrate().await?;
//!
//! let cache = Arc::new(MemoryDocumentStore::cold("cache"));
//! let remote = Arc::new(PgDocumentSource::new(&db));
//! let fetcher = Arc::new(SourceFallbackFetcher::new(cache, remote));
//! ```

pub mod memory;
pub mod postgres;

pub use memory::MemoryDocumentStore;
pub use postgres::{Database, DatabaseConfig, PgDocumentSource, PurgeStats};
