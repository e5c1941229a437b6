//! Core query layer for Shopbook.
//!
//! This crate contains the domain models, port traits (interfaces), the
//! query planner and the paging services used by list screens of the
//! billing app. It follows hexagonal architecture principles - this is the
//! innermost layer with no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     shopbook (binary)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    shopbook-storage                         │
//! │            (in-memory cache, PostgreSQL remote)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     shopbook-core  ← YOU ARE HERE           │
//! │          (models, ports, query planning, services)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Documents and entities (Customer, InventoryItem)
//! - [`query`] - Predicate sets, the query planner and client-side filters
//! - [`ports`] - Interface traits for adapters to implement, page types
//! - [`services`] - Source fallback and paged loading
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Key Concepts
//!
//! ## Ports
//!
//! [`ports::DocumentSource`] executes a [`query::ResolvedQuery`] against one
//! collection of one shop. The app pairs a local cache with the
//! authoritative remote store; both implement the same trait.
//!
//! ## Loading a page
//!
//! 1. [`query::QueryPlanner`] turns a [`query::PredicateSet`] into one
//!    backend query with a deterministic sort order
//! 2. [`services::SourceFallbackFetcher`] reads the cache, falling back to
//!    the remote store
//! 3. [`query::PostFilter`] drops records the backend cannot filter
//! 4. [`services::PagedSequenceProducer`] checks whether more records exist
//!    and hands back a [`ports::PageCursor`]

pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod query;
pub mod services;
