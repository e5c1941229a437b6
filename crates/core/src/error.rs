//! Error types for the query layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`PlanError`] - A predicate set cannot be turned into a valid query
//! - [`StorageError`] - A document source failed or rejected a fetch
//! - [`DomainError`] - A stored document does not decode into an entity
//! - [`LoadError`] - Top-level error returned to callers of the producer
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Planning Errors
// =============================================================================

/// The requested predicate combination has no valid backend query.
///
/// Planning errors indicate a caller or logic defect and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// The backend cannot express this combination in a single query
    /// (for example two independent range constraints).
    #[error("Unsupported query shape: {0}")]
    UnsupportedQueryShape(String),

    /// A field name is not a plain identifier.
    #[error("Invalid field name: {0:?}")]
    InvalidFieldName(String),
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Document source errors.
///
/// These errors originate from a cache or remote adapter while executing a
/// resolved query.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The source cannot serve requests right now (cold cache, offline,
    /// pool exhausted).
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Failed to establish a connection.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The source rejected or failed the query.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Stored data could not be (de)serialized.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StorageError {
    /// Whether the error means the source could not be reached at all,
    /// as opposed to having rejected the query.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::ConnectionError(_))
    }
}

// =============================================================================
// Domain Errors
// =============================================================================

/// Entity decoding and validation errors.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A raw document did not match the entity schema.
    #[error("Cannot decode {collection}/{id}: {message}")]
    DecodingError {
        /// Collection the document was read from.
        collection: &'static str,
        /// Document id.
        id: String,
        /// Decoder message.
        message: String,
    },

    /// Generic validation error.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

// =============================================================================
// Load Errors
// =============================================================================

/// Top-level errors returned by the paged sequence producer.
///
/// No partial page is ever returned alongside one of these: a failed load
/// yields no data at all.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The predicate set cannot be expressed as one backend query.
    #[error("Unsupported query shape: {0}")]
    UnsupportedQueryShape(String),

    /// The authoritative source could not be reached after the fallback.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[source] StorageError),

    /// The remote source rejected or failed the query after the fallback.
    #[error("Backend error: {0}")]
    Backend(#[source] StorageError),

    /// The cursor was produced for a different query.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Page size must be at least one.
    #[error("Invalid page size: {0}")]
    InvalidPageSize(usize),

    /// A fetched document could not be decoded.
    #[error("Domain error: {0}")]
    Decoding(#[from] DomainError),
}

impl From<PlanError> for LoadError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::UnsupportedQueryShape(msg) => Self::UnsupportedQueryShape(msg),
            PlanError::InvalidFieldName(field) => {
                Self::UnsupportedQueryShape(format!("invalid field name {field:?}"))
            }
        }
    }
}

impl LoadError {
    /// Build the terminal error for a failed authoritative fetch.
    pub fn from_terminal(err: StorageError) -> Self {
        if err.is_unavailable() {
            Self::SourceUnavailable(err)
        } else {
            Self::Backend(err)
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for planning.
pub type PlanResult<T> = Result<T, PlanError>;

/// Result type for document source operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for page loads.
pub type LoadResult<T> = Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    // Test critique: la chaîne de conversion d'erreurs fonctionne
    #[test]
    fn test_plan_error_maps_to_unsupported_shape() {
        let err: LoadError = PlanError::UnsupportedQueryShape("two ranges".into()).into();
        assert!(matches!(err, LoadError::UnsupportedQueryShape(ref m) if m == "two ranges"));

        let err: LoadError = PlanError::InvalidFieldName("a-b".into()).into();
        assert!(err.to_string().contains("a-b"));
    }

    // Test critique: la cause d'origine est préservée après le fallback
    #[test]
    fn test_terminal_error_classification() {
        let err = LoadError::from_terminal(StorageError::Unavailable("offline".into()));
        assert!(matches!(err, LoadError::SourceUnavailable(_)));
        assert!(err.to_string().contains("offline"));

        let err = LoadError::from_terminal(StorageError::QueryError("missing index".into()));
        assert!(matches!(err, LoadError::Backend(_)));
        assert!(err.to_string().contains("missing index"));
    }

    #[test]
    fn test_decoding_error_names_document() {
        let err = DomainError::DecodingError {
            collection: "customers",
            id: "c-1".into(),
            message: "missing field `name`".into(),
        };
        let load: LoadError = err.into();
        let msg = load.to_string();
        assert!(msg.contains("customers/c-1") && msg.contains("name"));
    }
}
