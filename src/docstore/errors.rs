//! # Document Store Errors

use thiserror::Error;

use crate::error::DbError;

/// Result type for document store operations
pub type DocStoreResult<T> = Result<T, DocStoreError>;

/// Errors reported by the document store engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocStoreError {
    // ==================
    // Connection Errors
    // ==================
    /// Server is not accepting connections
    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),

    // ==================
    // Namespace Errors
    // ==================
    /// Collection already exists
    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    /// Collection does not exist
    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    /// Index name already in use
    #[error("Index already exists: {0}")]
    IndexExists(String),

    // ==================
    // Write Errors
    // ==================
    /// `_id` already present in the collection
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    // ==================
    // Query Errors
    // ==================
    /// Malformed filter, update or pipeline stage
    #[error("Bad query: {0}")]
    BadQuery(String),
}

impl DocStoreError {
    /// Numeric error code, in the style of the engine's wire protocol
    pub fn code(&self) -> u32 {
        match self {
            DocStoreError::ServerUnavailable(_) => 6,
            DocStoreError::BadQuery(_) => 2,
            DocStoreError::NamespaceNotFound(_) => 26,
            DocStoreError::CollectionExists(_) => 48,
            DocStoreError::IndexExists(_) => 85,
            DocStoreError::DuplicateKey(_) => 11000,
        }
    }

    /// Returns true for "already exists" failures on create
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            DocStoreError::CollectionExists(_) | DocStoreError::IndexExists(_)
        )
    }
}

impl From<DocStoreError> for DbError {
    fn from(e: DocStoreError) -> Self {
        match e {
            DocStoreError::ServerUnavailable(msg) => DbError::unavailable(msg),
            DocStoreError::BadQuery(msg) => DbError::invalid_argument(msg),
            other => DbError::backend(other.to_string()),
        }
    }
}
