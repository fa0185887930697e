//! # Table Store Errors

use thiserror::Error;

use super::term::EvalError;
use crate::error::DbError;

/// Result type for table store operations
pub type TableStoreResult<T> = Result<T, TableStoreError>;

/// Errors reported by the table store engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableStoreError {
    // ==================
    // Connection Errors
    // ==================
    /// Could not reach the server
    #[error("Could not connect to {0}")]
    Connection(String),

    // ==================
    // Op Errors
    // ==================
    /// Table already exists
    #[error("Table `{0}` already exists")]
    TableExists(String),

    /// Table does not exist
    #[error("Table `{0}` does not exist")]
    TableNotFound(String),

    /// Secondary index already exists
    #[error("Index `{index}` already exists on table `{table}`")]
    IndexExists { table: String, index: String },

    /// Secondary index does not exist
    #[error("Index `{index}` was not found on table `{table}`")]
    IndexNotFound { table: String, index: String },

    /// Primary key already present
    #[error("Duplicate primary key `id`: {0}")]
    DuplicateKey(String),

    // ==================
    // Query Errors
    // ==================
    /// Term could not be evaluated
    #[error("{0}")]
    Query(String),
}

impl TableStoreError {
    /// Returns true for "already exists" failures on create
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            TableStoreError::TableExists(_) | TableStoreError::IndexExists { .. }
        )
    }

    /// Error class name, in the style of the engine's error responses
    pub fn class(&self) -> &'static str {
        match self {
            TableStoreError::Connection(_) => "ReqlDriverError",
            TableStoreError::TableExists(_)
            | TableStoreError::TableNotFound(_)
            | TableStoreError::IndexExists { .. }
            | TableStoreError::IndexNotFound { .. } => "ReqlOpFailedError",
            TableStoreError::DuplicateKey(_) => "ReqlOpIndeterminateError",
            TableStoreError::Query(_) => "ReqlQueryLogicError",
        }
    }
}

impl From<EvalError> for TableStoreError {
    fn from(e: EvalError) -> Self {
        TableStoreError::Query(e.to_string())
    }
}

impl From<TableStoreError> for DbError {
    fn from(e: TableStoreError) -> Self {
        match e {
            TableStoreError::Connection(msg) => DbError::unavailable(msg),
            other => DbError::backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists() {
        assert!(TableStoreError::TableExists("t".into()).is_already_exists());
        assert!(TableStoreError::IndexExists {
            table: "t".into(),
            index: "a+b".into()
        }
        .is_already_exists());
        assert!(!TableStoreError::TableNotFound("t".into()).is_already_exists());
    }

    #[test]
    fn test_into_db_error() {
        let err: DbError = TableStoreError::Connection("localhost:28015".into()).into();
        assert!(err.is_unavailable());

        let err: DbError = TableStoreError::Query("bad".into()).into();
        assert_eq!(err, DbError::Backend("bad".into()));
        assert_eq!(TableStoreError::Query("x".into()).class(), "ReqlQueryLogicError");
    }
}
