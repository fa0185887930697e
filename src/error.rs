//! Crate Error Types
//!
//! Unified error handling for query building, compilation and adapters.

use thiserror::Error;

/// Crate result type
pub type DbResult<T> = Result<T, DbError>;

/// Crate error type
///
/// Cloneable so a single failure can be observed by every waiter of a
/// shared connection or provisioning future.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// Malformed input detected before any I/O
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Collection or model used before it was provisioned/bound
    #[error("Not registered: {0}")]
    NotRegistered(String),

    /// Single record targeted by id does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Connection or transport failure
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Any other failure reported by the storage engine
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DbError {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a not registered error
    pub fn not_registered(what: impl Into<String>) -> Self {
        Self::NotRegistered(what.into())
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a backend unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Create a generic backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Stable error code for logs and callers
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "PLUG_INVALID_ARGUMENT",
            Self::NotRegistered(_) => "PLUG_NOT_REGISTERED",
            Self::NotFound(_) => "PLUG_NOT_FOUND",
            Self::BackendUnavailable(_) => "PLUG_BACKEND_UNAVAILABLE",
            Self::Backend(_) => "PLUG_BACKEND_ERROR",
        }
    }

    /// Returns true if this error came from the transport layer
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(DbError::invalid_argument("x").code(), "PLUG_INVALID_ARGUMENT");
        assert_eq!(DbError::not_registered("users").code(), "PLUG_NOT_REGISTERED");
        assert_eq!(DbError::unavailable("down").code(), "PLUG_BACKEND_UNAVAILABLE");
    }

    #[test]
    fn test_error_display() {
        let err = DbError::not_registered("users");
        assert_eq!(err.to_string(), "Not registered: users");
        assert!(DbError::unavailable("refused").is_unavailable());
        assert!(!DbError::backend("boom").is_unavailable());
    }
}
