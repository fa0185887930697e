//! Observable adapter events
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable events emitted by adapters and compilers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Connection lifecycle
    /// Connection task started
    ConnectBegin,
    /// Connection established and shared
    ConnectReady,
    /// Connection failed or timed out
    ConnectFailed,

    // Provisioning
    /// Collection/table created or found
    CollectionReady,
    /// Concurrent create lost the race, "already exists" swallowed
    CollectionCreateRaced,
    /// Provisioning failed
    CollectionFailed,

    // Indexes
    /// Index registered and built
    IndexCreated,
    /// Index already existed, duplicate creation swallowed
    IndexExists,

    // Query compilation
    /// Query compiled into a native cursor/selection
    QueryCompiled,
    /// Equality filter rewritten into an index scan
    IndexRewrite,
    /// Sort served from an index order
    IndexOrder,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConnectBegin => "CONNECT_BEGIN",
            Event::ConnectReady => "CONNECT_READY",
            Event::ConnectFailed => "CONNECT_FAILED",
            Event::CollectionReady => "COLLECTION_READY",
            Event::CollectionCreateRaced => "COLLECTION_CREATE_RACED",
            Event::CollectionFailed => "COLLECTION_FAILED",
            Event::IndexCreated => "INDEX_CREATED",
            Event::IndexExists => "INDEX_EXISTS",
            Event::QueryCompiled => "QUERY_COMPILED",
            Event::IndexRewrite => "INDEX_REWRITE",
            Event::IndexOrder => "INDEX_ORDER",
        }
    }

    /// Default severity used when logging this event
    pub fn severity(&self) -> Severity {
        match self {
            Event::ConnectFailed | Event::CollectionFailed => Severity::Error,
            Event::CollectionCreateRaced | Event::IndexExists => Severity::Warn,
            Event::QueryCompiled | Event::IndexRewrite | Event::IndexOrder => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
