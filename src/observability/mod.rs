//! Observability for plugdb
//!
//! Structured JSON logging of adapter lifecycle and compilation events.
//!
//! # Usage
//!
//! ```ignore
//! use plugdb::observability::{log_event, Event};
//!
//! log_event(Event::CollectionReady, &[("collection", "users")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a typed event at its default severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // This just verifies no panic
        log_event(Event::ConnectBegin, &[("backend", "docstore")]);
        log_event(Event::QueryCompiled, &[]);
    }
}
