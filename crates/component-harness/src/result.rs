//! Result and error types for component harnesses.

use thiserror::Error;

use crate::backend::NodeRef;

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur while locating or driving components.
///
/// None of these are retried by the framework. Retrying is left to the
/// test author.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A required query matched zero candidates
    #[error("Failed to find element matching {query} within {scope}")]
    HarnessNotFound {
        /// Description of the query (selector and predicate units)
        query: String,
        /// Description of the scope the query ran in
        scope: String,
    },

    /// An exactly-one query matched several candidates
    #[error("Expected exactly one match for {query} but found {count}: [{}]", .matches.join(", "))]
    AmbiguousMatch {
        /// Description of the query
        query: String,
        /// Number of candidates that matched
        count: usize,
        /// Short description of every match
        matches: Vec<String>,
    },

    /// The element behind a handle was removed from the rendered tree
    #[error("Element found with selector '{selector}' is no longer attached to the rendered tree")]
    StaleElement {
        /// Selector the handle was originally located with
        selector: String,
    },

    /// The backend could not reach quiescence within its bound
    #[error("{backend} did not stabilize after {cycles} cycles ({pending} tasks still pending)")]
    StabilityTimeout {
        /// Backend name
        backend: String,
        /// Pump cycles (or elapsed milliseconds for timed backends) spent
        cycles: u64,
        /// Pending work left when giving up
        pending: usize,
    },

    /// Raw backend report that a node is gone; element handles translate
    /// this into [`HarnessError::StaleElement`]
    #[error("Node {node} is detached")]
    NodeDetached {
        /// The detached node
        node: NodeRef,
    },

    /// Selector could not be parsed by the backend
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector {
        /// The offending selector
        selector: String,
        /// Parser message
        message: String,
    },

    /// Filter options for a harness were rejected
    #[error("Invalid filters for {harness}: {message}")]
    InvalidFilters {
        /// Harness type name
        harness: String,
        /// Error message
        message: String,
    },

    /// Backend-specific failure (protocol error, evaluation failure)
    #[error("{backend} backend error: {message}")]
    Backend {
        /// Backend name
        backend: String,
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// Create a backend error
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error reports a missing match
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::HarnessNotFound { .. })
    }

    /// Whether this error reports a stale element
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::StaleElement { .. })
    }
}
