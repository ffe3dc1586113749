//! Result and error types for Atento.

use thiserror::Error;

/// Result type for Atento operations
pub type AtentoResult<T> = Result<T, AtentoError>;

/// Errors that can occur while driving a page.
///
/// Soft timeouts never appear here: best-effort waits report them through
/// [`crate::WaitOutcome`] and [`crate::Readiness`] instead.
#[derive(Debug, Error)]
pub enum AtentoError {
    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Page error reported by the driver
    #[error("Page error: {message}")]
    Page {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// A driver operation exceeded its per-call timeout
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// A precondition element never appeared or became visible
    #[error("Required element '{descriptor}' not available after {elapsed_ms}ms")]
    RequiredElementTimeout {
        /// Descriptor name
        descriptor: String,
        /// Time spent waiting
        elapsed_ms: u64,
    },

    /// Extracted content did not match the expectation
    #[error("{context}: expected {expected}, got {actual}")]
    AssertionMismatch {
        /// What was being checked
        context: String,
        /// Expected value or pattern
        expected: String,
        /// Last observed value
        actual: String,
    },

    /// A collection that must not be empty resolved to nothing
    #[error("No elements matched '{descriptor}'")]
    EmptyResult {
        /// Descriptor name
        descriptor: String,
    },

    /// A descriptor failed validation
    #[error("Invalid descriptor '{descriptor}': {message}")]
    InvalidDescriptor {
        /// Descriptor name
        descriptor: String,
        /// Error message
        message: String,
    },

    /// A CSS selector or text pattern could not be parsed
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector {
        /// Offending selector or pattern
        selector: String,
        /// Error message
        message: String,
    },

    /// A node reference outlived the document it was taken from
    #[error("Stale element reference (document {document}, node {index})")]
    StaleElement {
        /// Document generation of the reference
        document: u64,
        /// Node index within that document
        index: usize,
    },

    /// The element does not support the requested action
    #[error("Cannot {action} element: {message}")]
    Interaction {
        /// Action attempted
        action: String,
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// A whole flow exceeded its time budget
    #[error("Flow '{flow}' exceeded its {ms}ms budget")]
    FlowTimeout {
        /// Flow name
        flow: String,
        /// Budget in milliseconds
        ms: u64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl AtentoError {
    /// Create a page error
    #[must_use]
    pub fn page(message: impl Into<String>) -> Self {
        Self::Page {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an assertion mismatch
    #[must_use]
    pub fn mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::AssertionMismatch {
            context: context.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Whether the error came from a node reference outliving its document
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::StaleElement { .. })
    }

    /// Whether the error is a timeout of any kind
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::RequiredElementTimeout { .. } | Self::FlowTimeout { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_required_element_timeout_names_descriptor() {
        let err = AtentoError::RequiredElementTimeout {
            descriptor: "password input".to_string(),
            elapsed_ms: 5000,
        };
        let text = err.to_string();
        assert!(text.contains("password input"));
        assert!(text.contains("5000ms"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_mismatch_shows_expected_and_actual() {
        let err = AtentoError::mismatch("error region", "/too long/", "Something's missing");
        let text = err.to_string();
        assert!(text.contains("expected /too long/"));
        assert!(text.contains("got Something's missing"));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_stale_detection() {
        let err = AtentoError::StaleElement {
            document: 2,
            index: 7,
        };
        assert!(err.is_stale());
        assert!(!AtentoError::page("boom").is_stale());
    }

    #[test]
    fn test_yaml_conversion() {
        let yaml_err = serde_yaml_ng::from_str::<u32>("[").unwrap_err();
        let err: AtentoError = yaml_err.into();
        assert!(err.to_string().starts_with("YAML error"));
    }
}
