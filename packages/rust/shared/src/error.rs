//! Error types for SiteQuery.
//!
//! Library crates use [`SiteQueryError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all SiteQuery operations.
#[derive(Debug, thiserror::Error)]
pub enum SiteQueryError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure (connect, DNS, reset, body read).
    #[error("network error: {0}")]
    Network(String),

    /// A request exceeded its per-request timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// HTML/JSON parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// An extraction adapter failed on a page.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (block below quality threshold, bad input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SiteQueryError>;

impl SiteQueryError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a failed fetch may succeed if attempted again.
    ///
    /// Only transport errors and timeouts qualify; HTTP statuses never do.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SiteQueryError::config("page_budget must be between 1 and 100");
        assert_eq!(
            err.to_string(),
            "config error: page_budget must be between 1 and 100"
        );

        let err = SiteQueryError::HttpStatus {
            url: "https://example.com/a".into(),
            status: 503,
        };
        assert_eq!(err.to_string(), "HTTP 503 for https://example.com/a");
    }

    #[test]
    fn only_transport_errors_are_transient() {
        assert!(SiteQueryError::Network("connection reset".into()).is_transient());
        assert!(SiteQueryError::Timeout("10s elapsed".into()).is_transient());
        assert!(
            !SiteQueryError::HttpStatus {
                url: "https://example.com".into(),
                status: 500
            }
            .is_transient()
        );
        assert!(!SiteQueryError::parse("bad html").is_transient());
    }
}
