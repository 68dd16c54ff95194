//! Error types for pagewise.
//!
//! Library crates use [`PagewiseError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pagewise operations.
#[derive(Debug, thiserror::Error)]
pub enum PagewiseError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error that is not attributable to a specific backend.
    #[error("network error: {0}")]
    Network(String),

    /// Embedding backend error (request, response shape, dimensions).
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Similarity index construction or query error.
    #[error("index error: {0}")]
    Index(String),

    /// Generative model backend error (request, auth, quota, empty reply).
    #[error("model error: {0}")]
    Model(String),

    /// Broken-link probing error.
    #[error("link check error: {0}")]
    LinkCheck(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (duplicate ids, invalid values, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Malformed upstream scrape payload.
    #[error("input error: {message}")]
    Input { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PagewiseError>;

impl PagewiseError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an upstream-input error from any displayable message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PagewiseError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = PagewiseError::input("scraper reported: timeout");
        assert!(err.to_string().starts_with("input error:"));

        let err = PagewiseError::Model("HTTP 429 Too Many Requests".into());
        assert!(err.to_string().contains("429"));
    }
}
