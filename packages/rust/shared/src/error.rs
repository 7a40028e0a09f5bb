//! Error types for Localvore.
//!
//! Library crates use [`LocalvoreError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Localvore operations.
#[derive(Debug, thiserror::Error)]
pub enum LocalvoreError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while scraping or downloading datasets.
    #[error("network error: {0}")]
    Network(String),

    /// HTML, JSON or word-vector parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid input (unknown collection, bad parameters, dimension mismatch).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A query matched nothing.
    #[error("not found: {message}")]
    NotFound { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LocalvoreError>;

impl LocalvoreError {
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

    /// Create a not-found error from any displayable message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
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
        let err = LocalvoreError::config("missing database path");
        assert_eq!(err.to_string(), "config error: missing database path");

        let err = LocalvoreError::not_found("no matching recipes");
        assert!(err.to_string().contains("no matching recipes"));

        let err = LocalvoreError::validation("collection 'XX' is empty");
        assert!(err.to_string().starts_with("validation error"));
    }
}
