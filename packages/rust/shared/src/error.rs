//! Error types for newsmirror.
//!
//! Library crates use [`NewsMirrorError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all newsmirror operations.
#[derive(Debug, thiserror::Error)]
pub enum NewsMirrorError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The remote source could not be reached, timed out, answered with a
    /// non-success status, or returned an unusable body.
    #[error("upstream unavailable ({url}): {message}")]
    UpstreamUnavailable { url: String, message: String },

    /// Decoding error for stored documents or remote payloads.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or batch commit error.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A dataset name that does not map to a known ranking/collection.
    #[error("invalid dataset name '{name}': expected 'jobs' or 'stories'")]
    InvalidDatasetName { name: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NewsMirrorError>;

impl NewsMirrorError {
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

    /// Create an upstream error for the given URL.
    pub fn upstream(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            url: url.into(),
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
