//! Error types for the catalog workspace.
//!
//! Library crates use [`CatalogError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Maximum number of characters of an upstream body kept for diagnostics.
const MAX_DIAGNOSTIC_BODY: usize = 2_000;

/// Top-level error type for all catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to an upstream provider.
    #[error("network error: {0}")]
    Network(String),

    /// Upstream payload parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The constrained generation call failed or returned nothing extractable.
    ///
    /// `status` is absent for transport failures and deadline misses.
    #[error("generation failed: {reason}{}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    GenerationFailed {
        status: Option<u16>,
        body: String,
        reason: String,
    },

    /// Shared-secret check rejected the caller.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, invalid record, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
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

    /// Create a generation failure, truncating the upstream body.
    pub fn generation(status: Option<u16>, body: &str, reason: impl Into<String>) -> Self {
        Self::GenerationFailed {
            status,
            body: truncate_body(body),
            reason: reason.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Upstream HTTP status carried by a generation failure, if any.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::GenerationFailed { status, .. } => *status,
            _ => None,
        }
    }
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_DIAGNOSTIC_BODY) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
