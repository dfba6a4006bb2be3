// ------------------------------------------------------------
// Error types for the price collector
// ------------------------------------------------------------
//
// Only startup-level failures surface as `CollectorError` to the caller.
// Per-unit failures (timeouts, 429s, dead proxies) are absorbed by the
// market client and end up as an `Unavailable` result instead.
//

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for collector operations
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Catalog file could not be read
    #[error("failed to read catalog {path}: {source}")]
    CatalogIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catalog file is not valid catalog JSON
    #[error("failed to parse catalog {path}: {source}")]
    CatalogParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Catalog parsed but contains no items
    #[error("catalog {0} contains no items")]
    EmptyCatalog(PathBuf),

    /// Existing checkpoint cannot be trusted
    #[error(
        "checkpoint {path} is unreadable ({reason}); rerun with --no-resume to discard it"
    )]
    CheckpointCorrupt { path: PathBuf, reason: String },

    /// Checkpoint could not be written
    #[error("checkpoint I/O error: {0}")]
    CheckpointIo(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Proxy string could not be parsed
    #[error("invalid proxy entry '{0}'")]
    InvalidProxy(String),

    /// HTTP client construction or transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The run was interrupted before the current unit finished
    #[error("interrupted")]
    Interrupted,
}

/// Result alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;
