//! Error types for pharsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use pharsync_core::StoreError;

/// Every way reconciling a single identity can abort.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the desired-state store other than "not found".
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Connection, timeout, or body-read failure.
    #[error("HTTP request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP request to {url} failed with status code {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("invalid plugin source: neither inline data nor an HTTP URL is set")]
    InvalidSource,

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
