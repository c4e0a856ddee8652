use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, scheduler and watcher.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("store error: {0}")]
    Store(#[from] pharsync_core::StoreError),

    #[error("sync error: {0}")]
    Sync(#[from] pharsync_sync::SyncError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{task} task join failure: {reason}")]
    Join { task: &'static str, reason: String },

    #[error("signal handler failed: {0}")]
    Signal(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
