//! Error types for pharsync-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Identity;

/// Rejected `<namespace>/<name>` input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity must have the form <namespace>/<name>, got '{0}'")]
    Malformed(String),

    /// A namespace or name that cannot be used as a single path segment.
    #[error("invalid identity segment '{0}'")]
    InvalidSegment(String),
}

/// All errors that can arise from desired-state store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse plugin resource at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("plugin {0} not found")]
    NotFound(Identity),

    #[error("plugin {0} already exists")]
    AlreadyExists(Identity),

    /// Optimistic write lost against a concurrent writer.
    #[error("plugin {identity} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        identity: Identity,
        expected: u64,
        found: u64,
    },

    #[error(transparent)]
    InvalidIdentity(#[from] IdentityError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
