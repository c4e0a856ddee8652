//! Reconciliation of a single identity.
//!
//! ## `reconcile` decision protocol
//!
//! 1. Resolve the artifact path (creating the namespace directory).
//! 2. Fetch the resource. Not found → remove the local artifact and stop.
//! 3. Hash base = declared URL for HTTP sources, empty otherwise.
//! 4. Artifact present and `expectedChecksum` set → checksum the file; a
//!    match is a no-op (no network, no store write).
//! 5. Download, overwriting the artifact.
//! 6. Checksum the new artifact; write it back to the store if it differs
//!    from the recorded value. Conflicts are dropped, never retried.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use pharsync_core::{DesiredStateStore, Identity, PluginResource};

use crate::checksum::checksum_file;
use crate::download::Downloader;
use crate::error::{io_err, SyncError};
use crate::paths::PathResolver;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to the store's `expectedChecksum` after a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWrite {
    /// The new checksum was written back.
    Recorded,
    /// The store already held this checksum; nothing was written.
    AlreadyCurrent,
    /// Another writer advanced the resource first. Not retried.
    Conflict,
    /// The write-back failed; the next reconcile will try again.
    Failed,
}

/// Result of one successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local artifact already matches the recorded checksum.
    Unchanged,
    /// Artifact (re)materialized from its source.
    Downloaded { checksum: u32, status: StatusWrite },
    /// Resource is gone and its artifact was removed.
    Deleted,
    /// Resource is gone and there was no artifact to remove.
    Absent,
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Unchanged => "unchanged",
            SyncOutcome::Downloaded { .. } => "downloaded",
            SyncOutcome::Deleted => "deleted",
            SyncOutcome::Absent => "absent",
        }
    }
}

// ---------------------------------------------------------------------------
// ArtifactSyncer
// ---------------------------------------------------------------------------

/// Reconciles identities against the store. Cheap to clone; every reconcile
/// task of a batch holds its own handle.
#[derive(Clone)]
pub struct ArtifactSyncer {
    store: Arc<dyn DesiredStateStore>,
    paths: PathResolver,
    downloader: Downloader,
}

impl ArtifactSyncer {
    pub fn new(
        store: Arc<dyn DesiredStateStore>,
        paths: PathResolver,
        downloader: Downloader,
    ) -> Self {
        Self {
            store,
            paths,
            downloader,
        }
    }

    pub fn store(&self) -> &Arc<dyn DesiredStateStore> {
        &self.store
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    pub async fn reconcile(&self, identity: &Identity) -> Result<SyncOutcome, SyncError> {
        let path = self.paths.resolve(identity).await;

        let resource = match self.store.get(identity).await {
            Ok(resource) => resource,
            Err(err) if err.is_not_found() => return remove_artifact(identity, &path).await,
            Err(err) => return Err(err.into()),
        };

        let hash_base = resource.spec.source.hash_base();

        if let Some(expected) = resource.status.expected_checksum {
            if artifact_exists(&path).await {
                match checksum_file(hash_base, &path).await {
                    Ok(actual) if actual == expected => {
                        tracing::debug!(identity = %identity, checksum = actual, "checksum matches, skipping");
                        return Ok(SyncOutcome::Unchanged);
                    }
                    Ok(actual) => {
                        tracing::debug!(
                            identity = %identity,
                            expected,
                            actual,
                            "checksum mismatch, re-downloading",
                        );
                    }
                    Err(err) => {
                        tracing::warn!(
                            identity = %identity,
                            error = %err,
                            "cannot calculate checksum, re-downloading",
                        );
                    }
                }
            }
        }

        self.downloader
            .download(&resource.spec.source, &path)
            .await?;

        let checksum = checksum_file(hash_base, &path).await?;
        let status = self.record_checksum(resource, checksum).await;
        tracing::info!(identity = %identity, checksum, status = ?status, "plugin downloaded");
        Ok(SyncOutcome::Downloaded { checksum, status })
    }

    async fn record_checksum(&self, mut resource: PluginResource, checksum: u32) -> StatusWrite {
        if resource.status.expected_checksum == Some(checksum) {
            return StatusWrite::AlreadyCurrent;
        }

        resource.status.expected_checksum = Some(checksum);
        match self.store.update(&resource).await {
            Ok(_) => StatusWrite::Recorded,
            // The resource may have changed underneath us; the next event for this
            // identity reconciles against the new version.
            Err(err) if err.is_conflict() => {
                tracing::debug!(identity = %resource.identity(), "status update conflicted, dropping");
                StatusWrite::Conflict
            }
            Err(err) => {
                tracing::error!(identity = %resource.identity(), error = %err, "cannot update plugin status");
                StatusWrite::Failed
            }
        }
    }
}

async fn remove_artifact(identity: &Identity, path: &Path) -> Result<SyncOutcome, SyncError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::info!(identity = %identity, path = %path.display(), "removed deleted plugin");
            Ok(SyncOutcome::Deleted)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(SyncOutcome::Absent),
        Err(err) => Err(io_err(path, err)),
    }
}

/// A stat failure other than "not found" is logged and treated as absent.
async fn artifact_exists(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(_) => true,
        Err(err) if err.kind() == ErrorKind::NotFound => false,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "cannot stat plugin file");
            false
        }
    }
}
