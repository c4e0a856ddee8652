//! Identity → artifact location under the mount root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use pharsync_core::Identity;

pub const ARTIFACT_EXT: &str = "phar";

/// Maps identities to `<mount_root>/<namespace>/<name>.phar`.
#[derive(Debug, Clone)]
pub struct PathResolver {
    mount_root: PathBuf,
}

impl PathResolver {
    pub fn new(mount_root: impl Into<PathBuf>) -> Self {
        Self {
            mount_root: mount_root.into(),
        }
    }

    pub fn mount_root(&self) -> &Path {
        &self.mount_root
    }

    /// Pure path computation, no I/O.
    pub fn artifact_path(&self, identity: &Identity) -> PathBuf {
        self.mount_root
            .join(&identity.namespace)
            .join(format!("{}.{ARTIFACT_EXT}", identity.name))
    }

    /// Like [`artifact_path`](Self::artifact_path), but first creates the
    /// namespace directory (mode 0755) if it is missing.
    ///
    /// A creation failure is logged and the directory is assumed usable; any
    /// real problem resurfaces from the following file operation.
    pub async fn resolve(&self, identity: &Identity) -> PathBuf {
        let namespace_dir = self.mount_root.join(&identity.namespace);

        let mut builder = tokio::fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(0o755);
        match builder.create(&namespace_dir).await {
            Ok(()) => {
                tracing::debug!(path = %namespace_dir.display(), "created namespace directory");
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => {
                tracing::error!(
                    path = %namespace_dir.display(),
                    error = %err,
                    "error creating namespace directory",
                );
            }
        }

        self.artifact_path(identity)
    }
}
