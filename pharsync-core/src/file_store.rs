//! File-backed desired-state store.
//!
//! # Storage layout
//!
//! ```text
//! <root>/
//!   <namespace>/            (mode 0700, created on first write)
//!     <name>.yaml           (one PluginResource per file, mode 0600)
//! ```
//!
//! The file location is authoritative for the identity: `namespace`/`name`
//! inside the document are overwritten from the path on load.
//!
//! Writes go through `<name>.yaml.tmp` + rename and are serialized by an
//! internal lock so `update` can compare `resourceVersion` and write without
//! a lost update between the two.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{io_err, StoreError};
use crate::store::DesiredStateStore;
use crate::types::{Identity, PluginResource};

const RESOURCE_EXT: &str = "yaml";

#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // -----------------------------------------------------------------------
    // 1. Path helpers
    // -----------------------------------------------------------------------

    /// `<root>/<namespace>/<name>.yaml`. Pure, no I/O.
    pub fn resource_path(&self, identity: &Identity) -> PathBuf {
        self.root
            .join(&identity.namespace)
            .join(format!("{}.{RESOURCE_EXT}", identity.name))
    }

    /// Inverse of [`resource_path`](Self::resource_path). `None` for anything
    /// that is not exactly `<root>/<ns>/<name>.yaml` (temp files included).
    pub fn identity_for_path(&self, path: &Path) -> Option<Identity> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut components = relative.components();
        let (Some(Component::Normal(namespace)), Some(Component::Normal(file)), None) =
            (components.next(), components.next(), components.next())
        else {
            return None;
        };

        let file = Path::new(file);
        if file.extension().and_then(|ext| ext.to_str()) != Some(RESOURCE_EXT) {
            return None;
        }
        let identity = Identity::new(
            namespace.to_str()?,
            file.file_stem().and_then(|stem| stem.to_str())?,
        );
        identity.validate().ok()?;
        Some(identity)
    }

    // -----------------------------------------------------------------------
    // 2. Load
    // -----------------------------------------------------------------------

    async fn load(&self, identity: &Identity) -> Result<PluginResource, StoreError> {
        let path = self.resource_path(identity);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(identity.clone()));
            }
            Err(err) => return Err(io_err(&path, err)),
        };
        let mut resource: PluginResource = serde_yaml::from_str(&contents)
            .map_err(|source| StoreError::Parse { path, source })?;
        resource.namespace = identity.namespace.clone();
        resource.name = identity.name.clone();
        Ok(resource)
    }

    // -----------------------------------------------------------------------
    // 3. Save (atomic)
    // -----------------------------------------------------------------------

    async fn save(&self, resource: &PluginResource) -> Result<(), StoreError> {
        let identity = resource.identity();
        let dir = self.root.join(&identity.namespace);
        if tokio::fs::metadata(&dir).await.is_err() {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| io_err(&dir, e))?;
            set_dir_permissions(&dir).await?;
        }

        let path = self.resource_path(&identity);
        let tmp = path.with_file_name(format!("{}.{RESOURCE_EXT}.tmp", identity.name));
        let yaml = serde_yaml::to_string(resource)?;
        tokio::fs::write(&tmp, yaml)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        set_file_permissions(&tmp).await?;
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(&path, err));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // 4. Authoring operations (CLI side)
    // -----------------------------------------------------------------------

    /// Declare a new plugin. The stored copy starts at version 1.
    pub async fn create(&self, mut resource: PluginResource) -> Result<PluginResource, StoreError> {
        let identity = resource.identity();
        identity.validate()?;

        let _guard = self.write_lock.lock().await;
        if tokio::fs::metadata(self.resource_path(&identity)).await.is_ok() {
            return Err(StoreError::AlreadyExists(identity));
        }

        let now = Utc::now();
        resource.resource_version = 1;
        resource.created_at = now;
        resource.updated_at = now;
        self.save(&resource).await?;
        tracing::debug!(identity = %identity, "created plugin resource");
        Ok(resource)
    }

    pub async fn delete(&self, identity: &Identity) -> Result<(), StoreError> {
        identity.validate()?;
        let _guard = self.write_lock.lock().await;
        let path = self.resource_path(identity);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(identity = %identity, "deleted plugin resource");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(identity.clone()))
            }
            Err(err) => Err(io_err(&path, err)),
        }
    }
}

#[async_trait]
impl DesiredStateStore for FileStore {
    /// Sorted by namespace, then name. Documents that fail to parse are
    /// logged and left out; `get` still reports them.
    async fn list(&self) -> Result<Vec<PluginResource>, StoreError> {
        let namespaces = match sorted_entries(&self.root).await {
            Ok(entries) => entries,
            Err(StoreError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                return Ok(vec![]);
            }
            Err(err) => return Err(err),
        };

        let mut result = Vec::new();
        for namespace_dir in namespaces {
            let is_dir = tokio::fs::metadata(&namespace_dir)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            for file in sorted_entries(&namespace_dir).await? {
                let Some(identity) = self.identity_for_path(&file) else {
                    continue;
                };
                match self.load(&identity).await {
                    Ok(resource) => result.push(resource),
                    // Removed between read_dir and load.
                    Err(StoreError::NotFound(_)) => continue,
                    Err(StoreError::Parse { path, source }) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %source,
                            "skipping unparseable plugin resource",
                        );
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(result)
    }

    async fn get(&self, identity: &Identity) -> Result<PluginResource, StoreError> {
        identity.validate()?;
        self.load(identity).await
    }

    async fn update(&self, resource: &PluginResource) -> Result<PluginResource, StoreError> {
        let identity = resource.identity();
        identity.validate()?;

        let _guard = self.write_lock.lock().await;
        let current = self.load(&identity).await?;
        if current.resource_version != resource.resource_version {
            return Err(StoreError::Conflict {
                identity,
                expected: resource.resource_version,
                found: current.resource_version,
            });
        }

        let mut next = resource.clone();
        next.resource_version = current.resource_version + 1;
        next.created_at = current.created_at;
        next.updated_at = Utc::now();
        self.save(&next).await?;
        Ok(next)
    }

    async fn has_synced(&self) -> bool {
        tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

async fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| io_err(dir, e))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(dir, e))? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

#[cfg(unix)]
async fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .await
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
async fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
async fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
async fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
