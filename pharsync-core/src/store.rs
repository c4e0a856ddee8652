//! The desired-state store contract consumed by the reconciler.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Identity, PluginResource};

/// System of record for plugin specs and observed status.
///
/// Implementations must be safe to share between the concurrent reconcile
/// tasks of one batch. Change notifications are not part of this trait; the
/// watch side feeds identities into the daemon's coalescer directly.
#[async_trait]
pub trait DesiredStateStore: Send + Sync {
    /// Every currently declared plugin.
    async fn list(&self) -> Result<Vec<PluginResource>, StoreError>;

    /// Returns [`StoreError::NotFound`] once the plugin has been deleted.
    async fn get(&self, identity: &Identity) -> Result<PluginResource, StoreError>;

    /// Optimistic write keyed on `resource.resource_version`.
    ///
    /// Returns [`StoreError::Conflict`] when another writer got there first.
    async fn update(&self, resource: &PluginResource) -> Result<PluginResource, StoreError>;

    /// Whether the store has finished its initial load and can be listed.
    async fn has_synced(&self) -> bool;
}
