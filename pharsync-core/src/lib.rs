//! pharsync core library: plugin resource model, desired-state store contract,
//! and the file-backed store used by the CLI and daemon.
//!
//! - [`types`]: identities and the `PluginResource` schema
//! - [`error`]: [`StoreError`] and [`IdentityError`]
//! - [`store`]: the [`DesiredStateStore`] trait consumed by the reconciler
//! - [`file_store`]: [`FileStore`], one YAML document per plugin

pub mod error;
pub mod file_store;
pub mod store;
pub mod types;

pub use error::{IdentityError, StoreError};
pub use file_store::FileStore;
pub use store::DesiredStateStore;
pub use types::{
    DependencyPolicy, HttpSource, Identity, PluginResource, PluginSource, PluginSpec,
    PluginStatus, SourceKind,
};
