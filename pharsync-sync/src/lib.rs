//! # pharsync-sync
//!
//! Per-identity reconciliation of plugin artifacts.
//!
//! [`ArtifactSyncer::reconcile`] decides between skip, download and delete
//! for one identity, using [`PathResolver`] for the on-disk location,
//! [`Downloader`] to materialize the bytes and [`checksum`] to detect drift.

pub mod checksum;
pub mod download;
pub mod error;
pub mod paths;
pub mod syncer;

pub use download::Downloader;
pub use error::SyncError;
pub use paths::PathResolver;
pub use syncer::{ArtifactSyncer, StatusWrite, SyncOutcome};
