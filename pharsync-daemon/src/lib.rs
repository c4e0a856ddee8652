//! pharsync daemon: keeps `<mount>/<namespace>/<name>.phar` in line with the
//! desired-state store.
//!
//! - [`coalescer`]: pending-set plus single-slot wake-up
//! - [`scheduler`]: readiness wait, initial pass, serialized batches
//! - `watcher`: store filesystem events into the coalescer
//! - [`config`]: [`DaemonConfig`] and its defaults

pub mod coalescer;
pub mod config;
mod error;
mod runtime;
pub mod scheduler;
mod watcher;

pub use coalescer::{ChangeCoalescer, ChangeNotifier};
pub use config::{DaemonConfig, LogFormat};
pub use error::DaemonError;
pub use runtime::{init_tracing, reconcile_once, run, start_blocking};
pub use scheduler::{Backoff, BatchReport, Phase, ReconcileScheduler};
