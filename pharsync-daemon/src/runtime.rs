use std::fs;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;

use pharsync_core::FileStore;
use pharsync_sync::{ArtifactSyncer, Downloader, PathResolver};

use crate::coalescer;
use crate::config::{DaemonConfig, LogFormat};
use crate::error::{io_err, DaemonError};
use crate::scheduler::{BatchReport, ReconcileScheduler};
use crate::watcher::StoreWatcher;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<(), DaemonError> {
    init_tracing(config.verbose, config.log_format);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon until SIGINT or SIGTERM, a fatal scheduler error, or the
/// watcher stopping.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    config.validate()?;
    let store = Arc::new(open_store(&config.store_root)?);
    let scheduler = ReconcileScheduler::new(build_syncer(&config, store.clone())?, config.sync_backoff);
    tracing::info!(
        mount_root = %config.mount_root.display(),
        store_root = %store.root().display(),
        "starting plugin reconciler",
    );

    let (notifier, coalescer) = coalescer::channel();
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let signals = ShutdownSignals::install()?;
    // Registered before the scheduler lists the store, so no change falls
    // between the initial pass and the first event.
    let watcher = StoreWatcher::start(store.clone())?;

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = watcher.run(notifier, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = scheduler.run(coalescer, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok::<(), DaemonError>(()),
                signal = signals.recv() => {
                    let name = signal?;
                    tracing::info!(signal = name, "received {name}, shutting down after the current batch");
                    let _ = shutdown.send(());
                    Ok(())
                }
            }
        })
    };

    let (watcher_result, scheduler_result, signal_result) =
        tokio::join!(watcher_handle, scheduler_handle, signal_handle);

    handle_join("scheduler", scheduler_result)?;
    handle_join("watcher", watcher_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("plugin reconciler stopped");
    Ok(())
}

/// SIGINT and SIGTERM listeners, registered up front so a signal that
/// arrives during startup is not lost.
struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    #[cfg(unix)]
    fn install() -> Result<Self, DaemonError> {
        use tokio::signal::unix::{signal, SignalKind};

        let listen = |kind| signal(kind).map_err(|e| DaemonError::Signal(e.to_string()));
        Ok(Self {
            interrupt: listen(SignalKind::interrupt())?,
            terminate: listen(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    fn install() -> Result<Self, DaemonError> {
        Ok(Self {})
    }

    /// Resolves with the name of the first signal received.
    #[cfg(unix)]
    async fn recv(mut self) -> Result<&'static str, DaemonError> {
        tokio::select! {
            _ = self.interrupt.recv() => Ok("SIGINT"),
            _ = self.terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    async fn recv(self) -> Result<&'static str, DaemonError> {
        tokio::signal::ctrl_c()
            .await
            .map(|()| "ctrl-c")
            .map_err(|e| DaemonError::Signal(e.to_string()))
    }
}

/// One readiness wait plus one full pass, without watching for changes.
pub async fn reconcile_once(config: &DaemonConfig) -> Result<BatchReport, DaemonError> {
    config.validate()?;
    let store = Arc::new(open_store(&config.store_root)?);
    let scheduler = ReconcileScheduler::new(build_syncer(config, store)?, config.sync_backoff);
    if !scheduler.wait_for_sync().await {
        tracing::warn!("store did not report synced, reconciling anyway");
    }
    scheduler.reconcile_initial().await
}

/// Creates the store root if needed and opens it by its canonical path, so
/// watcher event paths line up with the store's own layout.
fn open_store(root: &Path) -> Result<FileStore, DaemonError> {
    fs::create_dir_all(root).map_err(|e| io_err(root, e))?;
    let canonical = fs::canonicalize(root).map_err(|e| io_err(root, e))?;
    Ok(FileStore::new(canonical))
}

fn build_syncer(config: &DaemonConfig, store: Arc<FileStore>) -> Result<ArtifactSyncer, DaemonError> {
    Ok(ArtifactSyncer::new(
        store,
        PathResolver::new(&config.mount_root),
        Downloader::new()?,
    ))
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join {
            task,
            reason: err.to_string(),
        }),
    }
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
