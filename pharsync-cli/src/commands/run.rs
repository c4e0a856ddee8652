//! `pharsync run` and `pharsync reconcile`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use pharsync_daemon::config::{DEFAULT_MOUNT_PATH, MOUNT_PATH_ENV};
use pharsync_daemon::{init_tracing, reconcile_once, start_blocking, DaemonConfig, LogFormat};

use super::{block_on, StoreArgs};

#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Directory under which `<namespace>/<name>.phar` files are kept. Must exist.
    #[arg(long, env = MOUNT_PATH_ENV, default_value = DEFAULT_MOUNT_PATH, value_name = "DIR")]
    pub mount_path: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Log at debug level (RUST_LOG still takes precedence).
    #[arg(short, long)]
    pub verbose: bool,

    /// Log output format: text | json.
    #[arg(long, default_value_t = LogFormat::Text, value_name = "FORMAT")]
    pub log_format: LogFormat,
}

impl DaemonArgs {
    fn config(&self) -> Result<DaemonConfig> {
        let mut config = DaemonConfig::new(&self.mount_path, self.store.resolve()?);
        config.verbose = self.verbose;
        config.log_format = self.log_format;
        Ok(config)
    }
}

pub fn run(args: DaemonArgs) -> Result<()> {
    let config = args.config()?;
    start_blocking(config).context("reconciler exited with error")
}

pub fn reconcile(args: DaemonArgs) -> Result<()> {
    let config = args.config()?;
    init_tracing(config.verbose, config.log_format);

    let report = block_on(reconcile_once(&config))?.context("reconciliation failed")?;

    println!(
        "Reconciled {} plugins in {}ms: {} downloaded, {} unchanged, {} deleted, {} absent",
        report.total(),
        report.duration.as_millis(),
        report.downloaded,
        report.unchanged,
        report.deleted,
        report.absent,
    );
    if report.failed > 0 {
        println!(
            "{}",
            format!("{} plugins failed; see the log for details", report.failed).red()
        );
    }
    if report.status_failures > 0 {
        println!(
            "{}",
            format!(
                "{} checksums could not be recorded and will be retried",
                report.status_failures
            )
            .yellow()
        );
    }
    Ok(())
}
