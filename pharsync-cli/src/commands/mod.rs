pub mod plugin;
pub mod run;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use pharsync_core::FileStore;
use pharsync_daemon::config::{default_store_root, STORE_DIR_ENV};

/// Location of the desired-state store, shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Store directory. Defaults to ~/.pharsync/store.
    #[arg(long = "store-dir", env = STORE_DIR_ENV, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,
}

impl StoreArgs {
    pub fn resolve(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.store_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir().context("could not determine home directory")?;
        Ok(default_store_root(&home))
    }

    pub fn open(&self) -> Result<FileStore> {
        Ok(FileStore::new(self.resolve()?))
    }
}

/// Drives one store future to completion on a single-threaded runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}
