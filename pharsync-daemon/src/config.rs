use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::DaemonError;
use crate::scheduler::Backoff;

pub const DEFAULT_MOUNT_PATH: &str = "/mnt/plugins";
pub const MOUNT_PATH_ENV: &str = "PHARSYNC_MOUNT_PATH";
pub const STORE_DIR_ENV: &str = "PHARSYNC_STORE_DIR";

/// `~/.pharsync/store` for a given home directory.
pub fn default_store_root(home: &Path) -> PathBuf {
    home.join(".pharsync").join("store")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

/// Everything the runtime needs, resolved by the CLI before startup.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Root under which `<namespace>/<name>.phar` artifacts live.
    pub mount_root: PathBuf,
    /// Root of the file-backed desired-state store.
    pub store_root: PathBuf,
    pub sync_backoff: Backoff,
    pub log_format: LogFormat,
    pub verbose: bool,
}

impl DaemonConfig {
    pub fn new(mount_root: impl Into<PathBuf>, store_root: impl Into<PathBuf>) -> Self {
        Self {
            mount_root: mount_root.into(),
            store_root: store_root.into(),
            sync_backoff: Backoff::default(),
            log_format: LogFormat::default(),
            verbose: false,
        }
    }

    /// The mount root must already exist and be a directory. The store root
    /// is created on demand and is not checked here.
    pub fn validate(&self) -> Result<(), DaemonError> {
        match std::fs::metadata(&self.mount_root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(DaemonError::Config(format!(
                "mount path {} is not a directory",
                self.mount_root.display()
            ))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(DaemonError::Config(format!(
                    "mount path {} does not exist",
                    self.mount_root.display()
                )))
            }
            Err(err) => Err(DaemonError::Io {
                path: self.mount_root.clone(),
                source: err,
            }),
        }
    }
}
