//! Materializes a plugin source at its destination path.
//!
//! Both variants write to `<dest>.pharsync.tmp` (mode 0644) and rename over
//! the destination only once every byte has been written. A failed or
//! truncated transfer therefore leaves the previous artifact untouched and no
//! temp file behind.
//!
//! HTTP sources: one GET, bounded by the source's `timeoutSeconds` (covering
//! connect, headers and body). The response status is validated before the
//! temp file is opened.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use pharsync_core::{HttpSource, PluginSource, SourceKind};

use crate::error::{io_err, SyncError};

const USER_AGENT: &str = concat!("pharsync/", env!("CARGO_PKG_VERSION"));

/// Shared across every reconcile task; cloning is cheap.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new() -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(SyncError::Client)?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn download(&self, source: &PluginSource, dest: &Path) -> Result<(), SyncError> {
        match source.kind() {
            Some(SourceKind::Inline(data)) => write_inline(data, dest).await,
            Some(SourceKind::Http(http)) => self.fetch(http, dest).await,
            None => Err(SyncError::InvalidSource),
        }
    }

    async fn fetch(&self, http: &HttpSource, dest: &Path) -> Result<(), SyncError> {
        let transport = |source: reqwest::Error| SyncError::Transport {
            url: http.url.clone(),
            source,
        };

        let mut response = self
            .client
            .get(&http.url)
            .timeout(http.timeout())
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                url: http.url.clone(),
                status: status.as_u16(),
            });
        }

        let tmp = tmp_path(dest);
        let mut file = create_tmp(&tmp).await?;
        let streamed = async {
            let mut written = 0u64;
            while let Some(chunk) = response.chunk().await.map_err(transport)? {
                file.write_all(&chunk).await.map_err(|e| io_err(&tmp, e))?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(|e| io_err(&tmp, e))?;
            Ok::<_, SyncError>(written)
        }
        .await;
        drop(file);

        let written = commit(&tmp, dest, streamed).await?;
        tracing::debug!(url = %http.url, path = %dest.display(), bytes = written, "downloaded plugin");
        Ok(())
    }
}

async fn write_inline(data: &[u8], dest: &Path) -> Result<(), SyncError> {
    let tmp = tmp_path(dest);
    let mut file = create_tmp(&tmp).await?;
    let written = async {
        file.write_all(data).await.map_err(|e| io_err(&tmp, e))?;
        file.flush().await.map_err(|e| io_err(&tmp, e))?;
        Ok::<_, SyncError>(data.len())
    }
    .await;
    drop(file);

    commit(&tmp, dest, written).await?;
    tracing::debug!(path = %dest.display(), bytes = data.len(), "wrote inline plugin");
    Ok(())
}

/// `<dest>.pharsync.tmp`, a sibling so the rename never crosses filesystems.
pub(crate) fn tmp_path(dest: &Path) -> PathBuf {
    PathBuf::from(format!("{}.pharsync.tmp", dest.display()))
}

async fn create_tmp(tmp: &Path) -> Result<File, SyncError> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o644);
    options.open(tmp).await.map_err(|e| io_err(tmp, e))
}

/// Renames `tmp` over `dest` if `result` is `Ok`; otherwise (or if the rename
/// fails) removes `tmp` and returns the error.
async fn commit<T>(tmp: &Path, dest: &Path, result: Result<T, SyncError>) -> Result<T, SyncError> {
    let value = match result {
        Ok(value) => value,
        Err(err) => {
            let _ = tokio::fs::remove_file(tmp).await;
            return Err(err);
        }
    };
    if let Err(err) = tokio::fs::rename(tmp, dest).await {
        let _ = tokio::fs::remove_file(tmp).await;
        return Err(io_err(dest, err));
    }
    Ok(value)
}
