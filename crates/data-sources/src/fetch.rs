//! Upstream HTTP access.
//!
//! Sources talk to NOMADS through the `Fetcher` trait so tests can serve
//! listings and payloads from memory.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tempfile::{NamedTempFile, TempPath};
use tile_common::{TileError, TileResult};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Result of a HEAD request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Missing,
    Present { size: Option<u64> },
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET a text resource such as a directory listing.
    async fn get_text(&self, url: &str) -> TileResult<String>;

    /// HEAD a resource.
    async fn probe(&self, url: &str) -> TileResult<Probe>;

    /// GET `url` into `dest`, replacing it atomically. Returns bytes written.
    async fn download_to(&self, url: &str, dest: &Path) -> TileResult<u64>;
}

/// `Fetcher` over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    async fn stream_to(&self, url: &str, dest: &Path) -> anyhow::Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {}", response.status()));
        }
        let expected = response.content_length();

        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).await?;
        let (file, temp) = partial_file(dest, dir)
            .with_context(|| format!("Failed to create partial file in {}", dir.display()))?;
        let mut file = fs::File::from_std(file);

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed reading response body")?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        if let Some(expected) = expected {
            if written != expected {
                return Err(anyhow!(
                    "Download size mismatch: expected {} bytes, got {}",
                    expected,
                    written
                ));
            }
        }

        temp.persist(dest)
            .with_context(|| format!("Failed to move download to {}", dest.display()))?;
        Ok(written)
    }
}

/// A `{file}.XXXXXX.partial` sibling of `dest`, unique per transfer and
/// removed on drop unless persisted.
fn partial_file(dest: &Path, dir: &Path) -> std::io::Result<(std::fs::File, TempPath)> {
    let mut prefix = dest.file_name().unwrap_or_default().to_os_string();
    prefix.push(".");
    tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".partial")
        .tempfile_in(dir)
        .map(NamedTempFile::into_parts)
}

fn network(url: &str, err: impl std::fmt::Display) -> TileError {
    TileError::Network(format!("{}: {}", url, err))
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn get_text(&self, url: &str) -> TileResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network(url, e))?;
        if !response.status().is_success() {
            return Err(network(url, response.status()));
        }
        response.text().await.map_err(|e| network(url, e))
    }

    #[instrument(skip(self))]
    async fn probe(&self, url: &str) -> TileResult<Probe> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| network(url, e))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(Probe::Missing),
            status if status.is_success() => {
                let size = response
                    .headers()
                    .get(header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok());
                Ok(Probe::Present { size })
            }
            status => Err(network(url, status)),
        }
    }

    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    async fn download_to(&self, url: &str, dest: &Path) -> TileResult<u64> {
        let bytes = self
            .stream_to(url, dest)
            .await
            .map_err(|e| network(url, format!("{:#}", e)))?;
        info!(url = %url, bytes = bytes, "Download completed");
        Ok(bytes)
    }
}

/// Make `dest` mirror `url`.
///
/// Skips the transfer when the local size already equals the upstream
/// content-length, unless `force` is set. Returns whether bytes moved.
pub async fn sync_file(
    fetcher: &dyn Fetcher,
    url: &str,
    dest: &Path,
    force: bool,
) -> TileResult<bool> {
    if !force {
        let local = fs::metadata(dest).await.ok().map(|m| m.len());
        if let Some(local) = local {
            match fetcher.probe(url).await? {
                Probe::Present { size: Some(remote) } if remote == local => {
                    debug!(path = %dest.display(), size = local, "Local copy up to date");
                    return Ok(false);
                }
                Probe::Missing => {
                    return Err(TileError::DataNotAvailable(format!(
                        "{} is not published",
                        url
                    )))
                }
                _ => {}
            }
        }
    }

    fetcher.download_to(url, dest).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_files_are_unique_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("gfs-2024-3-14-12-0.grib2");

        let (_, a) = partial_file(&dest, dir.path()).unwrap();
        let (_, b) = partial_file(&dest, dir.path()).unwrap();
        assert_ne!(a.to_path_buf(), b.to_path_buf());
        for temp in [&a, &b] {
            let name = temp.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("gfs-2024-3-14-12-0.grib2."));
            assert!(name.ends_with(".partial"));
            assert_eq!(temp.parent(), Some(dir.path()));
        }

        let path = a.to_path_buf();
        drop(a);
        assert!(!path.exists());
    }
}
