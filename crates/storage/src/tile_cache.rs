//! Content-addressed tile cache and its durable filesystem backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tile_common::{TileError, TileResult};
use tokio::fs;
use tracing::{debug, info, instrument};

/// Cache of encoded tiles keyed by a deterministic string.
///
/// Keys are flat file names (no path separators); a key must encode every
/// input that affects the tile's pixels.
#[async_trait]
pub trait TileCache: Send + Sync {
    async fn exists(&self, key: &str) -> TileResult<bool>;

    async fn read(&self, key: &str) -> TileResult<Option<Bytes>>;

    async fn write(&self, key: &str, data: Bytes) -> TileResult<()>;

    /// Remove every entry whose key starts with `prefix`. Returns the count.
    async fn invalidate(&self, prefix: &str) -> TileResult<usize> {
        self.invalidate_except(prefix, None).await
    }

    /// Like `invalidate`, but entries that also start with `keep` survive.
    async fn invalidate_except(&self, prefix: &str, keep: Option<&str>) -> TileResult<usize>;
}

/// Whether `key` falls under `prefix` and not under `keep`.
pub(crate) fn is_stale(key: &str, prefix: &str, keep: Option<&str>) -> bool {
    key.starts_with(prefix) && !keep.is_some_and(|keep| key.starts_with(keep))
}

/// Tiles stored as individual files under one directory.
#[derive(Debug, Clone)]
pub struct FsTileCache {
    dir: PathBuf,
}

impl FsTileCache {
    /// Use `dir`, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> TileResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            TileError::Cache(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> TileResult<PathBuf> {
        check_key(key)?;
        Ok(self.dir.join(key))
    }
}

pub(crate) fn check_key(key: &str) -> TileResult<()> {
    if key.is_empty() || key.contains(|c: char| c == '/' || c == '\\') || key.starts_with('.') {
        return Err(TileError::Cache(format!("Invalid cache key '{}'", key)));
    }
    Ok(())
}

#[async_trait]
impl TileCache for FsTileCache {
    async fn exists(&self, key: &str) -> TileResult<bool> {
        let path = self.path_for(key)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| TileError::Cache(format!("Failed to stat {}: {}", key, e)))
    }

    async fn read(&self, key: &str) -> TileResult<Option<Bytes>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TileError::Cache(format!("Failed to read {}: {}", key, e))),
        }
    }

    /// Written to a `.partial` sibling then renamed, so readers never see a
    /// half-written tile.
    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn write(&self, key: &str, data: Bytes) -> TileResult<()> {
        let path = self.path_for(key)?;
        let temp = self.dir.join(format!(".{}.partial", key));

        fs::write(&temp, &data)
            .await
            .map_err(|e| TileError::Cache(format!("Failed to write {}: {}", key, e)))?;
        fs::rename(&temp, &path)
            .await
            .map_err(|e| TileError::Cache(format!("Failed to commit {}: {}", key, e)))?;

        debug!(key = %key, "Cached tile");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn invalidate_except(&self, prefix: &str, keep: Option<&str>) -> TileResult<usize> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| TileError::Cache(format!("Failed to list cache: {}", e)))?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TileError::Cache(format!("Failed to list cache: {}", e)))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !is_stale(name, prefix, keep) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(TileError::Cache(format!("Failed to remove {}: {}", name, e)))
                }
            }
        }

        info!(prefix = %prefix, removed = removed, "Invalidated cached tiles");
        Ok(removed)
    }
}
