//! In-memory LRU tile cache for single-process fast-cache mode.
//!
//! Bounded by entry count. Hit/miss/eviction counters are atomics so they
//! can be read without taking the cache lock.

use crate::tile_cache::{check_key, is_stale, TileCache};
use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tile_common::TileResult;
use tokio::sync::RwLock;
use tracing::debug;

/// Statistics for the memory tile cache.
#[derive(Debug, Default)]
pub struct MemoryTileCacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub invalidated: AtomicU64,
    pub size_bytes: AtomicU64,
}

impl MemoryTileCacheStats {
    /// Hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64 * 100.0
        }
    }
}

pub struct MemoryTileCache {
    cache: Arc<RwLock<LruCache<String, Bytes>>>,
    stats: Arc<MemoryTileCacheStats>,
}

impl MemoryTileCache {
    /// Cache holding at most `capacity` tiles (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(RwLock::new(LruCache::new(capacity))),
            stats: Arc::new(MemoryTileCacheStats::default()),
        }
    }

    pub fn stats(&self) -> &MemoryTileCacheStats {
        &self.stats
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}

#[async_trait]
impl TileCache for MemoryTileCache {
    async fn exists(&self, key: &str) -> TileResult<bool> {
        Ok(self.cache.read().await.contains(key))
    }

    async fn read(&self, key: &str) -> TileResult<Option<Bytes>> {
        // `get` promotes the entry, so this needs the write lock
        let mut cache = self.cache.write().await;
        match cache.get(key) {
            Some(data) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(data.clone()))
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn write(&self, key: &str, data: Bytes) -> TileResult<()> {
        check_key(key)?;
        let size = data.len() as u64;
        let mut cache = self.cache.write().await;

        if let Some((old_key, old)) = cache.push(key.to_string(), data) {
            self.stats
                .size_bytes
                .fetch_sub(old.len() as u64, Ordering::Relaxed);
            if old_key != key {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(evicted = %old_key, "Evicted tile from memory cache");
            }
        }
        self.stats.size_bytes.fetch_add(size, Ordering::Relaxed);
        Ok(())
    }

    async fn invalidate_except(&self, prefix: &str, keep: Option<&str>) -> TileResult<usize> {
        let mut cache = self.cache.write().await;
        let stale: Vec<String> = cache
            .iter()
            .filter(|(key, _)| is_stale(key, prefix, keep))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            if let Some(old) = cache.pop(key) {
                self.stats
                    .size_bytes
                    .fetch_sub(old.len() as u64, Ordering::Relaxed);
            }
        }
        self.stats
            .invalidated
            .fetch_add(stale.len() as u64, Ordering::Relaxed);
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let cache = MemoryTileCache::new(10);
        assert!(cache.is_empty().await);
        assert!(cache.read("tile1").await.unwrap().is_none());

        cache.write("tile1", Bytes::from("png")).await.unwrap();
        assert!(cache.exists("tile1").await.unwrap());
        assert_eq!(cache.read("tile1").await.unwrap(), Some(Bytes::from("png")));

        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().misses.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().size_bytes.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = MemoryTileCache::new(2);
        cache.write("a", Bytes::from("1")).await.unwrap();
        cache.write("b", Bytes::from("2")).await.unwrap();
        cache.read("a").await.unwrap();
        cache.write("c", Bytes::from("3")).await.unwrap();

        assert!(cache.exists("a").await.unwrap());
        assert!(!cache.exists("b").await.unwrap());
        assert_eq!(cache.stats().evictions.load(Ordering::Relaxed), 1);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_size() {
        let cache = MemoryTileCache::new(4);
        cache.write("a", Bytes::from("1234")).await.unwrap();
        cache.write("a", Bytes::from("12")).await.unwrap();
        assert_eq!(cache.stats().size_bytes.load(Ordering::Relaxed), 2);
        assert_eq!(cache.stats().evictions.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_holds_one() {
        let cache = MemoryTileCache::new(0);
        cache.write("a", Bytes::from("1")).await.unwrap();
        assert_eq!(cache.len().await, 1);
    }
}
