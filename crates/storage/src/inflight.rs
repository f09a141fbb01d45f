//! Per-key render locks.
//!
//! Concurrent requests for the same missing tile queue on one lock; the first
//! renders and writes the cache, the rest re-check the cache after it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct InflightLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

/// Held while rendering one key; dropping it releases the next waiter.
#[derive(Debug)]
pub struct InflightGuard {
    _guard: OwnedMutexGuard<()>,
}

impl InflightLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive ownership of `key`.
    pub async fn acquire(&self, key: &str) -> InflightGuard {
        let lock = self.lock_for(key);
        InflightGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Keys with a live lock (held or awaited).
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.values().filter(|w| w.strong_count() > 0).count()
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = locks.get(key).and_then(Weak::upgrade) {
            return lock;
        }

        locks.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(key.to_string(), Arc::downgrade(&lock));
        lock
    }
}
