//! History page cache

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::LogsError;
use crate::viewer::history::{LogPage, LogPageSource, PageQuery};

/// Page cache entry
#[derive(Debug, Clone)]
pub struct PageCacheEntry {
    pub page: LogPage,
    pub cached_seq: u64,
}

/// In-memory page cache keyed by canonical query key
pub struct PageCache {
    entries: RwLock<HashMap<String, PageCacheEntry>>,
    capacity: u64,
    seq: AtomicU64,
}

impl PageCache {
    /// Create a new page cache
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            seq: AtomicU64::new(0),
        }
    }

    /// Get a page from cache
    pub fn get(&self, key: &str) -> Option<LogPage> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).map(|e| e.page.clone())
    }

    /// Insert a page into cache
    pub fn insert(&self, key: String, page: LogPage) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        // Evict oldest if at capacity
        if !entries.contains_key(&key) && entries.len() as u64 >= self.capacity {
            if let Some(oldest_key) = entries
                .iter()
                .min_by_key(|(_, e)| e.cached_seq)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest_key);
            }
        }

        let entry = PageCacheEntry {
            page,
            cached_seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        entries.insert(key, entry);
    }

    /// Remove a page from cache
    pub fn remove(&self, key: &str) -> Option<PageCacheEntry> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key)
    }

    /// Clear the cache
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    /// Get cache size
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serves repeated queries from a [`PageCache`]. Concurrent identical queries
/// share a single request.
pub struct CachedPageSource<S> {
    inner: S,
    cache: Arc<PageCache>,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: LogPageSource> CachedPageSource<S> {
    pub fn new(inner: S, cache: Arc<PageCache>) -> Self {
        Self {
            inner,
            cache,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.entry(key.to_string()).or_default().clone()
    }

    /// Forget the lock of `key`, unless a newer caller already replaced it
    fn release(&self, key: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if in_flight.get(key).is_some_and(|current| Arc::ptr_eq(current, lock)) {
            in_flight.remove(key);
        }
    }

    /// Number of keys with a request in progress
    pub fn in_flight_len(&self) -> usize {
        let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.len()
    }
}

#[async_trait]
impl<S: LogPageSource> LogPageSource for CachedPageSource<S> {
    async fn query_page(&self, query: &PageQuery) -> Result<LogPage, LogsError> {
        let key = query.key();
        if let Some(page) = self.cache.get(&key) {
            debug!(%key, "Logs page served from cache");
            return Ok(page);
        }

        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;
        if let Some(page) = self.cache.get(&key) {
            self.release(&key, &lock);
            return Ok(page);
        }

        let result = self.inner.query_page(query).await;
        if let Ok(page) = &result {
            self.cache.insert(key.clone(), page.clone());
        }
        self.release(&key, &lock);
        result
    }
}
