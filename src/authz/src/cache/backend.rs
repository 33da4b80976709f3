//! Key-value cache backends
//!
//! The assignment cache talks to any shared key-value cache through
//! `CacheBackend`. Values are opaque bytes with a per-entry time-to-live.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cache surface consumed by the assignment cache
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a live value; `None` on miss or expiry
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value for `ttl`
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Remove a value; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Cached entry with TTL
#[derive(Clone)]
struct CachedEntry {
    value: Vec<u8>,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedEntry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            cached_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// In-process cache backend
///
/// Thread-safe DashMap with TTL-based expiration and a capacity bound.
/// Clones share the same underlying map, so several managers in one process
/// can share one backend.
#[derive(Clone)]
pub struct InMemoryCacheBackend {
    entries: Arc<DashMap<String, CachedEntry>>,
    capacity: usize,
}

impl InMemoryCacheBackend {
    /// Create a backend holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Make room for one insert: drop expired entries first, then the oldest
    fn evict(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());

        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.cached_at)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }

        self.entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            self.evict();
        }
        self.entries.insert(key.to_string(), CachedEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = InMemoryCacheBackend::default();

        assert!(backend.get("k").await.unwrap().is_none());

        backend.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));

        backend.delete("k").await.unwrap();
        assert!(backend.get("k").await.unwrap().is_none());
        backend.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let backend = InMemoryCacheBackend::default();
        backend.set("k", b"v".to_vec(), Duration::from_millis(30)).await.unwrap();
        assert!(backend.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(backend.get("k").await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let backend = InMemoryCacheBackend::new(2);
        backend.set("a", vec![1], Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        backend.set("b", vec![2], Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        backend.set("c", vec![3], Duration::from_secs(60)).await.unwrap();

        assert_eq!(backend.len(), 2);
        assert!(backend.get("a").await.unwrap().is_none());
        assert!(backend.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let backend = InMemoryCacheBackend::default();
        let other = backend.clone();

        backend.set("k", vec![9], Duration::from_secs(60)).await.unwrap();
        assert_eq!(other.get("k").await.unwrap(), Some(vec![9]));
    }
}
