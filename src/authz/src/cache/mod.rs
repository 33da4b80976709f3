//! Per-user assignment cache
//!
//! Read-through cache in front of an [`AssignmentStore`]. The unit of caching
//! is a user's complete assignment set; a cached set is either absent or a
//! full snapshot taken from one store read, never patched in place.
//!
//! # Modes
//!
//! | `CacheDuration` | local memo | shared backend |
//! |---|---|---|
//! | `Disabled` | no | no |
//! | `LocalOnly` | yes | no |
//! | `Ttl(d)` | yes | read + write with TTL `d` |
//!
//! The local memo lives as long as the `AssignmentCache` value. The shared
//! backend is keyed by a BLAKE3 digest of `(application_id, generation,
//! user_id)` so that several applications can share one backend without
//! collisions. The generation is a token stored in the backend per
//! application; a full clear replaces it.
//!
//! Every invalidation bumps a counter before it drops cached entries. A fill
//! that read the store under an older counter value returns its set without
//! keeping it, so a read racing a write never outlives the write.

pub mod backend;

pub use backend::{CacheBackend, InMemoryCacheBackend};

use crate::error::{AuthzError, Result};
use crate::store::AssignmentStore;
use crate::types::AssignmentSet;
use blake3::Hasher;
use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Generation used when no shared backend is in play
const LOCAL_GENERATION: &str = "local";

/// Caching policy for assignment sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheDuration {
    /// Every read hits the store
    Disabled,
    /// Memoize per cache instance, never write the backend
    #[default]
    LocalOnly,
    /// Memoize and write the backend with this time-to-live
    Ttl(Duration),
}

impl CacheDuration {
    /// Map the configuration value: `false`, `0`, or a number of seconds
    pub fn from_seconds(seconds: Option<u64>) -> Self {
        match seconds {
            None => CacheDuration::Disabled,
            Some(0) => CacheDuration::LocalOnly,
            Some(secs) => CacheDuration::Ttl(Duration::from_secs(secs)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, CacheDuration::Disabled)
    }
}

impl Serialize for CacheDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CacheDuration::Disabled => serializer.serialize_bool(false),
            CacheDuration::LocalOnly => serializer.serialize_u64(0),
            CacheDuration::Ttl(ttl) => serializer.serialize_u64(ttl.as_secs()),
        }
    }
}

impl<'de> Deserialize<'de> for CacheDuration {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Seconds(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(false) => Ok(CacheDuration::Disabled),
            Raw::Flag(true) => Err(serde::de::Error::custom(
                "cache_duration must be false or a number of seconds",
            )),
            Raw::Seconds(secs) => Ok(CacheDuration::from_seconds(Some(secs))),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Sets served from the local memo
    pub memo_hits: usize,
    /// Sets served from the shared backend
    pub backend_hits: usize,
    /// Sets read from the assignment store
    pub store_reads: usize,
    /// Per-user invalidations
    pub invalidations: usize,
    /// Users currently memoized
    pub memoized_users: usize,
}

/// Snapshot of the invalidation counters a fill was started under
type Version = (u64, u64);

/// Read-through cache of per-user assignment sets
pub struct AssignmentCache {
    store: Arc<dyn AssignmentStore>,
    backend: Option<Arc<dyn CacheBackend>>,
    duration: CacheDuration,
    application_id: String,

    /// Local memo: user id -> complete assignment set
    memo: DashMap<String, Arc<AssignmentSet>>,

    /// Per-user invalidation counters
    versions: DashMap<String, u64>,

    /// Bumped by every full clear
    epoch: AtomicU64,

    stats: DashMap<&'static str, usize>,
}

impl AssignmentCache {
    pub fn new(
        store: Arc<dyn AssignmentStore>,
        backend: Option<Arc<dyn CacheBackend>>,
        duration: CacheDuration,
        application_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            backend,
            duration,
            application_id: application_id.into(),
            memo: DashMap::new(),
            versions: DashMap::new(),
            epoch: AtomicU64::new(0),
            stats: DashMap::new(),
        }
    }

    /// A new cache over the same store and backend with an empty local memo
    pub fn fork(&self) -> Self {
        Self::new(
            self.store.clone(),
            self.backend.clone(),
            self.duration,
            self.application_id.clone(),
        )
    }

    pub fn store(&self) -> &Arc<dyn AssignmentStore> {
        &self.store
    }

    pub fn duration(&self) -> CacheDuration {
        self.duration
    }

    /// Backend key for a user's assignment set within this application
    ///
    /// Keys include the application's current generation, so starting a new
    /// generation makes every earlier entry unreachable.
    pub async fn cache_key(&self, user_id: &str) -> Result<String> {
        let generation = self.current_generation().await?;
        Ok(self.entry_key(&generation, user_id))
    }

    /// All assignments of `user_id`, served according to the cache mode
    pub async fn assignments(&self, user_id: &str) -> Result<Arc<AssignmentSet>> {
        if !self.duration.is_enabled() {
            return self.read_store(user_id).await;
        }

        if let Some(set) = self.memo.get(user_id).map(|entry| entry.value().clone()) {
            self.increment_stat("memo_hits");
            debug!("Assignment memo hit for user {}", user_id);
            return Ok(set);
        }

        let observed = self.version(user_id);
        let generation = self.current_generation().await?;

        if let Some(set) = self.read_backend(&generation, user_id).await? {
            self.remember(user_id, &set, observed);
            return Ok(set);
        }

        let set = self.read_store(user_id).await?;
        self.remember(user_id, &set, observed);
        self.write_backend(&generation, user_id, &set, observed).await?;
        Ok(set)
    }

    /// Drop the memo and backend entry of exactly one user
    ///
    /// Fills that started before this call are not cached.
    pub async fn invalidate(&self, user_id: &str) -> Result<()> {
        self.versions
            .entry(user_id.to_string())
            .and_modify(|version| *version += 1)
            .or_insert(1);
        self.memo.remove(user_id);

        if let Some((backend, _)) = self.shared_backend() {
            let generation = self.current_generation().await?;
            backend.delete(&self.entry_key(&generation, user_id)).await?;
        }

        self.increment_stat("invalidations");
        debug!("Invalidated cached assignments for user {}", user_id);
        Ok(())
    }

    /// Drop every cached set of this application
    ///
    /// Empties the local memo and starts a new backend generation, which
    /// hides the entries written by every instance sharing the backend.
    pub async fn clear(&self) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.memo.clear();

        if let Some((backend, ttl)) = self.shared_backend() {
            let generation = self.start_generation(backend, ttl).await?;
            debug!("Started assignment cache generation {}", generation);
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memo_hits: self.get_stat("memo_hits"),
            backend_hits: self.get_stat("backend_hits"),
            store_reads: self.get_stat("store_reads"),
            invalidations: self.get_stat("invalidations"),
            memoized_users: self.memo.len(),
        }
    }

    fn version(&self, user_id: &str) -> Version {
        let user = self.versions.get(user_id).map(|v| *v).unwrap_or(0);
        (self.epoch.load(Ordering::SeqCst), user)
    }

    /// Memoize `set` unless an invalidation ran since `observed`
    ///
    /// Invalidations bump the counters before removing the memo entry, so a
    /// set inserted here is either seen as stale below or removed by them.
    fn remember(&self, user_id: &str, set: &Arc<AssignmentSet>, observed: Version) {
        self.memo.insert(user_id.to_string(), set.clone());

        if self.version(user_id) != observed {
            self.memo.remove_if(user_id, |_, cached| Arc::ptr_eq(cached, set));
            debug!("Not caching assignments of user {} read before an invalidation", user_id);
        }
    }

    fn shared_backend(&self) -> Option<(&Arc<dyn CacheBackend>, Duration)> {
        match (self.duration, &self.backend) {
            (CacheDuration::Ttl(ttl), Some(backend)) => Some((backend, ttl)),
            _ => None,
        }
    }

    fn entry_key(&self, generation: &str, user_id: &str) -> String {
        let mut hasher = Hasher::new();
        hasher.update(b"authz.assignments");
        hasher.update(&[0]);
        hasher.update(self.application_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(generation.as_bytes());
        hasher.update(&[0]);
        hasher.update(user_id.as_bytes());
        format!("authz:assignments:{}", hasher.finalize().to_hex())
    }

    fn generation_key(&self) -> String {
        let mut hasher = Hasher::new();
        hasher.update(b"authz.generation");
        hasher.update(&[0]);
        hasher.update(self.application_id.as_bytes());
        format!("authz:generation:{}", hasher.finalize().to_hex())
    }

    /// Generation token stored in the backend
    ///
    /// A missing or unreadable token starts a new generation rather than
    /// falling back to a fixed one, so expired or evicted tokens never make
    /// older entries reachable again.
    async fn current_generation(&self) -> Result<String> {
        let Some((backend, ttl)) = self.shared_backend() else {
            return Ok(LOCAL_GENERATION.to_string());
        };

        if let Some(bytes) = backend.get(&self.generation_key()).await? {
            if let Ok(generation) = String::from_utf8(bytes) {
                return Ok(generation);
            }
            warn!("Discarding corrupt assignment cache generation for {}", self.application_id);
        }

        self.start_generation(backend, ttl).await
    }

    async fn start_generation(&self, backend: &Arc<dyn CacheBackend>, ttl: Duration) -> Result<String> {
        let generation = Uuid::new_v4().to_string();
        backend
            .set(&self.generation_key(), generation.clone().into_bytes(), ttl)
            .await?;
        Ok(generation)
    }

    async fn read_store(&self, user_id: &str) -> Result<Arc<AssignmentSet>> {
        self.increment_stat("store_reads");
        let set = self.store.select_all_for_user(user_id).await?;
        debug!("Read {} assignments for user {} from store", set.len(), user_id);
        Ok(Arc::new(set))
    }

    async fn read_backend(&self, generation: &str, user_id: &str) -> Result<Option<Arc<AssignmentSet>>> {
        let Some((backend, _)) = self.shared_backend() else {
            return Ok(None);
        };

        let Some(bytes) = backend.get(&self.entry_key(generation, user_id)).await? else {
            return Ok(None);
        };

        match serde_json::from_slice::<AssignmentSet>(&bytes) {
            Ok(set) => {
                self.increment_stat("backend_hits");
                debug!("Assignment backend hit for user {}", user_id);
                Ok(Some(Arc::new(set)))
            }
            Err(e) => {
                warn!("Discarding corrupt cached assignments for user {}: {}", user_id, e);
                Ok(None)
            }
        }
    }

    /// Write `set` to the backend, retracting it if an invalidation ran
    /// while the write was in flight
    async fn write_backend(
        &self,
        generation: &str,
        user_id: &str,
        set: &AssignmentSet,
        observed: Version,
    ) -> Result<()> {
        let Some((backend, ttl)) = self.shared_backend() else {
            return Ok(());
        };

        let key = self.entry_key(generation, user_id);
        let bytes = serde_json::to_vec(set)
            .map_err(|e| AuthzError::CacheError(format!("Failed to encode assignments: {}", e)))?;
        backend.set(&key, bytes, ttl).await?;

        if self.version(user_id) != observed {
            backend.delete(&key).await?;
        }
        Ok(())
    }

    fn increment_stat(&self, key: &'static str) {
        self.stats
            .entry(key)
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &'static str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAssignmentStore;

    fn cache_with(duration: CacheDuration, backend: Option<Arc<dyn CacheBackend>>) -> AssignmentCache {
        let store: Arc<dyn AssignmentStore> = Arc::new(InMemoryAssignmentStore::new());
        AssignmentCache::new(store, backend, duration, "app")
    }

    #[test]
    fn test_cache_duration_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            d: CacheDuration,
        }

        let off: Wrapper = serde_json::from_str(r#"{"d": false}"#).unwrap();
        let local: Wrapper = serde_json::from_str(r#"{"d": 0}"#).unwrap();
        let ttl: Wrapper = serde_json::from_str(r#"{"d": 3600}"#).unwrap();

        assert_eq!(off.d, CacheDuration::Disabled);
        assert_eq!(local.d, CacheDuration::LocalOnly);
        assert_eq!(ttl.d, CacheDuration::Ttl(Duration::from_secs(3600)));
        assert!(serde_json::from_str::<Wrapper>(r#"{"d": true}"#).is_err());
    }

    #[tokio::test]
    async fn test_cache_key_isolates_users_and_applications() {
        let store: Arc<dyn AssignmentStore> = Arc::new(InMemoryAssignmentStore::new());
        let a = AssignmentCache::new(store.clone(), None, CacheDuration::LocalOnly, "tenant-a");
        let b = AssignmentCache::new(store, None, CacheDuration::LocalOnly, "tenant-b");

        let key = a.cache_key("7").await.unwrap();
        assert_eq!(key, a.cache_key("7").await.unwrap());
        assert_ne!(key, a.cache_key("8").await.unwrap());
        assert_ne!(key, b.cache_key("7").await.unwrap());
        assert!(key.starts_with("authz:assignments:"));
    }

    #[tokio::test]
    async fn test_clear_starts_new_generation() {
        let backend: Arc<dyn CacheBackend> = Arc::new(InMemoryCacheBackend::default());
        let cache = cache_with(CacheDuration::Ttl(Duration::from_secs(60)), Some(backend));

        let before = cache.cache_key("7").await.unwrap();
        assert_eq!(before, cache.cache_key("7").await.unwrap());

        cache.assignments("7").await.unwrap();
        cache.clear().await.unwrap();

        assert_ne!(before, cache.cache_key("7").await.unwrap());
        assert_eq!(cache.stats().memoized_users, 0);

        // The entry written before the clear is unreachable
        cache.assignments("7").await.unwrap();
        assert_eq!(cache.stats().store_reads, 2);
        assert_eq!(cache.stats().backend_hits, 0);

        // Entries written after it are shared as usual
        let fork = cache.fork();
        fork.assignments("7").await.unwrap();
        assert_eq!(fork.stats().backend_hits, 1);
        assert_eq!(fork.stats().store_reads, 0);
    }

    #[tokio::test]
    async fn test_missing_generation_hides_older_entries() {
        let backend = Arc::new(InMemoryCacheBackend::default());
        let cache = cache_with(
            CacheDuration::Ttl(Duration::from_secs(60)),
            Some(backend.clone() as Arc<dyn CacheBackend>),
        );

        let before = cache.cache_key("7").await.unwrap();
        backend.delete(&cache.generation_key()).await.unwrap();

        assert_ne!(before, cache.cache_key("7").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_only_touches_one_user() {
        let cache = cache_with(CacheDuration::LocalOnly, None);
        cache.assignments("7").await.unwrap();
        cache.assignments("8").await.unwrap();
        assert_eq!(cache.stats().memoized_users, 2);

        cache.invalidate("7").await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.memoized_users, 1);
        assert_eq!(stats.invalidations, 1);
    }

    #[tokio::test]
    async fn test_corrupt_backend_entry_is_a_miss() {
        let backend = Arc::new(InMemoryCacheBackend::default());
        let cache = cache_with(
            CacheDuration::Ttl(Duration::from_secs(60)),
            Some(backend.clone() as Arc<dyn CacheBackend>),
        );

        let key = cache.cache_key("7").await.unwrap();
        backend
            .set(&key, b"{broken".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let set = cache.assignments("7").await.unwrap();
        assert!(set.is_empty());
        assert_eq!(cache.stats().store_reads, 1);
        assert_eq!(cache.stats().backend_hits, 0);
    }

    #[tokio::test]
    async fn test_ttl_without_backend_degrades_to_memo() {
        let cache = cache_with(CacheDuration::Ttl(Duration::from_secs(60)), None);
        cache.assignments("7").await.unwrap();
        cache.assignments("7").await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.store_reads, 1);
        assert_eq!(stats.memo_hits, 1);
    }
}
