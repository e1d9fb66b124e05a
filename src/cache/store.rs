//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU tracking and an
//! append-only log. Every live mutation is applied in memory first and then
//! logged; evictions are logged as a DEL ahead of the SET that caused them.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::cache::recovery::{RecoveryOrchestrator, RecoveryReport};
use crate::cache::{CacheEntry, CacheStats, LruTracker};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::persistence::{LogRecord, Persistence};

// == Apply Context ==
/// Whether a mutation comes from a caller or from startup replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyContext {
    /// Caller-issued; logged
    Live,
    /// Rebuilt from snapshot or log; never logged again
    Replaying,
}

impl ApplyContext {
    fn logs(self) -> bool {
        self == Self::Live
    }
}

// == Lru Cache ==
/// Bounded key-value cache with strict LRU eviction.
#[derive(Debug)]
pub struct LruCache {
    /// Key-value storage
    entries: HashMap<Vec<u8>, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    capacity: usize,
    /// Log and snapshot files; `None` for a purely in-memory cache
    persistence: Option<Persistence>,
    /// Logged mutations between automatic snapshots (0 = never)
    snapshot_every: usize,
    logged_since_snapshot: usize,
    recovery: Option<RecoveryReport>,
}

impl LruCache {
    // == Constructor ==
    /// Creates an in-memory cache without durability.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CacheError::InvalidCapacity(capacity));
        }
        Ok(Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            capacity,
            persistence: None,
            snapshot_every: 0,
            logged_since_snapshot: 0,
            recovery: None,
        })
    }

    /// Opens a durable cache described by `config` and recovers its state.
    ///
    /// Misconfiguration is fatal; unreadable or missing data files are not.
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let persistence = Persistence::open(
            &config.aof_path,
            &config.snapshot_path,
            config.codec()?,
        );
        Self::with_persistence(config.capacity, persistence, config.snapshot_every)
    }

    /// Attaches `persistence` to a new cache and replays snapshot and log into it.
    pub fn with_persistence(
        capacity: usize,
        persistence: Persistence,
        snapshot_every: usize,
    ) -> Result<Self> {
        let mut cache = Self::new(capacity)?;
        cache.persistence = Some(persistence);
        cache.snapshot_every = snapshot_every;

        let report = RecoveryOrchestrator::new().run(&mut cache);
        cache.recovery = Some(report);
        Ok(cache)
    }

    // == Set ==
    /// Stores a key-value pair, evicting the least recently used key if full.
    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.apply_set(key.into(), value.into(), ApplyContext::Live);
    }

    // == Get ==
    /// Retrieves a value by key, marking it most recently used on a hit.
    pub fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        match self.entries.get(key) {
            Some(entry) => {
                self.lru.touch(entry.handle);
                self.stats.record_hit();
                Some(entry.value.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether it was present.
    pub fn del(&mut self, key: &[u8]) -> bool {
        self.apply_del(key, ApplyContext::Live)
    }

    // == Apply ==
    /// Applies a mutation in the given context.
    ///
    /// Returns false only for a DEL of an absent key.
    pub fn apply(&mut self, record: LogRecord, ctx: ApplyContext) -> bool {
        match record {
            LogRecord::Set { key, value } => {
                self.apply_set(key, value, ctx);
                true
            }
            LogRecord::Del { key } => self.apply_del(&key, ctx),
        }
    }

    fn apply_set(&mut self, key: Vec<u8>, value: Vec<u8>, ctx: ApplyContext) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.replace(value);
            self.lru.touch(entry.handle);
        } else {
            if self.entries.len() >= self.capacity {
                self.evict_oldest(ctx);
            }
            let handle = self.lru.push_front(key.clone());
            self.entries
                .insert(key.clone(), CacheEntry::new(value, handle));
        }
        self.stats.set_total_entries(self.entries.len());

        if ctx.logs() {
            if let (Some(persistence), Some(entry)) =
                (self.persistence.as_mut(), self.entries.get(&key))
            {
                let persisted = persistence.append_set(&key, &entry.value);
                self.stats.record_log_append(persisted);
            }
            self.note_logged_mutation();
        }
    }

    fn apply_del(&mut self, key: &[u8], ctx: ApplyContext) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        self.lru.remove(entry.handle);
        self.stats.set_total_entries(self.entries.len());

        if ctx.logs() {
            self.log_del(key);
            self.note_logged_mutation();
        }
        true
    }

    fn evict_oldest(&mut self, ctx: ApplyContext) {
        let Some(evicted) = self.lru.pop_oldest() else {
            return;
        };
        self.entries.remove(&evicted);
        self.stats.record_eviction();
        debug!(key = %String::from_utf8_lossy(&evicted), "evicted least recently used key");

        if ctx.logs() {
            self.log_del(&evicted);
        }
    }

    fn log_del(&mut self, key: &[u8]) {
        if let Some(persistence) = self.persistence.as_mut() {
            let persisted = persistence.append_del(key);
            self.stats.record_log_append(persisted);
        }
    }

    fn note_logged_mutation(&mut self) {
        if self.persistence.is_none() || self.snapshot_every == 0 {
            return;
        }
        self.logged_since_snapshot += 1;
        if self.logged_since_snapshot >= self.snapshot_every {
            if let Err(e) = self.save_snapshot() {
                warn!(error = %e, "periodic snapshot failed; log retained");
                self.logged_since_snapshot = 0;
            }
        }
    }

    // == Snapshot ==
    /// Writes every pair to the snapshot file and truncates the log.
    ///
    /// Pairs are written least recently used first so that reloading them in
    /// file order rebuilds the same recency order. A no-op without persistence.
    pub fn save_snapshot(&mut self) -> Result<()> {
        let Some(persistence) = self.persistence.as_mut() else {
            return Ok(());
        };
        let entries = &self.entries;
        let pairs = self
            .lru
            .iter_oldest_first()
            .filter_map(|key| entries.get(key).map(|e| (key, e.value.as_slice())));
        persistence.snapshot(pairs)?;

        self.stats.record_snapshot();
        self.logged_since_snapshot = 0;
        Ok(())
    }

    // == Flush ==
    /// Forces the log to stable storage without compaction.
    pub fn flush_log(&mut self) -> Result<()> {
        match self.persistence.as_mut() {
            Some(persistence) => persistence.flush(),
            None => Ok(()),
        }
    }

    // == Accessors ==
    /// Returns the current number of entries in the cache.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks presence without touching recency or statistics.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys from most to least recently used.
    pub fn recency_order(&self) -> Vec<Vec<u8>> {
        self.lru.iter().map(<[u8]>::to_vec).collect()
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    /// Whether mutations are currently reaching the log.
    pub fn is_durable(&self) -> bool {
        self.persistence
            .as_ref()
            .is_some_and(Persistence::is_durable)
    }

    /// Outcome of the startup recovery, for durable caches.
    pub fn recovery_report(&self) -> Option<&RecoveryReport> {
        self.recovery.as_ref()
    }

    pub(crate) fn persistence(&self) -> Option<&Persistence> {
        self.persistence.as_ref()
    }

    pub(crate) fn persistence_mut(&mut self) -> Option<&mut Persistence> {
        self.persistence.as_mut()
    }
}

impl Drop for LruCache {
    fn drop(&mut self) {
        if let Err(e) = self.flush_log() {
            warn!(error = %e, "failed to sync log on shutdown");
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PayloadCodec;
    use tempfile::TempDir;

    fn durable(dir: &TempDir, capacity: usize) -> LruCache {
        let persistence = Persistence::open(
            dir.path().join("aof.log"),
            dir.path().join("snapshot.rdb"),
            PayloadCodec::Plain,
        );
        LruCache::with_persistence(capacity, persistence, 0).unwrap()
    }

    fn logged(dir: &TempDir) -> Vec<LogRecord> {
        crate::persistence::AofReader::open(dir.path().join("aof.log"), PayloadCodec::Plain)
            .unwrap()
            .map(|r| r.filter_map(|item| item.ok()).collect())
            .unwrap_or_default()
    }

    fn set(key: &str, value: &str) -> LogRecord {
        LogRecord::Set {
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
        }
    }

    fn del(key: &str) -> LogRecord {
        LogRecord::Del {
            key: key.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_huge_capacity_allocates_lazily() {
        let mut store = LruCache::new(usize::MAX / 64).unwrap();
        store.set("a", "1");
        assert_eq!(store.capacity(), usize::MAX / 64);
        assert_eq!(store.get(b"a"), Some(b"1".to_vec()));
    }

    #[test]
    fn test_store_new() {
        let store = LruCache::new(100).unwrap();
        assert_eq!(store.size(), 0);
        assert_eq!(store.capacity(), 100);
        assert!(store.is_empty());
        assert!(!store.is_durable());
        assert!(store.recovery_report().is_none());
    }

    #[test]
    fn test_store_zero_capacity_rejected() {
        assert!(matches!(
            LruCache::new(0),
            Err(CacheError::InvalidCapacity(0))
        ));
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = LruCache::new(100).unwrap();

        store.set("key1", "value1");
        assert_eq!(store.get(b"key1"), Some(b"value1".to_vec()));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = LruCache::new(100).unwrap();
        assert_eq!(store.get(b"nonexistent"), None);
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_store_delete() {
        let mut store = LruCache::new(100).unwrap();

        store.set("key1", "value1");
        assert!(store.del(b"key1"));

        assert!(store.is_empty());
        assert_eq!(store.get(b"key1"), None);
        assert!(!store.del(b"key1"));
    }

    #[test]
    fn test_store_overwrite_does_not_evict() {
        let mut store = LruCache::new(2).unwrap();

        store.set("a", "1");
        store.set("b", "2");
        store.set("a", "3");

        assert_eq!(store.size(), 2);
        assert_eq!(store.get(b"a"), Some(b"3".to_vec()));
        assert_eq!(store.get(b"b"), Some(b"2".to_vec()));
        assert_eq!(store.stats().evictions, 0);
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = LruCache::new(2).unwrap();

        store.set("a", "1");
        store.set("b", "2");
        store.set("c", "3");

        assert_eq!(store.size(), 2);
        assert_eq!(store.get(b"a"), None);
        assert_eq!(store.get(b"b"), Some(b"2".to_vec()));
        assert_eq!(store.get(b"c"), Some(b"3".to_vec()));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_store_lru_touch_on_get() {
        let mut store = LruCache::new(2).unwrap();

        store.set("a", "1");
        store.set("b", "2");
        assert!(store.get(b"a").is_some());
        store.set("c", "3");

        assert_eq!(store.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(store.get(b"c"), Some(b"3".to_vec()));
        assert_eq!(store.get(b"b"), None);
    }

    #[test]
    fn test_store_overwrite_refreshes_recency() {
        let mut store = LruCache::new(2).unwrap();

        store.set("a", "1");
        store.set("b", "2");
        store.set("a", "1+");
        store.set("c", "3");

        assert!(store.contains(b"a"));
        assert!(!store.contains(b"b"));
        assert_eq!(store.recency_order(), vec![b"c".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn test_store_binary_keys_and_values() {
        let mut store = LruCache::new(4).unwrap();
        store.set(vec![0u8, 255, b'\n'], vec![b' '; 3]);
        assert_eq!(store.get(&[0, 255, b'\n']), Some(vec![b' '; 3]));
    }

    #[test]
    fn test_store_stats() {
        let mut store = LruCache::new(100).unwrap();

        store.set("key1", "value1");
        store.get(b"key1");
        store.get(b"nonexistent");

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
        // In-memory caches never log
        assert_eq!(stats.log_appends, 0);
    }

    #[test]
    fn test_live_mutations_are_logged_in_order() {
        let dir = TempDir::new().unwrap();
        let mut store = durable(&dir, 2);

        store.set("a", "1");
        store.set("b", "2");
        store.set("c", "3");
        assert!(store.del(b"b"));
        assert!(!store.del(b"missing"));

        assert_eq!(
            logged(&dir),
            vec![
                set("a", "1"),
                set("b", "2"),
                del("a"),
                set("c", "3"),
                del("b"),
            ]
        );
        assert_eq!(store.stats().log_appends, 5);
    }

    #[test]
    fn test_get_is_not_logged() {
        let dir = TempDir::new().unwrap();
        let mut store = durable(&dir, 2);
        store.set("a", "1");
        store.get(b"a");
        store.get(b"zzz");
        assert_eq!(logged(&dir).len(), 1);
    }

    #[test]
    fn test_replaying_context_skips_log() {
        let dir = TempDir::new().unwrap();
        let mut store = durable(&dir, 1);

        assert!(store.apply(set("a", "1"), ApplyContext::Replaying));
        assert!(store.apply(set("b", "2"), ApplyContext::Replaying));
        assert!(store.apply(del("b"), ApplyContext::Replaying));
        assert!(!store.apply(del("b"), ApplyContext::Replaying));

        assert!(logged(&dir).is_empty());
        assert!(store.is_empty());
        // Eviction still happens during replay, it just isn't logged
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_save_snapshot_truncates_log() {
        let dir = TempDir::new().unwrap();
        let mut store = durable(&dir, 4);
        store.set("a", "1");
        store.set("b", "2");

        store.save_snapshot().unwrap();

        assert!(logged(&dir).is_empty());
        assert_eq!(store.stats().snapshots, 1);
        assert!(dir.path().join("snapshot.rdb").exists());
    }

    #[test]
    fn test_snapshot_every_n_mutations() {
        let dir = TempDir::new().unwrap();
        let persistence = Persistence::open(
            dir.path().join("aof.log"),
            dir.path().join("snapshot.rdb"),
            PayloadCodec::Plain,
        );
        let mut store = LruCache::with_persistence(10, persistence, 3).unwrap();

        store.set("a", "1");
        store.set("b", "2");
        assert_eq!(store.stats().snapshots, 0);
        store.set("c", "3");
        assert_eq!(store.stats().snapshots, 1);
        assert!(logged(&dir).is_empty());

        store.set("d", "4");
        assert_eq!(logged(&dir), vec![set("d", "4")]);
    }

    #[test]
    fn test_in_memory_snapshot_and_flush_are_noops() {
        let mut store = LruCache::new(2).unwrap();
        store.set("a", "1");
        assert!(store.save_snapshot().is_ok());
        assert!(store.flush_log().is_ok());
        assert_eq!(store.stats().snapshots, 0);
    }

    #[test]
    fn test_unwritable_log_keeps_serving() {
        let dir = TempDir::new().unwrap();
        let persistence = Persistence::open(
            dir.path().join("no-such-dir").join("aof.log"),
            dir.path().join("snapshot.rdb"),
            PayloadCodec::Plain,
        );
        let mut store = LruCache::with_persistence(2, persistence, 0).unwrap();
        assert!(!store.is_durable());

        store.set("a", "1");
        assert_eq!(store.get(b"a"), Some(b"1".to_vec()));
        assert!(store.del(b"a"));
        assert_eq!(store.stats().log_failures, 2);
    }
}
