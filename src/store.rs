//! Key-value stores backing secrets, cache tiers and rate limit counters.
//!
//! Two flavours mirror what the host platform offers: a persistent option store
//! (plain get/set/delete) and a transient store whose entries carry a TTL.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::StoreError;

/// Persistent key-value store for opaque option values.
pub trait OptionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Counter state returned by [`TransientStore::increment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    pub expires_at: u64,
}

/// Key-value store whose entries expire after a TTL.
///
/// Each operation is atomic per key. Nothing is atomic across keys.
pub trait TransientStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String, ttl_secs: u64);
    fn delete(&self, key: &str);
    /// Increments the counter under `key`. A missing or expired entry starts a new
    /// window of `ttl_secs`; increments inside a window keep its original expiry.
    fn increment(&self, key: &str, ttl_secs: u64) -> WindowCount;
}

/// In-memory option store.
#[derive(Debug, Default)]
pub struct MemoryOptionStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryOptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OptionStore for MemoryOptionStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

/// Option store persisted as a JSON object on disk.
///
/// Every write rewrites the whole file through a temporary sibling and a rename.
#[derive(Debug)]
pub struct FileOptionStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileOptionStore {
    /// Opens the store at `path`, creating parent directories as needed.
    /// A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let shown = path.display().to_string();

        let values = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Read {
                path: shown.clone(),
                source,
            })?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                    path: shown.clone(),
                    source,
                })?
            }
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                        path: shown.clone(),
                        source,
                    })?;
                }
            }
            info!("Option store {} does not exist yet, starting empty", shown);
            BTreeMap::new()
        };

        debug!("Loaded {} options from {}", values.len(), shown);
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let shown = self.path.display().to_string();
        let content = serde_json::to_string_pretty(values).map_err(|source| StoreError::Corrupt {
            path: shown.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|source| StoreError::Write {
            path: shown.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Write {
            path: shown,
            source,
        })
    }
}

impl OptionStore for FileOptionStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Transient {
    value: String,
    expires_at: u64,
}

/// Writes between two sweeps of expired entries.
pub const SWEEP_INTERVAL: u64 = 1024;

/// In-memory transient store driven by an injected clock.
///
/// Expired entries are dropped when read again and by a sweep every
/// [`SWEEP_INTERVAL`] writes, so keys that are never touched again do not pile up.
pub struct MemoryTransientStore {
    entries: DashMap<String, Transient>,
    clock: Arc<dyn Clock>,
    writes: AtomicU64,
}

impl MemoryTransientStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            writes: AtomicU64::new(0),
        }
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let dropped = before.saturating_sub(self.entries.len());
        if dropped > 0 {
            debug!("Purged {} expired transient entries", dropped);
        }
    }

    /// Counts a write and sweeps on every interval boundary. Must run before
    /// any entry guard is taken, `retain` locks every shard.
    fn note_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if writes % SWEEP_INTERVAL == 0 {
            self.purge_expired();
        }
    }
}

impl TransientStore for MemoryTransientStore {
    fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        None
    }

    fn set(&self, key: &str, value: String, ttl_secs: u64) {
        self.note_write();
        let expires_at = self.clock.now().saturating_add(ttl_secs);
        self.entries
            .insert(key.to_string(), Transient { value, expires_at });
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    fn increment(&self, key: &str, ttl_secs: u64) -> WindowCount {
        self.note_write();
        let now = self.clock.now();
        let fresh = move || Transient {
            value: "0".to_string(),
            expires_at: now.saturating_add(ttl_secs),
        };

        let mut entry = self.entries.entry(key.to_string()).or_insert_with(fresh);
        if entry.expires_at <= now {
            *entry = fresh();
        }

        let count = entry.value.parse::<u64>().unwrap_or(0).saturating_add(1);
        entry.value = count.to_string();

        WindowCount {
            count,
            expires_at: entry.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_transient_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemoryTransientStore::new(clock.clone());

        store.set("k", "v".to_string(), 10);
        assert_eq!(store.get("k").as_deref(), Some("v"));

        clock.advance(9);
        assert_eq!(store.get("k").as_deref(), Some("v"));

        clock.advance(1);
        assert_eq!(store.get("k"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_increment_keeps_window_expiry() {
        let clock = Arc::new(ManualClock::new(500));
        let store = MemoryTransientStore::new(clock.clone());

        let first = store.increment("rl", 60);
        assert_eq!(first.count, 1);
        assert_eq!(first.expires_at, 560);

        clock.advance(30);
        let second = store.increment("rl", 60);
        assert_eq!(second.count, 2);
        assert_eq!(second.expires_at, 560);

        clock.advance(30);
        let reset = store.increment("rl", 60);
        assert_eq!(reset.count, 1);
        assert_eq!(reset.expires_at, 620);
    }

    #[test]
    fn test_purge_expired() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryTransientStore::new(clock.clone());
        store.set("short", "a".into(), 5);
        store.set("long", "b".into(), 50);
        clock.advance(10);
        store.purge_expired();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long").as_deref(), Some("b"));
    }

    #[test]
    fn test_abandoned_counters_are_reclaimed() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryTransientStore::new(clock.clone());

        for window in 0..5 {
            for client in 0..2000 {
                store.increment(&format!("rl_{}_{}", window, client), 60);
            }
            assert!(store.len() <= 2000 + SWEEP_INTERVAL as usize, "{}", store.len());
            clock.advance(120);
        }

        // Only the last window's keys can still be live.
        assert!(store.len() <= 2000 + SWEEP_INTERVAL as usize);
        for _ in 0..SWEEP_INTERVAL {
            store.set("tick", "x".into(), 1);
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("tick").as_deref(), Some("x"));
    }

    #[test]
    fn test_sweep_keeps_live_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryTransientStore::new(clock.clone());
        store.set("tier_heavy", "body".into(), 300);
        for i in 0..SWEEP_INTERVAL * 2 {
            store.increment(&format!("rl_{}", i), 60);
        }
        clock.advance(61);
        for _ in 0..SWEEP_INTERVAL {
            store.increment("rl_live", 60);
        }
        assert_eq!(store.get("tier_heavy").as_deref(), Some("body"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_file_option_store_empty_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        fs::write(&path, "  \n").unwrap();
        let store = FileOptionStore::open(&path).unwrap();
        assert_eq!(store.get("anything"), None);
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn test_file_option_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("options.json");

        {
            let store = FileOptionStore::open(&path).unwrap();
            store.set("slymetrics_api_key", "secret").unwrap();
            store.set("other", "x").unwrap();
            store.delete("other").unwrap();
        }

        let reopened = FileOptionStore::open(&path).unwrap();
        assert_eq!(reopened.get("slymetrics_api_key").as_deref(), Some("secret"));
        assert_eq!(reopened.get("other"), None);
    }

    #[test]
    fn test_file_option_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileOptionStore::open(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
