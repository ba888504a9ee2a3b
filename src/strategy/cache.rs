//! Local strategy cache: one entry per fingerprint, expired lazily on read.
//!
//! Entries live in a single JSON map file (`strategy-cache.json`), keyed by
//! `lol_strategy_<fingerprint>`. Each value is a serialized
//! `{data, timestamp, version}` blob, so one corrupt entry never poisons the
//! rest of the file.
//!
//! All file IO here is synchronous. Async callers go through
//! [`StrategyCache::run_blocking`] so it lands on tokio's blocking pool.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::fingerprint::{Fingerprint, CACHE_KEY_PREFIX};
use super::StrategyData;
use crate::error::{CopilotError, Result};
use crate::util::now_millis;

/// Entries older than this are treated as absent.
pub const CACHE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

const CACHE_FILE: &str = "strategy-cache.json";

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    data: StrategyData,
    /// Write time, milliseconds since the Unix epoch.
    timestamp: i64,
    version: String,
}

pub struct StrategyCache {
    path: PathBuf,
    version: String,
    ttl_ms: i64,
    // Serializes read-modify-write cycles on the map file.
    lock: Mutex<()>,
}

impl StrategyCache {
    pub fn new(dir: impl AsRef<Path>, version: &str) -> Self {
        Self {
            path: dir.as_ref().join(CACHE_FILE),
            version: version.to_string(),
            ttl_ms: CACHE_TTL_MS,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Run a cache operation on the blocking thread pool.
    pub async fn run_blocking<T, F>(self: Arc<Self>, op: F) -> Result<T>
    where
        F: FnOnce(&StrategyCache) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(move || op(&self))
            .await
            .map_err(|e| CopilotError::Custom(format!("Strategy cache task failed: {e}")))?
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<StrategyData> {
        self.lookup_at(fingerprint, now_millis())
    }

    /// Lookup as of `now` (ms). An expired or unparseable entry is removed and
    /// reported absent.
    pub fn lookup_at(&self, fingerprint: &Fingerprint, now: i64) -> Option<StrategyData> {
        let _guard = self.lock.lock().ok()?;
        let key = fingerprint.storage_key();
        let mut entries = self.read_entries();
        let blob = entries.get(&key)?;

        match serde_json::from_str::<CacheEntry>(blob) {
            Ok(entry) if now - entry.timestamp < self.ttl_ms => Some(entry.data),
            Ok(entry) => {
                debug!(key = %key, age_ms = now - entry.timestamp, "Strategy cache entry expired");
                entries.remove(&key);
                self.persist(&entries);
                None
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Dropping corrupt strategy cache entry");
                entries.remove(&key);
                self.persist(&entries);
                None
            }
        }
    }

    pub fn store(&self, fingerprint: &Fingerprint, data: &StrategyData) -> Result<()> {
        self.store_at(fingerprint, data, now_millis())
    }

    pub fn store_at(&self, fingerprint: &Fingerprint, data: &StrategyData, now: i64) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CopilotError::Custom("Strategy cache lock poisoned".into()))?;

        let entry = CacheEntry {
            data: data.clone(),
            timestamp: now,
            version: self.version.clone(),
        };
        let mut entries = self.read_entries();
        entries.insert(fingerprint.storage_key(), serde_json::to_string(&entry)?);
        self.write_entries(&entries)
    }

    /// Drop every expired or unreadable entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        self.purge_expired_at(now_millis())
    }

    pub fn purge_expired_at(&self, now: i64) -> Result<usize> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CopilotError::Custom("Strategy cache lock poisoned".into()))?;

        let mut entries = self.read_entries();
        let before = entries.len();
        entries.retain(|_, blob| {
            serde_json::from_str::<CacheEntry>(blob)
                .map(|entry| now - entry.timestamp < self.ttl_ms)
                .unwrap_or(false)
        });
        let removed = before - entries.len();
        if removed > 0 {
            self.write_entries(&entries)?;
        }
        Ok(removed)
    }

    /// Remove all strategy entries. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CopilotError::Custom("Strategy cache lock poisoned".into()))?;

        let mut entries = self.read_entries();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(CACHE_KEY_PREFIX));
        let removed = before - entries.len();
        self.write_entries(&entries)?;
        Ok(removed)
    }

    /// Missing or unreadable file reads as an empty store.
    fn read_entries(&self) -> BTreeMap<String, String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return BTreeMap::new(),
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Strategy cache file unreadable, starting empty");
            BTreeMap::new()
        })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Best-effort write used on the read path, where a failed purge is harmless.
    fn persist(&self, entries: &BTreeMap<String, String>) {
        if let Err(e) = self.write_entries(entries) {
            warn!(error = %e, "Failed to rewrite strategy cache");
        }
    }
}
