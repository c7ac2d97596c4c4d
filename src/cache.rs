// src/cache.rs
//! In-memory dedup cache keyed by content fingerprint, with a retention sweep.
//!
//! All access goes through one `RwLock`: membership tests and stats take the
//! read side, insert/mark/sweep take the write side, so a reader never sees a
//! half-written entry. Nothing is persisted; a restart starts from empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ingest::types::Item;
use crate::shutdown::Shutdown;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 3600);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CacheEntry {
    item: Item,
    processed_at: DateTime<Utc>,
    marked: bool,
}

/// Read-only snapshot for the host's stats surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_cached_items: usize,
    pub processed_count: usize,
    #[serde(rename = "retention_secs", serialize_with = "as_secs")]
    pub retention: Duration,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

#[derive(Debug)]
pub struct DedupCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    retention: Duration,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl DedupCache {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn has(&self, fingerprint: &str) -> bool {
        self.entries.read().contains_key(fingerprint)
    }

    pub fn get(&self, fingerprint: &str) -> Option<Item> {
        self.entries.read().get(fingerprint).map(|e| e.item.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or overwrite the entry for `item.fingerprint`, stamped now.
    pub fn add(&self, item: Item) {
        self.add_at(item, Utc::now());
    }

    /// Insert with an explicit processed-at stamp (cache warm-up, replay).
    pub fn add_at(&self, item: Item, processed_at: DateTime<Utc>) {
        let mut map = self.entries.write();
        map.insert(
            item.fingerprint.clone(),
            CacheEntry {
                item,
                processed_at,
                marked: false,
            },
        );
        gauge!("cache_entries").set(map.len() as f64);
    }

    /// Refresh processed-at for an existing entry. No-op when absent.
    pub fn mark_processed(&self, fingerprint: &str) {
        if let Some(entry) = self.entries.write().get_mut(fingerprint) {
            entry.processed_at = Utc::now();
            entry.marked = true;
        }
    }

    pub fn stats(&self) -> CacheStats {
        let map = self.entries.read();
        CacheStats {
            total_cached_items: map.len(),
            processed_count: map.values().filter(|e| e.marked).count(),
            retention: self.retention,
        }
    }

    /// Drop every entry older than the retention window at `now`.
    /// Returns the number of evicted entries.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX);
        let mut map = self.entries.write();
        let before = map.len();
        map.retain(|_, e| now.signed_duration_since(e.processed_at) <= retention);
        let evicted = before - map.len();

        gauge!("cache_entries").set(map.len() as f64);
        counter!("cache_evicted_total").increment(evicted as u64);
        evicted
    }

    pub fn sweep(&self) -> usize {
        self.sweep_expired(Utc::now())
    }
}

/// Run the retention sweep every `every` until shutdown.
pub fn spawn_sweeper(cache: Arc<DedupCache>, every: Duration, mut shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick fires immediately; nothing can be stale yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    let evicted = cache.sweep();
                    tracing::info!(
                        target: "cache",
                        evicted,
                        remaining = cache.len(),
                        "retention sweep"
                    );
                }
            }
        }
        tracing::debug!(target: "cache", "sweeper stopped");
    })
}
