//! Time-indexed cache of exporter and interface metadata.
//!
//! Keyed by (canonical exporter, ifIndex). Every entry carries three
//! timestamps: when it was written, when it was last served, and when it
//! expires. The refresh scan uses the first two to re-poll entries that
//! are both aging and in active use, so hot flows never see a miss;
//! entries that went cold are left to expire.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use flowmeta_core::{Interface, Resolved};
use rustc_hash::FxHashMap;

use crate::metrics::Metrics;
use crate::CacheKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CacheEntry {
    pub exporter_name: String,
    pub interface: Interface,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub(crate) struct InterfaceCache {
    entries: RwLock<FxHashMap<CacheKey, CacheEntry>>,
    duration: chrono::Duration,
    /// Refresh age; `None` disables the refresh scan.
    refresh: Option<chrono::Duration>,
    metrics: Metrics,
}

impl InterfaceCache {
    pub(crate) fn new(
        duration: std::time::Duration,
        refresh: std::time::Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            duration: chrono_duration(duration),
            refresh: (!refresh.is_zero()).then(|| chrono_duration(refresh)),
            metrics,
        }
    }

    /// Serve a fresh entry and mark it accessed. Expired entries are left
    /// in place for the next scan and count as misses.
    pub(crate) fn get(&self, now: DateTime<Utc>, key: CacheKey) -> Option<Resolved> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(&key) {
            if entry.expires_at > now {
                entry.last_access = now;
                self.metrics.cache_hit.inc();
                return Some(Resolved {
                    exporter_name: entry.exporter_name.clone(),
                    interface: entry.interface.clone(),
                });
            }
        }
        self.metrics.cache_miss.inc();
        None
    }

    /// Write or overwrite an entry, restarting its lifetime.
    pub(crate) fn put(
        &self,
        now: DateTime<Utc>,
        key: CacheKey,
        exporter_name: String,
        interface: Interface,
    ) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            CacheEntry {
                exporter_name,
                interface,
                created_at: now,
                last_access: now,
                expires_at: now + self.duration,
            },
        );
        self.metrics.cache_size.set(entries.len() as i64);
    }

    /// Keys of entries past their expiry.
    pub(crate) fn expired_before(&self, now: DateTime<Utc>) -> Vec<CacheKey> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| *key)
            .collect()
    }

    /// Keys of live entries that have reached the refresh age and were
    /// recently served.
    pub(crate) fn needing_refresh(&self, now: DateTime<Utc>) -> Vec<CacheKey> {
        let Some(refresh) = self.refresh else {
            return Vec::new();
        };
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|(_, entry)| {
                entry.expires_at > now
                    && now >= entry.created_at + refresh
                    && entry.last_access >= now - refresh
            })
            .map(|(key, _)| *key)
            .collect()
    }

    pub(crate) fn delete(&self, key: &CacheKey) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        self.metrics.cache_size.set(entries.len() as i64);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Copy of all entries, for snapshotting.
    pub(crate) fn dump(&self) -> Vec<(CacheKey, CacheEntry)> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    /// Bulk-restore entries, keeping their original timestamps so that
    /// anything already past expiry is evicted by the next scan.
    pub(crate) fn restore(&self, restored: impl IntoIterator<Item = (CacheKey, CacheEntry)>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for (key, entry) in restored {
            entries.insert(key, entry);
        }
        self.metrics.cache_size.set(entries.len() as i64);
    }
}

fn chrono_duration(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36500))
}
