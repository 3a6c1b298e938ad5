//! Degraded-result cache
//!
//! Holds the last good raw reply per request key so the coordinator can
//! replay it when every provider is down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::resilience::{Clock, TokioClock};

/// Key-value store for degraded replays
#[async_trait]
pub trait DegradedCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn put(&self, key: String, value: String, ttl: Duration);
}

struct CacheEntry {
    value: String,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

/// In-process `DegradedCache` with per-entry expiry
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    hit_count: AtomicUsize,
    miss_count: AtomicUsize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl MemoryCache {
    /// Create a cache holding at most `max_entries` replies
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(TokioClock))
    }

    /// Create a cache whose expiry reads time from `clock`
    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            clock,
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
        }
    }

    /// Number of stored entries, expired ones included
    pub fn size(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (usize, usize) {
        (
            self.hit_count.load(Ordering::Relaxed),
            self.miss_count.load(Ordering::Relaxed),
        )
    }

    fn evict(entries: &mut HashMap<String, CacheEntry>, max_entries: usize, now: Instant) {
        entries.retain(|_, entry| !entry.is_expired(now));
        while entries.len() >= max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl DegradedCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                let age = now.saturating_duration_since(entry.stored_at);
                debug!(key = %key, age_ms = age.as_millis() as u64, "Degraded cache hit");
                Some(entry.value.clone())
            }
            _ => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn put(&self, key: String, value: String, ttl: Duration) {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if !entries.contains_key(&key) {
            Self::evict(&mut entries, self.max_entries, now);
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
                ttl,
            },
        );
    }
}
