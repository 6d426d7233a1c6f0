pub mod entry;

pub use entry::{Entry, ValueRecord};

use crate::metrics::Metrics;
use crate::time::{now_unix_secs, resolve_expire};
use bytes::Bytes;
use moka::notification::RemovalCause;
use moka::sync::Cache as MokaCache;
use moka::Expiry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Per-entry variable TTL for moka: each `Entry` already carries the
/// duration it was created with, so the policy just hands that back.
struct EntryExpiry;

impl Expiry<String, Arc<Entry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<Entry>,
        _current_time: std::time::Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<Entry>,
        _current_time: std::time::Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// The concurrent, cost-bounded, TTL-aware key/value store. Backed by
/// `moka::sync::Cache`: a weigher charges each entry its accounting cost,
/// a W-TinyLFU frequency sketch over a segmented LRU admits or rejects
/// candidates once the map is at capacity, and the custom `Expiry` above
/// gives each entry its own TTL instead of one cache-wide value.
pub struct CacheEngine {
    cache: MokaCache<String, Arc<Entry>>,
    cas_counter: AtomicU64,
    metrics: Arc<Metrics>,
}

impl CacheEngine {
    pub fn new(max_cost_bytes: u64, metrics: Arc<Metrics>) -> Arc<Self> {
        let listener_metrics = metrics.clone();
        let cache = MokaCache::builder()
            .max_capacity(max_cost_bytes)
            .weigher(|k: &String, v: &Arc<Entry>| Entry::cost(k, v.value.len()))
            .expire_after(EntryExpiry)
            .eviction_listener(move |k: Arc<String>, v: Arc<Entry>, cause| {
                if matches!(cause, RemovalCause::Size) {
                    listener_metrics.keys_evicted.fetch_add(1, Ordering::Relaxed);
                    listener_metrics
                        .cost_evicted
                        .fetch_add(Entry::cost(&k, v.value.len()) as u64, Ordering::Relaxed);
                }
            })
            .build();

        Arc::new(Self {
            cache,
            cas_counter: AtomicU64::new(0),
            metrics,
        })
    }

    /// Looks up `keys` in request order, preserving duplicates; missing
    /// keys are silently dropped from the returned sequence.
    pub fn get(&self, keys: &[String]) -> Vec<(String, Arc<Entry>)> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            match self.cache.get(key) {
                Some(entry) => {
                    self.metrics.get_hits.fetch_add(1, Ordering::Relaxed);
                    out.push((key.clone(), entry));
                }
                None => {
                    self.metrics.get_misses.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        out
    }

    /// Stores `value` under `key`, assigning a fresh CAS token. Always
    /// reports success to the caller even if admission later drops the
    /// entry, mirroring reference semantics (§4.4).
    pub fn set(&self, key: String, flags: u32, expire: i64, value: Bytes) -> u64 {
        let now = now_unix_secs();
        let expires_at = resolve_expire(expire, now);
        let ttl = expires_at.map(|exp| Duration::from_secs(exp.saturating_sub(now)));
        let cost = Entry::cost(&key, value.len());

        let unique = self.cas_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let is_update = self.cache.contains_key(&key);

        let entry = Arc::new(Entry { flags, value, unique, ttl });
        self.cache.insert(key, entry);

        if is_update {
            self.metrics.keys_updated.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.keys_added.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.cost_added.fetch_add(cost as u64, Ordering::Relaxed);

        unique
    }

    pub fn delete(&self, key: &str) -> bool {
        let existed = self.cache.contains_key(key);
        self.cache.invalidate(key);
        existed
    }

    pub fn flush_all(&self) {
        self.cache.invalidate_all();
    }

    /// Atomically raises or lowers the capacity ceiling. moka does not
    /// synchronously evict down to a lower ceiling; subsequent reads/writes
    /// trigger the catch-up (§9, open question on shrink-to-fit).
    pub fn set_max_capacity(&self, max_cost_bytes: u64) {
        self.cache.policy().set_max_capacity(max_cost_bytes);
    }

    pub fn max_capacity(&self) -> u64 {
        self.cache.policy().max_capacity().unwrap_or(0)
    }

    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn weighted_size(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.weighted_size()
    }
}

/// Spawns a deferred `flush_all` that fires once `delay` has elapsed,
/// holding only an `Arc` to the engine so the connection that requested it
/// can return immediately.
pub fn schedule_flush(engine: Arc<CacheEngine>, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        engine.flush_all();
    });
}
