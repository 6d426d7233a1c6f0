use crate::time::now_unix_secs;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Server-level and cache-level counters, all plain atomics. The stats
/// snapshot reads each one independently; cross-field consistency at a
/// single instant is not required (§5 of the design notes).
#[derive(Default)]
pub struct Metrics {
    start_time_unix: u64,

    pub curr_connections: AtomicI64,
    pub total_connections: AtomicU64,
    pub rejected_connections: AtomicU64,

    pub cmd_get: AtomicU64,
    pub cmd_set: AtomicU64,
    pub cmd_flush: AtomicU64,

    pub get_hits: AtomicU64,
    pub get_misses: AtomicU64,

    pub delete_hits: AtomicU64,
    pub delete_misses: AtomicU64,

    pub store_too_large: AtomicU64,

    pub keys_added: AtomicU64,
    pub keys_updated: AtomicU64,
    pub keys_evicted: AtomicU64,
    pub cost_added: AtomicU64,
    pub cost_evicted: AtomicU64,

    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time_unix: now_unix_secs(),
            ..Default::default()
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        now_unix_secs().saturating_sub(self.start_time_unix)
    }

    pub fn inc_connection_opened(&self) {
        self.curr_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_connection_closed(&self) {
        self.curr_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inc_rejected_connection(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }
}
