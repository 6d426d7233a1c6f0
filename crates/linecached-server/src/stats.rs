use linecached_proto::{Encoder, MemcachedMarshal};
use parking_lot::RwLock;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheEngine;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::time::now_unix_secs;

pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The process-wide figures `stats` can't get from atomics: CPU time from
/// `getrusage`, sampled once a second by [`RuntimeSampler`] rather than on
/// every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuntimeSnapshot {
    pub user_cpu_seconds: f64,
    pub system_cpu_seconds: f64,
}

/// Background ticker publishing a fresh [`RuntimeSnapshot`] once per second.
/// The ticker takes the write side of the lock; request handlers only ever
/// read it.
pub struct RuntimeSampler {
    snapshot: RwLock<RuntimeSnapshot>,
}

impl RuntimeSampler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { snapshot: RwLock::new(read_rusage()) })
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        *self.snapshot.read()
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            *self.snapshot.write() = read_rusage();
        }
    }
}

/// Reads `getrusage(RUSAGE_SELF)` via a raw libc binding, matching the
/// reference server's own `syscall.Getrusage` call — the one place this
/// crate reaches for libc directly, since no safe-Rust crate in the corpus
/// wraps it any more simply.
fn read_rusage() -> RuntimeSnapshot {
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        let rc = libc::getrusage(libc::RUSAGE_SELF, &mut usage);
        if rc != 0 {
            return RuntimeSnapshot::default();
        }
        RuntimeSnapshot {
            user_cpu_seconds: usage.ru_utime.tv_sec as f64 + usage.ru_utime.tv_usec as f64 / 1_000_000.0,
            system_cpu_seconds: usage.ru_stime.tv_sec as f64 + usage.ru_stime.tv_usec as f64 / 1_000_000.0,
        }
    }
}

/// A consistent-in-structure, per-field independently atomic sample of
/// server, cache, and runtime counters. Built fresh on every `stats`
/// command and marshaled as one `STAT <name> <value>` line per field.
pub struct StatsSnapshot {
    pub pid: u32,
    pub uptime_seconds: u64,
    pub time: u64,
    pub version: &'static str,
    pub rusage_user: f64,
    pub rusage_system: f64,
    pub max_connections: i64,
    pub curr_connections: i64,
    pub total_connections: u64,
    pub rejected_connections: u64,
    pub cmd_get: u64,
    pub cmd_set: u64,
    pub cmd_flush: u64,
    pub cmd_touch: u64,
    pub cmd_meta: u64,
    pub get_hits: u64,
    pub get_misses: u64,
    pub get_expired: u64,
    pub get_flushed: u64,
    pub store_too_large: u64,
    pub store_no_memory: u64,
    pub delete_hits: u64,
    pub delete_misses: u64,
    pub incr_hits: u64,
    pub incr_misses: u64,
    pub decr_hits: u64,
    pub decr_misses: u64,
    pub touch_hits: u64,
    pub touch_misses: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub bytes: u64,
    pub limit_maxbytes: u64,
    pub curr_items: u64,
    pub total_items: u64,
    pub evictions: u64,
}

impl StatsSnapshot {
    pub fn build(
        cfg: &Config,
        metrics: &Metrics,
        cache: &CacheEngine,
        runtime: RuntimeSnapshot,
    ) -> Self {
        let keys_added = metrics.keys_added.load(Ordering::Relaxed);
        let keys_updated = metrics.keys_updated.load(Ordering::Relaxed);
        Self {
            pid: std::process::id(),
            uptime_seconds: metrics.uptime_secs(),
            time: now_unix_secs(),
            version: SERVER_VERSION,
            rusage_user: runtime.user_cpu_seconds,
            rusage_system: runtime.system_cpu_seconds,
            max_connections: cfg.max_connections,
            curr_connections: metrics.curr_connections.load(Ordering::Relaxed),
            total_connections: metrics.total_connections.load(Ordering::Relaxed),
            rejected_connections: metrics.rejected_connections.load(Ordering::Relaxed),
            cmd_get: metrics.cmd_get.load(Ordering::Relaxed),
            cmd_set: metrics.cmd_set.load(Ordering::Relaxed),
            cmd_flush: metrics.cmd_flush.load(Ordering::Relaxed),
            // touch/meta commands are unsupported (§1 Non-goals); counters stay at zero.
            cmd_touch: 0,
            cmd_meta: 0,
            get_hits: metrics.get_hits.load(Ordering::Relaxed),
            get_misses: metrics.get_misses.load(Ordering::Relaxed),
            get_expired: 0,
            get_flushed: 0,
            delete_hits: metrics.delete_hits.load(Ordering::Relaxed),
            delete_misses: metrics.delete_misses.load(Ordering::Relaxed),
            incr_hits: 0,
            incr_misses: 0,
            decr_hits: 0,
            decr_misses: 0,
            touch_hits: 0,
            touch_misses: 0,
            store_too_large: metrics.store_too_large.load(Ordering::Relaxed),
            store_no_memory: 0,
            bytes_read: metrics.bytes_read.load(Ordering::Relaxed),
            bytes_written: metrics.bytes_written.load(Ordering::Relaxed),
            bytes: cache.weighted_size(),
            limit_maxbytes: cache.max_capacity(),
            curr_items: cache.len(),
            total_items: keys_added + keys_updated,
            evictions: metrics.keys_evicted.load(Ordering::Relaxed),
        }
    }
}

impl MemcachedMarshal for StatsSnapshot {
    fn marshal(&self, out: &mut Encoder) {
        macro_rules! stat {
            ($name:expr, $value:expr) => {
                out.line(&format!("STAT {} {}", $name, $value));
            };
        }

        stat!("pid", self.pid);
        stat!("uptime", self.uptime_seconds);
        stat!("time", self.time);
        stat!("version", self.version);
        stat!("rusage_user", format!("{:.6}", self.rusage_user));
        stat!("rusage_system", format!("{:.6}", self.rusage_system));
        stat!("max_connections", self.max_connections);
        stat!("curr_connections", self.curr_connections);
        stat!("total_connections", self.total_connections);
        stat!("rejected_connections", self.rejected_connections);
        stat!("cmd_get", self.cmd_get);
        stat!("cmd_set", self.cmd_set);
        stat!("cmd_flush", self.cmd_flush);
        stat!("cmd_touch", self.cmd_touch);
        stat!("cmd_meta", self.cmd_meta);
        stat!("get_hits", self.get_hits);
        stat!("get_misses", self.get_misses);
        stat!("get_expired", self.get_expired);
        stat!("get_flushed", self.get_flushed);
        stat!("store_too_large", self.store_too_large);
        stat!("store_no_memory", self.store_no_memory);
        stat!("delete_hits", self.delete_hits);
        stat!("delete_misses", self.delete_misses);
        stat!("incr_hits", self.incr_hits);
        stat!("incr_misses", self.incr_misses);
        stat!("decr_hits", self.decr_hits);
        stat!("decr_misses", self.decr_misses);
        stat!("touch_hits", self.touch_hits);
        stat!("touch_misses", self.touch_misses);
        stat!("bytes_read", self.bytes_read);
        stat!("bytes_written", self.bytes_written);
        stat!("bytes", self.bytes);
        stat!("limit_maxbytes", self.limit_maxbytes);
        stat!("curr_items", self.curr_items);
        stat!("total_items", self.total_items);
        stat!("evictions", self.evictions);
        out.end();
    }
}
