//! Time-boxed memoization of upstream results.
//!
//! Entries never expire on their own: freshness is checked on read
//! (`age < ttl`), and a background sweep drops entries older than `2 × ttl`.
//! Values are replaced wholesale on every write and failed computations are
//! never stored.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::any::Any;
use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Upper bound on stored entries; only reached if keys are unbounded.
const MAX_ENTRIES: u64 = 10_000;

/// Builds a key from an operation name and its argument tuple.
///
/// The `Debug` rendering quotes strings, so different arguments never
/// produce the same key.
pub fn cache_key(operation: &str, args: impl Debug) -> String {
    format!("{operation}{args:?}")
}

#[derive(Clone)]
struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    stored_at: Instant,
    stored_at_wall: DateTime<Utc>,
    ttl: Duration,
    generation: u64,
}

impl CacheEntry {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.age(now) < self.ttl
    }

    fn is_sweepable(&self, now: Instant) -> bool {
        self.age(now) > self.ttl * 2
    }
}

/// State of one cache entry, for admin reporting.
#[derive(Debug, Clone)]
pub struct EntryStatus {
    pub key: String,
    pub stored_at: DateTime<Utc>,
    pub age: Duration,
    pub ttl: Duration,
    pub fresh: bool,
}

/// In-memory TTL cache shared by all content operations.
pub struct TtlCache {
    entries: Cache<String, CacheEntry>,
    generation: AtomicU64,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().max_capacity(MAX_ENTRIES).build(),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the fresh cached value for `key`, or runs `compute` and stores
    /// its result.
    ///
    /// With `force_refresh` the stored value is ignored and `compute` always
    /// runs. A stored value of a different type counts as a miss.
    ///
    /// # Errors
    ///
    /// Returns the error of `compute` unchanged; the stored entry, if any, is
    /// left untouched.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        force_refresh: bool,
        compute: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !force_refresh {
            if let Some(value) = self.get_fresh::<T>(key).await {
                debug!(key, "Cache hit");
                return Ok(value);
            }
        }

        debug!(key, force_refresh, "Cache miss, computing");
        let value = compute().await?;
        self.store(key, ttl, value.clone()).await;
        Ok(value)
    }

    /// Fresh value for `key`, if present and of type `T`.
    pub async fn get_fresh<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key).await?;
        if !entry.is_fresh(Instant::now()) {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub async fn store<T: Send + Sync + 'static>(&self, key: &str, ttl: Duration, value: T) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = CacheEntry {
            value: Arc::new(value),
            stored_at: Instant::now(),
            stored_at_wall: Utc::now(),
            ttl,
            generation,
        };
        self.entries.insert(key.to_string(), entry).await;
    }

    /// Write generation of the fresh entry under `key`.
    ///
    /// Every write gets a new, strictly larger generation, so a changed
    /// generation means the value was replaced. Expired entries report `None`.
    pub async fn generation(&self, key: &str) -> Option<u64> {
        self.entries
            .get(key)
            .await
            .filter(|e| e.is_fresh(Instant::now()))
            .map(|e| e.generation)
    }

    /// Removes entries older than twice their TTL. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let stale: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_sweepable(now))
            .map(|(key, _)| key)
            .collect();

        for key in &stale {
            self.entries.invalidate(key.as_str()).await;
        }
        stale.len()
    }

    /// Runs [`Self::sweep`] every `interval` until `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.sweep().await;
                        if removed > 0 {
                            info!(removed, "Swept expired cache entries");
                        }
                    }
                }
            }
            debug!("Cache sweeper stopped");
        })
    }

    /// Status of every entry, sorted by key.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EntryStatus> {
        let now = Instant::now();
        let mut statuses: Vec<EntryStatus> = self
            .entries
            .iter()
            .map(|(key, entry)| EntryStatus {
                key: key.as_str().to_string(),
                stored_at: entry.stored_at_wall,
                age: entry.age(now),
                ttl: entry.ttl,
                fresh: entry.is_fresh(now),
            })
            .collect();
        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        statuses
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
