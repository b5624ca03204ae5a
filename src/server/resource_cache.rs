//! Resource cache with TTL expiry, stale fallback and single-flight refresh
//!
//! Each registered resource key owns a slot holding its last good value and, while
//! one is running, the refresh that will replace it. The key→slot table is built
//! once and never changes, so unrelated keys never contend on a shared lock.
//!
//! Reads resolve as follows:
//!
//! - fresh entry, not invalidated: served from memory
//! - refresh already running: join it and share its outcome
//! - otherwise: start a refresh in its own task and wait for it
//!
//! A failed refresh never overwrites the stored value. If there is one, callers get
//! it back marked stale with the failure attached; if there is none, the read fails
//! with [`HomeyError::UpstreamUnreachableNoCache`].

use crate::client::Fetcher;
use crate::error::{FetchError, HomeyError, Result};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type RefreshOutcome = std::result::Result<Arc<CacheEntry>, RefreshFailure>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Last successfully fetched value for a key
#[derive(Debug)]
pub struct CacheEntry {
    pub key: String,
    pub value: Arc<Value>,
    /// Monotonic fetch time, used for TTL checks
    pub fetched_at: Instant,
    /// Wall-clock fetch time, used for reporting
    pub fetched_at_utc: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    fn new(key: &str, value: Value, ttl: Duration) -> Self {
        Self {
            key: key.to_string(),
            value: Arc::new(value),
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
            ttl,
        }
    }

    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.fetched_at)
    }

    pub fn is_fresh(&self) -> bool {
        self.age() < self.ttl
    }
}

/// A failed refresh, stamped when the fetcher gave up
#[derive(Debug, Clone)]
struct RefreshFailure {
    error: Arc<FetchError>,
    failed_at: DateTime<Utc>,
}

impl RefreshFailure {
    fn new(error: FetchError) -> Self {
        Self {
            error: Arc::new(error),
            failed_at: Utc::now(),
        }
    }
}

/// Whether a read reflects a successful refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
}

/// Result of a cache read
#[derive(Debug, Clone)]
pub struct CacheRead {
    pub value: Arc<Value>,
    pub freshness: Freshness,
    pub fetched_at: DateTime<Utc>,
    /// Refresh failure that forced a stale read
    pub error: Option<Arc<FetchError>>,
    /// When that refresh failed
    pub failed_at: Option<DateTime<Utc>>,
}

impl CacheRead {
    fn fresh(entry: &CacheEntry) -> Self {
        Self {
            value: Arc::clone(&entry.value),
            freshness: Freshness::Fresh,
            fetched_at: entry.fetched_at_utc,
            error: None,
            failed_at: None,
        }
    }

    fn stale(entry: &CacheEntry, failure: Option<RefreshFailure>) -> Self {
        let (error, failed_at) = match failure {
            Some(failure) => (Some(failure.error), Some(failure.failed_at)),
            None => (None, None),
        };
        Self {
            value: Arc::clone(&entry.value),
            freshness: Freshness::Stale,
            fetched_at: entry.fetched_at_utc,
            error,
            failed_at,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }
}

/// Coarse per-key state for status reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Empty,
    Fresh,
    Stale,
}

/// Per-key status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub key: String,
    pub state: EntryState,
    pub refreshing: bool,
    pub invalidated: bool,
    #[serde(with = "humantime_serde")]
    pub age: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Reads served from a fresh entry
    pub hits: u64,
    /// Reads that started a refresh
    pub misses: u64,
    /// Refreshes started
    pub refreshes: u64,
    /// Refreshes that failed
    pub refresh_failures: u64,
    /// Reads answered with stale data
    pub stale_served: u64,
    /// Reads that joined an in-flight refresh
    pub joined_waiters: u64,
}

impl CacheStats {
    /// Calculate hit ratio
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses + self.joined_waiters;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
    stale_served: AtomicU64,
    joined_waiters: AtomicU64,
}

impl CacheCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            joined_waiters: self.joined_waiters.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
struct SlotState {
    entry: Option<Arc<CacheEntry>>,
    in_flight: Option<SharedRefresh>,
    invalidated: bool,
    /// Bumped by every invalidation; a refresh only clears the mark if none
    /// happened while it ran
    generation: u64,
}

struct KeySlot {
    key: String,
    ttl: Duration,
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<SlotState>,
}

/// One resource key with its TTL and fetcher
#[derive(Clone)]
pub struct ResourceRegistration {
    pub key: String,
    pub ttl: Duration,
    pub fetcher: Arc<dyn Fetcher>,
}

impl ResourceRegistration {
    pub fn new(key: impl Into<String>, ttl: Duration, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            key: key.into(),
            ttl,
            fetcher,
        }
    }
}

impl std::fmt::Debug for ResourceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistration")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ResourceCache`]
#[derive(Debug, Default)]
pub struct ResourceCacheBuilder {
    registrations: Vec<ResourceRegistration>,
}

impl ResourceCacheBuilder {
    pub fn register(
        mut self,
        key: impl Into<String>,
        ttl: Duration,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        self.registrations
            .push(ResourceRegistration::new(key, ttl, fetcher));
        self
    }

    pub fn build(self) -> Result<ResourceCache> {
        ResourceCache::from_registrations(self.registrations)
    }
}

/// TTL cache over a fixed set of resource keys
pub struct ResourceCache {
    slots: HashMap<String, Arc<KeySlot>>,
    counters: Arc<CacheCounters>,
}

impl ResourceCache {
    pub fn builder() -> ResourceCacheBuilder {
        ResourceCacheBuilder::default()
    }

    /// Build from explicit registrations; duplicate or empty keys are rejected
    pub fn from_registrations<I>(registrations: I) -> Result<Self>
    where
        I: IntoIterator<Item = ResourceRegistration>,
    {
        let mut slots = HashMap::new();
        for registration in registrations {
            if registration.key.trim().is_empty() {
                return Err(HomeyError::config("resource key must not be empty"));
            }
            if slots.contains_key(&registration.key) {
                return Err(HomeyError::config(format!(
                    "resource '{}' registered twice",
                    registration.key
                )));
            }

            debug!(
                "Registered resource {} with TTL {:?}",
                registration.key, registration.ttl
            );
            let slot = KeySlot {
                key: registration.key.clone(),
                ttl: registration.ttl,
                fetcher: registration.fetcher,
                state: Mutex::new(SlotState::default()),
            };
            slots.insert(registration.key, Arc::new(slot));
        }

        Ok(Self {
            slots,
            counters: Arc::new(CacheCounters::default()),
        })
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    fn slot(&self, key: &str) -> Result<&Arc<KeySlot>> {
        self.slots
            .get(key)
            .ok_or_else(|| HomeyError::unknown_resource(key))
    }

    /// Read `key`, refreshing it if it is empty, expired or invalidated
    pub async fn get(&self, key: &str) -> Result<CacheRead> {
        let slot = self.slot(key)?;

        let (refresh, fallback) = {
            let mut state = slot.state.lock().await;

            if let Some(in_flight) = &state.in_flight {
                CacheCounters::bump(&self.counters.joined_waiters);
                debug!("Joining in-flight refresh for {}", key);
                (in_flight.clone(), state.entry.clone())
            } else {
                if let Some(entry) = &state.entry {
                    if !state.invalidated && entry.is_fresh() {
                        CacheCounters::bump(&self.counters.hits);
                        debug!("Cache hit for {}", key);
                        return Ok(CacheRead::fresh(entry));
                    }
                }

                CacheCounters::bump(&self.counters.misses);
                debug!("Cache miss for {}, refreshing", key);
                let refresh = self.start_refresh(slot, state.generation);
                state.in_flight = Some(refresh.clone());
                (refresh, state.entry.clone())
            }
        };

        match refresh.await {
            Ok(entry) => Ok(CacheRead::fresh(&entry)),
            Err(failure) => match fallback {
                Some(previous) => {
                    CacheCounters::bump(&self.counters.stale_served);
                    Ok(CacheRead::stale(&previous, Some(failure)))
                }
                None => Err(HomeyError::UpstreamUnreachableNoCache {
                    resource: key.to_string(),
                    source: failure.error,
                    failed_at: failure.failed_at,
                }),
            },
        }
    }

    /// Spawn the fetch so that callers giving up do not cancel it
    fn start_refresh(&self, slot: &Arc<KeySlot>, generation: u64) -> SharedRefresh {
        CacheCounters::bump(&self.counters.refreshes);

        let task = tokio::spawn(run_refresh(
            Arc::clone(slot),
            Arc::clone(&self.counters),
            generation,
        ));

        async move {
            task.await.unwrap_or_else(|e| {
                Err(RefreshFailure::new(FetchError::internal(format!(
                    "refresh task failed: {e}"
                ))))
            })
        }
        .boxed()
        .shared()
    }

    /// Force the next read of `key` to refresh. The stored value stays as fallback.
    pub async fn invalidate(&self, key: &str) -> Result<()> {
        let slot = self.slot(key)?;
        let mut state = slot.state.lock().await;
        state.invalidated = true;
        state.generation += 1;
        debug!("Invalidated {}", key);
        Ok(())
    }

    pub async fn invalidate_all(&self) {
        for slot in self.slots.values() {
            let mut state = slot.state.lock().await;
            state.invalidated = true;
            state.generation += 1;
        }
        info!("Invalidated all {} cached resources", self.slots.len());
    }

    /// Stored value with its freshness; never fetches
    pub async fn peek(&self, key: &str) -> Result<Option<CacheRead>> {
        let slot = self.slot(key)?;
        let state = slot.state.lock().await;
        Ok(state.entry.as_ref().map(|entry| {
            if !state.invalidated && entry.is_fresh() {
                CacheRead::fresh(entry)
            } else {
                CacheRead::stale(entry, None)
            }
        }))
    }

    /// Per-key status, sorted by key
    pub async fn status(&self) -> Vec<ResourceStatus> {
        let mut report = Vec::with_capacity(self.slots.len());
        for key in self.keys() {
            let slot = &self.slots[key];
            let state = slot.state.lock().await;
            let entry_state = match &state.entry {
                None => EntryState::Empty,
                Some(entry) if !state.invalidated && entry.is_fresh() => EntryState::Fresh,
                Some(_) => EntryState::Stale,
            };
            report.push(ResourceStatus {
                key: key.to_string(),
                state: entry_state,
                refreshing: state.in_flight.is_some(),
                invalidated: state.invalidated,
                age: state.entry.as_ref().map(|entry| entry.age()),
                ttl: slot.ttl,
                fetched_at: state.entry.as_ref().map(|entry| entry.fetched_at_utc),
            });
        }
        report
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("keys", &self.keys())
            .field("stats", &self.stats())
            .finish()
    }
}

async fn run_refresh(
    slot: Arc<KeySlot>,
    counters: Arc<CacheCounters>,
    generation: u64,
) -> RefreshOutcome {
    let started = Instant::now();
    let result = AssertUnwindSafe(slot.fetcher.fetch(&slot.key))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(FetchError::internal(format!(
                "fetcher for '{}' panicked: {}",
                slot.key,
                panic_message(panic.as_ref())
            )))
        });

    let mut state = slot.state.lock().await;
    state.in_flight = None;

    match result {
        Ok(value) => {
            let entry = Arc::new(CacheEntry::new(&slot.key, value, slot.ttl));
            state.entry = Some(Arc::clone(&entry));
            if state.generation == generation {
                state.invalidated = false;
            }
            info!("Refreshed {} in {:?}", slot.key, started.elapsed());
            Ok(entry)
        }
        Err(e) => {
            CacheCounters::bump(&counters.refresh_failures);
            if state.entry.is_some() {
                warn!(
                    "Refresh of {} failed ({}), serving stale data: {}",
                    slot.key,
                    e.kind(),
                    e
                );
            } else {
                error!(
                    "Refresh of {} failed ({}) and no cached data is available: {}",
                    slot.key,
                    e.kind(),
                    e
                );
            }
            Err(RefreshFailure::new(e))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FnFetcher;
    use serde_json::json;

    fn constant(value: Value) -> Arc<dyn Fetcher> {
        Arc::new(FnFetcher::new(move |_key: String| {
            let value = value.clone();
            async move { Ok(value) }
        }))
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let result = ResourceCache::builder()
            .register("devices", Duration::from_secs(30), constant(json!([])))
            .register("devices", Duration::from_secs(60), constant(json!([])))
            .build();
        assert!(matches!(result, Err(HomeyError::Config(_))));
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = ResourceCache::builder()
            .register("  ", Duration::from_secs(30), constant(json!([])))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let cache = ResourceCache::builder().build().unwrap();
        assert!(matches!(
            cache.get("zones").await,
            Err(HomeyError::UnknownResourceKey(_))
        ));
        assert!(cache.peek("zones").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_after_miss() {
        let cache = ResourceCache::builder()
            .register("zones", Duration::from_secs(300), constant(json!(["kitchen"])))
            .build()
            .unwrap();

        assert!(cache.peek("zones").await.unwrap().is_none());

        let first = cache.get("zones").await.unwrap();
        let second = cache.get("zones").await.unwrap();
        assert_eq!(*first.value, json!(["kitchen"]));
        assert!(!second.is_stale());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.refreshes, 1);
        assert_eq!(stats.hit_ratio(), 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_always_refreshes() {
        let cache = ResourceCache::builder()
            .register("devices", Duration::ZERO, constant(json!([])))
            .build()
            .unwrap();

        cache.get("devices").await.unwrap();
        cache.get("devices").await.unwrap();
        assert_eq!(cache.stats().refreshes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_states() {
        let cache = ResourceCache::builder()
            .register("flows", Duration::from_secs(120), constant(json!([])))
            .register("zones", Duration::from_secs(10), constant(json!([])))
            .build()
            .unwrap();

        cache.get("zones").await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        let status = cache.status().await;
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].key, "flows");
        assert_eq!(status[0].state, EntryState::Empty);
        assert_eq!(status[1].state, EntryState::Stale);
        assert!(!status[1].refreshing);
        assert!(status[1].age.unwrap() >= Duration::from_secs(11));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
