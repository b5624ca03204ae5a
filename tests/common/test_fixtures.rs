//! Test fixtures: scripted fetchers and cache/facade setup

use homey_mcp_rust::client::{FetchResult, Fetcher};
use homey_mcp_rust::error::FetchError;
use homey_mcp_rust::server::{PageCodec, QueryFacade, ResourceCache};
use async_trait::async_trait;
use rstest::*;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fetcher that replays a fixed list of outcomes, one per call
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<FetchResult>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedFetcher {
    pub fn new(script: impl IntoIterator<Item = FetchResult>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Every call sleeps for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, key: &str) -> FetchResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(FetchError::internal(format!("script for {key} exhausted"))))
    }
}

/// `count` device records with ids `0..count`
pub fn devices(count: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|i| json!({ "id": format!("dev-{i:03}"), "name": format!("Device {i:03}") }))
            .collect(),
    )
}

/// Cache with a single `devices` resource backed by `fetcher`
pub fn single_resource_cache(fetcher: Arc<ScriptedFetcher>, ttl: Duration) -> ResourceCache {
    ResourceCache::builder()
        .register("devices", ttl, fetcher)
        .build()
        .expect("valid registrations")
}

#[fixture]
pub fn codec() -> PageCodec {
    PageCodec::new(10, 50).expect("valid page sizes")
}

/// Facade over `devices` and `system-overview`, each scripted separately
pub fn facade_with(
    devices: Arc<ScriptedFetcher>,
    overview: Arc<ScriptedFetcher>,
    codec: PageCodec,
) -> QueryFacade {
    let cache = ResourceCache::builder()
        .register("devices", Duration::from_secs(30), devices)
        .register("system-overview", Duration::from_secs(300), overview)
        .build()
        .expect("valid registrations");
    QueryFacade::new(Arc::new(cache), codec)
}
