//! Upstream access for resource values
//!
//! The cache never talks to HomeyPro itself. Each resource is registered with a
//! [`Fetcher`] that knows how to produce a fresh value for it; the HTTP
//! implementation lives in [`http_client`], and anything else (tests, fixtures,
//! alternative transports) can plug in through the same trait.

pub mod http_client;

pub use http_client::{HomeyFetcher, HomeyHttpClient};

use crate::error::FetchError;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Result of a single upstream fetch
pub type FetchResult = std::result::Result<Value, FetchError>;

/// Produces a fresh value for a resource key
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the current value for `key`. Timeouts and retries are the
    /// implementation's business; the cache only sees success or failure.
    async fn fetch(&self, key: &str) -> FetchResult;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, key: &str) -> FetchResult {
        (**self).fetch(key).await
    }
}

/// Adapts an async closure into a [`Fetcher`]
pub struct FnFetcher<F> {
    func: F,
}

impl<F, Fut> FnFetcher<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = FetchResult> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Fetcher for FnFetcher<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = FetchResult> + Send,
{
    async fn fetch(&self, key: &str) -> FetchResult {
        (self.func)(key.to_string()).await
    }
}

impl<F> std::fmt::Debug for FnFetcher<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnFetcher(<function>)")
    }
}
