//! Fetcher wrapper applying timeout, retry and circuit breaking
//!
//! Each attempt is bounded by the per-call timeout and gated by the (optional,
//! usually shared) circuit breaker. The retry executor decides whether a failed
//! attempt is tried again. The cache in front of this only ever sees the final
//! outcome.

use crate::client::{FetchResult, Fetcher};
use crate::config::ResilienceConfig;
use crate::error::FetchError;
use crate::error_recovery::{
    CircuitBreaker, CircuitBreakerStats, RetryExecutor, RetryPolicy, RetryStats,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A [`Fetcher`] hardened against a flaky upstream
pub struct ResilientFetcher<F> {
    inner: F,
    timeout: Duration,
    retry: RetryExecutor,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl<F: Fetcher> ResilientFetcher<F> {
    pub fn new(inner: F, timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            inner,
            timeout,
            retry: RetryExecutor::new(policy),
            breaker: None,
        }
    }

    /// Build from configuration, sharing `breaker` if the config enables one
    pub fn from_config(
        inner: F,
        timeout: Duration,
        config: &ResilienceConfig,
        breaker: Option<Arc<CircuitBreaker>>,
    ) -> Self {
        let fetcher = Self::new(inner, timeout, config.retry.clone());
        match (breaker, config.circuit_breaker.is_some()) {
            (Some(breaker), true) => fetcher.with_circuit_breaker(breaker),
            _ => fetcher,
        }
    }

    /// Gate every attempt through `breaker`
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub async fn retry_stats(&self) -> RetryStats {
        self.retry.get_stats().await
    }

    pub async fn circuit_breaker_stats(&self) -> Option<CircuitBreakerStats> {
        match &self.breaker {
            Some(breaker) => Some(breaker.stats().await),
            None => None,
        }
    }

    async fn attempt(&self, key: &str) -> FetchResult {
        if let Some(breaker) = &self.breaker {
            breaker.try_acquire().await?;
        }

        let result = match tokio::time::timeout(self.timeout, self.inner.fetch(key)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Fetch of {} exceeded {:?}", key, self.timeout);
                Err(FetchError::timeout(format!(
                    "fetch of '{key}' exceeded {:?}",
                    self.timeout
                )))
            }
        };

        if let Some(breaker) = &self.breaker {
            match &result {
                Ok(_) => breaker.record_success().await,
                Err(e) if e.is_network_failure() => breaker.record_failure().await,
                Err(_) => breaker.release_trial().await,
            }
        }

        result
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for ResilientFetcher<F> {
    async fn fetch(&self, key: &str) -> FetchResult {
        self.retry.execute(|| self.attempt(key)).await
    }
}

impl<F> std::fmt::Debug for ResilientFetcher<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientFetcher")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.retry.policy().max_retries)
            .field("circuit_breaker", &self.breaker.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FnFetcher;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out_and_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let inner = FnFetcher::new(move |_key: String| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok(json!(["ok"]))
            }
        });

        let policy = RetryPolicy {
            max_retries: 1,
            ..RetryPolicy::default()
        }
        .without_jitter();
        let fetcher = ResilientFetcher::new(inner, Duration::from_secs(5), policy);

        assert_eq!(fetcher.fetch("devices").await.unwrap(), json!(["ok"]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_decode_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let inner = FnFetcher::new(move |_key: String| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::decode("not json")) }
        });
        let fetcher = ResilientFetcher::new(inner, Duration::from_secs(5), RetryPolicy::default());

        assert_eq!(
            fetcher.fetch("zones").await.unwrap_err(),
            FetchError::decode("not json")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
