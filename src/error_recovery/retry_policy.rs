//! Retry policy with exponential backoff and jitter
//!
//! Retries belong to the fetch path, never to the cache: the cache reacts to the
//! final outcome of a fetch, however many attempts that took.

use crate::error::FetchError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Backoff strategy
    pub backoff_strategy: BackoffStrategy,
    /// Jitter configuration
    pub jitter: JitterConfig,
    /// Log every attempt at debug level
    pub detailed_logging: bool,
}

/// Backoff strategies for retry delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Fixed,
    /// Delay grows by `increment` per retry
    Linear {
        #[serde(with = "humantime_serde")]
        increment: Duration,
    },
    /// Delay is multiplied by `multiplier` per retry
    Exponential { multiplier: f64 },
}

/// Jitter configuration for retry delays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitterConfig {
    /// Enable jitter
    pub enabled: bool,
    /// Jitter type
    pub jitter_type: JitterType,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

/// Types of jitter strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JitterType {
    /// delay = random(0, delay * factor)
    Full,
    /// delay = delay/2 + random(0, delay/2 * factor)
    Equal,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_strategy: BackoffStrategy::Exponential { multiplier: 2.0 },
            jitter: JitterConfig {
                enabled: true,
                jitter_type: JitterType::Equal,
                jitter_factor: 0.5,
            },
            detailed_logging: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Deterministic delays, mostly for tests
    pub fn without_jitter(mut self) -> Self {
        self.jitter.enabled = false;
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let step = retry.saturating_sub(1);
        let base_delay = match &self.backoff_strategy {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Linear { increment } => {
                self.initial_delay + increment.saturating_mul(step)
            }
            BackoffStrategy::Exponential { multiplier } => {
                let ms = self.initial_delay.as_millis() as f64 * multiplier.powi(step as i32);
                if ms.is_finite() && ms < self.max_delay.as_millis() as f64 {
                    Duration::from_millis(ms.max(0.0) as u64)
                } else {
                    self.max_delay
                }
            }
        };

        let capped_delay = base_delay.min(self.max_delay);

        if self.jitter.enabled {
            self.apply_jitter(capped_delay)
        } else {
            capped_delay
        }
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        let delay_ms = delay.as_millis() as f64;
        let factor = self.jitter.jitter_factor.clamp(0.0, 1.0);

        let jittered_ms = match self.jitter.jitter_type {
            JitterType::Full => rng.gen_range(0.0..=delay_ms * factor),
            JitterType::Equal => {
                let half = delay_ms / 2.0;
                half + rng.gen_range(0.0..=half * factor)
            }
        };

        Duration::from_millis(jittered_ms as u64)
    }

    /// Check if error should be retried
    pub fn should_retry(&self, error: &FetchError) -> bool {
        error.is_retryable()
    }
}

/// Retry statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryStats {
    /// Total operations attempted
    pub total_operations: u64,
    /// Successful operations (no retry needed)
    pub successful_first_attempt: u64,
    /// Successful operations (after retry)
    pub successful_after_retry: u64,
    /// Failed operations (retries exhausted or error not retryable)
    pub failed: u64,
    /// Total retry attempts
    pub total_retry_attempts: u64,
}

/// Runs operations under a [`RetryPolicy`]
#[derive(Debug)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    stats: Arc<RwLock<RetryStats>>,
}

impl RetryExecutor {
    /// Create new retry executor
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            stats: Arc::new(RwLock::new(RetryStats::default())),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute operation with retry policy
    pub async fn execute<F, T, Fut>(&self, operation: F) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        self.stats.write().await.total_operations += 1;

        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if self.policy.detailed_logging && attempt > 1 {
                debug!(
                    "Retry attempt {} of {}",
                    attempt - 1,
                    self.policy.max_retries
                );
            }

            let error = match operation().await {
                Ok(result) => {
                    let mut stats = self.stats.write().await;
                    if attempt == 1 {
                        stats.successful_first_attempt += 1;
                    } else {
                        stats.successful_after_retry += 1;
                        info!("Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !self.policy.should_retry(&error) {
                if self.policy.detailed_logging {
                    debug!("Error not retryable: {}", error);
                }
                self.stats.write().await.failed += 1;
                return Err(error);
            }

            if attempt > self.policy.max_retries {
                warn!("Operation failed after {} attempts: {}", attempt, error);
                self.stats.write().await.failed += 1;
                return Err(error);
            }

            let delay = self.policy.calculate_delay(attempt);
            self.stats.write().await.total_retry_attempts += 1;

            warn!(
                "Attempt {}/{} failed, retrying in {:?}: {}",
                attempt,
                self.policy.max_retries + 1,
                delay,
                error
            );

            sleep(delay).await;
        }
    }

    /// Get retry statistics
    pub async fn get_stats(&self) -> RetryStats {
        self.stats.read().await.clone()
    }
}
