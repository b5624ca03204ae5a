//! Error recovery for upstream fetches
//!
//! Retry policies with backoff, a circuit breaker, and [`ResilientFetcher`] which
//! wraps any [`Fetcher`](crate::client::Fetcher) with both.

pub mod circuit_breaker;
pub mod resilient_fetcher;
pub mod retry_policy;

// Re-export commonly used types
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use resilient_fetcher::ResilientFetcher;
pub use retry_policy::{
    BackoffStrategy, JitterConfig, JitterType, RetryExecutor, RetryPolicy, RetryStats,
};
