//! Circuit breaker for upstream fetches
//!
//! After enough consecutive network failures the breaker opens and fetches fail
//! fast with [`FetchError::CircuitOpen`] until the recovery timeout elapses. The
//! breaker then goes half-open and lets a limited number of trial calls through
//! at a time; a run of successes closes it, any failure opens it again.

use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed - normal operation
    Closed,
    /// Circuit is open - operations blocked
    Open,
    /// Circuit is half-open - testing if service recovered
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Successes in half-open needed to close
    pub success_threshold: u32,
    /// Time the circuit stays open before a trial call
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
    /// Trial calls allowed in flight while half-open
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

fn default_half_open_max_calls() -> u32 {
    1
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

/// Snapshot of breaker state for status reports
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_rejected: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    total_rejected: u64,
    trials_in_flight: u32,
    last_trial_at: Option<Instant>,
}

/// Circuit breaker guarding one upstream
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
                total_rejected: 0,
                trials_in_flight: 0,
                last_trial_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, moving Open to HalfOpen if the recovery timeout has passed
    pub async fn state(&self) -> CircuitState {
        let mut state = self.state.write().await;
        self.maybe_half_open(&mut state);
        state.state
    }

    /// Gate a call; fails with [`FetchError::CircuitOpen`] while open, or while
    /// half-open with every trial slot taken.
    ///
    /// A call admitted half-open holds a trial slot until it is reported through
    /// [`record_success`](Self::record_success), [`record_failure`](Self::record_failure)
    /// or [`release_trial`](Self::release_trial).
    pub async fn try_acquire(&self) -> Result<(), FetchError> {
        let mut state = self.state.write().await;
        self.maybe_half_open(&mut state);

        match state.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                state.total_rejected += 1;
                debug!("Circuit breaker {} rejected call", self.name);
                Err(FetchError::CircuitOpen(format!(
                    "circuit breaker {} is open",
                    self.name
                )))
            }
            CircuitState::HalfOpen => {
                // A trial that never reported back (its caller was dropped) is
                // given up after one recovery period
                let abandoned = state
                    .last_trial_at
                    .map(|at| at.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(false);
                if abandoned && state.trials_in_flight > 0 {
                    warn!("Circuit breaker {} reclaiming stuck trial calls", self.name);
                    state.trials_in_flight = 0;
                }

                if state.trials_in_flight >= self.config.half_open_max_calls {
                    state.total_rejected += 1;
                    debug!("Circuit breaker {} rejected call, trial in progress", self.name);
                    return Err(FetchError::CircuitOpen(format!(
                        "circuit breaker {} is half-open with a trial in progress",
                        self.name
                    )));
                }

                state.trials_in_flight += 1;
                state.last_trial_at = Some(Instant::now());
                Ok(())
            }
        }
    }

    /// Give back a trial slot for a call whose outcome says nothing about
    /// upstream health
    pub async fn release_trial(&self) {
        let mut state = self.state.write().await;
        if state.state == CircuitState::HalfOpen {
            state.trials_in_flight = state.trials_in_flight.saturating_sub(1);
        }
    }

    /// Record a successful call
    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        match state.state {
            CircuitState::HalfOpen => {
                state.success_count += 1;
                state.trials_in_flight = state.trials_in_flight.saturating_sub(1);
                if state.success_count >= self.config.success_threshold {
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.opened_at = None;
                    state.trials_in_flight = 0;
                    info!("Circuit breaker {} moved to CLOSED", self.name);
                }
            }
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    /// Record a failed call
    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.failure_count += 1;

        match state.state {
            CircuitState::Closed if state.failure_count >= self.config.failure_threshold => {
                state.state = CircuitState::Open;
                state.opened_at = Some(Instant::now());
                warn!(
                    "Circuit breaker {} moved to OPEN after {} failures",
                    self.name, state.failure_count
                );
            }
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                state.success_count = 0;
                state.trials_in_flight = 0;
                state.opened_at = Some(Instant::now());
                warn!("Circuit breaker {} moved back to OPEN from HALF_OPEN", self.name);
            }
            _ => {}
        }
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let state = self.state.read().await;
        CircuitBreakerStats {
            name: self.name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            total_rejected: state.total_rejected,
        }
    }

    fn maybe_half_open(&self, state: &mut BreakerState) {
        if state.state != CircuitState::Open {
            return;
        }
        let elapsed = state
            .opened_at
            .map(|opened| opened.elapsed() >= self.config.recovery_timeout)
            .unwrap_or(true);
        if elapsed {
            state.state = CircuitState::HalfOpen;
            state.success_count = 0;
            state.trials_in_flight = 0;
            state.last_trial_at = None;
            info!("Circuit breaker {} moving to HALF_OPEN", self.name);
        }
    }
}
