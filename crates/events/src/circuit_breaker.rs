//! Circuit breaker contract plus an in-process implementation.
//!
//! The publisher only needs `run`: a protected call that either executes the
//! closure and reports its outcome, or refuses to execute it while the breaker
//! is open. Whatever the caller does on failure is its fallback.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::info;

/// Outcome of a protected call that did not succeed.
#[derive(Debug, Error)]
pub enum CallError {
    /// The breaker is open (or half-open with no probe slots left).
    #[error("circuit breaker '{breaker}' is open; call not permitted")]
    NotPermitted { breaker: String },

    /// The call ran and failed.
    #[error(transparent)]
    Failed(anyhow::Error),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl core::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BreakerState::Closed => f.write_str("closed"),
            BreakerState::Open => f.write_str("open"),
            BreakerState::HalfOpen => f.write_str("half-open"),
        }
    }
}

/// Stops calling a failing downstream until it has had time to recover.
///
/// State is shared by every caller; implementations synchronise internally.
pub trait CircuitBreaker: Send + Sync {
    fn name(&self) -> &str;

    fn state(&self) -> BreakerState;

    fn run(&self, call: &mut dyn FnMut() -> anyhow::Result<()>) -> Result<(), CallError>;
}

/// Settings for [`ThresholdCircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub name: String,
    /// Consecutive failures that trip a closed breaker.
    pub failure_threshold: u32,
    /// How long an open breaker rejects calls before probing.
    pub open_duration: Duration,
    /// Probes admitted while half-open; that many successes close the breaker.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "event-sender".to_string(),
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    pub fn with_half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls.max(1);
        self
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_admitted: u32,
    half_open_successes: u32,
}

/// Consecutive-failure circuit breaker.
///
/// - **Closed**: calls pass; `failure_threshold` consecutive failures open it.
/// - **Open**: calls are rejected until `open_duration` has elapsed.
/// - **HalfOpen**: up to `half_open_max_calls` probes pass. Any probe failure
///   re-opens; that many probe successes close.
#[derive(Debug)]
pub struct ThresholdCircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl ThresholdCircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_admitted: 0,
                half_open_successes: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // Counters stay consistent under every partial update, so a poisoned
        // lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut BreakerInner, to: BreakerState) {
        if inner.state == to {
            return;
        }
        info!(
            circuit_breaker = %self.config.name,
            from = %inner.state,
            to = %to,
            "circuit breaker state transition"
        );
        inner.state = to;
        match to {
            BreakerState::Open => {
                inner.opened_at = Some(Instant::now());
            }
            BreakerState::HalfOpen => {
                inner.half_open_admitted = 0;
                inner.half_open_successes = 0;
            }
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
                inner.opened_at = None;
            }
        }
    }

    fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.open_duration)
                    .unwrap_or(true);
                if elapsed {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    inner.half_open_admitted = 1;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_admitted < self.config.half_open_max_calls {
                    inner.half_open_admitted += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => inner.consecutive_failures = 0,
            BreakerState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_max_calls {
                    self.transition(&mut inner, BreakerState::Closed);
                }
            }
            BreakerState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => self.transition(&mut inner, BreakerState::Open),
            BreakerState::Open => {}
        }
    }
}

impl CircuitBreaker for ThresholdCircuitBreaker {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> BreakerState {
        self.lock().state
    }

    fn run(&self, call: &mut dyn FnMut() -> anyhow::Result<()>) -> Result<(), CallError> {
        if !self.try_acquire() {
            return Err(CallError::NotPermitted {
                breaker: self.config.name.clone(),
            });
        }

        // The lock is not held across the call.
        match call() {
            Ok(()) => {
                self.record_success();
                Ok(())
            }
            Err(err) => {
                self.record_failure();
                Err(CallError::Failed(err))
            }
        }
    }
}
