//! Bounded retry with backoff.
//!
//! [`RetryCommand`] re-invokes a fallible closure until it succeeds, the
//! attempt budget is spent, or a failure is classified as not worth retrying.
//! Between attempts it sleeps for the delay the [`RetryPolicy`] gives.

use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// `base * multiplier^(attempt - 1)`, capped at `max_delay`.
    Exponential { multiplier: f64 },
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(10, Duration::from_millis(100), 2.0, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// Fixed pause between attempts.
    pub fn fixed(max_attempts: u32, pause: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: pause,
            max_delay: pause,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential { multiplier },
        }
    }

    /// Delay after failed attempt number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential { multiplier } => {
                let base_ms = self.base_delay.as_millis() as f64;
                let max_ms = self.max_delay.as_millis() as f64;
                let factor = multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
                Duration::from_millis((base_ms * factor).min(max_ms) as u64)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("max retries exceeded after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        last: E,
    },

    /// A failure the caller classified as not worth retrying.
    #[error("{0}")]
    NotRetryable(#[source] E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::MaxRetriesExceeded { last, .. } => last,
            RetryError::NotRetryable(err) => err,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryCommand {
    policy: RetryPolicy,
}

impl RetryCommand {
    /// At most `max_retries` attempts with `retry_pause` between them.
    pub fn new(max_retries: u32, retry_pause: Duration) -> Self {
        Self::with_policy(RetryPolicy::fixed(max_retries, retry_pause))
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Retry every failure.
    pub fn run<T, E, F>(&self, supplier: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: core::fmt::Display,
    {
        self.run_while(supplier, |_| true)
    }

    /// Retry only failures for which `should_retry` holds; others are surfaced at once.
    pub fn run_while<T, E, F, P>(&self, mut supplier: F, should_retry: P) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: core::fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match supplier() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !should_retry(&err) {
                debug!(attempt, error = %err, "failure is not retryable");
                return Err(RetryError::NotRetryable(err));
            }

            if attempt >= max_attempts {
                warn!(attempts = attempt, error = %err, "max retries exceeded");
                return Err(RetryError::MaxRetriesExceeded { attempts: attempt, last: err });
            }

            let delay = self.policy.delay_for_attempt(attempt);
            debug!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use proptest::prelude::*;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    enum Flaky {
        #[error("busy")]
        Busy,
        #[error("broken")]
        Broken,
    }

    fn no_pause(max: u32) -> RetryCommand {
        RetryCommand::new(max, Duration::ZERO)
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result = no_pause(5).run(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 { Err(Flaky::Busy) } else { Ok("done") }
        });

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn always_failing_supplier_exhausts_budget() {
        let calls = Cell::new(0);
        let result: Result<(), _> = no_pause(4).run(|| {
            calls.set(calls.get() + 1);
            Err(Flaky::Busy)
        });

        match result.unwrap_err() {
            RetryError::MaxRetriesExceeded { attempts, last } => {
                assert_eq!(attempts, 4);
                assert_eq!(last, Flaky::Busy);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn non_retryable_failure_surfaces_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), _> = no_pause(4).run_while(
            || {
                calls.set(calls.get() + 1);
                Err(Flaky::Broken)
            },
            |e| *e == Flaky::Busy,
        );

        assert!(matches!(result, Err(RetryError::NotRetryable(Flaky::Broken))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let calls = Cell::new(0);
        let _: Result<(), _> = no_pause(0).run(|| {
            calls.set(calls.get() + 1);
            Err(Flaky::Busy)
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn exponential_delays_grow_and_cap() {
        let policy = RetryPolicy::exponential(10, Duration::from_millis(100), 2.0, Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
    }

    #[test]
    fn fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(25));
        assert_eq!(policy.delay_for_attempt(1), policy.delay_for_attempt(3));
    }

    #[test]
    fn pause_is_applied_between_attempts() {
        let started = std::time::Instant::now();
        let _: Result<(), _> = RetryCommand::new(3, Duration::from_millis(10)).run(|| Err(Flaky::Busy));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: n < max failures followed by a success costs exactly n + 1 calls.
        #[test]
        fn eventual_success_costs_failures_plus_one(max in 1u32..20, seed in 0u32..20) {
            let failures = seed % max;
            let calls = Cell::new(0u32);

            let result = no_pause(max).run(|| {
                calls.set(calls.get() + 1);
                if calls.get() <= failures { Err(Flaky::Busy) } else { Ok(calls.get()) }
            });

            prop_assert_eq!(result.unwrap(), failures + 1);
            prop_assert_eq!(calls.get(), failures + 1);
        }
    }
}
