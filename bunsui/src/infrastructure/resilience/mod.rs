// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resilience Utilities
//!
//! Composable retry, circuit-breaking, and rate-limiting for adapter calls.
//!
//! - [`RetryPolicy`] retries recoverable errors (Throttling, Timeout,
//!   ServiceUnavailable) with exponential backoff and jitter, honoring a
//!   backend retry-after hint when one is present.
//! - [`CircuitBreaker`] short-circuits calls after a configurable run of
//!   consecutive failures, re-probing after a cooldown
//!   (Closed / Open / HalfOpen).
//! - [`RateLimiter`] enforces a minimum inter-request interval across
//!   callers sharing one backend client.

use parking_lot::Mutex;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use bunsui_domain::BunsuiError;

/// Retry tuning: attempt cap, delay window, backoff factor, jitter flag.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Backoff delay before retrying after `attempt` (0-based) failures:
    /// exponential, capped at `max_delay`, with ±25% jitter and a 100 ms
    /// floor.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let mut delay = exponential.min(self.max_delay.as_secs_f64());
        if self.jitter {
            let factor = rand::rng().random_range(0.75..=1.25);
            delay *= factor;
        }
        Duration::from_secs_f64(delay.max(0.1))
    }

    /// Runs `operation` until it succeeds, fails unrecoverably, or the
    /// attempt cap is reached. A Throttling retry-after hint overrides the
    /// computed backoff for that attempt.
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, BunsuiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BunsuiError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_recoverable() && attempt + 1 < self.max_attempts => {
                    let delay = error
                        .retry_after()
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| self.delay_for(attempt));
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying recoverable failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker with a timed half-open probe.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Runs `operation` through the breaker.
    ///
    /// # Errors
    ///
    /// * `ServiceUnavailable` - the breaker is open and the cooldown has
    ///   not elapsed; the operation is not attempted
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, BunsuiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BunsuiError>>,
    {
        {
            let mut inner = self.inner.lock();
            if inner.state == BreakerState::Open {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed < self.cooldown {
                    return Err(BunsuiError::service_unavailable("Circuit breaker is open"));
                }
                inner.state = BreakerState::HalfOpen;
                debug!("circuit breaker half-open, probing");
            }
        }

        match operation().await {
            Ok(value) => {
                let mut inner = self.inner.lock();
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                Ok(value)
            }
            Err(error) => {
                let mut inner = self.inner.lock();
                inner.consecutive_failures += 1;
                if inner.state == BreakerState::HalfOpen || inner.consecutive_failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        consecutive_failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
                Err(error)
            }
        }
    }
}

/// Minimum inter-request interval shared by callers of one backend client.
/// The default interval of 100 ms works out to roughly 10 requests per
/// second.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: tokio::sync::Mutex::new(None),
        }
    }

    /// Waits until the next request slot is available.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn no_jitter_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_factor: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            backoff_factor: 2.0,
            jitter: false,
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        // Capped at max_delay.
        assert_eq!(policy.delay_for(5), Duration::from_secs(4));
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let policy = RetryPolicy::default();
        for attempt in 0..4 {
            let nominal = 1.0 * 2.0_f64.powi(attempt);
            let delay = policy.delay_for(attempt as u32).as_secs_f64();
            assert!(delay >= nominal * 0.75 - 1e-9);
            assert!(delay <= nominal * 1.25 + 1e-9);
        }
    }

    #[tokio::test]
    async fn test_run_retries_recoverable_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = no_jitter_policy(5)
            .run("op", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(BunsuiError::throttling("slow down"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_unrecoverable() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = no_jitter_policy(5)
            .run("op", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(BunsuiError::validation("bad input"))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_exhausts_attempt_cap() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = no_jitter_policy(3)
            .run("op", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(BunsuiError::service_unavailable("down"))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold_and_reprobes() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(20));
        assert_eq!(breaker.state(), BreakerState::Closed);

        for _ in 0..2 {
            let _: Result<(), _> = breaker
                .call(|| async { Err(BunsuiError::service_unavailable("down")) })
                .await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        // Short-circuits while open.
        let err = breaker.call(|| async { Ok(()) }).await.unwrap_err();
        assert_eq!(err.category(), "service_unavailable");

        // After the cooldown the probe runs and success closes the breaker.
        tokio::time::sleep(Duration::from_millis(25)).await;
        breaker.call(|| async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_breaker_reopens_on_failed_probe() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        let _: Result<(), _> = breaker
            .call(|| async { Err(BunsuiError::timeout("late")) })
            .await;
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(15)).await;
        let _: Result<(), _> = breaker
            .call(|| async { Err(BunsuiError::timeout("still late")) })
            .await;
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(Duration::from_millis(20));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        // Two enforced gaps of 20ms.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
