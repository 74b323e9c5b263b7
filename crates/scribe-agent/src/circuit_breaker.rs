//! Circuit breaker for remote model dependencies
//!
//! Stops calling a dependency that keeps failing, then lets a single trial
//! call through once the recovery timeout has passed.

use scribe_core::{CircuitConfig, LogContext, ResilienceEvent};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - requests allowed
    Closed,
    /// Too many failures - reject requests immediately
    Open,
    /// Testing recovery - one trial request in flight
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Answer to [`CircuitBreaker::before_call`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// Go ahead; report the outcome with `record_success`/`record_failure`
    Allowed,
    /// Do not call the dependency
    Rejected { retry_after: Duration },
}

impl Permit {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Permit::Allowed)
    }
}

/// Serializable view of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub retry_after_ms: u64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker to prevent hammering a failing dependency
///
/// # States
///
/// - **Closed**: Normal operation, all requests allowed
/// - **Open**: Too many failures, reject requests immediately
/// - **HalfOpen**: After timeout, allow one trial request to test recovery
///
/// OPEN → HALF_OPEN is evaluated lazily when a caller arrives; there is no
/// background timer. All state lives behind one mutex that is held only while
/// reading or updating counters, never across the remote call.
///
/// # Example
///
/// ```
/// use scribe_agent::{CircuitBreaker, CircuitState};
/// use std::time::Duration;
///
/// let cb = CircuitBreaker::new("youtube_script", 3, Duration::from_secs(60));
///
/// cb.record_failure();
/// cb.record_failure();
/// cb.record_failure();
///
/// assert_eq!(cb.state(), CircuitState::Open);
/// assert!(!cb.before_call().is_allowed());
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    ///
    /// # Arguments
    ///
    /// * `name` - The protected operation, used in log events
    /// * `failure_threshold` - Consecutive failures before opening (minimum 1)
    /// * `recovery_timeout` - Time an open circuit waits before a trial call
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &CircuitConfig) -> Self {
        Self::new(name, config.failure_threshold, config.recovery_timeout())
    }

    // A panicking caller must not wedge the breaker for everyone else
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn recovery_timeout(&self) -> Duration {
        self.recovery_timeout
    }

    /// Current stored state
    ///
    /// An open circuit whose timeout has elapsed still reports `Open` until
    /// the next [`before_call`](Self::before_call) moves it to `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Get current failure count (for monitoring)
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Check whether a call may proceed
    pub fn before_call(&self) -> Permit {
        self.before_call_at(Instant::now())
    }

    /// [`before_call`](Self::before_call) evaluated at `now`
    ///
    /// Moving to HALF_OPEN and admitting the trial happen under the same
    /// lock, so concurrent callers cannot both become the trial.
    pub fn before_call_at(&self, now: Instant) -> Permit {
        let (permit, event, failures) = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => (Permit::Allowed, None, inner.failure_count),
                CircuitState::Open => {
                    let remaining = self.remaining(&inner, now);
                    if remaining.is_zero() {
                        inner.state = CircuitState::HalfOpen;
                        inner.trial_in_flight = true;
                        (
                            Permit::Allowed,
                            Some(ResilienceEvent::HalfOpen),
                            inner.failure_count,
                        )
                    } else {
                        (
                            Permit::Rejected {
                                retry_after: remaining,
                            },
                            Some(ResilienceEvent::Rejected),
                            inner.failure_count,
                        )
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.trial_in_flight {
                        (
                            Permit::Rejected {
                                retry_after: Duration::ZERO,
                            },
                            Some(ResilienceEvent::Rejected),
                            inner.failure_count,
                        )
                    } else {
                        inner.trial_in_flight = true;
                        (Permit::Allowed, None, inner.failure_count)
                    }
                }
            }
        };

        if let Some(event) = event {
            LogContext::new(&self.name, event)
                .failure_count(failures)
                .emit();
        }
        permit
    }

    /// Record a successful call: the circuit closes and the count resets
    pub fn record_success(&self) {
        let previous = {
            let mut inner = self.lock();
            let previous = inner.state;
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.trial_in_flight = false;
            previous
        };

        if previous != CircuitState::Closed {
            LogContext::new(&self.name, ResilienceEvent::Closed)
                .failure_count(0)
                .emit();
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    /// [`record_failure`](Self::record_failure) evaluated at `now`
    ///
    /// A failed trial re-opens the circuit regardless of the threshold.
    pub fn record_failure_at(&self, now: Instant) {
        let (opened, failures) = {
            let mut inner = self.lock();
            inner.failure_count = inner.failure_count.saturating_add(1);
            inner.last_failure = Some(now);

            let opened = match inner.state {
                CircuitState::HalfOpen => true,
                CircuitState::Closed => inner.failure_count >= self.failure_threshold,
                CircuitState::Open => false,
            };
            if opened {
                inner.state = CircuitState::Open;
                inner.trial_in_flight = false;
            }
            (opened, inner.failure_count)
        };

        if opened {
            LogContext::new(&self.name, ResilienceEvent::Opened)
                .failure_count(failures)
                .emit();
        } else {
            tracing::debug!(
                circuit = %self.name,
                failure_count = failures,
                "Circuit breaker: recorded failure"
            );
        }
    }

    /// Time until an open circuit admits a trial call, zero otherwise
    pub fn time_until_retry(&self) -> Duration {
        let inner = self.lock();
        match inner.state {
            CircuitState::Open => self.remaining(&inner, Instant::now()),
            // Closed and HalfOpen can be attempted immediately
            _ => Duration::ZERO,
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        let retry_after = match inner.state {
            CircuitState::Open => self.remaining(&inner, Instant::now()),
            _ => Duration::ZERO,
        };
        CircuitSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.failure_threshold,
            recovery_timeout_secs: self.recovery_timeout.as_secs(),
            retry_after_ms: retry_after.as_millis() as u64,
        }
    }

    /// Force the circuit closed (manual recovery)
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.trial_in_flight = false;
    }

    fn remaining(&self, inner: &Inner, now: Instant) -> Duration {
        match inner.last_failure {
            Some(last) => self
                .recovery_timeout
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_config("default", &CircuitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    const TIMEOUT: Duration = Duration::from_secs(60);
    const EPSILON: Duration = Duration::from_millis(1);

    fn open_breaker(threshold: u32, at: Instant) -> CircuitBreaker {
        let cb = CircuitBreaker::new("test", threshold, TIMEOUT);
        for _ in 0..threshold {
            cb.record_failure_at(at);
        }
        cb
    }

    #[test]
    fn test_initial_state_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert!(cb.before_call().is_allowed());
    }

    #[test]
    fn test_opens_at_threshold() {
        for threshold in 1..=5 {
            let cb = CircuitBreaker::new("test", threshold, TIMEOUT);
            for _ in 0..threshold - 1 {
                cb.record_failure();
                assert_eq!(cb.state(), CircuitState::Closed);
            }
            cb.record_failure();
            assert_eq!(cb.state(), CircuitState::Open);
            assert_eq!(cb.failure_count(), threshold);
        }
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = CircuitBreaker::new("test", 3, TIMEOUT);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.failure_count(), 2);

        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);

        // Count starts over after the reset
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_rejects_until_recovery_timeout() {
        let t0 = Instant::now();
        let cb = open_breaker(3, t0);

        let permit = cb.before_call_at(t0 + TIMEOUT - EPSILON);
        assert_eq!(permit, Permit::Rejected { retry_after: EPSILON });
        assert_eq!(cb.state(), CircuitState::Open);

        assert_eq!(cb.before_call_at(t0 + TIMEOUT + EPSILON), Permit::Allowed);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_exactly_at_timeout() {
        let t0 = Instant::now();
        let cb = open_breaker(2, t0);
        assert!(cb.before_call_at(t0 + TIMEOUT).is_allowed());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_failure_reopens_immediately() {
        let t0 = Instant::now();
        let cb = open_breaker(5, t0);
        let t1 = t0 + TIMEOUT + EPSILON;
        assert!(cb.before_call_at(t1).is_allowed());

        cb.record_failure_at(t1);
        assert_eq!(cb.state(), CircuitState::Open);

        // The new timeout counts from the failed trial
        assert!(!cb.before_call_at(t1 + TIMEOUT - EPSILON).is_allowed());
        assert!(cb.before_call_at(t1 + TIMEOUT).is_allowed());
    }

    #[test]
    fn test_half_open_success_closes() {
        let t0 = Instant::now();
        let cb = open_breaker(3, t0);
        assert!(cb.before_call_at(t0 + TIMEOUT + EPSILON).is_allowed());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert!(cb.before_call().is_allowed());
    }

    #[test]
    fn test_half_open_admits_one_trial() {
        let t0 = Instant::now();
        let cb = open_breaker(3, t0);
        let t1 = t0 + TIMEOUT + EPSILON;

        assert!(cb.before_call_at(t1).is_allowed());
        assert_eq!(
            cb.before_call_at(t1),
            Permit::Rejected {
                retry_after: Duration::ZERO
            }
        );
    }

    #[test]
    fn test_concurrent_callers_race_for_trial() {
        let t0 = Instant::now();
        let cb = Arc::new(open_breaker(3, t0));
        let t1 = t0 + TIMEOUT + EPSILON;

        let callers = 16;
        let barrier = Arc::new(Barrier::new(callers));
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let cb = Arc::clone(&cb);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    cb.before_call_at(t1).is_allowed()
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_time_until_retry() {
        let cb = CircuitBreaker::new("test", 2, Duration::from_secs(2));
        assert_eq!(cb.time_until_retry(), Duration::ZERO);

        cb.record_failure();
        cb.record_failure();

        let remaining = cb.time_until_retry();
        assert!(remaining > Duration::ZERO);
        assert!(remaining <= Duration::from_secs(2));
    }

    #[test]
    fn test_snapshot_and_reset() {
        let cb = CircuitBreaker::new("linkedin_post", 1, TIMEOUT);
        cb.record_failure();

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.name, "linkedin_post");
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.failure_count, 1);
        assert!(snapshot.retry_after_ms > 0);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "OPEN");

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.before_call().is_allowed());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
    }
}
