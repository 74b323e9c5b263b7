//! Backoff policy for failed remote calls
//!
//! A pure decision: given how many attempts have been made and what went
//! wrong, either retry after a delay or stop. Sleeping is the caller's job.
//!
//! # Backoff Schedule (defaults)
//!
//! | Attempt | Delay (base) | With jitter (x0.5-x1.5) |
//! |---------|--------------|-------------------------|
//! | 1       | 1s           | 0.5-1.5s                |
//! | 2       | 2s           | 1-3s                    |
//! | 3       | 4s           | 2-6s                    |
//! | 4       | stop         |                         |

use rand::Rng;
use scribe_core::{ErrorKind, RetryConfig, ScribeError};
use std::collections::HashSet;
use std::time::Duration;

const JITTER_MIN: f64 = 0.5;
const JITTER_MAX: f64 = 1.5;

/// Why the policy gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The retry budget is spent
    Exhausted,
    /// The error is not worth retrying
    NonRetriable,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Exhausted => write!(f, "retries exhausted"),
            StopReason::NonRetriable => write!(f, "non-retriable error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    Retry(Duration),
    Stop(StopReason),
}

/// Exponential backoff with jitter
///
/// `delay = min(max_delay, base_delay * 2^(attempt-1))`, then scaled by a
/// uniform factor in `[0.5, 1.5]` when jitter is on.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
    retriable: HashSet<ErrorKind>,
}

impl BackoffPolicy {
    /// Create a policy that retries the default transient error kinds
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: true,
            retriable: ErrorKind::TRANSIENT.into_iter().collect(),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.base_delay(), config.max_delay())
            .with_jitter(config.jitter)
            .with_retriable(config.retriable.iter().copied())
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the set of error kinds worth retrying
    pub fn with_retriable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retriable = kinds.into_iter().collect();
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_retriable(&self, kind: ErrorKind) -> bool {
        self.retriable.contains(&kind)
    }

    /// Un-jittered delay before the attempt after `attempt`
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        // 2^31 of any non-zero base is far past any sane cap
        let factor = 1u32.checked_shl(exponent.min(31)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decide what to do after `attempt` (1-indexed) failed with `error`
    ///
    /// An attempt of 0 is treated as 1.
    pub fn decide(&self, attempt: u32, error: &ScribeError) -> BackoffDecision {
        self.decide_with_rng(attempt, error, &mut rand::thread_rng())
    }

    /// [`decide`](Self::decide) with a caller-supplied jitter source
    pub fn decide_with_rng<R: Rng + ?Sized>(
        &self,
        attempt: u32,
        error: &ScribeError,
        rng: &mut R,
    ) -> BackoffDecision {
        let attempt = attempt.max(1);

        if !self.is_retriable(error.kind()) {
            return BackoffDecision::Stop(StopReason::NonRetriable);
        }
        if attempt > self.max_retries {
            return BackoffDecision::Stop(StopReason::Exhausted);
        }

        let delay = self.base_delay_for(attempt);
        if self.jitter {
            BackoffDecision::Retry(delay.mul_f64(rng.gen_range(JITTER_MIN..=JITTER_MAX)))
        } else {
            BackoffDecision::Retry(delay)
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
