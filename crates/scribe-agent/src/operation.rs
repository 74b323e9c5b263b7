//! Agent operation: one unit of remote content work
//!
//! Composes the circuit breaker, the retry driver and (for batch runs) the
//! context manager around a single [`ContentModel`] call:
//!
//! 1. Ask the breaker for a permit; if rejected, return `CircuitOpen` without
//!    calling anything
//! 2. Call the model, retrying transient failures per the backoff policy
//! 3. Report the final outcome to the breaker exactly once
//! 4. In a batch, append the result summary to the context manager

use crate::backoff::BackoffPolicy;
use crate::circuit_breaker::{CircuitBreaker, CircuitState, Permit};
use crate::client::ContentModel;
use crate::retry::{retry_on_circuit, Retried};
use crate::types::{Generation, GenerationRequest};
use scribe_context::{ContextManager, SummaryInput};
use scribe_core::{ErrorKind, LogContext, OperationConfig, ResilienceEvent, ScribeError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Terminal outcome of an agent operation
#[derive(Debug)]
pub enum OperationOutcome<T> {
    /// The remote work finished on attempt `attempts`
    Completed {
        value: T,
        attempts: u32,
        circuit_state: CircuitState,
    },
    /// The breaker refused the call; nothing was attempted
    CircuitOpen {
        circuit: String,
        state: CircuitState,
        retry_after: Duration,
    },
    /// Every permitted attempt failed
    Failed {
        attempts: u32,
        error: ScribeError,
        circuit_state: CircuitState,
    },
}

/// Serializable result shape handed to callers and UIs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationReport {
    pub success: bool,
    pub error: Option<String>,
    pub error_type: Option<ErrorKind>,
    pub circuit_state: CircuitState,
    pub attempts: u32,
    pub retry_after_secs: Option<u64>,
}

impl<T> OperationOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, OperationOutcome::Completed { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, OperationOutcome::CircuitOpen { .. })
    }

    pub fn completed(self) -> Option<T> {
        match self {
            OperationOutcome::Completed { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Collapse into a `Result`, mapping a rejection to [`ScribeError::CircuitOpen`]
    pub fn into_result(self) -> scribe_core::Result<T> {
        match self {
            OperationOutcome::Completed { value, .. } => Ok(value),
            OperationOutcome::CircuitOpen {
                circuit,
                retry_after,
                ..
            } => Err(ScribeError::CircuitOpen {
                name: circuit,
                retry_after,
            }),
            OperationOutcome::Failed { error, .. } => Err(error),
        }
    }

    pub fn report(&self) -> OperationReport {
        match self {
            OperationOutcome::Completed {
                attempts,
                circuit_state,
                ..
            } => OperationReport {
                success: true,
                error: None,
                error_type: None,
                circuit_state: *circuit_state,
                attempts: *attempts,
                retry_after_secs: None,
            },
            OperationOutcome::CircuitOpen {
                circuit,
                state,
                retry_after,
            } => OperationReport {
                success: false,
                error: Some(format!(
                    "Circuit '{}' is open, retry in {}s",
                    circuit,
                    retry_after.as_secs()
                )),
                error_type: Some(ErrorKind::CircuitOpen),
                circuit_state: *state,
                attempts: 0,
                retry_after_secs: Some(retry_after.as_secs()),
            },
            OperationOutcome::Failed {
                attempts,
                error,
                circuit_state,
            } => OperationReport {
                success: false,
                error: Some(error.to_string()),
                error_type: Some(error.kind()),
                circuit_state: *circuit_state,
                attempts: *attempts,
                retry_after_secs: None,
            },
        }
    }

    /// Message for the end user
    pub fn user_message(&self) -> String {
        match self {
            OperationOutcome::Completed { .. } => "Completed.".to_string(),
            OperationOutcome::CircuitOpen { retry_after, .. } => format!(
                "Temporarily unavailable, the system will retry automatically in about {}s.",
                retry_after.as_secs().max(1)
            ),
            OperationOutcome::Failed {
                attempts, error, ..
            } => format!("This failed after {} attempt(s): {}", attempts, error),
        }
    }
}

/// Reports a failure if the operation is dropped before it settles
struct OutcomeGuard<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl<'a> OutcomeGuard<'a> {
    fn new(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            settled: false,
        }
    }

    fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for OutcomeGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            // A cancelled call is indistinguishable from a hung dependency
            LogContext::new(self.breaker.name(), ResilienceEvent::Cancelled)
                .failure_count(self.breaker.failure_count())
                .emit();
            self.breaker.record_failure();
        }
    }
}

/// One kind of remote content work guarded by a shared breaker
///
/// The breaker is injected so several operations can share one dependency's
/// breaker and tests can use a fresh breaker per case.
pub struct AgentOperation<M: ?Sized> {
    name: String,
    breaker: Arc<CircuitBreaker>,
    policy: BackoffPolicy,
    call_timeout: Duration,
    model: Arc<M>,
}

impl<M: ContentModel + ?Sized> AgentOperation<M> {
    pub fn new(
        name: impl Into<String>,
        breaker: Arc<CircuitBreaker>,
        policy: BackoffPolicy,
        call_timeout: Duration,
        model: Arc<M>,
    ) -> Self {
        Self {
            name: name.into(),
            breaker,
            policy,
            call_timeout,
            model,
        }
    }

    pub fn from_config(
        name: impl Into<String>,
        breaker: Arc<CircuitBreaker>,
        policy: BackoffPolicy,
        config: &OperationConfig,
        model: Arc<M>,
    ) -> Self {
        Self::new(name, breaker, policy, config.call_timeout(), model)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run the operation once, retrying transient failures
    ///
    /// Never returns an error: every terminal condition is an
    /// [`OperationOutcome`] variant.
    pub async fn run(&self, request: &GenerationRequest) -> OperationOutcome<Generation> {
        if let Permit::Rejected { retry_after } = self.breaker.before_call() {
            return OperationOutcome::CircuitOpen {
                circuit: self.breaker.name().to_string(),
                state: self.breaker.state(),
                retry_after,
            };
        }

        let guard = OutcomeGuard::new(&self.breaker);
        let result = retry_on_circuit(
            &self.policy,
            self.breaker.name(),
            &self.name,
            Some(self.call_timeout),
            || self.model.generate(request),
        )
        .await;

        match result {
            Ok(Retried { value, attempts }) => {
                guard.success();
                OperationOutcome::Completed {
                    value,
                    attempts,
                    circuit_state: self.breaker.state(),
                }
            }
            Err(exhausted) => {
                guard.failure();
                OperationOutcome::Failed {
                    attempts: exhausted.attempts,
                    error: exhausted.last_error,
                    circuit_state: self.breaker.state(),
                }
            }
        }
    }

    /// Run as one item of a batch, recording the result in `context`
    ///
    /// `summarize` turns the generation into the summary the context manager
    /// keeps; it is only called on success.
    pub async fn run_batch_item<S>(
        &self,
        request: &GenerationRequest,
        context: &mut ContextManager,
        summarize: S,
    ) -> OperationOutcome<Generation>
    where
        S: FnOnce(&Generation) -> SummaryInput,
    {
        let outcome = self.run(request).await;
        if let OperationOutcome::Completed { value, .. } = &outcome {
            context.add_summary(summarize(value));
        }
        outcome
    }
}
