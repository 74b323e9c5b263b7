//! # scribe-agent
//!
//! Resilient model calls for Scribe agents.
//!
//! Every piece of content is produced by one [`AgentOperation`], which wraps
//! a call to a [`ContentModel`] in three layers:
//! - a shared [`CircuitBreaker`] per remote dependency, checked before any work
//! - a [`BackoffPolicy`] deciding whether and when a failed attempt is retried
//! - a per-attempt timeout, treated as a transient failure
//!
//! Callers get back an [`OperationOutcome`]: completed, rejected because the
//! circuit is open, or failed after the retry budget was spent.

mod auth;
mod backoff;
mod circuit_breaker;
mod client;
mod operation;
mod retry;
mod types;

pub use auth::get_auth_token;
pub use backoff::{BackoffDecision, BackoffPolicy, StopReason};
pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState, Permit};
pub use client::{AnthropicClient, ContentModel};
pub use operation::{AgentOperation, OperationOutcome, OperationReport};
pub use retry::{retry_on_circuit, retry_with_backoff, Retried, RetryExhausted};
pub use types::*;
