//! # scribe-core
//!
//! Core types for the Scribe content-generation agents.
//!
//! Scribe agents call a language model with platform-specific prompts, score
//! the output against a rubric and carry what they learned from one post into
//! the next. This crate holds the pieces every other crate shares:
//!
//! - [`ScribeError`] and the [`ErrorKind`] taxonomy used to decide what is
//!   worth retrying
//! - [`ScribeConfig`], loaded from `.scribe/config.toml`
//! - [`LogContext`], the structured event record for circuit and retry logs
//! - [`fail_open`] for advisory work that must never abort a run

pub mod config;
mod error;
pub mod fail_open;
mod log_context;
mod types;

pub use config::{
    CircuitConfig, ContextConfig, ModelConfig, OperationConfig, RetryConfig, ScribeConfig,
};
pub use error::{ErrorKind, Result, ScribeError};
pub use log_context::{LogContext, ResilienceEvent};
pub use types::Platform;
