//! Structured log records for circuit breaker and retry events
//!
//! Log aggregators key on these field names, so every resilience event goes
//! through [`LogContext`] instead of ad-hoc `tracing` calls.

use std::time::Duration;

use crate::ScribeError;

/// Resilience event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResilienceEvent {
    /// Circuit moved to OPEN
    Opened,
    /// Circuit moved to CLOSED
    Closed,
    /// Circuit admitted a trial call
    HalfOpen,
    /// Call rejected by an open circuit
    Rejected,
    /// Attempt failed, another one is scheduled
    Retry,
    /// Attempt failed and no more are scheduled
    GaveUp,
    /// In-flight operation dropped before finishing
    Cancelled,
}

impl ResilienceEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResilienceEvent::Opened => "opened",
            ResilienceEvent::Closed => "closed",
            ResilienceEvent::HalfOpen => "half_open",
            ResilienceEvent::Rejected => "rejected",
            ResilienceEvent::Retry => "retry",
            ResilienceEvent::GaveUp => "gave_up",
            ResilienceEvent::Cancelled => "cancelled",
        }
    }

    fn is_warning(&self) -> bool {
        !matches!(self, ResilienceEvent::Closed | ResilienceEvent::HalfOpen)
    }
}

impl std::fmt::Display for ResilienceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resilience log record
///
/// # Example
///
/// ```
/// use scribe_core::{LogContext, ResilienceEvent};
/// use std::time::Duration;
///
/// LogContext::new("youtube_script", ResilienceEvent::Retry)
///     .operation("create_script")
///     .attempt(2)
///     .delay(Duration::from_millis(1500))
///     .emit();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LogContext<'a> {
    pub circuit: &'a str,
    pub event: ResilienceEvent,
    /// Operation that made the call, for retry events
    pub operation: Option<&'a str>,
    pub failure_count: Option<u32>,
    pub attempt: Option<u32>,
    pub delay: Option<Duration>,
    pub error_type: Option<&'static str>,
    pub error_message: Option<String>,
}

impl<'a> LogContext<'a> {
    pub fn new(circuit: &'a str, event: ResilienceEvent) -> Self {
        Self {
            circuit,
            event,
            operation: None,
            failure_count: None,
            attempt: None,
            delay: None,
            error_type: None,
            error_message: None,
        }
    }

    pub fn operation(mut self, operation: &'a str) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn failure_count(mut self, count: u32) -> Self {
        self.failure_count = Some(count);
        self
    }

    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn error(mut self, error: &ScribeError) -> Self {
        self.error_type = Some(error.kind().as_str());
        self.error_message = Some(error.to_string());
        self
    }

    /// Human-readable summary line
    pub fn message(&self) -> String {
        let mut msg = format!("circuit '{}' {}", self.circuit, self.event);
        if let Some(operation) = self.operation {
            msg.push_str(&format!(" [{}]", operation));
        }
        if let Some(attempt) = self.attempt {
            msg.push_str(&format!(" (attempt {})", attempt));
        }
        if let Some(delay) = self.delay {
            msg.push_str(&format!(", next in {}ms", delay.as_millis()));
        }
        if let Some(err) = &self.error_message {
            msg.push_str(&format!(": {}", err));
        }
        msg
    }

    /// Emit through `tracing`, `warn` for failures and `info` for recoveries
    pub fn emit(&self) {
        let delay_ms = self.delay.map(|d| d.as_millis() as u64);
        let message = self.message();

        if self.event.is_warning() {
            tracing::warn!(
                circuit = self.circuit,
                event = self.event.as_str(),
                operation = self.operation,
                failure_count = self.failure_count,
                attempt = self.attempt,
                delay_ms = delay_ms,
                error_type = self.error_type,
                error_message = self.error_message.as_deref(),
                "{}",
                message
            );
        } else {
            tracing::info!(
                circuit = self.circuit,
                event = self.event.as_str(),
                operation = self.operation,
                failure_count = self.failure_count,
                attempt = self.attempt,
                delay_ms = delay_ms,
                error_type = self.error_type,
                error_message = self.error_message.as_deref(),
                "{}",
                message
            );
        }
    }
}
