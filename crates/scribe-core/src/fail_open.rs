//! Fail-open helper for advisory work
//!
//! Activity logs and context snapshots help a human follow a batch run but
//! must never abort it. Wrap that work in [`fail_open`].
//!
//! DO NOT use fail-open for:
//! - Remote content generation (goes through the circuit breaker and retries)
//! - Configuration loading

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an advisory operation, logging and swallowing any error
///
/// # Usage
///
/// ```no_run
/// use scribe_core::fail_open::fail_open;
/// use scribe_core::Result;
///
/// async fn append_activity() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let written = fail_open("activity_log", || append_activity()).await;
///     // written is None if append_activity() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!(
                operation = operation_name,
                error_type = e.kind().as_str(),
                "{} failed (fail-open): {}",
                operation_name,
                e
            );
            None
        }
    }
}
