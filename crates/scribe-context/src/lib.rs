//! # scribe-context
//!
//! Rolling context for multi-post batch runs.
//!
//! A batch run generates several posts one after another. Each new prompt
//! should know what scored well so far without replaying the whole history,
//! so finished posts are appended to a small window that is periodically
//! folded into a running summary (mean score, trend, a few highlights).

mod manager;
mod summary;

pub use manager::{ContextManager, ContextStats};
pub use summary::{CompactedSummary, SummaryEntry, SummaryInput, Trend};
