//! # scribe-orchestrator
//!
//! Drives multi-post batch runs for Scribe.
//!
//! This crate provides:
//! - Batch runner: one context manager per run, items processed in order
//! - Per-platform prompt construction with rolling learnings
//! - Rubric score extraction from model output
//! - Markdown activity log in `.scribe/activity.md`

mod activity_logger;
mod batch;
mod prompt;
mod scoring;

pub use activity_logger::ActivityLogger;
pub use batch::{BatchPlan, BatchReport, BatchRunner, BatchStopReason, ItemResult, ItemStatus};
pub use prompt::{build_post_prompt, platform_guidance, SYSTEM_PROMPT};
pub use scoring::{extract_takeaway, parse_score, RUBRIC_MAX};
