//! Batch runner - generate several posts in one run
//!
//! Items are processed one at a time. Each prompt is built from the batch's
//! context manager, so later posts see what scored well earlier. The runner
//! owns that context manager exclusively for the length of the run.
//!
//! Stop rules:
//! - A failed item is recorded and the run moves on
//! - An open circuit ends the run; every remaining item is deferred

use std::path::PathBuf;
use std::time::Duration;

use scribe_agent::{AgentOperation, ContentModel, GenerationRequest, OperationOutcome};
use scribe_context::{ContextManager, ContextStats, SummaryInput};
use scribe_core::{ErrorKind, Platform};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::activity_logger::ActivityLogger;
use crate::prompt::{build_post_prompt, SYSTEM_PROMPT};
use crate::scoring::{extract_takeaway, parse_score};

/// What to generate in one batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub plan_id: String,
    pub platform: Platform,
    pub brief: String,
    pub count: usize,
}

impl BatchPlan {
    /// Create a plan with a generated id
    pub fn new(platform: Platform, brief: impl Into<String>, count: usize) -> Self {
        Self {
            plan_id: format!("batch-{}", &uuid::Uuid::new_v4().to_string()[..8]),
            platform,
            brief: brief.into(),
            count,
        }
    }

    pub fn with_plan_id(mut self, plan_id: impl Into<String>) -> Self {
        self.plan_id = plan_id.into();
        self
    }
}

/// Outcome of one batch item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Generated; `score` is `None` when the output carried no rubric grade
    Completed { score: Option<f64> },
    Failed {
        attempts: u32,
        error: String,
        error_type: ErrorKind,
    },
    /// Not attempted because the circuit opened earlier in the run
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub index: usize,
    #[serde(flatten)]
    pub status: ItemStatus,
    pub content: Option<String>,
}

/// Why a batch run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BatchStopReason {
    /// Every item was attempted
    Finished,
    /// The circuit opened; remaining items were deferred
    CircuitOpen {
        circuit: String,
        retry_after_secs: u64,
    },
}

impl std::fmt::Display for BatchStopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStopReason::Finished => write!(f, "all items attempted"),
            BatchStopReason::CircuitOpen {
                circuit,
                retry_after_secs,
            } => write!(
                f,
                "circuit '{}' open, retry in {}s",
                circuit, retry_after_secs
            ),
        }
    }
}

/// Result of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub plan_id: String,
    pub items: Vec<ItemResult>,
    pub stats: ContextStats,
    pub stop_reason: BatchStopReason,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Completed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Failed { .. }))
    }

    pub fn deferred(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Deferred))
    }

    fn count(&self, pred: impl Fn(&ItemStatus) -> bool) -> usize {
        self.items.iter().filter(|item| pred(&item.status)).count()
    }
}

/// Drives one batch run through an agent operation
pub struct BatchRunner<M: ?Sized> {
    operation: AgentOperation<M>,
    context: ContextManager,
    activity_logger: Option<ActivityLogger>,
}

impl<M: ContentModel + ?Sized> BatchRunner<M> {
    pub fn new(operation: AgentOperation<M>, context: ContextManager) -> Self {
        Self {
            operation,
            context,
            activity_logger: None,
        }
    }

    /// Enable activity logging to `<scribe_dir>/activity.md`
    pub fn with_activity_log(mut self, scribe_dir: PathBuf) -> Self {
        self.activity_logger = Some(ActivityLogger::new(scribe_dir));
        self
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    pub fn into_context(self) -> ContextManager {
        self.context
    }

    /// Run every item of `plan` in order
    pub async fn run(&mut self, plan: &BatchPlan) -> BatchReport {
        if plan.plan_id != self.context.plan_id() {
            warn!(
                plan_id = %plan.plan_id,
                context_plan_id = %self.context.plan_id(),
                "Batch plan and context manager ids differ"
            );
        }
        info!(
            plan_id = %plan.plan_id,
            platform = %plan.platform,
            count = plan.count,
            "Starting batch run"
        );
        if let Some(logger) = &self.activity_logger {
            logger.log_batch_start(plan).await;
        }

        let mut items = Vec::with_capacity(plan.count);
        let mut stop_reason = BatchStopReason::Finished;

        for index in 1..=plan.count {
            if let BatchStopReason::CircuitOpen { .. } = stop_reason {
                items.push(ItemResult {
                    index,
                    status: ItemStatus::Deferred,
                    content: None,
                });
                continue;
            }

            let prompt = build_post_prompt(
                plan,
                index,
                &self.context.get_compacted_learnings(),
                self.context.get_target_score(),
            );
            let request = GenerationRequest::new(plan.platform, prompt).with_system(SYSTEM_PROMPT);
            let platform = plan.platform;

            let outcome = self
                .operation
                .run_batch_item(&request, &mut self.context, |generation| SummaryInput {
                    index: Some(index),
                    score: parse_score(&generation.text),
                    takeaway: Some(extract_takeaway(&generation.text)),
                    platform: Some(platform),
                    link: None,
                })
                .await;

            let item = match outcome {
                OperationOutcome::Completed {
                    value: generation,
                    attempts,
                    ..
                } => {
                    let score = parse_score(&generation.text);
                    if score.is_none() {
                        warn!(plan_id = %plan.plan_id, index, "No rubric score in output");
                    }
                    info!(plan_id = %plan.plan_id, index, attempts, ?score, "Item completed");
                    ItemResult {
                        index,
                        status: ItemStatus::Completed { score },
                        content: Some(generation.text),
                    }
                }
                OperationOutcome::Failed {
                    attempts, error, ..
                } => {
                    warn!(plan_id = %plan.plan_id, index, attempts, error = %error, "Item failed");
                    ItemResult {
                        index,
                        status: ItemStatus::Failed {
                            attempts,
                            error: error.to_string(),
                            error_type: error.kind(),
                        },
                        content: None,
                    }
                }
                OperationOutcome::CircuitOpen {
                    circuit,
                    retry_after,
                    ..
                } => {
                    warn!(
                        plan_id = %plan.plan_id,
                        index,
                        circuit = %circuit,
                        retry_after_secs = retry_after.as_secs(),
                        "Circuit open, deferring remaining items"
                    );
                    stop_reason = BatchStopReason::CircuitOpen {
                        circuit,
                        retry_after_secs: round_up_secs(retry_after),
                    };
                    ItemResult {
                        index,
                        status: ItemStatus::Deferred,
                        content: None,
                    }
                }
            };

            if let Some(logger) = &self.activity_logger {
                logger.log_item(index, plan.count, &item).await;
            }
            items.push(item);
        }

        let report = BatchReport {
            plan_id: plan.plan_id.clone(),
            items,
            stats: self.context.get_stats(),
            stop_reason,
        };

        info!(
            plan_id = %report.plan_id,
            completed = report.completed(),
            failed = report.failed(),
            deferred = report.deferred(),
            avg_score = report.stats.avg_score,
            "Batch run finished: {}",
            report.stop_reason
        );
        if let Some(logger) = &self.activity_logger {
            logger.log_batch_complete(&report).await;
        }

        report
    }
}

fn round_up_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
