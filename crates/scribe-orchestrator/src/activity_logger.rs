//! Activity Logger - Human-readable batch logging to `.scribe/activity.md`
//!
//! Lets a human follow a batch run:
//! - Batch start (plan, platform, brief)
//! - Each item's status, score and a preview of the post
//! - Final summary with running average and trend

use chrono::Utc;
use scribe_core::fail_open::fail_open;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::batch::{BatchPlan, BatchReport, ItemResult, ItemStatus};

/// Maximum characters of post content shown per item
const ACTIVITY_LOG_PREVIEW_CHARS: usize = 400;

/// Activity logger for batch runs
pub struct ActivityLogger {
    output_path: PathBuf,
}

impl ActivityLogger {
    pub fn new(scribe_dir: PathBuf) -> Self {
        Self {
            output_path: scribe_dir.join("activity.md"),
        }
    }

    /// Log the start of a batch run
    ///
    /// Fail-open: logging failures never stop the batch
    pub async fn log_batch_start(&self, plan: &BatchPlan) {
        fail_open("activity_logger::log_batch_start", || async {
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
            let content = format!(
                "# Batch {}\n\n**Started**: {}\n**Platform**: {}\n**Posts**: {}\n**Brief**: {}\n\n---\n\n",
                plan.plan_id,
                timestamp,
                plan.platform,
                plan.count,
                plan.brief.lines().next().unwrap_or_default()
            );
            self.append_internal(&content).await
        })
        .await;
    }

    /// Log one finished (or deferred) item
    pub async fn log_item(&self, index: usize, count: usize, item: &ItemResult) {
        fail_open("activity_logger::log_item", || async {
            let mut content = format!("### Post {}/{}\n", index, count);

            match &item.status {
                ItemStatus::Completed { score } => {
                    let score = score
                        .map(|s| format!("{:.1}/25", s))
                        .unwrap_or_else(|| "not graded".to_string());
                    content.push_str(&format!("**Status**: completed ({})\n\n", score));
                }
                ItemStatus::Failed {
                    attempts,
                    error,
                    error_type,
                } => {
                    content.push_str(&format!(
                        "**Status**: failed after {} attempt(s) [{}]\n**Error**: {}\n\n",
                        attempts,
                        error_type.as_str(),
                        error
                    ));
                }
                ItemStatus::Deferred => {
                    content.push_str("**Status**: deferred (circuit open)\n\n");
                }
            }

            if let Some(text) = &item.content {
                let preview = if text.chars().count() > ACTIVITY_LOG_PREVIEW_CHARS {
                    let truncated: String = text.chars().take(ACTIVITY_LOG_PREVIEW_CHARS).collect();
                    format!("{truncated}...")
                } else {
                    text.to_string()
                };
                content.push_str("> ");
                content.push_str(&preview.replace('\n', "\n> "));
                content.push_str("\n\n");
            }

            self.append_internal(&content).await
        })
        .await;
    }

    /// Log the batch summary
    pub async fn log_batch_complete(&self, report: &BatchReport) {
        fail_open("activity_logger::log_batch_complete", || async {
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
            let content = format!(
                "---\n\n## Batch Summary\n\n\
                **Completed**: {}\n\
                **Posts**: {} completed, {} failed, {} deferred\n\
                **Average Score**: {:.1} (trend: {})\n\
                **Stop Reason**: {}\n\n",
                timestamp,
                report.completed(),
                report.failed(),
                report.deferred(),
                report.stats.avg_score,
                report.stats.trend.as_str(),
                report.stop_reason
            );
            self.append_internal(&content).await
        })
        .await;
    }

    async fn append_internal(&self, content: &str) -> scribe_core::Result<()> {
        if let Some(parent) = self.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)
            .await?;

        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchStopReason;
    use scribe_context::ContextManager;
    use scribe_core::{ErrorKind, Platform};
    use tempfile::TempDir;
    use tokio::fs;

    fn plan() -> BatchPlan {
        BatchPlan::new(Platform::Twitter, "Why we rewrote our billing system", 3)
            .with_plan_id("billing")
    }

    #[tokio::test]
    async fn test_log_batch_start() {
        let temp_dir = TempDir::new().unwrap();
        let logger = ActivityLogger::new(temp_dir.path().to_path_buf());

        logger.log_batch_start(&plan()).await;

        let content = fs::read_to_string(temp_dir.path().join("activity.md"))
            .await
            .unwrap();
        assert!(content.contains("# Batch billing"));
        assert!(content.contains("**Platform**: twitter"));
        assert!(content.contains("**Posts**: 3"));
        assert!(content.contains("Why we rewrote our billing system"));
    }

    #[tokio::test]
    async fn test_log_items() {
        let temp_dir = TempDir::new().unwrap();
        let logger = ActivityLogger::new(temp_dir.path().to_path_buf());

        logger
            .log_item(
                1,
                3,
                &ItemResult {
                    index: 1,
                    status: ItemStatus::Completed { score: Some(22.0) },
                    content: Some("Thread opener\nSecond tweet".into()),
                },
            )
            .await;
        logger
            .log_item(
                2,
                3,
                &ItemResult {
                    index: 2,
                    status: ItemStatus::Failed {
                        attempts: 4,
                        error: "Service unavailable: 503".into(),
                        error_type: ErrorKind::ServiceUnavailable,
                    },
                    content: None,
                },
            )
            .await;
        logger
            .log_item(
                3,
                3,
                &ItemResult {
                    index: 3,
                    status: ItemStatus::Deferred,
                    content: None,
                },
            )
            .await;

        let content = fs::read_to_string(temp_dir.path().join("activity.md"))
            .await
            .unwrap();
        assert!(content.contains("### Post 1/3"));
        assert!(content.contains("completed (22.0/25)"));
        assert!(content.contains("> Thread opener\n> Second tweet"));
        assert!(content.contains("failed after 4 attempt(s) [service_unavailable]"));
        assert!(content.contains("deferred (circuit open)"));
    }

    #[tokio::test]
    async fn test_log_batch_complete() {
        let temp_dir = TempDir::new().unwrap();
        let logger = ActivityLogger::new(temp_dir.path().to_path_buf());

        let report = BatchReport {
            plan_id: "billing".into(),
            items: vec![ItemResult {
                index: 1,
                status: ItemStatus::Deferred,
                content: None,
            }],
            stats: ContextManager::new("billing").get_stats(),
            stop_reason: BatchStopReason::CircuitOpen {
                circuit: "anthropic".into(),
                retry_after_secs: 60,
            },
        };
        logger.log_batch_complete(&report).await;

        let content = fs::read_to_string(temp_dir.path().join("activity.md"))
            .await
            .unwrap();
        assert!(content.contains("## Batch Summary"));
        assert!(content.contains("0 completed, 0 failed, 1 deferred"));
        assert!(content.contains("circuit 'anthropic' open, retry in 60s"));
    }

    #[tokio::test]
    async fn test_truncate_long_content() {
        let temp_dir = TempDir::new().unwrap();
        let logger = ActivityLogger::new(temp_dir.path().to_path_buf());

        let item = ItemResult {
            index: 1,
            status: ItemStatus::Completed { score: None },
            content: Some("x".repeat(1000)),
        };
        logger.log_item(1, 1, &item).await;

        let content = fs::read_to_string(temp_dir.path().join("activity.md"))
            .await
            .unwrap();
        assert!(content.contains("not graded"));
        assert!(content.contains("..."));
        assert!(!content.contains(&"x".repeat(500)));
    }

    #[tokio::test]
    async fn test_unwritable_path_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        // Parent is a regular file, so every write fails
        let logger = ActivityLogger::new(blocker.join("nested"));
        logger.log_batch_start(&plan()).await;

        assert!(!blocker.join("nested").exists());
    }
}
