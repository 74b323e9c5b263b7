//! Context manager for one batch run

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::Path;

use scribe_core::{ContextConfig, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::summary::{CompactedSummary, SummaryEntry, SummaryInput, Trend};

/// Point-in-time view of a batch's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextStats {
    pub plan_id: String,
    pub total_posts: usize,
    pub avg_score: f64,
    pub posts_since_compact: usize,
    pub recent_scores: Vec<f64>,
    pub trend: Trend,
    pub compactions: usize,
}

/// Bounded, trend-aware memory of a batch run
///
/// Finished posts go into an uncompacted window. When the window reaches
/// `compaction_threshold` entries it is folded into the compacted summary and
/// cleared, so the text handed to the next prompt stays bounded while the
/// running average still covers every post.
///
/// Owned by a single batch driver; not shared across runs.
///
/// # Example
///
/// ```
/// use scribe_context::{ContextManager, SummaryInput};
///
/// let mut ctx = ContextManager::new("launch-week");
/// for (i, score) in [18.0, 19.0, 20.0, 21.0, 22.0].into_iter().enumerate() {
///     ctx.add_summary(SummaryInput::new(i + 1, score));
/// }
///
/// assert_eq!(ctx.get_stats().avg_score, 20.0);
/// assert_eq!(ctx.get_target_score(), 21);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextManager {
    plan_id: String,
    compaction_threshold: usize,
    recent_limit: usize,
    target_score_floor: u32,
    max_highlights: usize,
    window: Vec<SummaryEntry>,
    compacted: Option<CompactedSummary>,
    recent_scores: VecDeque<f64>,
}

impl ContextManager {
    /// Create a context manager with default settings
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self::with_config(plan_id, &ContextConfig::default())
    }

    /// Create a context manager from configuration
    pub fn with_config(plan_id: impl Into<String>, config: &ContextConfig) -> Self {
        Self {
            plan_id: plan_id.into(),
            compaction_threshold: config.compaction_threshold.max(1),
            recent_limit: config.recent_scores,
            target_score_floor: config.target_score_floor,
            max_highlights: config.max_highlights,
            window: Vec::new(),
            compacted: None,
            recent_scores: VecDeque::new(),
        }
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn compaction_threshold(&self) -> usize {
        self.compaction_threshold
    }

    /// Entries added since the last compaction
    pub fn posts_since_compact(&self) -> usize {
        self.window.len()
    }

    /// Uncompacted entries, in completion order
    pub fn recent_entries(&self) -> &[SummaryEntry] {
        &self.window
    }

    pub fn compacted_summary(&self) -> Option<&CompactedSummary> {
        self.compacted.as_ref()
    }

    /// Record a finished post, compacting when the window is full
    ///
    /// Returns the index the entry was stored under.
    pub fn add_summary(&mut self, input: SummaryInput) -> usize {
        let next_index = self.total_posts() + 1;
        let entry = input.normalize(&self.plan_id, next_index);
        let index = entry.index;

        debug!(
            plan_id = %self.plan_id,
            index,
            score = entry.score,
            "Added post summary"
        );

        self.recent_scores.push_back(entry.score);
        while self.recent_scores.len() > self.recent_limit {
            self.recent_scores.pop_front();
        }
        self.window.push(entry);

        if self.window.len() >= self.compaction_threshold {
            self.compact();
        }
        index
    }

    /// Fold the uncompacted window into the compacted summary
    pub fn compact(&mut self) {
        if self.window.is_empty() {
            return;
        }

        let window = std::mem::take(&mut self.window);
        let summary = self.compacted.get_or_insert_with(CompactedSummary::default);
        let trend = summary.fold(&window, self.max_highlights);

        info!(
            plan_id = %self.plan_id,
            folded = window.len(),
            total_posts = summary.post_count,
            avg_score = summary.avg_score(),
            trend = trend.as_str(),
            "Compacted batch context"
        );
    }

    /// Posts recorded since the batch started
    pub fn total_posts(&self) -> usize {
        self.compacted.as_ref().map_or(0, |c| c.post_count) + self.window.len()
    }

    /// Mean score across compacted and uncompacted posts
    pub fn avg_score(&self) -> f64 {
        let total = self.total_posts();
        if total == 0 {
            return 0.0;
        }
        let compacted_sum = self.compacted.as_ref().map_or(0.0, |c| c.score_sum);
        let window_sum: f64 = self.window.iter().map(|e| e.score).sum();
        (compacted_sum + window_sum) / total as f64
    }

    /// Trend of the most recent compaction
    pub fn trend(&self) -> Trend {
        self.compacted.as_ref().map_or(Trend::Stable, |c| c.trend)
    }

    pub fn get_stats(&self) -> ContextStats {
        ContextStats {
            plan_id: self.plan_id.clone(),
            total_posts: self.total_posts(),
            avg_score: self.avg_score(),
            posts_since_compact: self.posts_since_compact(),
            recent_scores: self.recent_scores.iter().copied().collect(),
            trend: self.trend(),
            compactions: self.compacted.as_ref().map_or(0, |c| c.compactions),
        }
    }

    /// Score the next post should aim for
    ///
    /// One point above the rounded running average, never below the floor.
    /// Out-of-range averages saturate at `u32::MAX`.
    pub fn get_target_score(&self) -> u32 {
        let rounded = self.avg_score().round() as u32;
        rounded.saturating_add(1).max(self.target_score_floor)
    }

    /// Text digest for the next prompt
    ///
    /// Always states the running average and names the post ranges each
    /// compacted block covers.
    pub fn get_compacted_learnings(&self) -> String {
        let total = self.total_posts();
        if total == 0 {
            return format!("No posts completed yet in batch {}.\n", self.plan_id);
        }

        let mut out = String::new();
        let _ = writeln!(out, "## Learnings from batch {}", self.plan_id);
        let _ = writeln!(
            out,
            "Running average score: {:.1} across {} posts (trend: {})",
            self.avg_score(),
            total,
            self.trend()
        );

        if let Some(compacted) = &self.compacted {
            out.push_str("\n### Compacted history\n");
            for block in &compacted.blocks {
                let _ = writeln!(
                    out,
                    "- Posts {}-{}: {} posts, avg {:.1} ({})",
                    block.first_index,
                    block.last_index,
                    block.post_count,
                    block.avg_score,
                    block.trend
                );
            }
            if !compacted.highlights.is_empty() {
                out.push_str("Top posts so far:\n");
                for entry in &compacted.highlights {
                    let _ = writeln!(out, "- {}", format_entry(entry));
                }
            }
        }

        if !self.window.is_empty() {
            let first = self.window.iter().map(|e| e.index).min().unwrap_or(0);
            let last = self.window.iter().map(|e| e.index).max().unwrap_or(0);
            let _ = writeln!(out, "\n### Recent posts ({}-{})", first, last);
            for entry in &self.window {
                let _ = writeln!(out, "- {}", format_entry(entry));
            }
        }

        out
    }

    /// Write a JSON snapshot
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a JSON snapshot written by [`ContextManager::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn format_entry(entry: &SummaryEntry) -> String {
    let mut line = format!(
        "Post {} ({}, score {:.1})",
        entry.index, entry.platform, entry.score
    );
    if !entry.takeaway.is_empty() {
        line.push_str(": ");
        line.push_str(&entry.takeaway);
    }
    if let Some(link) = &entry.link {
        line.push_str(&format!(" <{}>", link));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::Platform;
    use tempfile::TempDir;

    fn add_scores(ctx: &mut ContextManager, scores: &[f64]) {
        for score in scores {
            let index = ctx.total_posts() + 1;
            ctx.add_summary(
                SummaryInput::new(index, *score)
                    .with_platform(Platform::Youtube)
                    .with_takeaway(format!("takeaway {}", index)),
            );
        }
    }

    #[test]
    fn test_running_average() {
        let mut ctx = ContextManager::new("plan-a");
        add_scores(&mut ctx, &[18.0, 19.0, 20.0, 21.0, 22.0]);

        let stats = ctx.get_stats();
        assert_eq!(stats.avg_score, 20.0);
        assert_eq!(stats.total_posts, 5);
        assert_eq!(stats.posts_since_compact, 5);
        assert_eq!(stats.recent_scores, vec![18.0, 19.0, 20.0, 21.0, 22.0]);
    }

    #[test]
    fn test_target_score() {
        let mut ctx = ContextManager::new("plan-a");
        add_scores(&mut ctx, &[18.0, 19.0, 20.0, 21.0, 22.0]);
        assert_eq!(ctx.get_target_score(), 21);
    }

    #[test]
    fn test_target_score_respects_floor() {
        let ctx = ContextManager::new("empty");
        assert_eq!(ctx.get_target_score(), 18);

        let mut low = ContextManager::new("low");
        add_scores(&mut low, &[5.0, 6.0]);
        assert_eq!(low.get_target_score(), 18);

        let config = ContextConfig {
            target_score_floor: 0,
            ..ContextConfig::default()
        };
        let mut unfloored = ContextManager::with_config("low", &config);
        add_scores(&mut unfloored, &[5.0, 6.0]);
        assert_eq!(unfloored.get_target_score(), 7);
    }

    #[test]
    fn test_target_score_saturates_on_huge_scores() {
        let mut ctx = ContextManager::new("outlier");
        ctx.add_summary(SummaryInput::new(1, 5.0e9));
        assert_eq!(ctx.get_target_score(), u32::MAX);

        // Sum overflows to infinity
        let mut overflow = ContextManager::new("overflow");
        add_scores(&mut overflow, &[f64::MAX, f64::MAX]);
        assert!(overflow.avg_score().is_infinite());
        assert_eq!(overflow.get_target_score(), u32::MAX);
    }

    #[test]
    fn test_compaction_trigger() {
        let mut ctx = ContextManager::new("plan-b");
        add_scores(&mut ctx, &[20.0; 9]);
        assert_eq!(ctx.posts_since_compact(), 9);
        assert!(ctx.compacted_summary().is_none());

        add_scores(&mut ctx, &[20.0]);
        assert_eq!(ctx.posts_since_compact(), 0);
        assert_eq!(ctx.total_posts(), 10);

        let learnings = ctx.get_compacted_learnings();
        assert!(learnings.contains("Posts 1-10"), "{}", learnings);
        assert!(learnings.contains("Running average score: 20.0"));
    }

    #[test]
    fn test_average_spans_compacted_and_recent() {
        let mut ctx = ContextManager::new("plan-c");
        add_scores(&mut ctx, &[10.0; 10]);
        add_scores(&mut ctx, &[20.0; 5]);

        let stats = ctx.get_stats();
        assert_eq!(stats.total_posts, 15);
        assert!((stats.avg_score - 13.333).abs() < 0.01);
        assert_eq!(stats.posts_since_compact, 5);
        assert_eq!(stats.compactions, 1);
    }

    #[test]
    fn test_trend_after_second_compaction() {
        let mut ctx = ContextManager::new("plan-d");
        add_scores(&mut ctx, &[15.0; 10]);
        assert_eq!(ctx.get_stats().trend, Trend::Stable);

        add_scores(&mut ctx, &[20.0; 10]);
        assert_eq!(ctx.get_stats().trend, Trend::Improving);

        let learnings = ctx.get_compacted_learnings();
        assert!(learnings.contains("Posts 1-10"));
        assert!(learnings.contains("Posts 11-20"));
        assert!(learnings.contains("trend: improving"));
    }

    #[test]
    fn test_manual_compact_resets_window() {
        let mut ctx = ContextManager::new("plan-e");
        add_scores(&mut ctx, &[19.0, 21.0, 23.0]);
        ctx.compact();

        assert_eq!(ctx.posts_since_compact(), 0);
        assert_eq!(ctx.total_posts(), 3);
        assert_eq!(ctx.avg_score(), 21.0);
        assert!(ctx.get_compacted_learnings().contains("Posts 1-3"));

        // Empty window is a no-op
        ctx.compact();
        assert_eq!(ctx.get_stats().compactions, 1);
    }

    #[test]
    fn test_stats_read_is_idempotent() {
        let mut ctx = ContextManager::new("plan-f");
        add_scores(&mut ctx, &[17.0, 23.0, 20.0]);

        assert_eq!(ctx.get_stats(), ctx.get_stats());
        assert_eq!(ctx.get_compacted_learnings(), ctx.get_compacted_learnings());
    }

    #[test]
    fn test_recent_scores_bounded() {
        let mut ctx = ContextManager::new("plan-g");
        add_scores(&mut ctx, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(ctx.get_stats().recent_scores, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_missing_fields_are_defaulted() {
        let mut ctx = ContextManager::new("plan-h");
        add_scores(&mut ctx, &[20.0]);
        let index = ctx.add_summary(SummaryInput::default());

        assert_eq!(index, 2);
        let stats = ctx.get_stats();
        assert_eq!(stats.total_posts, 2);
        assert_eq!(stats.avg_score, 10.0);
    }

    #[test]
    fn test_empty_learnings() {
        let ctx = ContextManager::new("fresh");
        assert_eq!(
            ctx.get_compacted_learnings(),
            "No posts completed yet in batch fresh.\n"
        );
    }

    #[test]
    fn test_recent_posts_listed_with_links() {
        let mut ctx = ContextManager::new("plan-i");
        ctx.add_summary(
            SummaryInput::new(1, 22.0)
                .with_platform(Platform::Linkedin)
                .with_takeaway("Open with a number")
                .with_link("https://example.com/p/1"),
        );

        let learnings = ctx.get_compacted_learnings();
        assert!(learnings.contains("### Recent posts (1-1)"));
        assert!(learnings.contains(
            "Post 1 (linkedin, score 22.0): Open with a number <https://example.com/p/1>"
        ));
    }

    #[test]
    fn test_save_and_load_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("context/plan-j.json");

        let mut ctx = ContextManager::new("plan-j");
        add_scores(&mut ctx, &[18.0; 12]);
        ctx.save(&path).unwrap();

        let loaded = ContextManager::load(&path).unwrap();
        assert_eq!(loaded.get_stats(), ctx.get_stats());
        assert_eq!(loaded.get_compacted_learnings(), ctx.get_compacted_learnings());
    }
}
