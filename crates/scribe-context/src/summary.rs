//! Per-post summaries and the compacted digest they fold into

use chrono::{DateTime, Utc};
use scribe_core::Platform;
use serde::{Deserialize, Serialize};

/// Score difference below which two means count as equal
pub(crate) const TREND_EPSILON: f64 = 0.5;

/// Compacted blocks kept before the oldest two are merged
pub(crate) const MAX_BLOCKS: usize = 6;

/// Direction of quality across compacted windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    #[default]
    Stable,
}

impl Trend {
    /// Compare a window's mean against the mean that preceded it
    pub fn compare(current: f64, prior: f64) -> Self {
        let delta = current - prior;
        if delta > TREND_EPSILON {
            Trend::Improving
        } else if delta < -TREND_EPSILON {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Declining => "declining",
            Trend::Stable => "stable",
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished post as reported by the batch driver
///
/// Every field is optional. Missing or malformed values are defaulted when
/// the summary is added, never rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryInput {
    pub index: Option<usize>,
    pub score: Option<f64>,
    pub takeaway: Option<String>,
    pub platform: Option<Platform>,
    pub link: Option<String>,
}

impl SummaryInput {
    pub fn new(index: usize, score: f64) -> Self {
        Self {
            index: Some(index),
            score: Some(score),
            ..Self::default()
        }
    }

    pub fn with_takeaway(mut self, takeaway: impl Into<String>) -> Self {
        self.takeaway = Some(takeaway.into());
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Fill defaults and record when the post was added
    pub(crate) fn normalize(self, plan_id: &str, next_index: usize) -> SummaryEntry {
        let index = match self.index {
            Some(index) => index,
            None => {
                tracing::warn!(plan_id, next_index, "Summary without index, using next ordinal");
                next_index
            }
        };

        let score = match self.score {
            Some(score) if score.is_finite() && score >= 0.0 => score,
            Some(score) => {
                tracing::warn!(plan_id, index, score, "Summary has invalid score, using 0");
                0.0
            }
            None => {
                tracing::warn!(plan_id, index, "Summary without score, using 0");
                0.0
            }
        };

        SummaryEntry {
            index,
            score,
            takeaway: self.takeaway.map(|t| t.trim().to_string()).unwrap_or_default(),
            platform: self.platform.unwrap_or_default(),
            link: self.link.filter(|l| !l.trim().is_empty()),
            timestamp: Utc::now(),
        }
    }
}

/// A post summary held by the context manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub index: usize,
    pub score: f64,
    pub takeaway: String,
    pub platform: Platform,
    pub link: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One folded window of posts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactedBlock {
    pub first_index: usize,
    pub last_index: usize,
    pub post_count: usize,
    pub avg_score: f64,
    pub trend: Trend,
}

/// Aggregate of every post folded out of the window so far
///
/// Only ever extended by [`CompactedSummary::fold`]; never rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompactedSummary {
    pub post_count: usize,
    pub score_sum: f64,
    pub trend: Trend,
    pub compactions: usize,
    pub blocks: Vec<CompactedBlock>,
    /// Best post of each folded window, highest score first
    pub highlights: Vec<SummaryEntry>,
}

impl CompactedSummary {
    pub fn avg_score(&self) -> f64 {
        if self.post_count == 0 {
            0.0
        } else {
            self.score_sum / self.post_count as f64
        }
    }

    pub fn first_index(&self) -> Option<usize> {
        self.blocks.iter().map(|b| b.first_index).min()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.blocks.iter().map(|b| b.last_index).max()
    }

    /// Fold a window into the summary, returning the window's trend
    pub(crate) fn fold(&mut self, window: &[SummaryEntry], max_highlights: usize) -> Trend {
        if window.is_empty() {
            return self.trend;
        }

        let window_sum: f64 = window.iter().map(|e| e.score).sum();
        let window_avg = window_sum / window.len() as f64;

        let trend = if self.post_count == 0 {
            Trend::Stable
        } else {
            Trend::compare(window_avg, self.avg_score())
        };

        let first_index = window.iter().map(|e| e.index).min().unwrap_or(0);
        let last_index = window.iter().map(|e| e.index).max().unwrap_or(0);

        self.post_count += window.len();
        self.score_sum += window_sum;
        self.trend = trend;
        self.compactions += 1;
        self.blocks.push(CompactedBlock {
            first_index,
            last_index,
            post_count: window.len(),
            avg_score: window_avg,
            trend,
        });
        if self.blocks.len() > MAX_BLOCKS {
            self.merge_oldest_blocks();
        }

        // Earliest entry wins ties
        let best = window.iter().fold(None::<&SummaryEntry>, |best, e| match best {
            Some(b) if b.score >= e.score => Some(b),
            _ => Some(e),
        });
        if let Some(best) = best {
            self.highlights.push(best.clone());
            self.highlights.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.index.cmp(&b.index))
            });
            self.highlights.truncate(max_highlights);
        }

        trend
    }

    fn merge_oldest_blocks(&mut self) {
        let second = self.blocks.remove(1);
        let first = &mut self.blocks[0];
        let count = first.post_count + second.post_count;
        first.avg_score = (first.avg_score * first.post_count as f64
            + second.avg_score * second.post_count as f64)
            / count as f64;
        first.post_count = count;
        first.first_index = first.first_index.min(second.first_index);
        first.last_index = first.last_index.max(second.last_index);
        first.trend = second.trend;
    }
}
