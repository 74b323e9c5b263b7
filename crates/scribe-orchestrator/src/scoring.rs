//! Rubric score extraction from model output
//!
//! Every post prompt asks the model to grade its own draft against a
//! 25-point rubric and finish with a line like `Score: 21/25`.

/// Maximum points on the rubric
pub const RUBRIC_MAX: f64 = 25.0;

const TAKEAWAY_MAX_CHARS: usize = 120;

/// Parse the self-assessed rubric score from model output
///
/// The last `Score: N/25` line wins, since drafts sometimes quote the rubric
/// before grading. Returns `None` when no well-formed score is present.
pub fn parse_score(output: &str) -> Option<f64> {
    output.lines().rev().find_map(parse_score_line)
}

fn parse_score_line(line: &str) -> Option<f64> {
    let lower = line.to_lowercase();
    let start = lower.find("score:")? + "score:".len();
    let rest = lower[start..].trim_start_matches(|c: char| c.is_whitespace() || c == '*');

    let (points, max) = rest.split_once('/')?;
    let points: f64 = points.trim().trim_matches('*').parse().ok()?;
    let max: f64 = max
        .trim()
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .next()?
        .parse()
        .ok()?;

    if max != RUBRIC_MAX || !(0.0..=RUBRIC_MAX).contains(&points) {
        tracing::debug!(line, "Ignoring score outside the rubric");
        return None;
    }
    Some(points)
}

/// One-line takeaway for the context manager: the post's opening line
pub fn extract_takeaway(output: &str) -> String {
    let first = output
        .lines()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .find(|line| !line.is_empty() && parse_score_line(line).is_none())
        .unwrap_or_default();

    if first.chars().count() > TAKEAWAY_MAX_CHARS {
        let truncated: String = first.chars().take(TAKEAWAY_MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        first.to_string()
    }
}
