//! Parse-or-degrade handling of free-form reviewer output.

use serde_json::Value;

use super::types::ReviewResult;

/// Issue recorded when a reviewer response carries no usable JSON verdict.
pub const UNPARSEABLE_ISSUE: &str = "unparseable review";

/// Score assigned to degraded reviews.
pub const DEGRADED_SCORE: f64 = 0.5;

/// Extract a [`ReviewResult`] from a reviewer response.
///
/// Takes the first balanced `{...}` span and parses it as JSON. If no span
/// exists, it does not parse, or it has no numeric `score`, the result is the
/// conservative degraded verdict carrying the raw response as feedback.
/// Scores are clamped to `[0, 1]`.
pub fn parse_review_or_degrade(response: &str) -> ReviewResult {
    match first_json_object(response).and_then(parse_review) {
        Some(review) => review,
        None => degraded(response),
    }
}

fn degraded(response: &str) -> ReviewResult {
    ReviewResult {
        passed: false,
        score: DEGRADED_SCORE,
        feedback: response.to_string(),
        issues: vec![UNPARSEABLE_ISSUE.to_string()],
        suggestions: Vec::new(),
    }
}

fn parse_review(span: &str) -> Option<ReviewResult> {
    let value: Value = serde_json::from_str(span).ok()?;
    let score = value.get("score")?.as_f64()?;
    if !score.is_finite() {
        return None;
    }
    let mut review: ReviewResult = serde_json::from_value(value).ok()?;
    review.score = score.clamp(0.0, 1.0);
    Some(review)
}

/// The first balanced `{...}` span in `text`, ignoring braces inside JSON
/// string literals.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
