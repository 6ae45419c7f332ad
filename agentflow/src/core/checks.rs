//! Pure evaluation of one round of automated checks against loop policy.

use super::task::LoopConfig;
use super::types::{QaVerdict, ReviewResult};

/// Raw outputs of the checks that actually ran in a round.
///
/// A `None` field means that check was not run, either because the task does
/// not require it or because no agent is configured for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckRound {
    pub review: Option<ReviewResult>,
    pub redteam_report: Option<String>,
    pub qa_report: Option<String>,
}

/// Derived verdicts for a round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundEvaluation {
    pub review_score: Option<f64>,
    pub qa: Option<QaVerdict>,
    /// Critical findings; 0 when red team did not run.
    pub redteam_critical: u32,
    /// Feedback for the next iteration, present only when a threshold failed.
    pub feedback: Option<String>,
    pub passed: bool,
}

/// Number of case-insensitive occurrences of "critical" in a report.
pub fn count_critical(report: &str) -> u32 {
    let count = report.to_lowercase().matches("critical").count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// The first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Evaluate a round in fixed order reviewer, red team, QA.
///
/// Reviewer and red-team checks that did not run are satisfied. QA is not:
/// when the policy requires a passing QA verdict and none was produced, the
/// round fails without a feedback block. Report excerpts in the feedback are
/// cut to `report_chars` characters.
pub fn evaluate_round(config: &LoopConfig, round: &CheckRound, report_chars: usize) -> RoundEvaluation {
    let mut blocks: Vec<String> = Vec::new();
    let mut passed = true;

    let review_score = round.review.as_ref().map(|review| {
        if review.score < config.min_review_score {
            passed = false;
            let mut block = format!(
                "## Reviewer Feedback (Score: {:.2})\n\n{}",
                review.score, review.feedback
            );
            if !review.issues.is_empty() {
                block.push_str("\n\nIssues:\n- ");
                block.push_str(&review.issues.join("\n- "));
            }
            blocks.push(block);
        }
        review.score
    });

    let mut redteam_critical = 0;
    if let Some(report) = round.redteam_report.as_deref() {
        redteam_critical = count_critical(report);
        if redteam_critical > config.redteam_max_critical {
            passed = false;
            blocks.push(format!(
                "## Red Team Findings ({redteam_critical} critical)\n\n{}",
                truncate_chars(report, report_chars)
            ));
        }
    }

    let qa = round.qa_report.as_deref().map(|report| {
        let verdict = QaVerdict::classify(report);
        if verdict != QaVerdict::Pass && config.qa_must_pass {
            passed = false;
            blocks.push(format!(
                "## QA Report (Status: {verdict})\n\n{}",
                truncate_chars(report, report_chars)
            ));
        }
        verdict
    });
    if qa.is_none() && config.require_qa && config.qa_must_pass {
        passed = false;
    }

    let feedback = (!blocks.is_empty()).then(|| blocks.join("\n\n"));
    RoundEvaluation {
        review_score,
        qa,
        redteam_critical,
        feedback,
        passed,
    }
}
