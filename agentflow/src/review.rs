//! Review gate: pending review documents, approval, and rejection.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::core::task::Task;
use crate::core::types::{TaskStatus, TaskType};
use crate::engine::{Engine, Refusal};
use crate::io::artifacts::timestamp;
use crate::io::generator::Generator;
use crate::io::prompt::{LoopSummary, ReviewDocument};
use crate::io::review_docs::{discard_review_doc, finalize_review_doc, write_review_doc};

/// Result of a review-gate transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Refused(Refusal),
}

/// One task waiting for a human decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewQueueEntry {
    pub id: String,
    pub title: String,
    pub task_type: TaskType,
    pub has_redteam_report: bool,
    pub has_qa_report: bool,
    /// Rounds run by the feedback loop; 0 when the loop is disabled.
    pub loop_iterations: u32,
    pub review_doc: PathBuf,
}

fn join_arrow<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn loop_summary(task: &Task) -> LoopSummary {
    let state = &task.loop_state;
    let scores: Vec<String> = state.review_scores.iter().map(|s| format!("{s:.2}")).collect();
    LoopSummary {
        iterations: state.iteration,
        review_scores: scores.join(" -> "),
        qa_results: join_arrow(&state.qa_results),
        redteam_critical: join_arrow(&state.redteam_critical_counts),
    }
}

impl<G: Generator> Engine<G> {
    /// Write the self-contained review document for `task` and move it to
    /// `review`.
    pub(crate) fn queue_for_review(&self, task: &mut Task, artifact: &str, looped: bool) -> Result<()> {
        let document = ReviewDocument {
            id: &task.id,
            title: &task.title,
            task_type: task.task_type.as_str(),
            generated: timestamp(Utc::now()),
            loop_summary: looped.then(|| loop_summary(task)),
            input_contract: task.input_contract.as_deref(),
            output_contract: task.output_contract.as_deref(),
            criteria: &task.acceptance_criteria,
            prompt: &task.prompt,
            artifact,
            redteam_report: task.redteam_report.as_deref(),
            qa_report: task.qa_report.as_deref(),
        };
        let rendered = self.prompts.review_document(&document)?;
        let path = self.paths.review_doc(&task.id);
        write_review_doc(&path, &rendered)?;

        task.status = TaskStatus::Review;
        task.updated_at = Utc::now();
        info!(task_id = %task.id, path = %path.display(), "queued for human review");
        Ok(())
    }

    /// Approve a task in review: finalize its review document, mark it
    /// completed, and append it to the completion order.
    pub fn approve(&mut self, task_id: &str) -> Result<Transition> {
        let task = match self.reviewable(task_id) {
            Ok(task) => task,
            Err(refusal) => {
                info!(task_id, %refusal, "approve refused");
                return Ok(Transition::Refused(refusal));
            }
        };

        let pending = self.paths.review_doc(task_id);
        let finalized = self.finalized_path(&task);
        if !finalize_review_doc(&pending, &finalized)? {
            warn!(task_id, path = %pending.display(), "no pending review document to finalize");
        }
        self.state.mark_completed(task_id, Utc::now());
        self.persist()?;
        info!(task_id, path = %finalized.display(), "approved");
        Ok(Transition::Applied)
    }

    /// Reject a task in review. The reason is kept as review feedback and
    /// the pending review document is discarded. The task stays `rejected`.
    pub fn reject(&mut self, task_id: &str, reason: &str) -> Result<Transition> {
        if let Err(refusal) = self.reviewable(task_id) {
            info!(task_id, %refusal, "reject refused");
            return Ok(Transition::Refused(refusal));
        }

        discard_review_doc(&self.paths.review_doc(task_id))?;
        if let Some(task) = self.state.task_mut(task_id) {
            task.status = TaskStatus::Rejected;
            task.review_feedback = Some(reason.to_string());
            task.updated_at = Utc::now();
        }
        self.persist()?;
        info!(task_id, reason, "rejected");
        Ok(Transition::Applied)
    }

    fn reviewable(&self, task_id: &str) -> std::result::Result<Task, Refusal> {
        let task = self.state.task(task_id).ok_or_else(|| Refusal::UnknownTask {
            task: task_id.to_string(),
        })?;
        if task.status != TaskStatus::Review {
            return Err(Refusal::NotInReview {
                task: task_id.to_string(),
                status: task.status,
            });
        }
        Ok(task.clone())
    }

    /// Tasks currently awaiting review, in insertion order.
    pub fn review_queue(&self) -> Vec<ReviewQueueEntry> {
        self.state
            .tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Review)
            .map(|task| ReviewQueueEntry {
                id: task.id.clone(),
                title: task.title.clone(),
                task_type: task.task_type,
                has_redteam_report: task.redteam_report.is_some(),
                has_qa_report: task.qa_report.is_some(),
                loop_iterations: if task.loop_config.enabled {
                    task.loop_state.iteration
                } else {
                    0
                },
                review_doc: self.paths.review_doc(&task.id),
            })
            .collect()
    }
}
