//! Feedback loop controller: generate, check, and rework until the task's
//! thresholds pass or its iteration cap is reached.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::core::checks::{evaluate_round, truncate_chars};
use crate::core::task::{LoopState, Task};
use crate::engine::{CheckPlan, Engine, RunOutcome};
use crate::io::agents::AgentConfig;
use crate::io::generator::Generator;

impl<G: Generator> Engine<G> {
    /// Drive a loop-enabled task through up to `max_iterations` rounds.
    ///
    /// Exhausting the cap is not an error: the last artifact goes to the
    /// review gate with its full iteration history. State is persisted after
    /// every round.
    pub(crate) fn run_loop(&mut self, mut task: Task, agent: &AgentConfig) -> Result<RunOutcome> {
        let max_iterations = task.loop_config.effective_max_iterations();
        let plan = CheckPlan {
            review: task.loop_config.require_reviewer,
            redteam: task.loop_config.require_redteam,
            qa: task.loop_config.require_qa,
        };
        task.loop_state = LoopState::default();
        task.redteam_report = None;
        task.qa_report = None;

        let context = self.build_context(&task)?;
        let mut artifact = String::new();

        for iteration in 1..=max_iterations {
            info!(task_id = %task.id, iteration, max_iterations, "loop iteration");
            let prompt = if iteration == 1 {
                task.prompt.clone()
            } else {
                let previous = truncate_chars(&artifact, self.config.previous_artifact_chars);
                let feedback = task.loop_state.last_feedback().unwrap_or_default();
                self.prompts.rework(
                    &task.prompt,
                    iteration - 1,
                    (!previous.is_empty()).then_some(previous),
                    feedback,
                )?
            };

            artifact = self.generate(agent, prompt, context.clone())?;
            self.save_artifact(&mut task, agent, &artifact, Some(iteration))?;

            let round = self.run_checks(&task, &artifact, plan)?;
            let evaluation =
                evaluate_round(&task.loop_config, &round, self.config.feedback_report_chars);
            if round.redteam_report.is_some() {
                task.redteam_report = round.redteam_report;
            }
            if round.qa_report.is_some() {
                task.qa_report = round.qa_report;
            }
            task.loop_state.record(
                evaluation.review_score,
                evaluation.qa,
                evaluation.redteam_critical,
                evaluation.feedback,
            );
            task.updated_at = Utc::now();
            self.commit(task.clone())?;

            if evaluation.passed {
                info!(task_id = %task.id, iteration, "all checks passed");
                break;
            }
            if iteration == max_iterations {
                warn!(
                    task_id = %task.id,
                    max_iterations,
                    "iterations exhausted; proceeding to review with failing checks"
                );
            } else {
                info!(task_id = %task.id, iteration, "checks failed; reworking");
            }
        }

        self.save_artifact(&mut task, agent, &artifact, None)?;
        self.save_reports(&task)?;
        self.finish(task, &artifact, true)
    }
}
