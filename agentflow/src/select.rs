//! Selection helpers for `agentflow run-next`.

use anyhow::Result;
use tracing::info;

use crate::core::selector::next_ready_task;
use crate::engine::{Engine, RunOptions, RunOutcome};
use crate::io::generator::Generator;

/// Structured outcome of running the next ready task.
#[derive(Debug, Clone, PartialEq)]
pub enum NextOutcome {
    /// Nothing is ready to run.
    Idle,
    /// The selected task was run.
    Ran { task_id: String, outcome: RunOutcome },
}

impl<G: Generator> Engine<G> {
    /// Id of the task `run_next` would pick.
    pub fn next_task_id(&self) -> Option<String> {
        next_ready_task(&self.state).map(|task| task.id.clone())
    }

    /// Run the highest-priority ready task: contracts first, then rework,
    /// then the first ready task.
    pub fn run_next(&mut self, options: RunOptions) -> Result<NextOutcome> {
        let Some(task_id) = self.next_task_id() else {
            info!("no ready tasks");
            return Ok(NextOutcome::Idle);
        };
        let outcome = self.run_task(&task_id, options)?;
        Ok(NextOutcome::Ran { task_id, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AgentType;
    use crate::test_support::TestWorkspace;

    #[test]
    fn runs_contract_tasks_before_others() {
        let ws = TestWorkspace::new()
            .task("01-impl.yaml", "id: impl\ntitle: Impl\nagent_type: developer\nprompt: build\n")
            .task("02-spec.yaml", "id: spec\ntitle: Spec\nagent_type: contract\nprompt: define\nrequires_review: false\n")
            .agent(AgentType::Developer)
            .agent(AgentType::Contract);
        let mut engine = ws.engine();
        assert_eq!(engine.next_task_id().as_deref(), Some("spec"));

        engine.generator().push(AgentType::Contract, "contract");
        let outcome = engine.run_next(RunOptions::default()).expect("run next");
        assert_eq!(
            outcome,
            NextOutcome::Ran {
                task_id: "spec".to_string(),
                outcome: RunOutcome::Queued,
            }
        );
        assert_eq!(engine.next_task_id().as_deref(), Some("impl"));
    }

    #[test]
    fn idle_when_nothing_is_ready() {
        let ws = TestWorkspace::new()
            .task("01-a.yaml", "id: a\ntitle: A\nagent_type: developer\nprompt: a\ndepends_on: [b]\n")
            .task("02-b.yaml", "id: b\ntitle: B\nagent_type: developer\nprompt: b\ndepends_on: [a]\n")
            .agent(AgentType::Developer);
        let mut engine = ws.engine();
        assert_eq!(engine.run_next(RunOptions::default()).expect("run next"), NextOutcome::Idle);
        assert!(engine.generator().requests().is_empty());
    }
}
