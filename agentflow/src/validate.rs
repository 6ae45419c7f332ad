//! Workflow validation for `agentflow validate`.

use tracing::warn;

use crate::core::invariants::{ValidationWarning, validate_graph};
use crate::core::types::AgentType;
use crate::engine::Engine;
use crate::io::generator::Generator;

impl<G: Generator> Engine<G> {
    /// Graph warnings plus warnings about agents the workflow needs but the
    /// workspace does not configure. Never fails.
    pub fn validate(&self) -> Vec<ValidationWarning> {
        let mut warnings = validate_graph(&self.state);

        for task in &self.state.tasks {
            if !self.agents.contains(&task.agent_type) {
                warnings.push(ValidationWarning::UnconfiguredAgent {
                    task: task.id.clone(),
                    agent: task.agent_type.clone(),
                });
            }
        }

        for task in &self.state.tasks {
            let (review, redteam, qa) = if task.loop_config.enabled {
                let config = &task.loop_config;
                (config.require_reviewer, config.require_redteam, config.require_qa)
            } else {
                (task.requires_review, task.requires_redteam, task.requires_qa)
            };
            let checks = [
                (review, AgentType::Reviewer),
                (redteam, AgentType::Redteam),
                (qa, AgentType::Qa),
            ];
            for (required, agent) in checks {
                if required && !self.agents.contains(&agent) {
                    warnings.push(ValidationWarning::UnconfiguredCheck {
                        task: task.id.clone(),
                        agent,
                    });
                }
            }
        }

        for warning in &warnings {
            warn!(task_id = %warning.task_id(), "{warning}");
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestWorkspace;

    #[test]
    fn reports_graph_and_configuration_warnings() {
        let ws = TestWorkspace::new()
            .task(
                "01-impl.yaml",
                "id: impl\ntitle: Impl\nagent_type: developer\nprompt: build\ndepends_on: [ghost]\nrequires_review: false\nrequires_qa: true\n",
            )
            .task(
                "02-plan.yaml",
                "id: plan\ntitle: Plan\nagent_type: planner\nprompt: plan\ninput_contract: x\nrequires_review: false\n",
            )
            .agent(AgentType::Developer);
        let engine = ws.engine();

        let warnings = engine.validate();
        assert_eq!(
            warnings,
            vec![
                ValidationWarning::UnknownDependency {
                    task: "impl".to_string(),
                    dependency: "ghost".to_string(),
                },
                ValidationWarning::MissingContract {
                    task: "impl".to_string(),
                },
                ValidationWarning::UnconfiguredAgent {
                    task: "plan".to_string(),
                    agent: AgentType::Planner,
                },
                ValidationWarning::UnconfiguredCheck {
                    task: "impl".to_string(),
                    agent: AgentType::Qa,
                },
            ]
        );
    }

    #[test]
    fn loop_policy_decides_which_checks_are_needed() {
        let ws = TestWorkspace::new()
            .task(
                "01-api.yaml",
                "id: api\ntitle: API\nagent_type: developer\nprompt: build\ninput_contract: x\nrequires_review: false\nloop:\n  enabled: true\n  require_redteam: true\n",
            )
            .agent(AgentType::Developer)
            .agent(AgentType::Qa);
        let engine = ws.engine();

        let warnings = engine.validate();
        assert_eq!(
            warnings,
            vec![
                ValidationWarning::UnconfiguredCheck {
                    task: "api".to_string(),
                    agent: AgentType::Reviewer,
                },
                ValidationWarning::UnconfiguredCheck {
                    task: "api".to_string(),
                    agent: AgentType::Redteam,
                },
            ]
        );
    }

    #[test]
    fn cycle_names_every_member() {
        let ws = TestWorkspace::new()
            .task("01-a.yaml", "id: a\ntitle: A\nagent_type: developer\nprompt: a\ninput_contract: x\nrequires_review: false\ndepends_on: [c]\n")
            .task("02-b.yaml", "id: b\ntitle: B\nagent_type: developer\nprompt: b\ninput_contract: x\nrequires_review: false\ndepends_on: [a]\n")
            .task("03-c.yaml", "id: c\ntitle: C\nagent_type: developer\nprompt: c\ninput_contract: x\nrequires_review: false\ndepends_on: [b]\n")
            .agent(AgentType::Developer);
        let engine = ws.engine();

        let cycles: Vec<String> = engine
            .validate()
            .iter()
            .filter(|w| matches!(w, ValidationWarning::CircularDependency { .. }))
            .map(|w| w.task_id().to_string())
            .collect();
        assert_eq!(cycles, vec!["a", "b", "c"]);
    }
}
