//! Workflow status summary for `agentflow status`.

use std::fmt;

use crate::core::retrieval::ContextMode;
use crate::core::types::{AgentType, TaskStatus, TaskType};
use crate::engine::Engine;
use crate::io::generator::Generator;

/// How design material reaches generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    None,
    Full,
    Retrieval,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContextKind::None => "none",
            ContextKind::Full => "full",
            ContextKind::Retrieval => "retrieval",
        })
    }
}

/// Snapshot of the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    pub total: usize,
    pub completed: usize,
    /// `pending` plus `rework`.
    pub pending: usize,
    pub in_review: usize,
    pub in_loop: usize,
    pub failed: usize,
    pub rejected: usize,
    pub ready: Vec<String>,
    pub context_chars: usize,
    pub context_chunks: usize,
    pub context_mode: ContextKind,
    pub qa_configured: bool,
    pub redteam_configured: bool,
    pub contract_tasks: usize,
    pub implementation_tasks: usize,
}

impl<G: Generator> Engine<G> {
    pub fn status(&self) -> StatusSummary {
        let state = &self.state;
        let retriever = self.context.retriever();
        StatusSummary {
            total: state.tasks.len(),
            completed: state.count_status(TaskStatus::Completed),
            pending: state.count_status(TaskStatus::Pending) + state.count_status(TaskStatus::Rework),
            in_review: state.count_status(TaskStatus::Review),
            in_loop: state.tasks_in_loop().len(),
            failed: state.count_status(TaskStatus::Failed),
            rejected: state.count_status(TaskStatus::Rejected),
            ready: state.ready_tasks().iter().map(|task| task.id.clone()).collect(),
            context_chars: retriever.total_chars(),
            context_chunks: retriever.chunks().len(),
            context_mode: match self.context.mode() {
                ContextMode::Empty => ContextKind::None,
                ContextMode::Full(_) => ContextKind::Full,
                ContextMode::Retrieval => ContextKind::Retrieval,
            },
            qa_configured: self.agents.contains(&AgentType::Qa),
            redteam_configured: self.agents.contains(&AgentType::Redteam),
            contract_tasks: state.tasks_by_type(TaskType::Contract).len(),
            implementation_tasks: state.tasks_by_type(TaskType::Implementation).len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestWorkspace;

    #[test]
    fn summarizes_counts_and_context() {
        let ws = TestWorkspace::new()
            .task("01-spec.yaml", "id: spec\ntitle: Spec\nagent_type: contract\nprompt: define\n")
            .task("02-impl.yaml", "id: impl\ntitle: Impl\nagent_type: developer\nprompt: build\ndepends_on: [spec]\n")
            .task("03-docs.yaml", "id: docs\ntitle: Docs\nagent_type: developer\ntask_type: documentation\nprompt: write\n")
            .agent(AgentType::Qa)
            .file("design/arch.md", "# Arch\n\nLayered design.")
            .file("review/docs.md", "# Review: Docs")
            .completed("spec");
        let engine = ws.engine();

        let status = engine.status();
        assert_eq!(status.total, 3);
        assert_eq!(status.completed, 1);
        assert_eq!(status.pending, 1);
        assert_eq!(status.in_review, 1);
        assert_eq!(status.in_loop, 0);
        assert_eq!(status.ready, vec!["impl".to_string()]);
        assert_eq!(status.context_mode, ContextKind::Full);
        assert_eq!(status.context_chunks, 1);
        assert!(status.qa_configured);
        assert!(!status.redteam_configured);
        assert_eq!(status.contract_tasks, 1);
        assert_eq!(status.implementation_tasks, 1);
    }

    #[test]
    fn empty_workspace_has_no_context() {
        let ws = TestWorkspace::new();
        let status = ws.engine().status();
        assert_eq!(status.total, 0);
        assert_eq!(status.context_mode, ContextKind::None);
        assert!(status.ready.is_empty());
    }
}
