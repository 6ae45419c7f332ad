//! Structural checks over the task graph.
//!
//! Every finding is a warning: validation never rejects a graph.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use super::types::{AgentType, TaskType};
use super::workflow::WorkflowState;

/// A non-fatal finding about the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// `task` depends on an id that is not defined.
    UnknownDependency { task: String, dependency: String },
    /// `task` can reach itself through `depends_on` edges.
    CircularDependency { task: String },
    /// Implementation task with no inline contract, contract reference, or
    /// contract-type dependency.
    MissingContract { task: String },
    /// No agent is configured for the task's agent type.
    UnconfiguredAgent { task: String, agent: AgentType },
    /// A required check cannot run because its agent is not configured.
    UnconfiguredCheck { task: String, agent: AgentType },
}

impl ValidationWarning {
    pub fn task_id(&self) -> &str {
        match self {
            ValidationWarning::UnknownDependency { task, .. }
            | ValidationWarning::CircularDependency { task }
            | ValidationWarning::MissingContract { task }
            | ValidationWarning::UnconfiguredAgent { task, .. }
            | ValidationWarning::UnconfiguredCheck { task, .. } => task,
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::UnknownDependency { task, dependency } => {
                write!(f, "{task}: depends on unknown task '{dependency}'")
            }
            ValidationWarning::CircularDependency { task } => {
                write!(f, "{task}: circular dependency detected")
            }
            ValidationWarning::MissingContract { task } => write!(
                f,
                "{task}: implementation task has no contract (inline, contract_task, or contract dependency)"
            ),
            ValidationWarning::UnconfiguredAgent { task, agent } => {
                write!(f, "{task}: no agent configured for type '{agent}'")
            }
            ValidationWarning::UnconfiguredCheck { task, agent } => {
                write!(f, "{task}: required '{agent}' check will be skipped (agent not configured)")
            }
        }
    }
}

/// Check graph structure: unknown dependencies, cycles, and missing contracts.
///
/// Warnings are grouped by kind, each group in task insertion order.
pub fn validate_graph(state: &WorkflowState) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    for task in &state.tasks {
        for dep in &task.depends_on {
            if !state.tasks.contains(dep) {
                warnings.push(ValidationWarning::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    for task in &state.tasks {
        if reaches_itself(state, &task.id) {
            warnings.push(ValidationWarning::CircularDependency {
                task: task.id.clone(),
            });
        }
    }

    for task in &state.tasks {
        if task.task_type != TaskType::Implementation || task.has_own_contract() {
            continue;
        }
        let contract_dependency = task.depends_on.iter().any(|dep| {
            state
                .task(dep)
                .is_some_and(|d| d.task_type == TaskType::Contract)
        });
        if !contract_dependency {
            warnings.push(ValidationWarning::MissingContract {
                task: task.id.clone(),
            });
        }
    }

    warnings
}

/// Breadth-first walk over `depends_on` starting from `origin`'s direct
/// dependencies. Revisiting `origin` is a cycle; any other revisit stops that
/// branch.
fn reaches_itself(state: &WorkflowState, origin: &str) -> bool {
    let Some(start) = state.task(origin) else {
        return false;
    };
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = start.depends_on.iter().map(String::as_str).collect();

    while let Some(id) = queue.pop_front() {
        if id == origin {
            return true;
        }
        if !visited.insert(id) {
            continue;
        }
        if let Some(task) = state.task(id) {
            queue.extend(task.depends_on.iter().map(String::as_str));
        }
    }
    false
}
