//! Deterministic selection among ready tasks.

use super::task::Task;
use super::types::{TaskStatus, TaskType};
use super::workflow::WorkflowState;

/// Pick the next task to run: contract tasks first, then tasks marked for
/// rework, then the first ready task. Ties keep insertion order.
///
/// Returns `None` when nothing is ready.
pub fn next_ready_task(state: &WorkflowState) -> Option<&Task> {
    let ready = state.ready_tasks();
    ready
        .iter()
        .find(|task| task.task_type == TaskType::Contract)
        .or_else(|| ready.iter().find(|task| task.status == TaskStatus::Rework))
        .or_else(|| ready.first())
        .copied()
}
