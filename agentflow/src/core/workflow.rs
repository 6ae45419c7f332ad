//! In-memory workflow state: the task graph plus completion history.

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::task::Task;
use super::types::{TaskStatus, TaskType};

/// Tasks keyed by id, iterated in insertion order.
///
/// Inserting an id that already exists replaces the earlier task in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskMap {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
}

impl TaskMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task, returning the task it replaced (if any).
    pub fn insert(&mut self, task: Task) -> Option<Task> {
        match self.index.get(&task.id) {
            Some(&pos) => Some(std::mem::replace(&mut self.tasks[pos], task)),
            None => {
                self.index.insert(task.id.clone(), self.tasks.len());
                self.tasks.push(task);
                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&pos| &self.tasks[pos])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.index.get(id).map(|&pos| &mut self.tasks[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }
}

impl<'a> IntoIterator for &'a TaskMap {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

impl FromIterator<Task> for TaskMap {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        let mut map = TaskMap::new();
        for task in iter {
            map.insert(task);
        }
        map
    }
}

impl Serialize for TaskMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tasks.len()))?;
        for task in &self.tasks {
            map.serialize_entry(&task.id, task)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TaskMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TaskMapVisitor;

        impl<'de> Visitor<'de> for TaskMapVisitor {
            type Value = TaskMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of task id to task")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TaskMap, A::Error> {
                let mut tasks = TaskMap::new();
                while let Some((key, mut task)) = access.next_entry::<String, Task>()? {
                    task.id = key;
                    tasks.insert(task);
                }
                Ok(tasks)
            }
        }

        deserializer.deserialize_map(TaskMapVisitor)
    }
}

/// The full persisted workflow record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Task ids in approval order.
    #[serde(default)]
    pub completed_tasks: Vec<String>,
    #[serde(default)]
    pub current_task: Option<String>,
    #[serde(default)]
    pub tasks: TaskMap,
}

impl WorkflowState {
    pub fn new(tasks: TaskMap) -> Self {
        Self {
            completed_tasks: Vec::new(),
            current_task: None,
            tasks,
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.completed_tasks.iter().any(|done| done == id)
    }

    /// Dependencies of `task` that have not been completed yet, in
    /// declaration order.
    pub fn unmet_dependencies<'a>(&self, task: &'a Task) -> Vec<&'a str> {
        task.depends_on
            .iter()
            .filter(|dep| !self.is_completed(dep))
            .map(String::as_str)
            .collect()
    }

    /// Runnable tasks whose dependencies are all completed, in insertion order.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| task.status.is_runnable())
            .filter(|task| task.depends_on.iter().all(|dep| self.is_completed(dep)))
            .collect()
    }

    pub fn tasks_by_type(&self, task_type: TaskType) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| task.task_type == task_type)
            .collect()
    }

    /// Loop-enabled tasks with at least one recorded iteration that are not
    /// completed yet.
    pub fn tasks_in_loop(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| {
                task.loop_config.enabled
                    && task.loop_state.iteration > 0
                    && task.status != TaskStatus::Completed
            })
            .collect()
    }

    pub fn count_status(&self, status: TaskStatus) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.status == status)
            .count()
    }

    /// Mark `id` completed and append it to the completion order.
    ///
    /// Appending is idempotent: an id already in the list keeps its original
    /// position. Returns `false` if the task does not exist.
    pub fn mark_completed(&mut self, id: &str, now: chrono::DateTime<chrono::Utc>) -> bool {
        let Some(task) = self.tasks.get_mut(id) else {
            return false;
        };
        task.status = TaskStatus::Completed;
        task.updated_at = now;
        if !self.is_completed(id) {
            self.completed_tasks.push(id.to_string());
        }
        if self.current_task.as_deref() == Some(id) {
            self.current_task = None;
        }
        true
    }

    /// Rebuild state from freshly loaded definitions and the last persisted
    /// record.
    ///
    /// - Runtime progress for tasks present in both is carried over.
    /// - A task interrupted mid-run (`running`) returns to `pending`.
    /// - Ids in the persisted completion list are forced to `completed`.
    /// - Otherwise, a task with a pending review document is forced to `review`.
    ///
    /// Completion ids that no longer match a defined task are kept so that
    /// downstream readiness is unaffected by removed definitions.
    pub fn restore<F>(definitions: TaskMap, persisted: Option<&WorkflowState>, has_review_doc: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        let mut state = WorkflowState::new(definitions);
        if let Some(previous) = persisted {
            state.completed_tasks = dedup_preserving_order(&previous.completed_tasks);
        }

        for task in state.tasks.tasks.iter_mut() {
            if let Some(previous) = persisted.and_then(|p| p.tasks.get(&task.id)) {
                task.adopt_progress(previous);
            }
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Pending;
            }
            if state.completed_tasks.iter().any(|done| done == &task.id) {
                task.status = TaskStatus::Completed;
            } else if has_review_doc(&task.id) {
                task.status = TaskStatus::Review;
            }
        }
        state
    }
}

fn dedup_preserving_order(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}
