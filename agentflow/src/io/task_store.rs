//! Task definition loading with schema validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::{debug, warn};

use super::agents::yaml_files;
use crate::core::task::TaskDefinition;
use crate::core::workflow::TaskMap;

/// JSON Schema every task definition must satisfy.
pub const TASK_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/task.schema.json"
));

/// Load every `tasks/*.yaml` definition in sorted filename order.
///
/// A later definition with an already-seen id replaces the earlier one.
pub fn load_tasks(tasks_dir: &Path, now: DateTime<Utc>) -> Result<TaskMap> {
    let mut tasks = TaskMap::new();
    if !tasks_dir.is_dir() {
        return Ok(tasks);
    }
    let schema: Value = serde_json::from_str(TASK_SCHEMA).context("parse task schema")?;
    let validator = validator_for(&schema).map_err(|err| anyhow!("invalid task schema: {}", err))?;

    for path in yaml_files(tasks_dir)? {
        let definition = load_definition(&validator, &path)?;
        let task = definition.into_task(now);
        debug!(task_id = %task.id, path = %path.display(), "loaded task definition");
        if let Some(previous) = tasks.insert(task) {
            warn!(task_id = %previous.id, path = %path.display(), "duplicate task id replaces earlier definition");
        }
    }
    Ok(tasks)
}

fn load_definition(validator: &jsonschema::Validator, path: &Path) -> Result<TaskDefinition> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value: Value = serde_yaml::from_str(&contents)
        .with_context(|| format!("parse task yaml {}", path.display()))?;
    if !validator.is_valid(&value) {
        let messages = validator
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "task schema validation failed for {}: {}",
            path.display(),
            messages.join("; ")
        ));
    }
    serde_json::from_value(value)
        .with_context(|| format!("deserialize task {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AgentType, TaskType};

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).expect("write task");
    }

    #[test]
    fn loads_sorted_and_applies_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path();
        write(dir, "02-impl.yaml", "id: impl\ntitle: Impl\nagent_type: developer\nprompt: build\ndepends_on: [contract]\n");
        write(dir, "01-contract.yaml", "id: contract\ntitle: Contract\nagent_type: contract\nprompt: define\n");
        write(dir, "notes.txt", "ignored");

        let tasks = load_tasks(dir, Utc::now()).expect("load");
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["contract", "impl"]);
        let contract = tasks.get("contract").expect("contract");
        assert_eq!(contract.task_type, TaskType::Contract);
        assert_eq!(contract.agent_type, AgentType::Contract);
        assert_eq!(tasks.get("impl").map(|t| t.depends_on.clone()), Some(vec!["contract".to_string()]));
    }

    #[test]
    fn duplicate_id_keeps_last_definition() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "a.yaml", "id: same\ntitle: First\nagent_type: developer\nprompt: p\n");
        write(temp.path(), "b.yaml", "id: same\ntitle: Second\nagent_type: developer\nprompt: p\n");
        let tasks = load_tasks(temp.path(), Utc::now()).expect("load");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks.get("same").map(|t| t.title.as_str()), Some("Second"));
    }

    #[test]
    fn schema_violations_name_the_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "broken.yaml", "id: x\ntitle: X\nagent_type: developer\n");
        let err = load_tasks(temp.path(), Utc::now()).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("broken.yaml"));
        assert!(msg.contains("prompt"));
    }

    #[test]
    fn loop_fields_are_type_checked() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(
            temp.path(),
            "t.yaml",
            "id: t\ntitle: T\nagent_type: developer\nprompt: p\nloop:\n  enabled: true\n  min_review_score: 2\n",
        );
        assert!(load_tasks(temp.path(), Utc::now()).is_err());
    }

    #[test]
    fn missing_directory_yields_no_tasks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tasks = load_tasks(&temp.path().join("absent"), Utc::now()).expect("load");
        assert!(tasks.is_empty());
    }
}
