//! Persisted workflow state (`workflow_state.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::workflow::WorkflowState;

/// Load persisted state. Returns `None` if the file does not exist.
pub fn load_state(path: &Path) -> Result<Option<WorkflowState>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let state: WorkflowState = serde_json::from_str(&contents)
        .with_context(|| format!("parse workflow state {}", path.display()))?;
    Ok(Some(state))
}

/// Atomically rewrite the whole state file (temp file + rename).
pub fn write_state(path: &Path, state: &WorkflowState) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(state).context("serialize workflow state")?;
    buf.push('\n');
    super::write_atomic(path, &buf)?;
    debug!(
        path = %path.display(),
        tasks = state.tasks.len(),
        completed = state.completed_tasks.len(),
        "persisted workflow state"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{QaVerdict, TaskStatus};
    use crate::test_support::task;

    #[test]
    fn missing_state_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(load_state(&temp.path().join("workflow_state.json")).expect("load").is_none());
    }

    #[test]
    fn state_round_trips_through_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("workflow_state.json");

        let mut looped = task("looped");
        looped.status = TaskStatus::Review;
        looped.loop_config.enabled = true;
        looped.loop_state.record(Some(0.6), Some(QaVerdict::Fail), 0, Some("redo".into()));
        looped.input_contract = Some("input".to_string());
        let mut state = WorkflowState::new([task("first"), looped].into_iter().collect());
        state.completed_tasks.push("first".to_string());
        state.current_task = Some("looped".to_string());

        write_state(&path, &state).expect("write");
        let loaded = load_state(&path).expect("load").expect("present");
        assert_eq!(loaded, state);

        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.ends_with('\n'));
        assert!(raw.contains("\"completed_tasks\""));
        assert!(!temp.path().join("workflow_state.json.tmp").exists());
    }

    #[test]
    fn corrupt_state_reports_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("workflow_state.json");
        fs::write(&path, "{not json").expect("write");
        let err = load_state(&path).unwrap_err();
        assert!(format!("{err:#}").contains("workflow_state.json"));
    }
}
