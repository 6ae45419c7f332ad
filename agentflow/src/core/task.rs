//! Task model: definition-time policy plus runtime progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{AgentType, QaVerdict, TaskStatus, TaskType};

/// Feedback-loop policy. Set once when the task is defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub enabled: bool,
    pub max_iterations: u32,
    pub require_reviewer: bool,
    pub require_redteam: bool,
    pub require_qa: bool,
    pub min_review_score: f64,
    pub qa_must_pass: bool,
    pub redteam_max_critical: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_iterations: 3,
            require_reviewer: true,
            require_redteam: false,
            require_qa: true,
            min_review_score: 0.7,
            qa_must_pass: true,
            redteam_max_critical: 0,
        }
    }
}

impl LoopConfig {
    /// Iteration cap actually used by the controller. A configured `0` still
    /// runs one round.
    pub fn effective_max_iterations(&self) -> u32 {
        self.max_iterations.max(1)
    }
}

/// Per-iteration history, mutated only by the feedback loop.
///
/// `redteam_critical_counts` gets one entry per iteration (0 when red team did
/// not run). `review_scores` and `qa_results` only receive an entry for
/// iterations where the matching check ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopState {
    pub iteration: u32,
    pub review_scores: Vec<f64>,
    pub qa_results: Vec<QaVerdict>,
    pub redteam_critical_counts: Vec<u32>,
    pub feedback_history: Vec<String>,
}

impl LoopState {
    /// Append one round of check results and advance the counter.
    pub fn record(
        &mut self,
        review_score: Option<f64>,
        qa: Option<QaVerdict>,
        redteam_critical: u32,
        feedback: Option<String>,
    ) {
        self.iteration += 1;
        if let Some(score) = review_score {
            self.review_scores.push(score);
        }
        if let Some(qa) = qa {
            self.qa_results.push(qa);
        }
        self.redteam_critical_counts.push(redteam_critical);
        if let Some(feedback) = feedback {
            self.feedback_history.push(feedback);
        }
    }

    pub fn last_feedback(&self) -> Option<&str> {
        self.feedback_history.last().map(String::as_str)
    }
}

/// A unit of work tracked by the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub agent_type: AgentType,
    pub prompt: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub status: TaskStatus,
    pub requires_review: bool,
    pub requires_human_approval: bool,
    #[serde(default)]
    pub requires_redteam: bool,
    #[serde(default)]
    pub requires_qa: bool,
    #[serde(default)]
    pub input_contract: Option<String>,
    #[serde(default)]
    pub output_contract: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub contract_task: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub artifact_path: Option<String>,
    #[serde(default)]
    pub review_feedback: Option<String>,
    #[serde(default)]
    pub redteam_report: Option<String>,
    #[serde(default)]
    pub qa_report: Option<String>,
    #[serde(rename = "loop", default)]
    pub loop_config: LoopConfig,
    #[serde(default)]
    pub loop_state: LoopState,
}

impl Task {
    /// True if the task carries any contract signal of its own (inline
    /// contract text or a contract task reference).
    pub fn has_own_contract(&self) -> bool {
        self.input_contract.is_some() || self.output_contract.is_some() || self.contract_task.is_some()
    }

    /// Overlay runtime progress from a previously persisted copy of the same
    /// task. Definition fields (prompt, policy, dependencies) keep their
    /// freshly loaded values.
    pub fn adopt_progress(&mut self, persisted: &Task) {
        self.status = persisted.status;
        self.created_at = persisted.created_at;
        self.updated_at = persisted.updated_at;
        self.artifact_path = persisted.artifact_path.clone();
        self.review_feedback = persisted.review_feedback.clone();
        self.redteam_report = persisted.redteam_report.clone();
        self.qa_report = persisted.qa_report.clone();
        self.loop_state = persisted.loop_state.clone();
    }
}

/// External task definition as written by humans in `tasks/*.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub agent_type: AgentType,
    pub prompt: String,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default = "default_true")]
    pub requires_review: bool,
    #[serde(default = "default_true")]
    pub requires_human_approval: bool,
    #[serde(default)]
    pub requires_redteam: bool,
    #[serde(default)]
    pub requires_qa: bool,
    #[serde(default)]
    pub input_contract: Option<String>,
    #[serde(default)]
    pub output_contract: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub contract_task: Option<String>,
    #[serde(rename = "loop", default)]
    pub loop_config: Option<LoopConfig>,
}

fn default_true() -> bool {
    true
}

impl TaskDefinition {
    pub fn into_task(self, now: DateTime<Utc>) -> Task {
        let task_type = self
            .task_type
            .unwrap_or_else(|| TaskType::default_for_agent(&self.agent_type));
        Task {
            id: self.id,
            title: self.title,
            description: self.description,
            agent_type: self.agent_type,
            prompt: self.prompt,
            task_type,
            depends_on: self.depends_on,
            status: self.status.unwrap_or(TaskStatus::Pending),
            requires_review: self.requires_review,
            requires_human_approval: self.requires_human_approval,
            requires_redteam: self.requires_redteam,
            requires_qa: self.requires_qa,
            input_contract: self.input_contract,
            output_contract: self.output_contract,
            acceptance_criteria: self.acceptance_criteria,
            contract_task: self.contract_task,
            created_at: now,
            updated_at: now,
            artifact_path: None,
            review_feedback: None,
            redteam_report: None,
            qa_report: None,
            loop_config: self.loop_config.unwrap_or_default(),
            loop_state: LoopState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_definition() -> TaskDefinition {
        serde_yaml::from_str(
            "id: api-impl\ntitle: API\nagent_type: developer\nprompt: Build the API\n",
        )
        .expect("parse definition")
    }

    #[test]
    fn definition_defaults_match_documented_policy() {
        let task = minimal_definition().into_task(Utc::now());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.task_type, TaskType::Implementation);
        assert!(task.requires_review);
        assert!(task.requires_human_approval);
        assert!(!task.requires_redteam);
        assert!(!task.requires_qa);
        assert_eq!(task.loop_config, LoopConfig::default());
        assert!(!task.loop_config.enabled);
        assert_eq!(task.loop_config.max_iterations, 3);
    }

    #[test]
    fn partial_loop_block_keeps_remaining_defaults() {
        let def: TaskDefinition = serde_yaml::from_str(
            "id: t\ntitle: T\nagent_type: developer\nprompt: p\nloop:\n  enabled: true\n  max_iterations: 5\n",
        )
        .expect("parse definition");
        let task = def.into_task(Utc::now());
        assert!(task.loop_config.enabled);
        assert_eq!(task.loop_config.max_iterations, 5);
        assert!(task.loop_config.require_qa);
        assert_eq!(task.loop_config.min_review_score, 0.7);
    }

    #[test]
    fn record_only_tracks_checks_that_ran() {
        let mut state = LoopState::default();
        state.record(Some(0.4), None, 0, Some("fix it".to_string()));
        state.record(Some(0.9), Some(QaVerdict::Pass), 0, None);
        assert_eq!(state.iteration, 2);
        assert_eq!(state.review_scores, vec![0.4, 0.9]);
        assert_eq!(state.qa_results, vec![QaVerdict::Pass]);
        assert_eq!(state.redteam_critical_counts, vec![0, 0]);
        assert_eq!(state.feedback_history, vec!["fix it".to_string()]);
        assert_eq!(state.last_feedback(), Some("fix it"));
    }

    #[test]
    fn task_state_survives_json_round_trip() {
        let mut task = minimal_definition().into_task(Utc::now());
        task.status = TaskStatus::Review;
        task.output_contract = Some("returns JSON".to_string());
        task.loop_config.enabled = true;
        task.loop_state.record(Some(0.5), Some(QaVerdict::Fail), 2, Some("x".into()));

        let encoded = serde_json::to_string(&task).expect("encode");
        assert!(encoded.contains("\"loop\""));
        let decoded: Task = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded.status, task.status);
        assert_eq!(decoded.loop_state, task.loop_state);
        assert_eq!(decoded.output_contract, task.output_contract);
        assert_eq!(decoded, task);
    }

    #[test]
    fn adopt_progress_keeps_definition_fields() {
        let mut fresh = minimal_definition().into_task(Utc::now());
        let mut persisted = fresh.clone();
        persisted.prompt = "stale prompt".to_string();
        persisted.status = TaskStatus::Failed;
        persisted.loop_state.iteration = 2;

        fresh.adopt_progress(&persisted);
        assert_eq!(fresh.status, TaskStatus::Failed);
        assert_eq!(fresh.loop_state.iteration, 2);
        assert_eq!(fresh.prompt, "Build the API");
    }
}
