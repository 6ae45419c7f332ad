//! Shared deterministic types for the engine core.
//!
//! These types define stable contracts between core components and the
//! persisted workflow state. They do not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
///
/// `Rework` behaves like `Pending` for readiness but marks a task that is
/// being re-offered after a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Review,
    Completed,
    Failed,
    Rejected,
    Rework,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Review => "review",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Rejected => "rejected",
            TaskStatus::Rework => "rework",
        }
    }

    /// True for statuses that may be offered for execution.
    pub fn is_runnable(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Rework)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a task produces. Drives ordering policy and where approved
/// artifacts land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Contract,
    Implementation,
    Test,
    Documentation,
    Planning,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Contract => "contract",
            TaskType::Implementation => "implementation",
            TaskType::Test => "test",
            TaskType::Documentation => "documentation",
            TaskType::Planning => "planning",
        }
    }

    /// Task type implied by the agent that handles a task when the definition
    /// does not name one.
    pub fn default_for_agent(agent: &AgentType) -> Self {
        match agent {
            AgentType::Contract => TaskType::Contract,
            AgentType::Tester | AgentType::Qa => TaskType::Test,
            AgentType::Planner => TaskType::Planning,
            _ => TaskType::Implementation,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generator persona that handles a task.
///
/// Well-known personas have their own variants; anything else is carried as
/// `Custom` and must match a configured agent to be runnable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentType {
    Developer,
    Reviewer,
    Planner,
    Contract,
    Redteam,
    Qa,
    Tester,
    Custom(String),
}

impl AgentType {
    pub fn as_str(&self) -> &str {
        match self {
            AgentType::Developer => "developer",
            AgentType::Reviewer => "reviewer",
            AgentType::Planner => "planner",
            AgentType::Contract => "contract",
            AgentType::Redteam => "redteam",
            AgentType::Qa => "qa",
            AgentType::Tester => "tester",
            AgentType::Custom(name) => name,
        }
    }
}

impl From<&str> for AgentType {
    fn from(value: &str) -> Self {
        match value {
            "developer" => AgentType::Developer,
            "reviewer" => AgentType::Reviewer,
            "planner" => AgentType::Planner,
            "contract" => AgentType::Contract,
            "redteam" => AgentType::Redteam,
            "qa" => AgentType::Qa,
            "tester" => AgentType::Tester,
            other => AgentType::Custom(other.to_string()),
        }
    }
}

impl From<String> for AgentType {
    fn from(value: String) -> Self {
        AgentType::from(value.as_str())
    }
}

impl From<AgentType> for String {
    fn from(value: AgentType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a QA report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QaVerdict {
    Pass,
    Fail,
    NeedsWork,
}

impl QaVerdict {
    /// `Pass` if the report mentions PASS and never FAIL, `Fail` if it
    /// mentions FAIL, otherwise `NeedsWork`. Matching is case-insensitive.
    pub fn classify(report: &str) -> Self {
        let upper = report.to_uppercase();
        let fail = upper.contains("FAIL");
        if upper.contains("PASS") && !fail {
            QaVerdict::Pass
        } else if fail {
            QaVerdict::Fail
        } else {
            QaVerdict::NeedsWork
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QaVerdict::Pass => "PASS",
            QaVerdict::Fail => "FAIL",
            QaVerdict::NeedsWork => "NEEDS_WORK",
        }
    }
}

impl fmt::Display for QaVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured verdict returned by a reviewer agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    #[serde(default)]
    pub passed: bool,
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_type_keeps_unknown_names_as_custom() {
        let agent: AgentType = serde_json::from_str("\"data-engineer\"").expect("parse");
        assert_eq!(agent, AgentType::Custom("data-engineer".to_string()));
        let encoded = serde_json::to_string(&agent).expect("encode");
        assert_eq!(encoded, "\"data-engineer\"");
    }

    #[test]
    fn agent_type_parses_well_known_names() {
        assert_eq!(AgentType::from("redteam"), AgentType::Redteam);
        assert_eq!(AgentType::from("qa"), AgentType::Qa);
        assert_eq!(AgentType::Developer.to_string(), "developer");
    }

    #[test]
    fn task_type_defaults_follow_agent() {
        assert_eq!(
            TaskType::default_for_agent(&AgentType::Contract),
            TaskType::Contract
        );
        assert_eq!(TaskType::default_for_agent(&AgentType::Tester), TaskType::Test);
        assert_eq!(TaskType::default_for_agent(&AgentType::Qa), TaskType::Test);
        assert_eq!(
            TaskType::default_for_agent(&AgentType::Planner),
            TaskType::Planning
        );
        assert_eq!(
            TaskType::default_for_agent(&AgentType::Custom("writer".to_string())),
            TaskType::Implementation
        );
    }

    #[test]
    fn qa_verdict_prefers_fail_over_pass() {
        assert_eq!(QaVerdict::classify("All checks pass."), QaVerdict::Pass);
        assert_eq!(
            QaVerdict::classify("3 PASS, 1 fail"),
            QaVerdict::Fail
        );
        assert_eq!(QaVerdict::classify("Failure in edge case"), QaVerdict::Fail);
        assert_eq!(
            QaVerdict::classify("Some criteria unclear"),
            QaVerdict::NeedsWork
        );
    }

    #[test]
    fn statuses_serialize_lowercase() {
        let encoded = serde_json::to_string(&TaskStatus::Review).expect("encode");
        assert_eq!(encoded, "\"review\"");
        assert!(TaskStatus::Rework.is_runnable());
        assert!(!TaskStatus::Rejected.is_runnable());
    }
}
