//! Test-only helpers: task and agent builders, a scripted generator, and
//! throwaway workspaces.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use chrono::Utc;
use tempfile::TempDir;

use crate::core::task::{LoopConfig, LoopState, Task};
use crate::core::types::{AgentType, TaskStatus, TaskType};
use crate::engine::Engine;
use crate::io::agents::AgentConfig;
use crate::io::generator::{GenerateRequest, Generator};

/// Create a deterministic pending implementation task for the developer.
pub fn task(id: &str) -> Task {
    let now = Utc::now();
    Task {
        id: id.to_string(),
        title: format!("{id} title"),
        description: String::new(),
        agent_type: AgentType::Developer,
        prompt: format!("Work on {id}"),
        task_type: TaskType::Implementation,
        depends_on: Vec::new(),
        status: TaskStatus::Pending,
        requires_review: true,
        requires_human_approval: true,
        requires_redteam: false,
        requires_qa: false,
        input_contract: None,
        output_contract: None,
        acceptance_criteria: Vec::new(),
        contract_task: None,
        created_at: now,
        updated_at: now,
        artifact_path: None,
        review_feedback: None,
        redteam_report: None,
        qa_report: None,
        loop_config: LoopConfig::default(),
        loop_state: LoopState::default(),
    }
}

/// Agent of `agent_type` named after its type.
pub fn agent(agent_type: AgentType) -> AgentConfig {
    AgentConfig {
        name: format!("{agent_type}-agent"),
        system_prompt: format!("You are the {agent_type}."),
        agent_type,
        model: "test-model".to_string(),
        temperature: 0.7,
        max_tokens: 4096,
    }
}

/// Generator that replays queued responses per agent type and records
/// every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: RefCell<HashMap<AgentType, VecDeque<Result<String, String>>>>,
    requests: RefCell<Vec<GenerateRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next call by `agent_type`.
    pub fn push(&self, agent_type: AgentType, response: &str) {
        self.queue(agent_type, Ok(response.to_string()));
    }

    /// Queue a transport failure for the next call by `agent_type`.
    pub fn push_failure(&self, agent_type: AgentType, message: &str) {
        self.queue(agent_type, Err(message.to_string()));
    }

    fn queue(&self, agent_type: AgentType, entry: Result<String, String>) {
        self.responses
            .borrow_mut()
            .entry(agent_type)
            .or_default()
            .push_back(entry);
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.borrow().clone()
    }

    pub fn requests_for(&self, agent_type: &AgentType) -> Vec<GenerateRequest> {
        self.requests
            .borrow()
            .iter()
            .filter(|request| &request.agent_type == agent_type)
            .cloned()
            .collect()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        let next = self
            .responses
            .borrow_mut()
            .get_mut(&request.agent_type)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted response for {}", request.agent_type)),
        }
    }
}

/// A workspace in a temporary directory, built up fluently.
pub struct TestWorkspace {
    dir: TempDir,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `tasks/{file}`.
    pub fn task(self, file: &str, yaml: &str) -> Self {
        self.file(&format!("tasks/{file}"), yaml)
    }

    /// Write `config/{type}.yaml` for an agent of `agent_type`.
    pub fn agent(self, agent_type: AgentType) -> Self {
        let config = agent(agent_type.clone());
        let yaml = serde_yaml::to_string(&config).expect("serialize agent");
        self.file(&format!("config/{agent_type}.yaml"), &yaml)
    }

    /// Write a file relative to the workspace root, creating parents.
    pub fn file(self, rel: &str, contents: &str) -> Self {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, contents).expect("write file");
        self
    }

    /// Record `id` as completed in `workflow_state.json`.
    pub fn completed(self, id: &str) -> Self {
        let path = self.dir.path().join("workflow_state.json");
        let mut state: serde_json::Value = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).expect("parse state"),
            Err(_) => serde_json::json!({ "completed_tasks": [] }),
        };
        state["completed_tasks"]
            .as_array_mut()
            .expect("completed_tasks array")
            .push(serde_json::Value::String(id.to_string()));
        let raw = serde_json::to_string_pretty(&state).expect("serialize state");
        fs::write(&path, raw).expect("write state");
        self
    }

    pub fn engine(&self) -> Engine<ScriptedGenerator> {
        Engine::load(self.dir.path(), ScriptedGenerator::new()).expect("engine")
    }
}
