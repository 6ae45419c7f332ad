//! Workflow engine: loading, persistence, and running a single task.
//!
//! Every mutating operation rewrites `workflow_state.json` before it
//! returns, so a crash never loses more than the in-flight generator call.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::checks::CheckRound;
use crate::core::retrieval::{ContextRetriever, DesignContext};
use crate::core::task::Task;
use crate::core::types::{AgentType, ReviewResult, TaskStatus, TaskType};
use crate::core::workflow::WorkflowState;
use crate::io::agents::{AgentConfig, AgentRegistry, load_agents};
use crate::io::artifacts::{
    ArtifactHeader, copy_file, read_first_existing, write_artifact, write_report,
};
use crate::io::config::{EngineConfig, load_config};
use crate::io::documents::load_documents;
use crate::io::generator::{GenerateRequest, Generator};
use crate::io::init::WorkspacePaths;
use crate::io::prompt::PromptEngine;
use crate::io::state_store::{load_state, write_state};
use crate::io::task_store::load_tasks;

/// Why an operation was not applied. The workflow state is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    UnknownTask { task: String },
    AlreadyCompleted { task: String },
    DependenciesUnmet { task: String, missing: Vec<String> },
    NoAgent { task: String, agent_type: AgentType },
    NotInReview { task: String, status: TaskStatus },
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::UnknownTask { task } => write!(f, "task not found: {task}"),
            Refusal::AlreadyCompleted { task } => write!(f, "task {task} is already completed"),
            Refusal::DependenciesUnmet { task, missing } => {
                write!(f, "task {task} has unmet dependencies: {}", missing.join(", "))
            }
            Refusal::NoAgent { task, agent_type } => {
                write!(f, "task {task}: no agent configured for type '{agent_type}'")
            }
            Refusal::NotInReview { task, status } => {
                write!(f, "task {task} is not in review (status: {status})")
            }
        }
    }
}

/// Result of [`Engine::run_task`].
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Artifact produced and queued for human review.
    Queued,
    /// Artifact produced and completed without human approval.
    Completed,
    /// A generator call failed; the task is now `failed`.
    Failed { error: String },
    Refused(Refusal),
}

/// A generator call that failed in transport.
#[derive(Debug)]
pub struct GeneratorFailure {
    pub agent: String,
    pub source: anyhow::Error,
}

impl fmt::Display for GeneratorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generation by {} failed: {:#}", self.agent, self.source)
    }
}

impl std::error::Error for GeneratorFailure {}

/// Options for [`Engine::run_task`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Do not warn about implementation tasks without contracts.
    pub skip_contract_warning: bool,
}

/// Which automated checks a round should attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CheckPlan {
    pub review: bool,
    pub redteam: bool,
    pub qa: bool,
}

fn unconfigured_tasks<'a>(state: &'a WorkflowState, agents: &AgentRegistry) -> Vec<&'a Task> {
    state
        .tasks
        .iter()
        .filter(|task| !agents.contains(&task.agent_type))
        .collect()
}

/// The workflow engine over one workspace.
pub struct Engine<G: Generator> {
    pub(crate) paths: WorkspacePaths,
    pub(crate) config: EngineConfig,
    pub(crate) agents: AgentRegistry,
    pub(crate) state: WorkflowState,
    pub(crate) context: DesignContext,
    pub(crate) prompts: PromptEngine,
    pub(crate) generator: G,
}

impl<G: Generator> Engine<G> {
    /// Load a workspace: configuration, agents, reference documents, task
    /// definitions, and the persisted state overlaid on those definitions.
    pub fn load(root: impl Into<PathBuf>, generator: G) -> Result<Self> {
        let paths = WorkspacePaths::new(root);
        paths.ensure_dirs()?;
        let config = load_config(&paths.engine_config_path)?;
        let agents = load_agents(&paths.config_dir)?;
        let documents = load_documents(&paths.design_dir, &paths.contracts_dir)?;
        let retriever = ContextRetriever::new(&documents);
        let context = DesignContext::new(
            retriever,
            config.full_context_threshold_chars,
            config.retrieval_limits(),
        );
        debug!(
            documents = documents.len(),
            chunks = context.retriever().chunks().len(),
            retrieval = context.mode().is_retrieval(),
            "loaded reference documents"
        );

        let definitions = load_tasks(&paths.tasks_dir, Utc::now())
            .with_context(|| format!("load tasks from {}", paths.tasks_dir.display()))?;
        let persisted = load_state(&paths.state_path)?;
        if let Some(current) = persisted.as_ref().and_then(|p| p.current_task.as_deref()) {
            warn!(task_id = %current, "previous run was interrupted");
        }
        let review_dir = paths.review_dir.clone();
        let state = WorkflowState::restore(definitions, persisted.as_ref(), |id| {
            review_dir.join(format!("{id}.md")).is_file()
        });
        info!(
            tasks = state.tasks.len(),
            completed = state.completed_tasks.len(),
            agents = agents.len(),
            "workflow loaded"
        );
        for task in unconfigured_tasks(&state, &agents) {
            warn!(
                task_id = %task.id,
                agent_type = %task.agent_type,
                "no agent configured for task's agent type"
            );
        }

        Ok(Self {
            paths,
            config,
            agents,
            state,
            context,
            prompts: PromptEngine::new()?,
            generator,
        })
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn design_context(&self) -> &DesignContext {
        &self.context
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Tasks whose agent type has no configured agent, in definition order.
    pub fn unconfigured_tasks(&self) -> Vec<&Task> {
        unconfigured_tasks(&self.state, &self.agents)
    }

    pub(crate) fn persist(&self) -> Result<()> {
        write_state(&self.paths.state_path, &self.state)
    }

    /// Replace the stored copy of `task` and persist.
    pub(crate) fn commit(&mut self, task: Task) -> Result<()> {
        self.state.tasks.insert(task);
        self.persist()
    }

    /// Run one task to a reviewable artifact.
    ///
    /// Refusals leave the state untouched. A generator failure marks the task
    /// `failed` and is reported as [`RunOutcome::Failed`]; any other error
    /// also marks it `failed` and is returned.
    pub fn run_task(&mut self, task_id: &str, options: RunOptions) -> Result<RunOutcome> {
        let (mut task, agent) = match self.check_runnable(task_id) {
            Ok(found) => found,
            Err(refusal) => {
                info!(task_id, %refusal, "run refused");
                return Ok(RunOutcome::Refused(refusal));
            }
        };

        if task.task_type == TaskType::Implementation
            && !task.has_own_contract()
            && !options.skip_contract_warning
        {
            warn!(task_id, "implementation task has no contracts; continuing");
        }

        info!(
            task_id,
            agent = %agent.name,
            task_type = %task.task_type,
            looped = task.loop_config.enabled,
            "running task"
        );
        task.status = TaskStatus::Running;
        task.updated_at = Utc::now();
        self.state.current_task = Some(task.id.clone());
        self.commit(task.clone())?;

        let result = if task.loop_config.enabled {
            self.run_loop(task, &agent)
        } else {
            self.run_single(task, &agent)
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.fail_task(task_id)?;
                if err.downcast_ref::<GeneratorFailure>().is_some() {
                    let error = format!("{err:#}");
                    warn!(task_id, error = %error, "task failed");
                    Ok(RunOutcome::Failed { error })
                } else {
                    Err(err)
                }
            }
        }
    }

    fn check_runnable(&self, task_id: &str) -> std::result::Result<(Task, AgentConfig), Refusal> {
        let task = self.state.task(task_id).ok_or_else(|| Refusal::UnknownTask {
            task: task_id.to_string(),
        })?;
        if task.status == TaskStatus::Completed {
            return Err(Refusal::AlreadyCompleted {
                task: task_id.to_string(),
            });
        }
        let missing = self.state.unmet_dependencies(task);
        if !missing.is_empty() {
            return Err(Refusal::DependenciesUnmet {
                task: task_id.to_string(),
                missing: missing.into_iter().map(str::to_string).collect(),
            });
        }
        let agent = self
            .agents
            .get(&task.agent_type)
            .ok_or_else(|| Refusal::NoAgent {
                task: task_id.to_string(),
                agent_type: task.agent_type.clone(),
            })?;
        Ok((task.clone(), agent.clone()))
    }

    fn fail_task(&mut self, task_id: &str) -> Result<()> {
        if let Some(task) = self.state.task_mut(task_id) {
            task.status = TaskStatus::Failed;
            task.updated_at = Utc::now();
        }
        self.state.current_task = None;
        self.persist()
    }

    fn run_single(&mut self, mut task: Task, agent: &AgentConfig) -> Result<RunOutcome> {
        let context = self.build_context(&task)?;
        let artifact = self.generate(agent, task.prompt.clone(), context)?;
        self.save_artifact(&mut task, agent, &artifact, None)?;

        let plan = CheckPlan {
            review: task.requires_review,
            redteam: task.requires_redteam,
            qa: task.requires_qa,
        };
        let round = self.run_checks(&task, &artifact, plan)?;
        if let Some(review) = &round.review {
            info!(task_id = %task.id, score = review.score, "automated review");
        }
        if round.redteam_report.is_some() {
            task.redteam_report = round.redteam_report;
        }
        if round.qa_report.is_some() {
            task.qa_report = round.qa_report;
        }
        self.save_reports(&task)?;
        self.finish(task, &artifact, false)
    }

    /// Hand a finished task to the review gate or complete it directly.
    pub(crate) fn finish(&mut self, mut task: Task, artifact: &str, looped: bool) -> Result<RunOutcome> {
        self.state.current_task = None;
        if task.requires_human_approval {
            self.queue_for_review(&mut task, artifact, looped)?;
            self.commit(task)?;
            return Ok(RunOutcome::Queued);
        }

        let source = self.paths.artifact(&task.id, None);
        copy_file(&source, &self.finalized_path(&task))?;
        let id = task.id.clone();
        self.state.tasks.insert(task);
        self.state.mark_completed(&id, Utc::now());
        self.persist()?;
        info!(task_id = %id, "task completed without human review");
        Ok(RunOutcome::Completed)
    }

    /// Where an approved artifact lives: `contracts/` for contract tasks,
    /// `done/` otherwise.
    pub(crate) fn finalized_path(&self, task: &Task) -> PathBuf {
        if task.task_type == TaskType::Contract {
            self.paths.contract_doc(&task.id)
        } else {
            self.paths.done_doc(&task.id)
        }
    }

    /// Call the generator as `agent`, tagging transport errors.
    pub(crate) fn generate(
        &self,
        agent: &AgentConfig,
        user_prompt: String,
        context: Option<String>,
    ) -> Result<String> {
        let request = GenerateRequest::for_agent(agent, user_prompt, context);
        self.generator
            .generate(&request)
            .map_err(|source| self.generator_failure(agent, source))
    }

    fn generator_failure(&self, agent: &AgentConfig, source: anyhow::Error) -> anyhow::Error {
        anyhow::Error::new(GeneratorFailure {
            agent: agent.name.clone(),
            source,
        })
    }

    /// Run the planned checks in order reviewer, red team, QA. A check whose
    /// agent is not configured is skipped.
    pub(crate) fn run_checks(&self, task: &Task, artifact: &str, plan: CheckPlan) -> Result<CheckRound> {
        let mut round = CheckRound::default();

        if let Some(reviewer) = self.check_agent(plan.review, AgentType::Reviewer) {
            round.review = Some(self.review_artifact(reviewer, task, artifact)?);
        }
        if let Some(redteam) = self.check_agent(plan.redteam, AgentType::Redteam) {
            let prompt = self.prompts.task_redteam(&task.prompt, artifact)?;
            round.redteam_report = Some(self.generate(redteam, prompt, None)?);
        }
        if let Some(qa) = self.check_agent(plan.qa, AgentType::Qa) {
            let prompt = self.prompts.task_qa(
                &task.prompt,
                task.output_contract.as_deref(),
                &task.acceptance_criteria,
                artifact,
            )?;
            round.qa_report = Some(self.generate(qa, prompt, None)?);
        }
        Ok(round)
    }

    fn check_agent(&self, required: bool, agent_type: AgentType) -> Option<&AgentConfig> {
        if required {
            self.agents.get(&agent_type)
        } else {
            None
        }
    }

    fn review_artifact(&self, reviewer: &AgentConfig, task: &Task, artifact: &str) -> Result<ReviewResult> {
        let task_context = self.prompts.review_context(
            &task.prompt,
            task.output_contract.as_deref(),
            &task.acceptance_criteria,
        )?;
        let prompt = self.prompts.review_request(&task_context, artifact)?;
        let request = GenerateRequest::for_agent(reviewer, prompt, None);
        self.generator
            .review(&request)
            .map_err(|source| self.generator_failure(reviewer, source))
    }

    /// Write an artifact document and remember its path on the task.
    pub(crate) fn save_artifact(
        &self,
        task: &mut Task,
        agent: &AgentConfig,
        body: &str,
        iteration: Option<u32>,
    ) -> Result<()> {
        let path = self.paths.artifact(&task.id, iteration);
        let header = ArtifactHeader {
            title: &task.title,
            task_type: task.task_type,
            agent_name: &agent.name,
            iteration,
            generated_at: Utc::now(),
        };
        write_artifact(&path, &header, body)?;
        debug!(task_id = %task.id, path = %path.display(), "saved artifact");
        task.artifact_path = Some(path.display().to_string());
        Ok(())
    }

    /// Write the task's stored red-team and QA reports, if any.
    pub(crate) fn save_reports(&self, task: &Task) -> Result<()> {
        let now = Utc::now();
        if let Some(report) = &task.redteam_report {
            let heading = format!("Red Team Report: {}", task.title);
            write_report(&self.paths.redteam_report(&task.id), &heading, report, now)?;
        }
        if let Some(report) = &task.qa_report {
            let heading = format!("QA Report: {}", task.title);
            write_report(&self.paths.qa_report(&task.id), &heading, report, now)?;
        }
        Ok(())
    }

    /// Everything a generator sees besides the prompt: design material,
    /// completed dependency artifacts, the referenced contract, inline
    /// contracts, and acceptance criteria.
    pub(crate) fn build_context(&self, task: &Task) -> Result<Option<String>> {
        let mut parts: Vec<String> = Vec::new();

        if let Some(design) = self.context.for_task(task) {
            parts.push(design);
        }

        let mut dependencies = Vec::new();
        for dep in &task.depends_on {
            let candidates = [self.paths.done_doc(dep), self.paths.artifact(dep, None)];
            if let Some((_, contents)) = read_first_existing(&candidates)? {
                dependencies.push(format!("## {dep}\n\n{contents}"));
            }
        }
        if !dependencies.is_empty() {
            parts.push(format!(
                "# COMPLETED DEPENDENCIES\n\n{}",
                dependencies.join("\n\n---\n\n")
            ));
        }

        if let Some(contract_task) = &task.contract_task {
            let candidates = [
                self.paths.done_doc(contract_task),
                self.paths.artifact(contract_task, None),
                self.paths.contract_doc(contract_task),
            ];
            match read_first_existing(&candidates)? {
                Some((_, contents)) => {
                    parts.push(format!("# CONTRACT (from {contract_task})\n\n{contents}"))
                }
                None => warn!(task_id = %task.id, contract_task = %contract_task, "contract artifact not found"),
            }
        }

        if let Some(contract) = &task.input_contract {
            parts.push(format!("# INPUT CONTRACT\n\n{contract}"));
        }
        if let Some(contract) = &task.output_contract {
            parts.push(format!("# OUTPUT CONTRACT\n\n{contract}"));
        }
        if !task.acceptance_criteria.is_empty() {
            let criteria = task
                .acceptance_criteria
                .iter()
                .map(|c| format!("- {c}"))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("# ACCEPTANCE CRITERIA\n\n{criteria}"));
        }

        Ok((!parts.is_empty()).then(|| parts.join("\n\n")))
    }
}
