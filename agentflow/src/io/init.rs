//! Workspace layout and scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{EngineConfig, write_config};

/// All canonical paths within a workspace root.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub config_dir: PathBuf,
    pub design_dir: PathBuf,
    pub contracts_dir: PathBuf,
    pub tasks_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub review_dir: PathBuf,
    pub redteam_dir: PathBuf,
    pub qa_dir: PathBuf,
    pub done_dir: PathBuf,
    pub exports_dir: PathBuf,
    pub state_path: PathBuf,
    pub engine_config_path: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let config_dir = root.join("config");
        Self {
            engine_config_path: config_dir.join("engine.toml"),
            config_dir,
            design_dir: root.join("design"),
            contracts_dir: root.join("contracts"),
            tasks_dir: root.join("tasks"),
            artifacts_dir: root.join("artifacts"),
            review_dir: root.join("review"),
            redteam_dir: root.join("redteam"),
            qa_dir: root.join("qa"),
            done_dir: root.join("done"),
            exports_dir: root.join("exports"),
            state_path: root.join("workflow_state.json"),
            root,
        }
    }

    pub fn directories(&self) -> [&Path; 10] {
        [
            &self.config_dir,
            &self.design_dir,
            &self.contracts_dir,
            &self.tasks_dir,
            &self.artifacts_dir,
            &self.review_dir,
            &self.redteam_dir,
            &self.qa_dir,
            &self.done_dir,
            &self.exports_dir,
        ]
    }

    /// Create any missing workspace directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in self.directories() {
            create_dir(dir)?;
        }
        Ok(())
    }

    /// `artifacts/{id}.md`, or `artifacts/{id}-iter{N}.md` for a loop iteration.
    pub fn artifact(&self, task_id: &str, iteration: Option<u32>) -> PathBuf {
        match iteration {
            Some(n) => self.artifacts_dir.join(format!("{task_id}-iter{n}.md")),
            None => self.artifacts_dir.join(format!("{task_id}.md")),
        }
    }

    pub fn review_doc(&self, task_id: &str) -> PathBuf {
        self.review_dir.join(format!("{task_id}.md"))
    }

    pub fn done_doc(&self, task_id: &str) -> PathBuf {
        self.done_dir.join(format!("{task_id}.md"))
    }

    pub fn contract_doc(&self, task_id: &str) -> PathBuf {
        self.contracts_dir.join(format!("{task_id}.md"))
    }

    pub fn redteam_report(&self, task_id: &str) -> PathBuf {
        self.redteam_dir.join(format!("{task_id}-redteam.md"))
    }

    pub fn qa_report(&self, task_id: &str) -> PathBuf {
        self.qa_dir.join(format!("{task_id}-qa.md"))
    }
}

/// Options for `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing `config/engine.toml`.
    pub force: bool,
}

/// Create the workspace directories and a default `config/engine.toml`.
///
/// Fails if `engine.toml` already exists unless `options.force` is set.
/// Existing tasks, documents and artifacts are never touched.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<WorkspacePaths> {
    let paths = WorkspacePaths::new(root);
    if paths.engine_config_path.exists() && !options.force {
        return Err(anyhow!(
            "init: {} already exists (use --force to overwrite)",
            paths.engine_config_path.display()
        ));
    }
    if paths.root.exists() && !paths.root.is_dir() {
        return Err(anyhow!(
            "init: {} exists but is not a directory",
            paths.root.display()
        ));
    }

    paths.ensure_dirs()?;
    write_config(&paths.engine_config_path, &EngineConfig::default())?;
    write_file(&paths.config_dir.join("agent.template.yaml"), AGENT_TEMPLATE)?;
    write_file(&paths.tasks_dir.join("example.yaml.template"), TASK_TEMPLATE)?;
    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const AGENT_TEMPLATE: &str = "\
# Copy to <name>.yaml and edit. Files with \"template\" in the name are ignored.
name: Developer
agent_type: developer
model: claude-sonnet-4-5
temperature: 0.7
max_tokens: 4096
system_prompt: |
  You are a careful software engineer. Follow the contracts exactly.
";

const TASK_TEMPLATE: &str = "\
# Rename to <id>.yaml to activate.
id: example-task
title: Example task
agent_type: developer
prompt: |
  Describe the work to be done.
depends_on: []
acceptance_criteria:
  - Describe how a reviewer can tell the work is done
loop:
  enabled: false
  max_iterations: 3
";
