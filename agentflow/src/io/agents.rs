//! Agent definitions loaded from `config/*.yaml`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::types::AgentType;

/// A configured generator persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub agent_type: AgentType,
    pub model: String,
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

/// Configured agents, at most one per agent type.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentType, AgentConfig>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, replacing any earlier agent of the same type.
    pub fn insert(&mut self, agent: AgentConfig) {
        self.agents.insert(agent.agent_type.clone(), agent);
    }

    pub fn get(&self, agent_type: &AgentType) -> Option<&AgentConfig> {
        self.agents.get(agent_type)
    }

    pub fn contains(&self, agent_type: &AgentType) -> bool {
        self.agents.contains_key(agent_type)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Agents sorted by type name.
    pub fn sorted(&self) -> Vec<&AgentConfig> {
        let mut agents: Vec<&AgentConfig> = self.agents.values().collect();
        agents.sort_by(|a, b| a.agent_type.as_str().cmp(b.agent_type.as_str()));
        agents
    }
}

impl FromIterator<AgentConfig> for AgentRegistry {
    fn from_iter<I: IntoIterator<Item = AgentConfig>>(iter: I) -> Self {
        let mut registry = AgentRegistry::new();
        for agent in iter {
            registry.insert(agent);
        }
        registry
    }
}

/// Load every `*.yaml` in `config_dir` that declares an `agent_type`.
///
/// Files whose name contains `template` are skipped, as are YAML documents
/// without an `agent_type` key. Files are read in sorted order so a later
/// file deterministically wins when two declare the same type.
pub fn load_agents(config_dir: &Path) -> Result<AgentRegistry> {
    let mut registry = AgentRegistry::new();
    if !config_dir.is_dir() {
        return Ok(registry);
    }
    for path in yaml_files(config_dir)? {
        let is_template = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains("template"));
        if is_template {
            debug!(path = %path.display(), "skipping agent template");
            continue;
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let value: serde_yaml::Value = serde_yaml::from_str(&contents)
            .with_context(|| format!("parse {}", path.display()))?;
        if value.get("agent_type").is_none() {
            continue;
        }
        let agent: AgentConfig = serde_yaml::from_value(value)
            .with_context(|| format!("parse agent definition {}", path.display()))?;
        info!(name = %agent.name, agent_type = %agent.agent_type, "loaded agent");
        registry.insert(agent);
    }
    Ok(registry)
}

/// Sorted `*.yaml` files directly inside `dir`.
pub(crate) fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("read dir entry in {}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "yaml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
