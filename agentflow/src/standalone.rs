//! Contract, plan, red-team, and QA operations that run outside the task
//! graph. None of them touch the workflow state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::info;

use crate::core::checks::truncate_chars;
use crate::core::types::AgentType;
use crate::engine::Engine;
use crate::io::agents::AgentConfig;
use crate::io::artifacts::{write_report, write_text};
use crate::io::generator::Generator;

const QUERY_CHUNKS: usize = 10;
const ARTIFACT_CHUNKS: usize = 5;
const ARTIFACT_QUERY_CHARS: usize = 1000;
/// Token budget for standalone retrieval, tighter than the per-task one.
const QUERY_MAX_TOKENS: usize = 8000;

/// Generated text and where it was saved, if an output name was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    pub saved: Option<PathBuf>,
}

fn output_path(dir: &Path, name: &str) -> Result<PathBuf> {
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(anyhow!("output name must be a file name, got '{name}'"));
    }
    Ok(dir.join(name))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl<G: Generator> Engine<G> {
    fn standalone_agent(&self, agent_type: AgentType) -> Result<&AgentConfig> {
        self.agents
            .get(&agent_type)
            .ok_or_else(|| anyhow!("no {agent_type} agent configured"))
    }

    /// Resolve a target artifact: absolute paths as given, relative ones
    /// against `artifacts/`, `done/`, then the workspace root.
    pub fn resolve_artifact(&self, target: &str) -> Result<PathBuf> {
        let path = Path::new(target);
        if path.is_absolute() {
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
            return Err(anyhow!("artifact not found: {target}"));
        }
        [&self.paths.artifacts_dir, &self.paths.done_dir, &self.paths.root]
            .into_iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| anyhow!("artifact not found: {target}"))
    }

    /// Ask the contract agent to define contracts for `feature`. Saved under
    /// `contracts/` when `output` is given.
    pub fn generate_contracts(&self, feature: &str, output: Option<&str>) -> Result<Generated> {
        let agent = self.standalone_agent(AgentType::Contract)?;
        let prompt = self.prompts.contracts(feature)?;
        let context = self.context.for_query(feature, QUERY_CHUNKS, QUERY_MAX_TOKENS);
        let text = self.generate(agent, prompt, context)?;

        let saved = match output {
            Some(name) => {
                let path = output_path(&self.paths.contracts_dir, name)?;
                write_report(&path, &format!("Contracts: {}", feature.trim()), &text, Utc::now())?;
                info!(path = %path.display(), "contracts saved");
                Some(path)
            }
            None => None,
        };
        Ok(Generated { text, saved })
    }

    /// Ask the planner to break `goal` into task definitions. Saved verbatim
    /// under `tasks/` when `output` is given.
    pub fn plan_feature(&self, goal: &str, output: Option<&str>) -> Result<Generated> {
        let agent = self.standalone_agent(AgentType::Planner)?;
        let prompt = self.prompts.plan(goal)?;
        let context = self.context.for_query(goal, QUERY_CHUNKS, QUERY_MAX_TOKENS);
        let text = self.generate(agent, prompt, context)?;

        let saved = match output {
            Some(name) => {
                let path = output_path(&self.paths.tasks_dir, name)?;
                write_text(&path, &text)?;
                info!(path = %path.display(), "plan saved");
                Some(path)
            }
            None => None,
        };
        Ok(Generated { text, saved })
    }

    /// Red-team any artifact file. Saved under `redteam/` when `output` is
    /// given.
    pub fn redteam_artifact(&self, target: &str, output: Option<&str>) -> Result<Generated> {
        let agent = self.standalone_agent(AgentType::Redteam)?;
        let path = self.resolve_artifact(target)?;
        let artifact = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        let name = display_name(&path);

        let prompt = self.prompts.standalone_redteam(&name, &artifact)?;
        let context = self.context.for_query(
            truncate_chars(&artifact, ARTIFACT_QUERY_CHARS),
            ARTIFACT_CHUNKS,
            QUERY_MAX_TOKENS,
        );
        let text = self.generate(agent, prompt, context)?;

        let saved = match output {
            Some(output) => {
                let report = output_path(&self.paths.redteam_dir, output)?;
                write_report(&report, &format!("Red Team Report: {name}"), &text, Utc::now())?;
                info!(path = %report.display(), "red-team report saved");
                Some(report)
            }
            None => None,
        };
        Ok(Generated { text, saved })
    }

    /// QA any artifact file against an optional contract and criteria. Saved
    /// under `qa/` when `output` is given.
    pub fn qa_artifact(
        &self,
        target: &str,
        output: Option<&str>,
        contract: Option<&str>,
        criteria: &[String],
    ) -> Result<Generated> {
        let agent = self.standalone_agent(AgentType::Qa)?;
        let path = self.resolve_artifact(target)?;
        let artifact = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        let name = display_name(&path);

        let prompt = self.prompts.standalone_qa(contract, criteria, &artifact)?;
        let context = self.context.for_query(
            truncate_chars(&artifact, ARTIFACT_QUERY_CHARS),
            ARTIFACT_CHUNKS,
            QUERY_MAX_TOKENS,
        );
        let text = self.generate(agent, prompt, context)?;

        let saved = match output {
            Some(output) => {
                let report = output_path(&self.paths.qa_dir, output)?;
                write_report(&report, &format!("QA Report: {name}"), &text, Utc::now())?;
                info!(path = %report.display(), "QA report saved");
                Some(report)
            }
            None => None,
        };
        Ok(Generated { text, saved })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestWorkspace;

    #[test]
    fn contracts_use_retrieved_design_context() {
        let ws = TestWorkspace::new()
            .agent(AgentType::Contract)
            .file("design/auth.md", "# Auth\n\n## Tokens\n\nSession tokens expire after one hour.");
        let engine = ws.engine();
        engine.generator().push(AgentType::Contract, "TokenService contract");

        let generated = engine
            .generate_contracts("session tokens", Some("tokens.md"))
            .expect("contracts");
        assert_eq!(generated.text, "TokenService contract");
        let saved = generated.saved.expect("saved");
        assert_eq!(saved, engine.paths().contracts_dir.join("tokens.md"));
        let body = std::fs::read_to_string(&saved).expect("read");
        assert!(body.starts_with("# Contracts: session tokens\n\nGenerated: "));
        assert!(body.ends_with("TokenService contract"));

        let requests = engine.generator().requests();
        assert_eq!(requests.len(), 1);
        let context = requests[0].context.as_deref().expect("context");
        assert!(context.starts_with("# RELEVANT DESIGN CONTEXT"));
        assert!(context.contains("expire after one hour"));
        assert!(requests[0].user_prompt.contains("## Feature\nsession tokens"));
    }

    #[test]
    fn query_context_stays_within_standalone_token_budget() {
        // About 10 000 tokens: inside the per-task budget, over the standalone one.
        let big = format!("# Tokens\n\n{}", "session tokens ".repeat(2800));
        let ws = TestWorkspace::new()
            .agent(AgentType::Contract)
            .file("design/big.md", &big)
            .file("design/small.md", "# Expiry\n\nSession tokens expire hourly.");
        let engine = ws.engine();
        assert!(engine.config().retrieval_max_tokens > 10_000);
        engine.generator().push(AgentType::Contract, "contract");

        engine.generate_contracts("session tokens", None).expect("contracts");
        let requests = engine.generator().requests();
        let context = requests[0].context.as_deref().expect("context");
        assert!(context.contains("expire hourly"));
        assert!(!context.contains("session tokens session tokens"));
    }

    #[test]
    fn missing_agent_is_an_error() {
        let ws = TestWorkspace::new();
        let engine = ws.engine();
        let err = engine.plan_feature("ship it", None).unwrap_err();
        assert!(err.to_string().contains("no planner agent configured"));
        assert!(engine.generator().requests().is_empty());
    }

    #[test]
    fn plan_is_saved_verbatim_under_tasks() {
        let ws = TestWorkspace::new().agent(AgentType::Planner);
        let engine = ws.engine();
        engine.generator().push(AgentType::Planner, "- id: a\n  title: A");

        let generated = engine.plan_feature("search", Some("plan.yaml.txt")).expect("plan");
        let saved = generated.saved.expect("saved");
        assert_eq!(saved, engine.paths().tasks_dir.join("plan.yaml.txt"));
        assert_eq!(std::fs::read_to_string(saved).expect("read"), "- id: a\n  title: A");
        assert!(engine.plan_feature("search", Some("../escape")).is_err());
    }

    #[test]
    fn artifacts_resolve_against_artifacts_then_done_then_root() {
        let ws = TestWorkspace::new()
            .file("done/api.md", "done copy")
            .file("notes.md", "root copy")
            .file("artifacts/api.md", "draft copy");
        let engine = ws.engine();
        assert_eq!(
            engine.resolve_artifact("api.md").expect("api"),
            engine.paths().artifacts_dir.join("api.md")
        );
        assert_eq!(
            engine.resolve_artifact("notes.md").expect("notes"),
            engine.paths().root.join("notes.md")
        );
        let err = engine.resolve_artifact("ghost.md").unwrap_err();
        assert!(err.to_string().contains("artifact not found: ghost.md"));
    }

    #[test]
    fn redteam_reports_name_the_file() {
        let ws = TestWorkspace::new()
            .agent(AgentType::Redteam)
            .file("done/api.md", "fn handler() {}");
        let engine = ws.engine();
        engine.generator().push(AgentType::Redteam, "CRITICAL: no auth");

        let generated = engine
            .redteam_artifact("api.md", Some("api-redteam.md"))
            .expect("redteam");
        let report = std::fs::read_to_string(generated.saved.expect("saved")).expect("read");
        assert!(report.starts_with("# Red Team Report: api.md\n"));
        let prompt = &engine.generator().requests()[0].user_prompt;
        assert!(prompt.contains("File: api.md"));
        assert!(prompt.contains("fn handler() {}"));
    }

    #[test]
    fn qa_renders_contract_and_criteria() {
        let ws = TestWorkspace::new()
            .agent(AgentType::Qa)
            .file("artifacts/api.md", "impl");
        let engine = ws.engine();
        engine.generator().push(AgentType::Qa, "PASS");

        let criteria = vec!["returns 404".to_string()];
        let generated = engine
            .qa_artifact("api.md", None, Some("GET /items"), &criteria)
            .expect("qa");
        assert_eq!(generated.text, "PASS");
        assert!(generated.saved.is_none());
        let prompt = &engine.generator().requests()[0].user_prompt;
        assert!(prompt.contains("## Output Contract\nGET /items"));
        assert!(prompt.contains("- returns 404"));
        assert!(engine.paths().qa_dir.read_dir().expect("qa dir").next().is_none());
    }
}
