//! Generator abstraction for text generation.
//!
//! The [`Generator`] trait decouples the engine from the actual model
//! backend. The production backend pipes prompts through an external
//! command; tests use a scripted generator that replays queued responses.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use super::agents::AgentConfig;
use super::config::GeneratorConfig;
use super::process::run_command_with_timeout;
use super::prompt::PromptEngine;
use crate::core::review_parse::{UNPARSEABLE_ISSUE, parse_review_or_degrade};
use crate::core::types::{AgentType, ReviewResult};

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub agent_name: String,
    pub agent_type: AgentType,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub user_prompt: String,
    /// Background material placed ahead of the task.
    pub context: Option<String>,
}

impl GenerateRequest {
    /// Request for `agent` with its persona settings.
    pub fn for_agent(agent: &AgentConfig, user_prompt: String, context: Option<String>) -> Self {
        Self {
            agent_name: agent.name.clone(),
            agent_type: agent.agent_type.clone(),
            model: agent.model.clone(),
            system_prompt: agent.system_prompt.clone(),
            temperature: agent.temperature,
            max_tokens: agent.max_tokens,
            user_prompt,
            context,
        }
    }
}

/// Abstraction over generation backends.
///
/// An `Err` from either method is a transport failure.
pub trait Generator {
    fn generate(&self, request: &GenerateRequest) -> Result<String>;

    /// Ask for a structured verdict. `request.user_prompt` must already be the
    /// JSON-requesting review prompt; malformed responses degrade instead of
    /// failing.
    fn review(&self, request: &GenerateRequest) -> Result<ReviewResult> {
        let response = self.generate(request)?;
        let review = parse_review_or_degrade(&response);
        if review.issues.iter().any(|issue| issue == UNPARSEABLE_ISSUE) {
            warn!(agent = %request.agent_name, "review response had no usable JSON verdict");
        }
        Ok(review)
    }
}

/// Generator that pipes each prompt through an external command.
///
/// The full prompt goes to stdin and the completion is read from stdout.
/// Persona settings reach the child as `AGENTFLOW_*` environment variables.
#[derive(Debug)]
pub struct CommandGenerator {
    config: GeneratorConfig,
    prompts: PromptEngine,
    workdir: PathBuf,
}

impl CommandGenerator {
    pub fn new(config: GeneratorConfig, workdir: impl Into<PathBuf>) -> Result<Self> {
        if config.command.is_empty() {
            return Err(anyhow!("generator command is empty"));
        }
        Ok(Self {
            config,
            prompts: PromptEngine::new()?,
            workdir: workdir.into(),
        })
    }

    fn command(&self, request: &GenerateRequest) -> Command {
        let mut cmd = Command::new(&self.config.command[0]);
        cmd.args(&self.config.command[1..])
            .current_dir(&self.workdir)
            .env("AGENTFLOW_AGENT", &request.agent_name)
            .env("AGENTFLOW_AGENT_TYPE", request.agent_type.as_str())
            .env("AGENTFLOW_MODEL", &request.model)
            .env("AGENTFLOW_TEMPERATURE", request.temperature.to_string())
            .env("AGENTFLOW_MAX_TOKENS", request.max_tokens.to_string());
        cmd
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(agent = %request.agent_name, model = %request.model))]
    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let program = &self.config.command[0];
        info!(program = %program, "invoking generator");
        let input = self.prompts.generator_input(
            &request.system_prompt,
            &request.user_prompt,
            request.context.as_deref(),
        )?;

        let output = run_command_with_timeout(
            self.command(request),
            Some(input.into_bytes()),
            self.config.timeout(),
            self.config.output_limit_bytes,
        )
        .with_context(|| format!("run generator {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = self.config.timeout_secs, "generator timed out");
            return Err(anyhow!(
                "generator {program} timed out after {}s",
                self.config.timeout_secs
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(anyhow!(
                "generator {program} failed with status {:?}: {}",
                output.status.code(),
                output.stderr_tail(5)
            ));
        }
        let text = output.stdout_lossy();
        if text.trim().is_empty() {
            return Err(anyhow!("generator {program} produced no output"));
        }
        debug!(chars = text.chars().count(), "generator completed");
        Ok(text.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedGenerator, agent};

    fn request(user_prompt: &str) -> GenerateRequest {
        GenerateRequest::for_agent(&agent(AgentType::Reviewer), user_prompt.to_string(), None)
    }

    #[test]
    fn review_parses_json_verdict() {
        let generator = ScriptedGenerator::new();
        generator.push(
            AgentType::Reviewer,
            "Here you go: {\"passed\": true, \"score\": 0.9, \"feedback\": \"ok\"}",
        );
        let review = generator.review(&request("review")).expect("review");
        assert!(review.passed);
        assert_eq!(review.score, 0.9);
        assert_eq!(review.feedback, "ok");
    }

    #[test]
    fn review_degrades_on_prose() {
        let generator = ScriptedGenerator::new();
        generator.push(AgentType::Reviewer, "Looks fine to me");
        let review = generator.review(&request("review")).expect("review");
        assert!(!review.passed);
        assert_eq!(review.score, 0.5);
        assert_eq!(review.feedback, "Looks fine to me");
        assert_eq!(review.issues, vec![UNPARSEABLE_ISSUE.to_string()]);
    }

    #[test]
    fn review_propagates_transport_failure() {
        let generator = ScriptedGenerator::new();
        generator.push_failure(AgentType::Reviewer, "connection reset");
        let err = generator.review(&request("review")).unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[cfg(unix)]
    #[test]
    fn command_generator_pipes_prompt_through_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = GeneratorConfig {
            command: vec!["cat".to_string()],
            ..GeneratorConfig::default()
        };
        let generator = CommandGenerator::new(config, temp.path()).expect("generator");
        let mut req = request("Write the parser");
        req.system_prompt = "Be terse.".to_string();
        let text = generator.generate(&req).expect("generate");
        assert!(text.starts_with("# System\n\nBe terse."));
        assert!(text.ends_with("Write the parser"));
    }

    #[cfg(unix)]
    #[test]
    fn command_generator_exposes_persona_env() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = GeneratorConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "cat >/dev/null; echo \"$AGENTFLOW_MODEL $AGENTFLOW_AGENT_TYPE\"".to_string(),
            ],
            ..GeneratorConfig::default()
        };
        let generator = CommandGenerator::new(config, temp.path()).expect("generator");
        let text = generator.generate(&request("x")).expect("generate");
        assert_eq!(text, "test-model reviewer");
    }

    #[cfg(unix)]
    #[test]
    fn command_generator_failure_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = GeneratorConfig {
            command: vec!["sh".to_string(), "-c".to_string(), "echo boom >&2; exit 4".to_string()],
            ..GeneratorConfig::default()
        };
        let generator = CommandGenerator::new(config, temp.path()).expect("generator");
        let err = generator.generate(&request("x")).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("Some(4)"));
        assert!(message.contains("boom"));
    }

    #[cfg(unix)]
    #[test]
    fn empty_output_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = GeneratorConfig {
            command: vec!["sh".to_string(), "-c".to_string(), "cat >/dev/null".to_string()],
            ..GeneratorConfig::default()
        };
        let generator = CommandGenerator::new(config, temp.path()).expect("generator");
        let err = generator.generate(&request("x")).unwrap_err();
        assert!(err.to_string().contains("produced no output"));
    }
}
