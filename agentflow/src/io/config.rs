//! Engine configuration stored under `config/engine.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::retrieval::RetrievalLimits;

/// Engine configuration (TOML).
///
/// Intended to be edited by humans. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Corpora at or below this many characters are handed to every task in full.
    pub full_context_threshold_chars: usize,

    /// Chunk cap for per-task retrieval.
    pub retrieval_max_chunks: usize,

    /// Approximate token budget for per-task retrieval (4 characters per token).
    pub retrieval_max_tokens: usize,

    /// Characters of the task prompt included in the retrieval query.
    pub query_prompt_chars: usize,

    /// Characters of the previous artifact carried into a rework prompt.
    pub previous_artifact_chars: usize,

    /// Characters of red-team / QA reports carried into loop feedback.
    pub feedback_report_chars: usize,

    /// Version recorded in export manifests.
    pub engine_version: String,

    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command that reads a prompt on stdin and prints the completion.
    pub command: Vec<String>,

    /// Wall-clock limit per generator call.
    pub timeout_secs: u64,

    /// Truncate captured generator stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string(), "-p".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            full_context_threshold_chars: 20_000,
            retrieval_max_chunks: 15,
            retrieval_max_tokens: 12_000,
            query_prompt_chars: 500,
            previous_artifact_chars: 8_000,
            feedback_report_chars: 2_000,
            engine_version: "1.0.0".to_string(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retrieval_max_chunks == 0 {
            return Err(anyhow!("retrieval_max_chunks must be > 0"));
        }
        if self.retrieval_max_tokens == 0 {
            return Err(anyhow!("retrieval_max_tokens must be > 0"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.generator.output_limit_bytes == 0 {
            return Err(anyhow!("generator.output_limit_bytes must be > 0"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        Ok(())
    }

    pub fn retrieval_limits(&self) -> RetrievalLimits {
        RetrievalLimits {
            max_chunks: self.retrieval_max_chunks,
            max_tokens: self.retrieval_max_tokens,
            query_prompt_chars: self.query_prompt_chars,
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config").join("engine.toml");
        let cfg = EngineConfig {
            full_context_threshold_chars: 5_000,
            generator: GeneratorConfig {
                command: vec!["my-llm".to_string(), "--quiet".to_string()],
                ..GeneratorConfig::default()
            },
            ..EngineConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("engine.toml");
        fs::write(&path, "retrieval_max_chunks = 4\n[generator]\ntimeout_secs = 30\n")
            .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.retrieval_max_chunks, 4);
        assert_eq!(cfg.generator.timeout_secs, 30);
        assert_eq!(cfg.generator.command, GeneratorConfig::default().command);
        assert_eq!(cfg.full_context_threshold_chars, 20_000);
    }

    #[test]
    fn empty_generator_command_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("engine.toml");
        fs::write(&path, "[generator]\ncommand = []\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("generator.command"));
    }
}
