//! Artifact and report documents.
//!
//! Every document starts with a short metadata header followed by `---` and
//! the generated body.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::core::types::TaskType;

/// Metadata written above a generated artifact.
#[derive(Debug, Clone)]
pub struct ArtifactHeader<'a> {
    pub title: &'a str,
    pub task_type: TaskType,
    pub agent_name: &'a str,
    pub iteration: Option<u32>,
    pub generated_at: DateTime<Utc>,
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Render an artifact document.
pub fn render_artifact(header: &ArtifactHeader<'_>, body: &str) -> String {
    let mut out = format!(
        "# {}\n\nGenerated: {}\nTask Type: {}\nAgent: {}\n",
        header.title,
        timestamp(header.generated_at),
        header.task_type,
        header.agent_name
    );
    if let Some(iteration) = header.iteration {
        out.push_str(&format!("Iteration: {iteration}\n"));
    }
    out.push_str("\n---\n\n");
    out.push_str(body);
    out
}

/// Render a report document (`# {heading}`, timestamp, body).
pub fn render_report(heading: &str, body: &str, generated_at: DateTime<Utc>) -> String {
    format!(
        "# {heading}\n\nGenerated: {}\n\n---\n\n{body}",
        timestamp(generated_at)
    )
}

pub fn write_artifact(path: &Path, header: &ArtifactHeader<'_>, body: &str) -> Result<()> {
    write_text(path, &render_artifact(header, body))
}

pub fn write_report(path: &Path, heading: &str, body: &str, generated_at: DateTime<Utc>) -> Result<()> {
    write_text(path, &render_report(heading, body, generated_at))
}

/// Write a text file, creating its parent directory.
pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// Contents of the first existing file among `candidates`.
pub fn read_first_existing(candidates: &[PathBuf]) -> Result<Option<(PathBuf, String)>> {
    for path in candidates {
        if path.is_file() {
            let contents =
                fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            return Ok(Some((path.clone(), contents)));
        }
    }
    Ok(None)
}

pub fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::copy(from, to)
        .with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
    Ok(())
}
