//! Prompt and document rendering from embedded minijinja templates.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

const GENERATOR_INPUT_TEMPLATE: &str = include_str!("prompts/generator_input.md");
const REWORK_TEMPLATE: &str = include_str!("prompts/rework.md");
const REVIEW_CONTEXT_TEMPLATE: &str = include_str!("prompts/review_context.md");
const REVIEW_REQUEST_TEMPLATE: &str = include_str!("prompts/review_request.md");
const TASK_REDTEAM_TEMPLATE: &str = include_str!("prompts/task_redteam.md");
const TASK_QA_TEMPLATE: &str = include_str!("prompts/task_qa.md");
const REVIEW_DOCUMENT_TEMPLATE: &str = include_str!("prompts/review_document.md");
const CONTRACTS_TEMPLATE: &str = include_str!("prompts/contracts.md");
const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const STANDALONE_REDTEAM_TEMPLATE: &str = include_str!("prompts/standalone_redteam.md");
const STANDALONE_QA_TEMPLATE: &str = include_str!("prompts/standalone_qa.md");
const EXPORT_README_TEMPLATE: &str = include_str!("prompts/export_readme.md");

const TEMPLATES: &[(&str, &str)] = &[
    ("generator_input", GENERATOR_INPUT_TEMPLATE),
    ("rework", REWORK_TEMPLATE),
    ("review_context", REVIEW_CONTEXT_TEMPLATE),
    ("review_request", REVIEW_REQUEST_TEMPLATE),
    ("task_redteam", TASK_REDTEAM_TEMPLATE),
    ("task_qa", TASK_QA_TEMPLATE),
    ("review_document", REVIEW_DOCUMENT_TEMPLATE),
    ("contracts", CONTRACTS_TEMPLATE),
    ("plan", PLAN_TEMPLATE),
    ("standalone_redteam", STANDALONE_REDTEAM_TEMPLATE),
    ("standalone_qa", STANDALONE_QA_TEMPLATE),
    ("export_readme", EXPORT_README_TEMPLATE),
];

/// Iteration history shown in a review document. Values are preformatted.
#[derive(Debug, Clone, Serialize)]
pub struct LoopSummary {
    pub iterations: u32,
    pub review_scores: String,
    pub qa_results: String,
    pub redteam_critical: String,
}

/// Everything a review document shows.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewDocument<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub task_type: &'a str,
    pub generated: String,
    pub loop_summary: Option<LoopSummary>,
    pub input_contract: Option<&'a str>,
    pub output_contract: Option<&'a str>,
    pub criteria: &'a [String],
    pub prompt: &'a str,
    pub artifact: &'a str,
    pub redteam_report: Option<&'a str>,
    pub qa_report: Option<&'a str>,
}

/// One artifact line in the export index.
#[derive(Debug, Clone, Serialize)]
pub struct ReadmeArtifact {
    pub file: String,
    pub title: String,
}

/// Export index contents.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReadme {
    pub exported: String,
    pub engine_version: String,
    pub artifacts: Vec<ReadmeArtifact>,
    pub contracts: Vec<String>,
    pub qa_reports: Vec<String>,
    pub redteam_reports: Vec<String>,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl std::fmt::Debug for PromptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptEngine").finish_non_exhaustive()
    }
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)
                .with_context(|| format!("load template {name}"))?;
        }
        Ok(Self { env })
    }

    fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("get template {name}"))?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render template {name}"))?;
        Ok(rendered.trim().to_string())
    }

    /// Full text sent to a generator: system prompt, optional context, task.
    pub fn generator_input(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        context: Option<&str>,
    ) -> Result<String> {
        self.render(
            "generator_input",
            context! {
                system_prompt => non_empty(system_prompt),
                user_prompt => user_prompt.trim(),
                context => context.map(str::trim).filter(|s| !s.is_empty()),
            },
        )
    }

    /// Prompt for iteration > 1 of a feedback loop.
    pub fn rework(
        &self,
        prompt: &str,
        previous_iteration: u32,
        previous_artifact: Option<&str>,
        feedback: &str,
    ) -> Result<String> {
        self.render(
            "rework",
            context! {
                prompt => prompt.trim(),
                previous_iteration => previous_iteration,
                previous_artifact => previous_artifact,
                feedback => feedback.trim(),
            },
        )
    }

    /// Task description handed to the reviewer: prompt plus output contract
    /// and acceptance criteria.
    pub fn review_context(
        &self,
        prompt: &str,
        output_contract: Option<&str>,
        criteria: &[String],
    ) -> Result<String> {
        self.render(
            "review_context",
            context! {
                prompt => prompt.trim(),
                output_contract => output_contract,
                criteria => criteria,
            },
        )
    }

    /// Reviewer prompt that asks for a JSON verdict.
    pub fn review_request(&self, task_context: &str, artifact: &str) -> Result<String> {
        self.render(
            "review_request",
            context! { task_context => task_context.trim(), artifact => artifact },
        )
    }

    pub fn task_redteam(&self, prompt: &str, artifact: &str) -> Result<String> {
        self.render(
            "task_redteam",
            context! { prompt => prompt.trim(), artifact => artifact },
        )
    }

    pub fn task_qa(
        &self,
        prompt: &str,
        output_contract: Option<&str>,
        criteria: &[String],
        artifact: &str,
    ) -> Result<String> {
        self.render(
            "task_qa",
            context! {
                prompt => prompt.trim(),
                output_contract => output_contract,
                criteria => criteria,
                artifact => artifact,
            },
        )
    }

    pub fn review_document(&self, doc: &ReviewDocument<'_>) -> Result<String> {
        let mut rendered = self.render("review_document", doc)?;
        rendered.push('\n');
        Ok(rendered)
    }

    pub fn contracts(&self, feature: &str) -> Result<String> {
        self.render("contracts", context! { feature => feature.trim() })
    }

    pub fn plan(&self, goal: &str) -> Result<String> {
        self.render("plan", context! { goal => goal.trim() })
    }

    pub fn standalone_redteam(&self, file_name: &str, artifact: &str) -> Result<String> {
        self.render(
            "standalone_redteam",
            context! { file_name => file_name, artifact => artifact },
        )
    }

    pub fn standalone_qa(
        &self,
        contract: Option<&str>,
        criteria: &[String],
        artifact: &str,
    ) -> Result<String> {
        self.render(
            "standalone_qa",
            context! { contract => contract, criteria => criteria, artifact => artifact },
        )
    }

    pub fn export_readme(&self, readme: &ExportReadme) -> Result<String> {
        let mut rendered = self.render("export_readme", readme)?;
        rendered.push('\n');
        Ok(rendered)
    }
}

fn non_empty(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PromptEngine {
        PromptEngine::new().expect("templates")
    }

    #[test]
    fn generator_input_frames_context_and_task() {
        let text = engine()
            .generator_input("Be precise.", "Write the parser", Some("# DESIGN CONTEXT\n\nstuff"))
            .expect("render");
        let system = text.find("Be precise.").expect("system");
        let context = text.find("## Context\n# DESIGN CONTEXT").expect("context");
        let task = text.find("## Task\nWrite the parser").expect("task");
        assert!(system < context && context < task);
    }

    #[test]
    fn generator_input_without_context_is_just_the_prompt() {
        let text = engine().generator_input("", "Write it", None).expect("render");
        assert_eq!(text, "Write it");
    }

    #[test]
    fn rework_prompt_carries_artifact_and_feedback() {
        let text = engine()
            .rework("Build X", 1, Some("fn x() {}"), "## QA Report (Status: FAIL)")
            .expect("render");
        assert!(text.contains("## Original Task\nBuild X"));
        assert!(text.contains("(Iteration 1)"));
        assert!(text.contains("fn x() {}"));
        assert!(text.contains("## QA Report (Status: FAIL)"));
        assert!(text.contains("COMPLETE corrected artifact"));

        let missing = engine().rework("Build X", 1, None, "fb").expect("render");
        assert!(missing.contains("Not available"));
    }

    #[test]
    fn review_context_lists_criteria() {
        let criteria = vec!["fast".to_string(), "safe".to_string()];
        let text = engine()
            .review_context("Do it", Some("JSON out"), &criteria)
            .expect("render");
        assert!(text.starts_with("Do it"));
        assert!(text.contains("## Expected Output Contract\nJSON out"));
        assert!(text.contains("- fast\n- safe"));
    }

    #[test]
    fn qa_prompt_marks_missing_fields() {
        let text = engine().task_qa("Do it", None, &[], "artifact").expect("render");
        assert!(text.contains("## Output Contract\nNot specified"));
        assert!(text.contains("## Acceptance Criteria\nNot specified"));
    }

    #[test]
    fn review_document_includes_loop_summary_and_reports() {
        let criteria = vec!["returns 200".to_string()];
        let doc = ReviewDocument {
            id: "api",
            title: "API",
            task_type: "implementation",
            generated: "2026-01-01T00:00:00Z".to_string(),
            loop_summary: Some(LoopSummary {
                iterations: 2,
                review_scores: "0.50 -> 0.80".to_string(),
                qa_results: "FAIL -> PASS".to_string(),
                redteam_critical: String::new(),
            }),
            input_contract: None,
            output_contract: Some("JSON"),
            criteria: &criteria,
            prompt: "Build the API",
            artifact: "the artifact",
            redteam_report: None,
            qa_report: Some("PASS"),
        };
        let text = engine().review_document(&doc).expect("render");
        assert!(text.starts_with("# Review: API\n\nTask ID: api"));
        assert!(text.contains("- Iterations: 2"));
        assert!(text.contains("- Review scores: 0.50 -> 0.80"));
        assert!(text.contains("- QA results: FAIL -> PASS"));
        assert!(!text.contains("Red team critical"));
        assert!(!text.contains("## Input Contract"));
        assert!(text.contains("## Expected Output Contract\n\nJSON"));
        assert!(text.contains("- returns 200"));
        assert!(text.contains("## Generated Artifact\n\nthe artifact"));
        assert!(text.contains("## QA REPORT\n\nPASS"));
        assert!(!text.contains("RED TEAM REPORT"));
        assert!(text.contains("agentflow approve api"));
    }
}
