//! Contract-driven task orchestration for model-backed agents.
//!
//! Operates on a workspace directory (`--root`, default `.`) holding
//! `config/`, `design/`, `contracts/`, `tasks/` and the generated output
//! folders. Every command prints human-readable output on stdout and
//! diagnostics on stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use agentflow::core::task::Task;
use agentflow::core::types::TaskType;
use agentflow::engine::{Engine, RunOptions, RunOutcome};
use agentflow::exit_codes;
use agentflow::io::config::load_config;
use agentflow::io::generator::CommandGenerator;
use agentflow::io::init::{InitOptions, WorkspacePaths, init_workspace};
use agentflow::logging;
use agentflow::review::Transition;
use agentflow::select::NextOutcome;
use agentflow::standalone::Generated;
use anyhow::Result;
use clap::{Parser, Subcommand};

const RULE: &str = "============================================================";

#[derive(Parser)]
#[command(
    name = "agentflow",
    version,
    about = "Contract-driven task orchestration for model-backed agents"
)]
struct Cli {
    /// Workspace root.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the workspace directories and a default `config/engine.toml`.
    Init {
        /// Overwrite an existing `config/engine.toml`.
        #[arg(short, long)]
        force: bool,
    },
    /// Show workflow status.
    Status,
    /// List all tasks.
    List,
    /// Show one task in detail.
    Show { task_id: String },
    /// Check the workflow for unknown dependencies, cycles, and missing agents.
    Validate,
    /// Run one task.
    Run {
        task_id: String,
        /// Do not warn about implementation tasks without contracts.
        #[arg(long)]
        skip_contract_warning: bool,
    },
    /// Run the next ready task (contracts first, then rework).
    RunNext,
    /// List tasks pending human review.
    Review,
    /// Approve a task in review.
    Approve { task_id: String },
    /// Reject a task in review.
    Reject {
        task_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Bundle approved work into `exports/`.
    Export {
        /// Archive file name inside `exports/`.
        #[arg(long)]
        output: Option<String>,
        /// Leave QA and red-team reports out of the bundle.
        #[arg(long)]
        no_reports: bool,
    },
    /// Generate contracts for a feature.
    Contracts {
        feature: String,
        /// File name inside `contracts/`.
        #[arg(long)]
        output: Option<String>,
    },
    /// Break a goal into task definitions.
    Plan {
        goal: String,
        /// File name inside `tasks/`.
        #[arg(long)]
        output: Option<String>,
    },
    /// Red-team a task's artifact or any file.
    Redteam {
        /// Task id or artifact path.
        target: String,
        /// File name inside `redteam/`.
        #[arg(long)]
        output: Option<String>,
    },
    /// QA a task's artifact or any file.
    Qa {
        /// Task id or artifact path.
        target: String,
        /// File name inside `qa/`.
        #[arg(long)]
        output: Option<String>,
        /// Output contract to verify against.
        #[arg(long)]
        contract: Option<String>,
        /// Acceptance criterion (repeatable).
        #[arg(long = "criteria")]
        criteria: Vec<String>,
    },
}

fn main() -> ExitCode {
    logging::init();
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::from(exit_codes::INVALID as u8)
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = cli.root;
    if let Command::Init { force } = cli.command {
        return cmd_init(&root, force);
    }

    let mut engine = open_engine(&root)?;
    match cli.command {
        Command::Init { .. } => Ok(exit_codes::OK),
        Command::Status => cmd_status(&engine),
        Command::List => cmd_list(&engine),
        Command::Show { task_id } => cmd_show(&engine, &task_id),
        Command::Validate => cmd_validate(&engine),
        Command::Run {
            task_id,
            skip_contract_warning,
        } => {
            let outcome = engine.run_task(&task_id, RunOptions { skip_contract_warning })?;
            Ok(report_outcome(&engine, &task_id, &outcome))
        }
        Command::RunNext => match engine.run_next(RunOptions::default())? {
            NextOutcome::Idle => {
                println!("No tasks ready to run.");
                println!("Check for tasks pending review: agentflow review");
                Ok(exit_codes::OK)
            }
            NextOutcome::Ran { task_id, outcome } => Ok(report_outcome(&engine, &task_id, &outcome)),
        },
        Command::Review => cmd_review(&engine),
        Command::Approve { task_id } => {
            let transition = engine.approve(&task_id)?;
            Ok(report_transition(&transition, &format!("Approved: {task_id}")))
        }
        Command::Reject { task_id, reason } => {
            let transition = engine.reject(&task_id, &reason)?;
            Ok(report_transition(&transition, &format!("Rejected: {task_id}")))
        }
        Command::Export { output, no_reports } => {
            let summary = engine.export_done(output.as_deref(), !no_reports)?;
            println!("Export complete: {}", summary.path.display());
            println!(
                "  {} artifacts, {} contracts, {} QA reports, {} red-team reports",
                summary.manifest.artifacts.len(),
                summary.manifest.contracts.len(),
                summary.manifest.qa_reports.len(),
                summary.manifest.redteam_reports.len()
            );
            Ok(exit_codes::OK)
        }
        Command::Contracts { feature, output } => {
            let generated = engine.generate_contracts(&feature, output.as_deref())?;
            Ok(print_generated("GENERATED CONTRACTS", &generated))
        }
        Command::Plan { goal, output } => {
            let generated = engine.plan_feature(&goal, output.as_deref())?;
            Ok(print_generated("GENERATED PLAN", &generated))
        }
        Command::Redteam { target, output } => {
            let (path, _) = resolve_target(&engine, &target)?;
            let generated = engine.redteam_artifact(&path, output.as_deref())?;
            Ok(print_generated("RED TEAM REPORT", &generated))
        }
        Command::Qa {
            target,
            output,
            contract,
            criteria,
        } => {
            let (path, task) = resolve_target(&engine, &target)?;
            let contract = contract.or_else(|| task.and_then(|t| t.output_contract.clone()));
            let criteria = match task {
                Some(task) if criteria.is_empty() => task.acceptance_criteria.clone(),
                _ => criteria,
            };
            let generated =
                engine.qa_artifact(&path, output.as_deref(), contract.as_deref(), &criteria)?;
            Ok(print_generated("QA REPORT", &generated))
        }
    }
}

fn open_engine(root: &Path) -> Result<Engine<CommandGenerator>> {
    let paths = WorkspacePaths::new(root);
    let config = load_config(&paths.engine_config_path)?;
    let generator = CommandGenerator::new(config.generator, root)?;
    Engine::load(root, generator)
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_workspace(root, &InitOptions { force })?;
    println!("Initialized workspace at {}", paths.root.display());
    println!("  1. Add agents to config/ (see config/agent.template.yaml)");
    println!("  2. Add design documents to design/");
    println!("  3. Add tasks to tasks/ (see tasks/example.yaml.template)");
    println!("  4. Run: agentflow status");
    Ok(exit_codes::OK)
}

fn cmd_status(engine: &Engine<CommandGenerator>) -> Result<i32> {
    let status = engine.status();
    println!("{RULE}");
    println!("WORKFLOW STATUS");
    println!("{RULE}");
    println!("Total tasks:       {}", status.total);
    println!("  - Contracts:     {}", status.contract_tasks);
    println!("  - Implementations: {}", status.implementation_tasks);
    println!("Completed:         {}", status.completed);
    println!("Pending:           {}", status.pending);
    println!("In Review:         {}", status.in_review);
    println!("In Loop:           {}", status.in_loop);
    println!("Failed:            {}", status.failed);
    println!("Rejected:          {}", status.rejected);
    println!(
        "Design context:    {} ({} chunks, {:.1} KB)",
        status.context_mode,
        status.context_chunks,
        status.context_chars as f64 / 1024.0
    );
    println!("QA agent:          {}", configured(status.qa_configured));
    println!("Red team agent:    {}", configured(status.redteam_configured));
    let ready = if status.ready.is_empty() {
        "None".to_string()
    } else {
        status.ready.join(", ")
    };
    println!("Ready to run:      {ready}");
    println!("{RULE}");
    Ok(exit_codes::OK)
}

fn configured(present: bool) -> &'static str {
    if present { "available" } else { "not configured" }
}

fn loop_column(task: &Task) -> String {
    if task.loop_config.enabled {
        format!(
            "{}/{}",
            task.loop_state.iteration,
            task.loop_config.effective_max_iterations()
        )
    } else {
        "-".to_string()
    }
}

fn cmd_list(engine: &Engine<CommandGenerator>) -> Result<i32> {
    println!("{:<30} {:<15} {:<10} {:<6} TITLE", "ID", "TYPE", "STATUS", "LOOP");
    for task in &engine.state().tasks {
        println!(
            "{:<30} {:<15} {:<10} {:<6} {}",
            task.id,
            task.task_type.as_str(),
            task.status.as_str(),
            loop_column(task),
            task.title
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_show(engine: &Engine<CommandGenerator>, task_id: &str) -> Result<i32> {
    let Some(task) = engine.state().task(task_id) else {
        eprintln!("task not found: {task_id}");
        return Ok(exit_codes::REFUSED);
    };
    let listed = |items: &[String]| {
        if items.is_empty() {
            "None".to_string()
        } else {
            items.join(", ")
        }
    };
    println!("{RULE}");
    println!("TASK: {}", task.id);
    println!("{RULE}");
    println!("Title:       {}", task.title);
    println!("Type:        {}", task.task_type);
    println!("Status:      {}", task.status);
    println!("Agent:       {}", task.agent_type);
    println!("Depends on:  {}", listed(&task.depends_on));
    println!("Review:      {}", if task.requires_review { "required" } else { "skipped" });
    println!(
        "Approval:    {}",
        if task.requires_human_approval { "required" } else { "auto" }
    );
    println!("Red team:    {}", if task.requires_redteam { "required" } else { "optional" });
    println!("QA:          {}", if task.requires_qa { "required" } else { "optional" });
    if task.loop_config.enabled {
        let config = &task.loop_config;
        println!();
        println!("Loop:        {} (max {})", loop_column(task), config.effective_max_iterations());
        println!("Min score:   {}", config.min_review_score);
        let scores: Vec<String> = task
            .loop_state
            .review_scores
            .iter()
            .map(|s| format!("{s:.2}"))
            .collect();
        if !scores.is_empty() {
            println!("Scores:      {}", scores.join(" -> "));
        }
    }
    if let Some(contract) = &task.input_contract {
        println!("\n--- INPUT CONTRACT ---\n{contract}");
    }
    if let Some(contract) = &task.output_contract {
        println!("\n--- OUTPUT CONTRACT ---\n{contract}");
    }
    if !task.acceptance_criteria.is_empty() {
        println!("\n--- ACCEPTANCE CRITERIA ---");
        for criterion in &task.acceptance_criteria {
            println!("  - {criterion}");
        }
    }
    if let Some(feedback) = &task.review_feedback {
        println!("\n--- REVIEW FEEDBACK ---\n{feedback}");
    }
    println!("\n--- PROMPT ---\n{}", task.prompt);
    println!("{RULE}");
    Ok(exit_codes::OK)
}

fn cmd_validate(engine: &Engine<CommandGenerator>) -> Result<i32> {
    let warnings = engine.validate();
    if warnings.is_empty() {
        println!("Workflow is valid.");
    } else {
        println!("Found {} issue(s):", warnings.len());
        for warning in &warnings {
            println!("  {warning}");
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_review(engine: &Engine<CommandGenerator>) -> Result<i32> {
    let queue = engine.review_queue();
    if queue.is_empty() {
        println!("No tasks pending review.");
        return Ok(exit_codes::OK);
    }
    let (contracts, others): (Vec<_>, Vec<_>) = queue
        .iter()
        .partition(|entry| entry.task_type == TaskType::Contract);
    println!("TASKS PENDING REVIEW");
    for (heading, entries) in [("CONTRACTS (review these first)", contracts), ("OTHER TASKS", others)] {
        if entries.is_empty() {
            continue;
        }
        println!("\n{heading}:");
        for entry in entries {
            let mut markers = Vec::new();
            if entry.loop_iterations > 0 {
                markers.push(format!("loop x{}", entry.loop_iterations));
            }
            if entry.has_redteam_report {
                markers.push("red team".to_string());
            }
            if entry.has_qa_report {
                markers.push("qa".to_string());
            }
            let markers = if markers.is_empty() {
                String::new()
            } else {
                format!(" [{}]", markers.join(", "))
            };
            println!("  {}: {}{markers}", entry.id, entry.title);
            println!("    File: {}", entry.review_doc.display());
            println!("    Approve: agentflow approve {}", entry.id);
        }
    }
    Ok(exit_codes::OK)
}

fn report_outcome(engine: &Engine<CommandGenerator>, task_id: &str, outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Queued => {
            println!("{task_id}: queued for review at {}", engine.paths().review_doc(task_id).display());
            exit_codes::OK
        }
        RunOutcome::Completed => {
            println!("{task_id}: completed");
            exit_codes::OK
        }
        RunOutcome::Failed { error } => {
            eprintln!("{task_id}: failed: {error}");
            exit_codes::FAILED
        }
        RunOutcome::Refused(refusal) => {
            eprintln!("{refusal}");
            exit_codes::REFUSED
        }
    }
}

fn report_transition(transition: &Transition, applied: &str) -> i32 {
    match transition {
        Transition::Applied => {
            println!("{applied}");
            exit_codes::OK
        }
        Transition::Refused(refusal) => {
            eprintln!("{refusal}");
            exit_codes::REFUSED
        }
    }
}

/// A known task id resolves to its draft or approved artifact; anything else
/// is passed through as a path.
fn resolve_target<'a>(
    engine: &'a Engine<CommandGenerator>,
    target: &str,
) -> Result<(String, Option<&'a Task>)> {
    let Some(task) = engine.state().task(target) else {
        return Ok((target.to_string(), None));
    };
    let paths = engine.paths();
    [paths.artifact(target, None), paths.done_doc(target)]
        .into_iter()
        .find(|path| path.is_file())
        .map(|path| (path.display().to_string(), Some(task)))
        .ok_or_else(|| anyhow::anyhow!("no artifact found for task: {target}"))
}

fn print_generated(heading: &str, generated: &Generated) -> i32 {
    println!("{RULE}");
    println!("{heading}");
    println!("{RULE}");
    println!("{}", generated.text);
    println!("{RULE}");
    if let Some(path) = &generated.saved {
        println!("Saved to: {}", path.display());
    }
    exit_codes::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["agentflow", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_global_root_after_subcommand() {
        let cli = Cli::parse_from(["agentflow", "status", "--root", "/tmp/ws"]);
        assert!(matches!(cli.command, Command::Status));
        assert_eq!(cli.root, PathBuf::from("/tmp/ws"));
    }

    #[test]
    fn parse_reject_requires_reason() {
        assert!(Cli::try_parse_from(["agentflow", "reject", "api"]).is_err());
        let cli = Cli::parse_from(["agentflow", "reject", "api", "--reason", "missing tests"]);
        match cli.command {
            Command::Reject { task_id, reason } => {
                assert_eq!(task_id, "api");
                assert_eq!(reason, "missing tests");
            }
            _ => panic!("expected reject"),
        }
    }

    #[test]
    fn parse_qa_collects_repeated_criteria() {
        let cli = Cli::parse_from([
            "agentflow", "qa", "api", "--criteria", "a", "--criteria", "b", "--contract", "c",
        ]);
        match cli.command {
            Command::Qa {
                target,
                criteria,
                contract,
                output,
            } => {
                assert_eq!(target, "api");
                assert_eq!(criteria, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(contract.as_deref(), Some("c"));
                assert!(output.is_none());
            }
            _ => panic!("expected qa"),
        }
    }

    #[test]
    fn parse_run_flags() {
        let cli = Cli::parse_from(["agentflow", "run", "api", "--skip-contract-warning"]);
        assert!(matches!(
            cli.command,
            Command::Run {
                skip_contract_warning: true,
                ..
            }
        ));
    }
}
