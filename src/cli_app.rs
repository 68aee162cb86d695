//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use subtree_pruner::core::config::{Config, parse_age};
use subtree_pruner::logger::jsonl::{ActivityEvent, ActivityLogger};
use subtree_pruner::pruner::apply::{PruneReport, Pruner};
use subtree_pruner::pruner::evaluate::{Evaluation, TreeEvaluator};
use subtree_pruner::pruner::fs::{EntryKind, RealFs};

/// Subtree pruner — removes stale entries from a temp directory tree.
#[derive(Debug, Parser)]
#[command(
    name = "stp",
    author,
    version,
    about = "Subtree Pruner - age-based temp directory cleanup",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Evaluate the tree and delete expired subtrees.
    Prune(PruneArgs),
    /// Evaluate only: show what a prune run would delete.
    Plan(PruneArgs),
    /// Show the effective configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct PruneArgs {
    /// Root directory to prune (defaults to the configured root).
    #[arg(long, value_name = "PATH")]
    root: Option<PathBuf>,
    /// Age threshold (for example: `3weeks`, `2months`, `45d`, `12h`).
    #[arg(long, value_name = "AGE")]
    older_than: Option<String>,
    /// Evaluate and report without deleting anything.
    #[arg(long)]
    dry_run: bool,
    /// Evaluate root-child subtrees sequentially instead of in parallel.
    #[arg(long)]
    sequential: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Show built-in defaults instead of the loaded file.
    #[arg(long)]
    defaults: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Prune(args) => run_prune(cli, args, false),
        Command::Plan(args) => run_prune(cli, args, true),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Prune / plan
// ---------------------------------------------------------------------------

fn run_prune(cli: &Cli, args: &PruneArgs, plan_only: bool) -> Result<(), CliError> {
    let config =
        Config::load(cli.config.as_deref()).map_err(|e| CliError::User(e.to_string()))?;

    let root = args
        .root
        .clone()
        .unwrap_or_else(|| config.prune.root.clone());
    let max_age = match &args.older_than {
        Some(raw) => parse_age(raw).map_err(|e| CliError::User(e.to_string()))?,
        None => config.max_age().map_err(|e| CliError::User(e.to_string()))?,
    };
    let dry_run = plan_only || args.dry_run || config.prune.dry_run;

    let logger = ActivityLogger::new(&config.paths.activity_log);
    logger.log(ActivityEvent::RunStarted {
        root: root.to_string_lossy().to_string(),
        max_age_secs: max_age.as_secs(),
        dry_run,
    });

    let parallelism = if args.sequential {
        1
    } else {
        config.prune.parallelism
    };
    let evaluation = TreeEvaluator::new(RealFs, max_age)
        .with_parallelism(parallelism)
        .evaluate(&root)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    for err in &evaluation.errors {
        logger.log(ActivityEvent::EvaluationError {
            path: err.path.to_string_lossy().to_string(),
            error_code: err.error.code().to_string(),
            error_message: err.error.to_string(),
        });
    }

    let report = Pruner::new(RealFs).dry_run(dry_run).apply(&evaluation);

    // Dry-run candidates are displayed at the CLI level; no audit events are
    // emitted for paths that were never actually removed.
    if !report.dry_run {
        let dirs = directory_paths(&evaluation);
        for path in &report.deleted {
            logger.log(ActivityEvent::EntryDeleted {
                path: path.to_string_lossy().to_string(),
                kind: if dirs.contains(path) { "directory" } else { "file" }.to_string(),
            });
        }
    }
    for failure in &report.failed {
        logger.log(ActivityEvent::DeletionFailed {
            path: failure.path.to_string_lossy().to_string(),
            error_code: failure.error_code.clone(),
            error_message: failure.error.clone(),
        });
    }
    logger.log(ActivityEvent::RunCompleted {
        deleted: report.deleted.len(),
        failed: report.failed.len(),
        duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
    });

    emit_prune_output(cli, &root, max_age, &evaluation, &report)
}

/// Every directory path in the evaluated tree, for kind lookups after the
/// entries themselves are gone.
fn directory_paths(evaluation: &Evaluation) -> std::collections::HashSet<PathBuf> {
    fn walk(node: &subtree_pruner::pruner::evaluate::Node, out: &mut std::collections::HashSet<PathBuf>) {
        if node.kind == EntryKind::Directory {
            out.insert(node.path.clone());
        }
        for child in &node.children {
            walk(child, out);
        }
    }
    let mut dirs = std::collections::HashSet::new();
    walk(&evaluation.root, &mut dirs);
    dirs
}

fn emit_prune_output(
    cli: &Cli,
    root: &std::path::Path,
    max_age: Duration,
    evaluation: &Evaluation,
    report: &PruneReport,
) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Json => {
            let payload = json!({
                "command": if report.dry_run { "plan" } else { "prune" },
                "root": root.to_string_lossy(),
                "max_age_secs": max_age.as_secs(),
                "dry_run": report.dry_run,
                "deleted": report.deleted.iter()
                    .map(|p| p.to_string_lossy().to_string())
                    .collect::<Vec<_>>(),
                "failed": report.failed.iter().map(|f| json!({
                    "path": f.path.to_string_lossy(),
                    "error_code": f.error_code,
                    "error": f.error,
                    "recoverable": f.recoverable,
                })).collect::<Vec<_>>(),
                "evaluation_errors": evaluation.errors.iter().map(|e| json!({
                    "path": e.path.to_string_lossy(),
                    "error_code": e.error.code(),
                })).collect::<Vec<_>>(),
            });
            write_json_line(&payload)
        }
        OutputMode::Human => {
            if !cli.quiet {
                let verb = if report.dry_run {
                    "would remove"
                } else {
                    "removed"
                };
                for doomed in evaluation.doomed() {
                    let label = match doomed.kind {
                        EntryKind::Directory => "subtree",
                        EntryKind::File => "file",
                    };
                    println!(
                        "{} {} {}",
                        verb.green(),
                        label.dimmed(),
                        doomed.path.display()
                    );
                }
            }
            for failure in &report.failed {
                eprintln!(
                    "{} {} ({})",
                    "failed".red(),
                    failure.path.display(),
                    failure.error_code
                );
            }
            if cli.verbose {
                for err in &evaluation.errors {
                    eprintln!(
                        "{} {} ({})",
                        "skipped".yellow(),
                        err.path.display(),
                        err.error.code()
                    );
                }
            }
            if !cli.quiet {
                println!(
                    "{} entries removed, {} failed, {} unreadable",
                    report.deleted.len(),
                    report.failed.len(),
                    evaluation.errors.len()
                );
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    let config = if args.defaults {
        Config::default()
    } else {
        Config::load(cli.config.as_deref()).map_err(|e| CliError::User(e.to_string()))?
    };

    match output_mode(cli) {
        OutputMode::Json => {
            let payload = serde_json::to_value(&config)?;
            write_json_line(&payload)
        }
        OutputMode::Human => {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| CliError::Runtime(e.to_string()))?;
            print!("{rendered}");
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Output plumbing
// ---------------------------------------------------------------------------

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("STP_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        Some("auto") | None => fallback,
        Some(_) => fallback,
    }
}
