//! `autopilot-launcher` — spawn, inspect, and stop a detached background
//! `autopilot run` process keyed by the current git branch.
//!
//! A separate binary from the main `autopilot` CLI: this one never runs the
//! orchestrator itself, it only manages the lifecycle of the process that
//! does.

use anyhow::{Context, Result, bail};
use autopilot::{init, launcher};
use autopilot::tracker::GitTracker;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "autopilot-launcher")]
#[command(about = "Launches, checks, and stops a backgrounded autopilot run")]
struct Cli {
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    branch: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Spawn a detached run for the current branch (the default).
    Launch {
        #[arg(long)]
        prd: Option<PathBuf>,
    },
    /// Report whether a run is alive, its dashboard URL, and its progress.
    Status,
    /// Terminate the run recorded for this branch.
    Stop,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    let branch = match cli.branch.clone() {
        Some(b) => b,
        None => GitTracker::new(&project_dir)
            .map(|g| g.current_branch())
            .unwrap_or_else(|_| "main".to_string()),
    };

    match cli.command.unwrap_or(Commands::Launch { prd: None }) {
        Commands::Launch { prd } => cmd_launch(&project_dir, &branch, prd),
        Commands::Status => cmd_status(&project_dir, &branch),
        Commands::Stop => cmd_stop(&project_dir, &branch),
    }
}

fn cmd_launch(project_dir: &std::path::Path, branch: &str, prd: Option<PathBuf>) -> Result<ExitCode> {
    let planning_dir = init::get_planning_dir(project_dir);
    if !init::is_initialized(project_dir) {
        init::init_project(project_dir)?;
    }

    let prd_path = match prd {
        Some(path) => path,
        None if init::has_prd(project_dir) => planning_dir.join("prd.md"),
        None => launcher::prompt_for_prd_path()?,
    };

    let cli_path = std::env::current_exe()
        .context("failed to resolve own executable path")?
        .with_file_name("autopilot");

    let mut cli_args = vec!["run".to_string()];
    cli_args.push("--prd".to_string());
    cli_args.push(prd_path.display().to_string());

    let outcome = launcher::launch(project_dir, &planning_dir, branch, &cli_path, &cli_args)?;

    if outcome.reused_existing {
        println!(
            "autopilot is already running for branch `{}` (pid {}) at {}",
            outcome.branch, outcome.pid, outcome.dashboard_url
        );
    } else {
        println!(
            "launched autopilot for branch `{}` (pid {}) at {}",
            outcome.branch, outcome.pid, outcome.dashboard_url
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_status(project_dir: &std::path::Path, branch: &str) -> Result<ExitCode> {
    let planning_dir = init::get_planning_dir(project_dir);
    if !planning_dir.exists() {
        bail!("not initialized at {}; run `autopilot init` first", project_dir.display());
    }
    println!("{}", launcher::status(&planning_dir, branch)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_stop(project_dir: &std::path::Path, branch: &str) -> Result<ExitCode> {
    let planning_dir = init::get_planning_dir(project_dir);
    launcher::stop(&planning_dir, branch)?;
    println!("stopped autopilot for branch `{branch}`");
    Ok(ExitCode::SUCCESS)
}
