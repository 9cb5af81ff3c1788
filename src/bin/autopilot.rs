//! The `autopilot` CLI entry point: `init`, `run`, `status`, `reset`.
//!
//! Grounded on the teacher's `Cli`/`Commands` clap derive structure, trimmed
//! to the commands this crate actually supports and extended with the
//! orchestrator's own flag surface (`--prd`, `--resume`, `--phases`, …).

use anyhow::{Context, Result};
use autopilot::agent::AgentIntegration;
use autopilot::config::{Config, ConfigArgs};
use autopilot::init;
use autopilot::logger::RingBufferLogger;
use autopilot::notify::{Notification, NotificationDispatcher};
use autopilot::orchestrator::{Orchestrator, OrchestratorEvent};
use autopilot::phase::PhasesFile;
use autopilot::question::QuestionHandler;
use autopilot::server::{AppState, ServerConfig, start_server};
use autopilot::state::StateStore;
use autopilot::tracker::GitTracker;
use autopilot::ui::OrchestratorUI;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "autopilot")]
#[command(version, about = "Runs a PRD through sequential phases with an AI coding agent")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(short, long, global = true)]
    quiet: bool,

    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold the `.autopilot/` planning directory.
    Init,
    /// Run the orchestrator against a PRD, serving the dashboard alongside it.
    Run {
        #[arg(long)]
        prd: Option<PathBuf>,
        #[arg(long)]
        resume: bool,
        #[arg(long)]
        phases: Option<String>,
        #[arg(long = "skip-discuss")]
        skip_discuss: bool,
        #[arg(long = "skip-verify")]
        skip_verify: bool,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, default_value = "standard")]
        depth: String,
        #[arg(long, default_value = "balanced")]
        model: String,
        #[arg(long)]
        notify: Option<String>,
        #[arg(long = "webhook-url")]
        webhook_url: Option<String>,
        #[arg(long = "adapter-path")]
        adapter_path: Option<String>,
    },
    /// Print current phase, progress, and dashboard URL.
    Status,
    /// Discard all persisted progress.
    Reset {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init => cmd_init(&project_dir),
        Commands::Run { .. } => cmd_run(&cli, project_dir).await,
        Commands::Status => cmd_status(&project_dir).await,
        Commands::Reset { force } => cmd_reset(&project_dir, *force).await,
    }
}

fn cmd_init(project_dir: &std::path::Path) -> Result<ExitCode> {
    let was_initialized = init::is_initialized(project_dir);
    let result = init::init_project(project_dir)?;
    if result.created {
        println!("Initialized autopilot project at {}", result.planning_dir.display());
        println!("Edit .autopilot/prd.md, then run `autopilot run`.");
    } else if was_initialized {
        println!("Already initialized at {}", result.planning_dir.display());
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_run(cli: &Cli, project_dir: PathBuf) -> Result<ExitCode> {
    let Commands::Run {
        prd,
        resume,
        phases,
        skip_discuss,
        skip_verify,
        port,
        depth,
        model,
        notify,
        webhook_url,
        adapter_path,
    } = &cli.command
    else {
        unreachable!("cmd_run only called for Commands::Run")
    };

    let args = ConfigArgs {
        prd_path: prd.clone(),
        verbose: cli.verbose,
        quiet: cli.quiet,
        resume: *resume,
        phases: phases.clone(),
        skip_discuss: *skip_discuss,
        skip_verify: *skip_verify,
        port: *port,
        depth: Some(depth.clone()),
        model: Some(model.clone()),
        notify: notify.clone(),
        webhook_url: webhook_url.clone(),
        adapter_path: adapter_path.clone(),
    };

    let config = Config::new(project_dir.clone(), args)?;
    config.ensure_directories()?;

    let logger = Arc::new(RingBufferLogger::new(config.ring_buffer_capacity));
    let questions = Arc::new(QuestionHandler::new());
    let state = Arc::new(StateStore::load(config.state_file.clone())?);
    let agent = Arc::new(AgentIntegration::new(
        config.agent_cmd.clone(),
        config.agent_flags(),
        logger.clone(),
        questions.clone(),
    ));
    let git = GitTracker::new(&config.project_dir).ok();
    let orchestrator = Orchestrator::new(
        config.clone(),
        state.clone(),
        logger.clone(),
        agent.clone(),
        questions.clone(),
        git,
    );

    if !config.resume {
        let phases_file = PhasesFile::load(&config.phases_file).with_context(|| {
            format!(
                "no phases file at {} — generate one before running without --resume",
                config.phases_file.display()
            )
        })?;
        orchestrator.prepare(&phases_file).await?;
    }

    run_with(config, state, logger, agent, questions, orchestrator).await
}

async fn run_with(
    config: Config,
    state: Arc<StateStore>,
    logger: Arc<RingBufferLogger>,
    agent: Arc<AgentIntegration>,
    questions: Arc<QuestionHandler>,
    orchestrator: Orchestrator,
) -> Result<ExitCode> {
    let orchestrator = Arc::new(orchestrator);

    let snapshot = state.get_state().await;
    let ui = Arc::new(OrchestratorUI::new(
        snapshot.phases.len() as u64,
        config.verbose,
        config.quiet,
    ));

    let ui_task = {
        let ui = ui.clone();
        let mut events = orchestrator.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    OrchestratorEvent::PhaseStarted { phase } => ui.phase_started(&phase, ""),
                    OrchestratorEvent::PhaseCompleted { phase } => ui.phase_completed(&phase),
                    OrchestratorEvent::StepStarted { phase, step } => ui.step_started(&phase, &step),
                    OrchestratorEvent::StepCompleted { phase, step } => ui.step_completed(&phase, &step),
                    OrchestratorEvent::ErrorEscalation { phase, step, message } => {
                        ui.escalation(&phase, &step, &message)
                    }
                    OrchestratorEvent::BuildComplete => ui.finish("build complete"),
                }
            }
        })
    };

    // `--adapter-path` is accepted but not wired to a third adapter type:
    // console/webhook are the only adapter implementations this crate ships
    // (notification adapter payload shapes are an out-of-scope collaborator
    // boundary). `--notify` selects which events reach the dispatcher at all.
    let notify_task = {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            logger.clone(),
            config.webhook_url.clone(),
        ));
        let wants = config.notify_channels.clone();
        let mut events = orchestrator.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                let notification = match event {
                    OrchestratorEvent::PhaseCompleted { phase } if wants_event(&wants, "phase") => {
                        Some(Notification {
                            title: "Phase complete".to_string(),
                            message: format!("Phase {phase} finished"),
                            phase: Some(phase),
                        })
                    }
                    OrchestratorEvent::ErrorEscalation { phase, step, message }
                        if wants_event(&wants, "escalation") =>
                    {
                        Some(Notification {
                            title: "Escalation".to_string(),
                            message: format!("Phase {phase} step {step}: {message}"),
                            phase: Some(phase),
                        })
                    }
                    OrchestratorEvent::BuildComplete if wants_event(&wants, "complete") => {
                        Some(Notification {
                            title: "Build complete".to_string(),
                            message: "All phases finished".to_string(),
                            phase: None,
                        })
                    }
                    _ => None,
                };
                if let Some(notification) = notification {
                    dispatcher.dispatch(notification).await;
                }
            }
        })
    };

    let app_state = Arc::new(AppState {
        state: state.clone(),
        logger: logger.clone(),
        questions: questions.clone(),
        orchestrator: orchestrator.clone(),
        project_dir: config.project_dir.clone(),
        started_at: Instant::now(),
    });

    let server_port = config.port.unwrap_or(3847);
    let orchestrator_for_server = orchestrator.clone();
    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        orchestrator_for_server.request_shutdown();
    };

    let server_handle = tokio::spawn(start_server(
        ServerConfig { port: server_port },
        app_state,
        shutdown,
    ));

    let run_result = orchestrator.run().await;
    ui_task.abort();
    notify_task.abort();
    let _ = agent;
    let _ = server_handle.await;

    match run_result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            eprintln!("autopilot run failed: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Empty `--notify` means "every channel"; otherwise `channel` must appear
/// literally in the comma-separated list.
fn wants_event(channels: &[String], channel: &str) -> bool {
    channels.is_empty() || channels.iter().any(|c| c == channel)
}

async fn cmd_status(project_dir: &std::path::Path) -> Result<ExitCode> {
    let planning_dir = init::get_planning_dir(project_dir);
    let state_path = planning_dir.join("autopilot-state.json");
    match std::fs::read(&state_path) {
        Ok(bytes) => {
            let state: autopilot::state::AutopilotState = serde_json::from_slice(&bytes)?;
            println!("status: {:?}", state.status);
            println!("current phase: {}", state.current_phase.as_deref().unwrap_or("-"));
            println!("progress: {}%", state.progress());
        }
        Err(_) => println!("no run has been started yet"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_reset(project_dir: &std::path::Path, force: bool) -> Result<ExitCode> {
    if !force {
        eprintln!("this discards all persisted progress; pass --force to confirm");
        return Ok(ExitCode::FAILURE);
    }
    let planning_dir = init::get_planning_dir(project_dir);
    let state_path = planning_dir.join("autopilot-state.json");
    if state_path.exists() {
        std::fs::remove_file(&state_path)?;
    }
    println!("reset complete");
    Ok(ExitCode::SUCCESS)
}
