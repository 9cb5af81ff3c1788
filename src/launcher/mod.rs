//! Detached-process launcher: spawn, supervise, and tear down a background
//! autopilot run behind a dashboard URL.
//!
//! Grounded on the PID-file write/cleanup idiom used by the example pack's
//! daemon lifecycle module (per-process PID tracking plus best-effort
//! cleanup), combined with this crate's own `PortManager`/`PidManager`.

use crate::pid::PidManager;
use crate::port::PortManager;
use anyhow::{Context, Result, bail};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

pub struct LaunchOutcome {
    pub branch: String,
    pub port: u16,
    pub pid: u32,
    pub dashboard_url: String,
    pub reused_existing: bool,
}

/// `launch` (the default subcommand): refuse to double-spawn if a recorded
/// PID is still alive; otherwise assign a port and spawn the CLI detached.
pub fn launch(
    project_dir: &Path,
    planning_dir: &Path,
    branch: &str,
    cli_path: &Path,
    cli_args: &[String],
) -> Result<LaunchOutcome> {
    let pids = PidManager::new(planning_dir);
    let ports = PortManager::new(planning_dir);

    if let Some(pid) = pids.read_pid(branch) {
        if crate::pid::is_process_running(pid) {
            let port = ports
                .assign_port(branch)
                .context("failed to read existing port assignment")?;
            return Ok(LaunchOutcome {
                branch: branch.to_string(),
                port,
                pid,
                dashboard_url: dashboard_url(port),
                reused_existing: true,
            });
        }
        pids.cleanup_pid(branch);
    }

    let port = ports.assign_port(branch)?;

    let child = std::process::Command::new(cli_path)
        .args(cli_args)
        .arg("--port")
        .arg(port.to_string())
        .current_dir(project_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to spawn detached autopilot process")?;

    let pid = child.id();
    pids.write_pid(branch, pid)?;
    std::mem::forget(child);

    let url = dashboard_url(port);
    health_check(&url);

    Ok(LaunchOutcome {
        branch: branch.to_string(),
        port,
        pid,
        dashboard_url: url,
        reused_existing: false,
    })
}

/// `status`: report current phase/progress/dashboard URL/liveness.
pub fn status(planning_dir: &Path, branch: &str) -> Result<String> {
    let state_path = planning_dir.join("autopilot-state.json");
    let pids = PidManager::new(planning_dir);
    let ports = PortManager::new(planning_dir);

    let alive = pids.is_running(branch).unwrap_or(false);
    let port = ports.assign_port(branch).ok();

    let summary = match std::fs::read(&state_path) {
        Ok(bytes) => match serde_json::from_slice::<crate::state::AutopilotState>(&bytes) {
            Ok(state) => format!(
                "status={:?} phase={} progress={}%",
                state.status,
                state.current_phase.as_deref().unwrap_or("-"),
                state.progress()
            ),
            Err(_) => "status=unknown (corrupt state file)".to_string(),
        },
        Err(_) => "status=unknown (no state file yet)".to_string(),
    };

    Ok(format!(
        "{summary} alive={alive} dashboard={}",
        port.map(dashboard_url).unwrap_or_else(|| "-".to_string())
    ))
}

/// `stop`: terminate the recorded process and clean up its PID file.
pub fn stop(planning_dir: &Path, branch: &str) -> Result<()> {
    let pids = PidManager::new(planning_dir);
    pids.stop_process(branch, Duration::from_millis(5000))?;
    Ok(())
}

fn dashboard_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

/// 3 attempts, 1 second apart; any 2xx-4xx response counts as up.
fn health_check(url: &str) {
    for _ in 0..3 {
        std::thread::sleep(Duration::from_secs(1));
        if let Ok(resp) = reqwest::blocking::get(format!("{url}/api/health")) {
            if resp.status().as_u16() < 500 {
                return;
            }
        }
    }
}

/// Dependency-free prompt for a PRD path when no planning directory exists
/// yet and none was supplied on the command line.
pub fn prompt_for_prd_path() -> Result<PathBuf> {
    print!("No PRD found. Enter a path to your PRD file: ");
    std::io::stdout().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    let trimmed = line.trim();
    if trimmed.is_empty() {
        bail!("no PRD path entered");
    }
    Ok(PathBuf::from(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn status_reports_unknown_when_no_state_file_exists() {
        let dir = tempdir().unwrap();
        let report = status(dir.path(), "main").unwrap();
        assert!(report.contains("no state file yet"));
    }

    #[test]
    fn stop_errors_when_nothing_is_recorded() {
        let dir = tempdir().unwrap();
        let result = stop(dir.path(), "main");
        assert!(result.is_err());
    }

    #[test]
    fn dashboard_url_formats_loopback_address() {
        assert_eq!(dashboard_url(3847), "http://127.0.0.1:3847");
    }
}
