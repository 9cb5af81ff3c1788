//! `autopilot init` — scaffold the `.autopilot/` planning directory.
//!
//! ```text
//! .autopilot/
//! ├── prd.md                  # PRD placeholder, edited by the user before a run
//! ├── phases.json             # Generated once a PRD is decomposed into phases
//! ├── autopilot-state.json    # Current execution state
//! └── autopilot-log/          # Append-only log files
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const PLANNING_DIR: &str = ".autopilot";

#[derive(Debug)]
pub struct InitResult {
    pub planning_dir: PathBuf,
    pub created: bool,
}

pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let planning_dir = project_dir.join(PLANNING_DIR);

    let created = if planning_dir.exists() {
        ensure_directory_structure(&planning_dir)?;
        false
    } else {
        create_directory_structure(&planning_dir)?;
        true
    };

    Ok(InitResult {
        planning_dir,
        created,
    })
}

fn create_directory_structure(planning_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(planning_dir)
        .with_context(|| format!("failed to create directory: {}", planning_dir.display()))?;
    ensure_directory_structure(planning_dir)
}

fn ensure_directory_structure(planning_dir: &Path) -> Result<()> {
    let log_dir = planning_dir.join("autopilot-log");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let prd_file = planning_dir.join("prd.md");
    if !prd_file.exists() {
        std::fs::write(&prd_file, "")
            .with_context(|| format!("failed to create prd.md: {}", prd_file.display()))?;
    }

    Ok(())
}

pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(PLANNING_DIR).exists()
}

pub fn get_planning_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(PLANNING_DIR)
}

/// `true` if `.autopilot/prd.md` exists and is not blank.
pub fn has_prd(project_dir: &Path) -> bool {
    let prd_file = project_dir.join(PLANNING_DIR).join("prd.md");
    match std::fs::read_to_string(&prd_file) {
        Ok(content) => !content.trim().is_empty(),
        Err(_) => false,
    }
}

/// `true` if `.autopilot/phases.json` exists and parses as JSON.
pub fn has_phases(project_dir: &Path) -> bool {
    let phases_file = project_dir.join(PLANNING_DIR).join("phases.json");
    match std::fs::read_to_string(&phases_file) {
        Ok(content) => {
            !content.trim().is_empty() && serde_json::from_str::<serde_json::Value>(&content).is_ok()
        }
        Err(_) => false,
    }
}
