//! Ambient `autopilot.toml` configuration: defaults for budgets and timeouts,
//! overridable by CLI flags and environment variables. Deliberately small —
//! the per-phase skill/review/decomposition machinery the teacher's
//! `forge.toml` supported has no counterpart in this crate.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectSection {
    #[serde(default)]
    pub agent_cmd: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_agent_timeout_ms")]
    pub agent_timeout_ms: u64,
    #[serde(default = "default_gap_iteration_cap")]
    pub gap_iteration_cap: u32,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_ring_buffer_capacity")]
    pub ring_buffer_capacity: usize,
    #[serde(default = "default_skip_permissions")]
    pub skip_permissions: bool,
}

fn default_agent_timeout_ms() -> u64 {
    600_000
}
fn default_gap_iteration_cap() -> u32 {
    3
}
fn default_retry_limit() -> u32 {
    1
}
fn default_ring_buffer_capacity() -> usize {
    500
}
fn default_skip_permissions() -> bool {
    true
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            agent_timeout_ms: default_agent_timeout_ms(),
            gap_iteration_cap: default_gap_iteration_cap(),
            retry_limit: default_retry_limit(),
            ring_buffer_capacity: default_ring_buffer_capacity(),
            skip_permissions: default_skip_permissions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AutopilotToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
}

impl AutopilotToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content).context("failed to parse autopilot.toml")
    }

    pub fn load_or_default(planning_dir: &Path) -> Result<Self> {
        let path = planning_dir.join("autopilot.toml");
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Resolved ambient config for a project directory: file values, with
/// environment variables able to override the ones that have an established
/// env-var convention (agent command, skip-permissions).
#[derive(Debug, Clone)]
pub struct AutopilotConfig {
    pub project_dir: PathBuf,
    toml: AutopilotToml,
}

impl AutopilotConfig {
    pub fn load(project_dir: &Path) -> Result<Self> {
        let planning_dir = project_dir.join(".autopilot");
        let toml = AutopilotToml::load_or_default(&planning_dir)?;
        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            toml,
        })
    }

    pub fn agent_cmd(&self) -> String {
        self.toml
            .project
            .agent_cmd
            .clone()
            .or_else(|| std::env::var("AUTOPILOT_AGENT_CMD").ok())
            .unwrap_or_else(|| "claude".to_string())
    }

    pub fn skip_permissions(&self) -> bool {
        if let Ok(env_val) = std::env::var("AUTOPILOT_SKIP_PERMISSIONS") {
            return env_val != "false";
        }
        self.toml.defaults.skip_permissions
    }

    pub fn defaults(&self) -> &DefaultsSection {
        &self.toml.defaults
    }
}
