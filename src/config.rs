//! Runtime configuration for the autopilot orchestrator.
//!
//! Bridges CLI flags, the optional `autopilot.toml` file, and environment
//! variables into one place the rest of the crate reads from.

use anyhow::{Context, Result, anyhow};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::autopilot_config::AutopilotConfig;

/// Runtime configuration for a single autopilot run.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub planning_dir: PathBuf,
    pub prd_path: PathBuf,
    pub phases_file: PathBuf,
    pub state_file: PathBuf,
    pub log_dir: PathBuf,
    pub pid_dir: PathBuf,
    pub agent_cmd: String,
    pub skip_permissions: bool,
    pub verbose: bool,
    pub quiet: bool,
    pub resume: bool,
    pub phase_filter: Option<BTreeSet<String>>,
    pub skip_discuss: bool,
    pub skip_verify: bool,
    pub port: Option<u16>,
    pub depth: String,
    pub model: String,
    pub notify_channels: Vec<String>,
    pub webhook_url: Option<String>,
    pub adapter_path: Option<String>,
    pub agent_timeout_ms: u64,
    pub gap_iteration_cap: u32,
    pub retry_limit: u32,
    pub ring_buffer_capacity: usize,
    autopilot_config: Option<AutopilotConfig>,
}

/// Everything a caller may override on the command line; fields left `None`
/// fall back to file/env/built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigArgs {
    pub prd_path: Option<PathBuf>,
    pub verbose: bool,
    pub quiet: bool,
    pub resume: bool,
    pub phases: Option<String>,
    pub skip_discuss: bool,
    pub skip_verify: bool,
    pub port: Option<u16>,
    pub depth: Option<String>,
    pub model: Option<String>,
    pub notify: Option<String>,
    pub webhook_url: Option<String>,
    pub adapter_path: Option<String>,
}

const PLANNING_DIR: &str = ".autopilot";

impl Config {
    pub fn new(project_dir: PathBuf, args: ConfigArgs) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("failed to resolve project directory")?;

        let autopilot_config = AutopilotConfig::load(&project_dir).ok();

        let prd_path = match args.prd_path {
            Some(path) => path
                .canonicalize()
                .context("failed to resolve PRD file path")?,
            None => Self::find_prd_file(&project_dir)?,
        };

        let planning_dir = project_dir.join(PLANNING_DIR);
        let phases_file = planning_dir.join("phases.json");
        let state_file = planning_dir.join("autopilot-state.json");
        let log_dir = planning_dir.join("autopilot-log");
        let pid_dir = planning_dir.clone();

        let (agent_cmd, skip_permissions) = if let Some(ref ac) = autopilot_config {
            (ac.agent_cmd(), ac.skip_permissions())
        } else {
            let agent_cmd = std::env::var("AUTOPILOT_AGENT_CMD").unwrap_or_else(|_| "claude".to_string());
            let skip_permissions = std::env::var("AUTOPILOT_SKIP_PERMISSIONS")
                .map(|v| v != "false")
                .unwrap_or(true);
            (agent_cmd, skip_permissions)
        };

        let phase_filter = args
            .phases
            .as_deref()
            .map(parse_phase_filter)
            .transpose()?;

        let notify_channels = args
            .notify
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let defaults = autopilot_config.as_ref().map(|c| c.defaults());

        Ok(Self {
            project_dir,
            planning_dir,
            prd_path,
            phases_file,
            state_file,
            log_dir,
            pid_dir,
            agent_cmd,
            skip_permissions,
            verbose: args.verbose,
            quiet: args.quiet,
            resume: args.resume,
            phase_filter,
            skip_discuss: args.skip_discuss,
            skip_verify: args.skip_verify,
            port: args.port,
            depth: args.depth.unwrap_or_else(|| "standard".to_string()),
            model: args.model.unwrap_or_else(|| "balanced".to_string()),
            notify_channels,
            webhook_url: args.webhook_url,
            adapter_path: args.adapter_path,
            agent_timeout_ms: defaults.map(|d| d.agent_timeout_ms).unwrap_or(600_000),
            gap_iteration_cap: defaults.map(|d| d.gap_iteration_cap).unwrap_or(3),
            retry_limit: defaults.map(|d| d.retry_limit).unwrap_or(1),
            ring_buffer_capacity: defaults.map(|d| d.ring_buffer_capacity).unwrap_or(500),
            autopilot_config,
        })
    }

    pub fn autopilot_config(&self) -> Option<&AutopilotConfig> {
        self.autopilot_config.as_ref()
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.planning_dir).context("failed to create planning directory")?;
        std::fs::create_dir_all(&self.log_dir).context("failed to create log directory")?;
        Ok(())
    }

    /// Flags forwarded to the agent subprocess invocation.
    pub fn agent_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.skip_permissions {
            flags.push("--dangerously-skip-permissions".to_string());
        }
        flags.push("--print".to_string());
        flags.push("--output-format".to_string());
        flags.push("stream-json".to_string());
        flags.push("--verbose".to_string());
        flags
    }

    /// `.autopilot/prd.md` first, then fall back to a top-level `PRD.md`.
    fn find_prd_file(project_dir: &PathBuf) -> Result<PathBuf> {
        let planning_prd = project_dir.join(PLANNING_DIR).join("prd.md");
        if planning_prd.exists() {
            return Ok(planning_prd);
        }
        let root_prd = project_dir.join("PRD.md");
        if root_prd.exists() {
            return Ok(root_prd);
        }
        Err(anyhow!(
            "no PRD file found. Create .autopilot/prd.md, a top-level PRD.md, or pass --prd"
        ))
    }
}

/// Parse a CLI phase-filter spec like `"1-3,5,7-9"` into a sorted, deduplicated
/// set of literal phase-number strings.
pub fn parse_phase_filter(spec: &str) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start
                .trim()
                .parse()
                .with_context(|| format!("invalid phase range start in '{part}'"))?;
            let end: u32 = end
                .trim()
                .parse()
                .with_context(|| format!("invalid phase range end in '{part}'"))?;
            if start > end {
                return Err(anyhow!("invalid phase range '{part}': start exceeds end"));
            }
            for n in start..=end {
                out.insert(n.to_string());
            }
        } else {
            out.insert(part.to_string());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn setup_prd(dir: &std::path::Path) -> PathBuf {
        let planning = dir.join(".autopilot");
        fs::create_dir_all(&planning).unwrap();
        let prd = planning.join("prd.md");
        fs::write(&prd, "# Test PRD").unwrap();
        prd
    }

    #[test]
    fn config_new_with_explicit_prd() {
        let dir = tempdir().unwrap();
        let prd = setup_prd(dir.path());
        let args = ConfigArgs {
            prd_path: Some(prd.clone()),
            verbose: true,
            ..Default::default()
        };
        let config = Config::new(dir.path().to_path_buf(), args).unwrap();
        assert!(config.verbose);
        assert_eq!(config.prd_path, prd.canonicalize().unwrap());
        assert_eq!(
            config.phases_file,
            dir.path().canonicalize().unwrap().join(".autopilot/phases.json")
        );
    }

    #[test]
    fn config_state_file_in_planning_directory() {
        let dir = tempdir().unwrap();
        let prd = setup_prd(dir.path());
        let args = ConfigArgs {
            prd_path: Some(prd),
            ..Default::default()
        };
        let config = Config::new(dir.path().to_path_buf(), args).unwrap();
        assert_eq!(
            config.state_file,
            dir.path()
                .canonicalize()
                .unwrap()
                .join(".autopilot/autopilot-state.json")
        );
    }

    #[test]
    fn config_new_with_auto_discovery() {
        let dir = tempdir().unwrap();
        let prd = setup_prd(dir.path());
        let args = ConfigArgs::default();
        let config = Config::new(dir.path().to_path_buf(), args).unwrap();
        assert_eq!(config.prd_path, prd.canonicalize().unwrap());
    }

    #[test]
    fn config_new_no_prd_file_errors() {
        let dir = tempdir().unwrap();
        let result = Config::new(dir.path().to_path_buf(), ConfigArgs::default());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("no PRD file found"));
    }

    #[test]
    fn ensure_directories_creates_planning_and_log_dirs() {
        let dir = tempdir().unwrap();
        let prd = setup_prd(dir.path());
        let args = ConfigArgs {
            prd_path: Some(prd),
            ..Default::default()
        };
        let config = Config::new(dir.path().to_path_buf(), args).unwrap();
        config.ensure_directories().unwrap();
        assert!(config.planning_dir.exists());
        assert!(config.log_dir.exists());
    }

    #[test]
    fn parse_phase_filter_handles_ranges_and_singles() {
        let set = parse_phase_filter("1-3,5,7-9").unwrap();
        let expected: BTreeSet<String> = ["1", "2", "3", "5", "7", "8", "9"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn parse_phase_filter_rejects_inverted_range() {
        assert!(parse_phase_filter("9-1").is_err());
    }

    #[test]
    fn parse_phase_filter_dedupes() {
        let set = parse_phase_filter("1,1,2").unwrap();
        assert_eq!(set.len(), 2);
    }
}
