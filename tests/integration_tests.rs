//! End-to-end CLI tests for `autopilot`.
//!
//! These exercise the scaffolding/status/reset surface through the compiled
//! binary. Driving a full `run` to completion would require an external
//! coding agent process and a long-lived server, so those paths are instead
//! covered at the orchestrator/agent-integration unit level; here we confirm
//! `run` fails fast and legibly when its preconditions (a phases file, a PRD)
//! aren't met.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn autopilot() -> Command {
    Command::cargo_bin("autopilot").unwrap()
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

fn init_project(dir: &TempDir) {
    autopilot()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

mod cli_basics {
    use super::*;

    #[test]
    fn help_succeeds() {
        autopilot().arg("--help").assert().success();
    }

    #[test]
    fn version_succeeds() {
        autopilot().arg("--version").assert().success();
    }

    #[test]
    fn no_subcommand_fails_with_usage() {
        autopilot().assert().failure();
    }
}

mod init_cmd {
    use super::*;

    #[test]
    fn creates_planning_directory_and_placeholder_prd() {
        let dir = create_temp_project();
        autopilot()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized autopilot project"));

        assert!(dir.path().join(".autopilot").is_dir());
        assert!(dir.path().join(".autopilot/autopilot-log").is_dir());
        assert!(dir.path().join(".autopilot/prd.md").is_file());
    }

    #[test]
    fn running_init_twice_is_idempotent() {
        let dir = create_temp_project();
        init_project(&dir);
        fs::write(dir.path().join(".autopilot/prd.md"), "# Real PRD").unwrap();

        autopilot()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Already initialized"));

        let content = fs::read_to_string(dir.path().join(".autopilot/prd.md")).unwrap();
        assert_eq!(content, "# Real PRD");
    }

    #[test]
    fn respects_project_dir_flag() {
        let dir = create_temp_project();
        autopilot()
            .arg("--project-dir")
            .arg(dir.path())
            .arg("init")
            .assert()
            .success();
        assert!(dir.path().join(".autopilot").is_dir());
    }
}

mod status_cmd {
    use super::*;

    #[test]
    fn reports_no_run_before_anything_starts() {
        let dir = create_temp_project();
        init_project(&dir);
        autopilot()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("no run has been started yet"));
    }
}

mod reset_cmd {
    use super::*;

    #[test]
    fn refuses_without_force() {
        let dir = create_temp_project();
        init_project(&dir);
        autopilot()
            .current_dir(dir.path())
            .arg("reset")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--force"));
    }

    #[test]
    fn removes_state_file_with_force() {
        let dir = create_temp_project();
        init_project(&dir);
        let state_path = dir.path().join(".autopilot/autopilot-state.json");
        fs::write(&state_path, "{}").unwrap();

        autopilot()
            .current_dir(dir.path())
            .arg("reset")
            .arg("--force")
            .assert()
            .success()
            .stdout(predicate::str::contains("reset complete"));

        assert!(!state_path.exists());
    }

    #[test]
    fn succeeds_even_with_no_prior_state() {
        let dir = create_temp_project();
        init_project(&dir);
        autopilot()
            .current_dir(dir.path())
            .arg("reset")
            .arg("--force")
            .assert()
            .success();
    }
}

mod run_cmd_preconditions {
    use super::*;

    #[test]
    fn fails_without_a_phases_file_when_not_resuming() {
        let dir = create_temp_project();
        init_project(&dir);
        fs::write(dir.path().join(".autopilot/prd.md"), "# A real PRD").unwrap();

        autopilot()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("no phases file"));
    }

    #[test]
    fn fails_without_a_prd() {
        // Neither `.autopilot/prd.md` nor a root `PRD.md` exists, and none
        // was passed via `--prd`.
        let dir = create_temp_project();

        autopilot()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("no PRD file found"));
    }
}
