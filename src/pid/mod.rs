//! Per-branch PID file tracking and process lifecycle control.
//!
//! Grounded on the daemon-lifecycle write/cleanup idiom in the example pack's
//! standalone daemon lifecycle module: a plain PID file opened with
//! `create(true).truncate(true)`, best-effort removal on cleanup
//! (`if path.exists() { let _ = remove_file(...) }`). That module uses
//! `fs2`'s exclusive-lock machinery for a single daemon-wide lock file; this
//! manager doesn't need that since each branch gets its own PID file and
//! there is no cross-process mutual exclusion to enforce, so it's plain
//! `std::fs` plus a `libc::kill` liveness probe.

use crate::errors::PidError;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct PidManager {
    dir: PathBuf,
}

impl PidManager {
    pub fn new(pid_dir: &Path) -> Self {
        Self {
            dir: pid_dir.to_path_buf(),
        }
    }

    fn pid_path(&self, branch: &str) -> PathBuf {
        self.dir
            .join(format!("autopilot-{}.pid", sanitize_branch(branch)))
    }

    pub fn write_pid(&self, branch: &str, pid: u32) -> Result<(), PidError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.pid_path(branch), pid.to_string())?;
        Ok(())
    }

    pub fn read_pid(&self, branch: &str) -> Option<u32> {
        std::fs::read_to_string(self.pid_path(branch))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn cleanup_pid(&self, branch: &str) {
        let path = self.pid_path(branch);
        if path.exists() {
            let _ = std::fs::remove_file(&path);
        }
    }

    /// `None` if no PID is on record; `Some(true)` if it's still alive.
    pub fn is_running(&self, branch: &str) -> Option<bool> {
        self.read_pid(branch).map(is_process_running)
    }

    /// `SIGTERM`, then poll for exit, escalating to `SIGKILL` after `timeout`.
    pub fn stop_process(&self, branch: &str, timeout: Duration) -> Result<(), PidError> {
        let Some(pid) = self.read_pid(branch) else {
            return Err(PidError::NotRunning {
                branch: branch.to_string(),
            });
        };

        send_signal(pid, libc::SIGTERM);

        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if !is_process_running(pid) {
                self.cleanup_pid(branch);
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        if is_process_running(pid) {
            send_signal(pid, libc::SIGKILL);
            std::thread::sleep(Duration::from_millis(100));
        }

        self.cleanup_pid(branch);
        if is_process_running(pid) {
            return Err(PidError::StopTimedOut {
                pid: pid as i32,
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }
}

fn sanitize_branch(branch: &str) -> String {
    branch.replace('/', "--")
}

/// A zero-signal `kill` probes existence without actually signaling. `ESRCH`
/// means the process is gone; `EPERM` means it exists but we don't own it.
pub fn is_process_running(pid: u32) -> bool {
    let rc = unsafe { libc::kill(pid as i32, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

fn send_signal(pid: u32, signal: i32) {
    unsafe {
        libc::kill(pid as i32, signal);
    }
}
