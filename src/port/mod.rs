//! Deterministic per-branch port assignment.
//!
//! Grounded on the daemon-lifecycle idiom of keeping a small sidecar state
//! file distinct from the main state file so the two can be written
//! concurrently without contention (see `other_examples` daemon lifecycle's
//! `lock_path`/`snapshot_path` split); the hash itself uses the teacher's
//! existing `sha2` dependency.

use crate::errors::PortError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};

const BASE_PORT: u16 = 3847;
const RANGE: u16 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchPort {
    pub port: u16,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PortsFile {
    branches: HashMap<String, BranchPort>,
}

pub struct PortManager {
    path: PathBuf,
}

impl PortManager {
    pub fn new(planning_dir: &Path) -> Self {
        Self {
            path: planning_dir.join("ports.json"),
        }
    }

    /// Reuse a recorded port if it's still available; otherwise hash, probe,
    /// and persist a fresh assignment.
    pub fn assign_port(&self, branch: &str) -> Result<u16, PortError> {
        let sanitized = sanitize_branch(branch);
        let mut file = self.load();

        if let Some(existing) = file.branches.get(&sanitized) {
            if is_port_available(existing.port) {
                return Ok(existing.port);
            }
        }

        let hashed = branch_to_port(branch);
        let mut candidate = hashed;
        let mut probed = 0u16;
        loop {
            if is_port_available(candidate) {
                break;
            }
            probed += 1;
            if probed >= RANGE {
                return Err(PortError::PortsExhausted { base: BASE_PORT });
            }
            candidate = BASE_PORT + ((candidate - BASE_PORT + 1) % RANGE);
        }

        file.branches.insert(
            sanitized,
            BranchPort {
                port: candidate,
                assigned_at: Utc::now(),
            },
        );
        self.save(&file);
        Ok(candidate)
    }

    fn load(&self) -> PortsFile {
        std::fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    fn save(&self, file: &PortsFile) {
        let Ok(content) = serde_json::to_vec_pretty(file) else {
            return;
        };
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let tmp = self.path.with_extension("json.tmp");
        if let Ok(mut f) = std::fs::File::create(&tmp) {
            if f.write_all(&content).is_ok() && f.sync_all().is_ok() {
                let _ = std::fs::rename(&tmp, &self.path);
            }
        }
    }
}

/// `base + (SHA256(branch)[0..8] mod range)`.
pub fn branch_to_port(branch: &str) -> u16 {
    let digest = Sha256::digest(branch.as_bytes());
    let prefix = u64::from_be_bytes(digest[0..8].try_into().unwrap());
    BASE_PORT + (prefix % RANGE as u64) as u16
}

/// Available iff a loopback bind of this port succeeds.
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

fn sanitize_branch(branch: &str) -> String {
    branch.replace('/', "--")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn branch_to_port_is_stable_and_in_range() {
        let port = branch_to_port("main");
        assert!(port >= BASE_PORT && port < BASE_PORT + RANGE);
        assert_eq!(port, branch_to_port("main"));
    }

    #[test]
    fn different_branches_usually_hash_differently() {
        assert_ne!(branch_to_port("main"), branch_to_port("feature/x"));
    }

    #[test]
    fn sanitize_branch_replaces_path_separators() {
        assert_eq!(sanitize_branch("feature/foo"), "feature--foo");
    }

    #[test]
    fn assign_port_persists_and_reuses_assignment() {
        let dir = tempdir().unwrap();
        let manager = PortManager::new(dir.path());
        let first = manager.assign_port("main").unwrap();
        let second = manager.assign_port("main").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn assign_port_records_distinct_branches_independently() {
        let dir = tempdir().unwrap();
        let manager = PortManager::new(dir.path());
        manager.assign_port("main").unwrap();
        manager.assign_port("feature/x").unwrap();
        let file = manager.load();
        assert_eq!(file.branches.len(), 2);
        assert!(file.branches.contains_key("feature--x"));
    }
}
