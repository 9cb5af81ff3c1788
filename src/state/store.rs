//! Atomic JSON persistence for `AutopilotState`.
//!
//! `save` never writes the destination path in place: it serializes to a
//! sibling temporary file in the same directory, flushes it, then renames it
//! over the destination. A reader can therefore never observe a truncated or
//! partial state file.

use super::AutopilotState;
use crate::errors::StateError;
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use tokio::sync::Mutex;

pub struct StateStore {
    path: PathBuf,
    state: Mutex<AutopilotState>,
}

impl StateStore {
    /// Load existing state from `path`, or start fresh if absent.
    pub fn load(path: PathBuf) -> Result<Self, StateError> {
        let state = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StateError::CorruptState {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AutopilotState::new(),
            Err(e) => return Err(StateError::Io(e)),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Point-in-time snapshot; never observes a partial patch.
    pub async fn get_state(&self) -> AutopilotState {
        self.state.lock().await.clone()
    }

    /// Apply `patch` to the current state, stamp `last_updated_at`, then persist.
    pub async fn set_state<F>(&self, patch: F) -> Result<(), StateError>
    where
        F: FnOnce(&mut AutopilotState),
    {
        let mut guard = self.state.lock().await;
        patch(&mut guard);
        guard.last_updated_at = Utc::now();
        Self::persist(&self.path, &guard)
    }

    /// Mutate a single phase by its literal number string, if present.
    pub async fn replace_phase<F>(&self, number: &str, patch: F) -> Result<(), StateError>
    where
        F: FnOnce(&mut crate::phase::Phase),
    {
        let mut guard = self.state.lock().await;
        if let Some(phase) = guard.phases.iter_mut().find(|p| p.number == number) {
            patch(phase);
        }
        guard.last_updated_at = Utc::now();
        Self::persist(&self.path, &guard)
    }

    pub async fn save(&self) -> Result<(), StateError> {
        let guard = self.state.lock().await;
        Self::persist(&self.path, &guard)
    }

    fn persist(path: &Path, state: &AutopilotState) -> Result<(), StateError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = dir.join(format!(
            ".{}.{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("state"),
            process::id()
        ));

        let write = || -> std::io::Result<()> {
            let content = serde_json::to_vec_pretty(state)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&content)?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, path)?;
            Ok(())
        };

        write().map_err(|source| StateError::PersistFailed {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use crate::state::RunStatus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn round_trips_through_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("autopilot-state.json");
        let store = StateStore::load(path.clone()).unwrap();
        store
            .set_state(|s| {
                s.status = RunStatus::Running;
                s.phases.push(Phase::new("1", "first"));
            })
            .await
            .unwrap();

        let reloaded = StateStore::load(path).unwrap();
        let snapshot = reloaded.get_state().await;
        assert!(matches!(snapshot.status, RunStatus::Running));
        assert_eq!(snapshot.phases.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_starts_with_fresh_idle_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let store = StateStore::load(path).unwrap();
        let snapshot = store.get_state().await;
        assert!(matches!(snapshot.status, RunStatus::Idle));
        assert!(snapshot.phases.is_empty());
    }

    #[tokio::test]
    async fn corrupt_json_is_a_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("autopilot-state.json");
        std::fs::write(&path, b"not json").unwrap();
        let result = StateStore::load(path);
        assert!(matches!(result, Err(StateError::CorruptState { .. })));
    }

    #[tokio::test]
    async fn save_never_leaves_a_stray_temp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("autopilot-state.json");
        let store = StateStore::load(path).unwrap();
        store.save().await.unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].path().ends_with("autopilot-state.json"));
    }

    #[tokio::test]
    async fn replace_phase_mutates_matching_phase_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("autopilot-state.json");
        let store = StateStore::load(path).unwrap();
        store
            .set_state(|s| {
                s.phases.push(Phase::new("1", "a"));
                s.phases.push(Phase::new("2", "b"));
            })
            .await
            .unwrap();
        store
            .replace_phase("2", |p| p.commits.push("abc123".to_string()))
            .await
            .unwrap();
        let snapshot = store.get_state().await;
        assert!(snapshot.phases[0].commits.is_empty());
        assert_eq!(snapshot.phases[1].commits, vec!["abc123".to_string()]);
    }
}
