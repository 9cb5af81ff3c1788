//! Typed error hierarchies for each subsystem.
//!
//! One enum per component boundary, following the same shape throughout:
//! `thiserror`-derived variants with `#[source]`/`#[from]` where a lower-level
//! error is being wrapped, and a catch-all `Other(anyhow::Error)` arm for
//! ad-hoc IO-adjacent failures at the edges.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to persist state to {path}: {source}")]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file at {path} contains corrupt JSON: {source}")]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum QuestionError {
    #[error("no pending question with id {id}")]
    UnknownId { id: String },
    #[error("question {id} was already answered")]
    AlreadyAnswered { id: String },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("an agent command is already running")]
    AlreadyRunning,
    #[error("agent command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("failed to spawn agent process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("agent stream error: {0}")]
    Stream(String),
    #[error(transparent)]
    Question(#[from] QuestionError),
}

#[derive(Debug, Error)]
pub enum PortError {
    #[error("no free port found in range starting at {base}")]
    PortsExhausted { base: u16 },
    #[error("failed to probe port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum PidError {
    #[error("no process is recorded for branch {branch}")]
    NotRunning { branch: String },
    #[error("process {pid} did not stop within {timeout_ms}ms")]
    StopTimedOut { pid: i32, timeout_ms: u64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error("phase {phase} escalated after exhausting retries on step {step}: {message}")]
    Escalated {
        phase: String,
        step: String,
        message: String,
    },
    #[error("gap-detection cap reached for phase {phase} after {iterations} iterations")]
    GapCapReached { phase: String, iterations: u32 },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_error_messages_include_path() {
        let err = StateError::PersistFailed {
            path: PathBuf::from("/tmp/autopilot-state.json"),
            source: std::io::Error::other("disk full"),
        };
        assert!(err.to_string().contains("autopilot-state.json"));
    }

    #[test]
    fn question_error_unknown_id_message() {
        let err = QuestionError::UnknownId {
            id: "q-1".to_string(),
        };
        assert!(err.to_string().contains("q-1"));
    }

    #[test]
    fn agent_error_already_running_is_distinct() {
        let err = AgentError::AlreadyRunning;
        assert_eq!(err.to_string(), "an agent command is already running");
    }

    #[test]
    fn orchestrator_error_wraps_state_error() {
        let inner = StateError::Io(std::io::Error::other("boom"));
        let err: OrchestratorError = inner.into();
        assert!(matches!(err, OrchestratorError::State(_)));
    }

    #[test]
    fn orchestrator_error_escalated_message() {
        let err = OrchestratorError::Escalated {
            phase: "2".to_string(),
            step: "execute".to_string(),
            message: "agent crashed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("phase 2"));
        assert!(msg.contains("execute"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_error<E: std::error::Error>(_: &E) {}
        assert_error(&StateError::Io(std::io::Error::other("x")));
        assert_error(&QuestionError::AlreadyAnswered {
            id: "a".to_string(),
        });
        assert_error(&AgentError::AlreadyRunning);
        assert_error(&PortError::PortsExhausted { base: 3847 });
        assert_error(&PidError::NotRunning {
            branch: "main".to_string(),
        });
        assert_error(&OrchestratorError::GapCapReached {
            phase: "1".to_string(),
            iterations: 3,
        });
    }
}
