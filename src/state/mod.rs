//! The authoritative autopilot state: global status, current position, and
//! the phase list. Per-branch port/PID bookkeeping lives in its own sidecar
//! files (`src/port`, `src/pid`) rather than here, so that assigning a port
//! or recording a PID never contends with a state save (see SPEC_FULL.md's
//! shared-resource policy).

mod store;

pub use store::StateStore;

use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    WaitingForHuman,
    Error,
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutopilotState {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub phases: Vec<Phase>,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    /// Phase numbers this run actually selected (e.g. via `--phases 1,3`).
    /// `None` means every phase in `phases` is in scope. Phases outside this
    /// set stay `Idle` forever and must not count against `progress`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_phases: Option<Vec<String>>,
}

impl AutopilotState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            status: RunStatus::Idle,
            current_phase: None,
            current_step: None,
            phases: Vec::new(),
            started_at: now,
            last_updated_at: now,
            active_phases: None,
        }
    }

    /// `done_steps / (phases * 4) * 100`, rounded, over the active phase set
    /// only — phases excluded by a `--phases` filter stay `Idle` and would
    /// otherwise cap progress below 100% even once every selected phase
    /// finishes. Skipped steps count as done.
    pub fn progress(&self) -> u32 {
        let phases: Vec<&Phase> = match &self.active_phases {
            Some(active) => self
                .phases
                .iter()
                .filter(|p| active.contains(&p.number))
                .collect(),
            None => self.phases.iter().collect(),
        };
        if phases.is_empty() {
            return 0;
        }
        let total = phases.len() as f64 * 4.0;
        let done: f64 = phases
            .iter()
            .map(|p| {
                use crate::phase::StepStatus::{Done, Skipped};
                [&p.steps.discuss, &p.steps.plan, &p.steps.execute, &p.steps.verify]
                    .iter()
                    .filter(|s| matches!(s.status, Done | Skipped))
                    .count() as f64
            })
            .sum();
        ((done / total) * 100.0).round() as u32
    }
}

impl Default for AutopilotState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{Phase, StepName, StepStatus};

    #[test]
    fn progress_is_zero_with_no_phases() {
        assert_eq!(AutopilotState::new().progress(), 0);
    }

    #[test]
    fn progress_counts_skipped_steps_as_done() {
        let mut state = AutopilotState::new();
        let mut phase = Phase::new("1", "p1");
        phase.steps.discuss.status = StepStatus::Done;
        phase.steps.plan.status = StepStatus::Skipped;
        state.phases.push(phase);
        assert_eq!(state.progress(), 50);
    }

    #[test]
    fn progress_is_monotonic_as_steps_complete() {
        let mut state = AutopilotState::new();
        state.phases.push(Phase::new("1", "p1"));
        let before = state.progress();
        state.phases[0].steps.get_mut(StepName::Discuss).status = StepStatus::Done;
        let after = state.progress();
        assert!(after >= before);
    }

    #[test]
    fn progress_ignores_phases_outside_the_active_set() {
        let mut state = AutopilotState::new();
        for number in ["1", "2", "3", "4"] {
            state.phases.push(Phase::new(number, "p"));
        }
        state.active_phases = Some(vec!["1".to_string(), "3".to_string()]);

        for number in ["1", "3"] {
            let phase = state.phases.iter_mut().find(|p| p.number == number).unwrap();
            for step in StepName::ORDER {
                phase.steps.get_mut(step).status = StepStatus::Done;
            }
        }

        assert_eq!(state.progress(), 100);
    }
}
