//! Phase and step data model, plus JSON loading for the phases file.
//!
//! A `Phase` carries a fixed four-step record (discuss, plan, execute, verify)
//! that must progress in that order. `PhasesFile` is the on-disk JSON shape
//! produced ahead of a run and consumed by the orchestrator.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Discuss,
    Plan,
    Execute,
    Verify,
}

impl StepName {
    pub const ORDER: [StepName; 4] = [
        StepName::Discuss,
        StepName::Plan,
        StepName::Execute,
        StepName::Verify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Discuss => "discuss",
            StepName::Plan => "plan",
            StepName::Execute => "execute",
            StepName::Verify => "verify",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Idle,
    InProgress,
    Done,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Idle,
    InProgress,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Count of retries already spent on this step invocation (capped at 1).
    #[serde(default)]
    pub retries: u32,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            status: StepStatus::Idle,
            started_at: None,
            completed_at: None,
            retries: 0,
        }
    }
}

/// The fixed four-step record carried by every phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Steps {
    pub discuss: Step,
    pub plan: Step,
    pub execute: Step,
    pub verify: Step,
}

impl Default for Steps {
    fn default() -> Self {
        Self {
            discuss: Step::default(),
            plan: Step::default(),
            execute: Step::default(),
            verify: Step::default(),
        }
    }
}

impl Steps {
    pub fn get(&self, name: StepName) -> &Step {
        match name {
            StepName::Discuss => &self.discuss,
            StepName::Plan => &self.plan,
            StepName::Execute => &self.execute,
            StepName::Verify => &self.verify,
        }
    }

    pub fn get_mut(&mut self, name: StepName) -> &mut Step {
        match name {
            StepName::Discuss => &mut self.discuss,
            StepName::Plan => &mut self.plan,
            StepName::Execute => &mut self.execute,
            StepName::Verify => &mut self.verify,
        }
    }

    /// First step that is neither `done` nor `skipped`, in fixed order.
    pub fn first_pending(&self) -> Option<StepName> {
        StepName::ORDER
            .into_iter()
            .find(|&name| !matches!(self.get(name).status, StepStatus::Done | StepStatus::Skipped))
    }

    pub fn all_resolved(&self) -> bool {
        self.first_pending().is_none()
    }

    pub fn any_failed(&self) -> bool {
        StepName::ORDER
            .into_iter()
            .any(|name| matches!(self.get(name).status, StepStatus::Failed))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationMeta {
    /// Number of gap-detection iterations (plan/execute/verify re-loops) spent on this phase.
    #[serde(default)]
    pub gap_iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_gaps: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    /// Literal string form so fractional insertions (e.g. "3.1") sort and round-trip exactly.
    pub number: String,
    pub name: String,
    #[serde(default)]
    pub steps: Steps,
    #[serde(default = "default_phase_status")]
    pub status: PhaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub verification: VerificationMeta,
}

fn default_phase_status() -> PhaseStatus {
    PhaseStatus::Idle
}

impl Phase {
    pub fn new(number: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            name: name.into(),
            steps: Steps::default(),
            status: PhaseStatus::Idle,
            started_at: None,
            completed_at: None,
            commits: Vec::new(),
            verification: VerificationMeta::default(),
        }
    }

    /// Recompute `status` from the step record. Called after every step mutation.
    pub fn recompute_status(&mut self) {
        if self.steps.any_failed() {
            self.status = PhaseStatus::Failed;
        } else if self.steps.all_resolved() {
            self.status = PhaseStatus::Done;
        } else if matches!(self.status, PhaseStatus::Idle) {
            // leave Idle until the first step actually starts
        } else {
            self.status = PhaseStatus::InProgress;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasesFile {
    pub prd_hash: String,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub phases: Vec<Phase>,
}

impl PhasesFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read phases file {}: {e}", path.display()))?;
        let parsed: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse phases file {}: {e}", path.display()))?;
        Ok(parsed)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| anyhow::anyhow!("failed to write phases file {}: {e}", path.display()))?;
        Ok(())
    }

    pub fn get_phase(&self, number: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.number == number)
    }

    pub fn get_phase_mut(&mut self, number: &str) -> Option<&mut Phase> {
        self.phases.iter_mut().find(|p| p.number == number)
    }

    /// First phase that is not `done`, in file order.
    pub fn first_pending(&self) -> Option<&Phase> {
        self.phases
            .iter()
            .find(|p| !matches!(p.status, PhaseStatus::Done))
    }
}
