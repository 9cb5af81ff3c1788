//! The phase/step state machine driving the external agent.
//!
//! Grounded on the upstream `run_orchestrator` per-phase loop: walk the phase
//! list in order, drive each through a fixed sequence, persist after every
//! step, and surface failures through a human-facing gate. Restructured here
//! around the spec's strict discuss/plan/execute/verify steps, a capped
//! gap-detection re-loop after verify, and retry-then-escalate on failure
//! (rather than the teacher's iteration-budget-per-phase loop).

use crate::agent::stream::extract_gaps;
use crate::agent::{AgentIntegration, CommandOptions};
use crate::config::Config;
use crate::errors::OrchestratorError;
use crate::logger::{LogLevel, RingBufferLogger};
use crate::phase::{PhaseStatus, PhasesFile, StepName, StepStatus};
use crate::question::{Answers, QuestionHandler, QuestionItem, QuestionOption};
use crate::state::{RunStatus, StateStore};
use crate::tracker::GitTracker;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    PhaseStarted { phase: String },
    PhaseCompleted { phase: String },
    StepStarted { phase: String, step: String },
    StepCompleted { phase: String, step: String },
    ErrorEscalation {
        phase: String,
        step: String,
        message: String,
    },
    BuildComplete,
}

pub struct Orchestrator {
    config: Config,
    state: Arc<StateStore>,
    logger: Arc<RingBufferLogger>,
    agent: Arc<AgentIntegration>,
    questions: Arc<QuestionHandler>,
    git: Option<GitTracker>,
    events: broadcast::Sender<OrchestratorEvent>,
    aborting: AtomicBool,
}

enum Escalation {
    Retry,
    Skip,
    Abort,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        state: Arc<StateStore>,
        logger: Arc<RingBufferLogger>,
        agent: Arc<AgentIntegration>,
        questions: Arc<QuestionHandler>,
        git: Option<GitTracker>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            state,
            logger,
            agent,
            questions,
            git,
            events,
            aborting: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    pub fn request_shutdown(&self) {
        self.aborting.store(true, Ordering::SeqCst);
    }

    fn is_aborting(&self) -> bool {
        self.aborting.load(Ordering::SeqCst)
    }

    /// Seed state with `phases_file`'s phases unless state already carries a
    /// phase list (resume).
    pub async fn prepare(&self, phases_file: &PhasesFile) -> Result<(), OrchestratorError> {
        let existing = self.state.get_state().await;
        if existing.phases.is_empty() {
            self.state
                .set_state(|s| s.phases = phases_file.phases.clone())
                .await?;
        }
        Ok(())
    }

    pub async fn run(&self) -> Result<(), OrchestratorError> {
        self.state
            .set_state(|s| s.status = RunStatus::Running)
            .await?;

        let phase_numbers: Vec<String> = {
            let snapshot = self.state.get_state().await;
            snapshot
                .phases
                .iter()
                .filter(|p| self.phase_is_selected(&p.number))
                .map(|p| p.number.clone())
                .collect()
        };
        self.state
            .set_state(|s| s.active_phases = Some(phase_numbers.clone()))
            .await?;

        for number in phase_numbers {
            if self.is_aborting() {
                break;
            }
            let already_done = {
                let snapshot = self.state.get_state().await;
                snapshot
                    .phases
                    .iter()
                    .find(|p| p.number == number)
                    .map(|p| matches!(p.status, PhaseStatus::Done))
                    .unwrap_or(false)
            };
            if already_done {
                continue;
            }

            match self.run_phase(&number).await {
                Ok(()) => {}
                Err(OrchestratorError::Escalated { .. }) => {
                    self.state.set_state(|s| s.status = RunStatus::Error).await?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }

            if self.is_aborting() {
                break;
            }
        }

        if self.is_aborting() {
            self.questions.reject_all().await;
            self.state.save().await?;
            return Ok(());
        }

        self.state
            .set_state(|s| s.status = RunStatus::Complete)
            .await?;
        let _ = self.events.send(OrchestratorEvent::BuildComplete);
        Ok(())
    }

    fn phase_is_selected(&self, number: &str) -> bool {
        match &self.config.phase_filter {
            Some(set) => set.contains(number),
            None => true,
        }
    }

    async fn run_phase(&self, number: &str) -> Result<(), OrchestratorError> {
        let before_sha = self
            .git
            .as_ref()
            .and_then(|g| g.snapshot_before(number).ok());

        self.state
            .replace_phase(number, |p| {
                if matches!(p.status, PhaseStatus::Idle) {
                    p.started_at = Some(chrono::Utc::now());
                }
                p.status = PhaseStatus::InProgress;
            })
            .await?;
        self.state
            .set_state(|s| s.current_phase = Some(number.to_string()))
            .await?;
        let _ = self.events.send(OrchestratorEvent::PhaseStarted {
            phase: number.to_string(),
        });

        loop {
            let pending_step = {
                let snapshot = self.state.get_state().await;
                snapshot
                    .phases
                    .iter()
                    .find(|p| p.number == number)
                    .and_then(|p| p.steps.first_pending())
            };

            let Some(step) = pending_step else {
                break;
            };

            if self.should_skip(step) {
                self.state
                    .replace_phase(number, |p| {
                        p.steps.get_mut(step).status = StepStatus::Skipped;
                    })
                    .await?;
                continue;
            }

            if self.is_aborting() {
                return Ok(());
            }

            self.run_step(number, step).await?;

            if step == StepName::Verify {
                self.run_gap_detection(number).await?;
            }
        }

        if let (Some(git), Some(before_sha)) = (&self.git, before_sha) {
            if let Ok(commits) = git.list_commits_since(&before_sha) {
                self.state
                    .replace_phase(number, |p| p.commits = commits)
                    .await?;
            }
        }

        self.state
            .replace_phase(number, |p| {
                p.completed_at = Some(chrono::Utc::now());
                p.recompute_status();
            })
            .await?;
        let _ = self.events.send(OrchestratorEvent::PhaseCompleted {
            phase: number.to_string(),
        });
        Ok(())
    }

    fn should_skip(&self, step: StepName) -> bool {
        (step == StepName::Discuss && self.config.skip_discuss)
            || (step == StepName::Verify && self.config.skip_verify)
    }

    /// Run one step: call the agent, retry up to `retry_limit` times, escalate
    /// once exhausted. Boxed because it can recurse through `escalate`'s
    /// retry branch.
    fn run_step<'a>(
        &'a self,
        number: &'a str,
        step: StepName,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), OrchestratorError>> + 'a>> {
        Box::pin(async move {
            self.state
                .replace_phase(number, |p| {
                    let s = p.steps.get_mut(step);
                    s.status = StepStatus::InProgress;
                    s.started_at = Some(chrono::Utc::now());
                })
                .await?;
            self.state
                .set_state(|s| s.current_step = Some(step.to_string()))
                .await?;
            let _ = self.events.send(OrchestratorEvent::StepStarted {
                phase: number.to_string(),
                step: step.to_string(),
            });

            let prompt = self.build_prompt(number, step);
            let mut attempt = 0u32;
            loop {
                let result = self
                    .agent
                    .run_command(
                        &prompt,
                        CommandOptions {
                            timeout_ms: self.config.agent_timeout_ms,
                            cwd: self.config.project_dir.clone(),
                            phase: Some(number.to_string()),
                            step: Some(step.to_string()),
                        },
                    )
                    .await;

                match result {
                    Ok(cmd_result) if cmd_result.success => {
                        if step == StepName::Verify {
                            let gaps = cmd_result.result.as_deref().map(extract_gaps);
                            self.state
                                .replace_phase(number, |p| p.verification.last_gaps = gaps)
                                .await?;
                        }
                        self.state
                            .replace_phase(number, |p| {
                                let s = p.steps.get_mut(step);
                                s.status = StepStatus::Done;
                                s.completed_at = Some(chrono::Utc::now());
                            })
                            .await?;
                        let _ = self.events.send(OrchestratorEvent::StepCompleted {
                            phase: number.to_string(),
                            step: step.to_string(),
                        });
                        return Ok(());
                    }
                    Ok(cmd_result) => {
                        let message = cmd_result
                            .error
                            .unwrap_or_else(|| "unknown agent failure".to_string());
                        if attempt < self.config.retry_limit {
                            attempt += 1;
                            self.logger
                                .log(
                                    LogLevel::Warn,
                                    "orchestrator",
                                    format!("step {step} failed, retrying: {message}"),
                                    Some(number.to_string()),
                                    Some(step.to_string()),
                                    None,
                                )
                                .await;
                            continue;
                        }
                        return self.escalate(number, step, &message).await;
                    }
                    Err(e) => {
                        if attempt < self.config.retry_limit {
                            attempt += 1;
                            continue;
                        }
                        return self.escalate(number, step, &e.to_string()).await;
                    }
                }
            }
        })
    }

    async fn run_gap_detection(&self, number: &str) -> Result<(), OrchestratorError> {
        loop {
            let (gaps, iterations) = {
                let snapshot = self.state.get_state().await;
                let phase = snapshot.phases.iter().find(|p| p.number == number).unwrap();
                (
                    phase.verification.last_gaps.clone().unwrap_or_default(),
                    phase.verification.gap_iterations,
                )
            };

            if gaps.is_empty() {
                return Ok(());
            }
            if iterations >= self.config.gap_iteration_cap {
                return self
                    .escalate(
                        number,
                        StepName::Verify,
                        &format!("gap-detection cap reached with {} unresolved gaps", gaps.len()),
                    )
                    .await;
            }

            self.state
                .replace_phase(number, |p| {
                    p.verification.gap_iterations += 1;
                    p.steps.plan.status = StepStatus::Idle;
                    p.steps.execute.status = StepStatus::Idle;
                    p.steps.verify.status = StepStatus::Idle;
                })
                .await?;

            self.run_step(number, StepName::Plan).await?;
            self.run_step(number, StepName::Execute).await?;
            self.run_step(number, StepName::Verify).await?;
        }
    }

    fn escalate<'a>(
        &'a self,
        number: &'a str,
        step: StepName,
        message: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), OrchestratorError>> + 'a>> {
        Box::pin(async move {
            self.state
                .replace_phase(number, |p| {
                    p.steps.get_mut(step).status = StepStatus::Failed;
                })
                .await?;
            self.state
                .set_state(|s| s.status = RunStatus::WaitingForHuman)
                .await?;
            let _ = self.events.send(OrchestratorEvent::ErrorEscalation {
                phase: number.to_string(),
                step: step.to_string(),
                message: message.to_string(),
            });

            let question = QuestionItem {
                question: format!(
                    "Phase {number} step {step} failed: {message}. How should we proceed?"
                ),
                header: "Escalation".to_string(),
                multi_select: false,
                options: vec![
                    QuestionOption {
                        label: "retry".to_string(),
                        description: "Run the step again".to_string(),
                    },
                    QuestionOption {
                        label: "skip".to_string(),
                        description: "Mark the step skipped and continue".to_string(),
                    },
                    QuestionOption {
                        label: "abort".to_string(),
                        description: "Stop the run".to_string(),
                    },
                ],
            };

            let (_id, rx) = self
                .questions
                .handle_question(
                    vec![question.clone()],
                    Some(number.to_string()),
                    Some(step.to_string()),
                )
                .await;
            let decision = match rx.await {
                Ok(answers) => parse_escalation_decision(&answers, &question.question),
                Err(_) => Escalation::Abort,
            };

            match decision {
                Escalation::Retry => {
                    self.state
                        .replace_phase(number, |p| p.steps.get_mut(step).status = StepStatus::Idle)
                        .await?;
                    self.state
                        .set_state(|s| s.status = RunStatus::Running)
                        .await?;
                    self.run_step(number, step).await
                }
                Escalation::Skip => {
                    self.state
                        .replace_phase(number, |p| p.steps.get_mut(step).status = StepStatus::Skipped)
                        .await?;
                    self.state
                        .set_state(|s| s.status = RunStatus::Running)
                        .await?;
                    Ok(())
                }
                Escalation::Abort => {
                    self.aborting.store(true, Ordering::SeqCst);
                    Err(OrchestratorError::Escalated {
                        phase: number.to_string(),
                        step: step.to_string(),
                        message: message.to_string(),
                    })
                }
            }
        })
    }

    fn build_prompt(&self, number: &str, step: StepName) -> String {
        let prd = std::fs::read_to_string(&self.config.prd_path)
            .unwrap_or_else(|e| format!("[ERROR: could not read PRD file: {e}]"));
        format!(
            "## PRD\n\n{prd}\n\n## TASK\n\nPhase {number}, step `{step}`. Depth: {}. Model profile: {}.\n",
            self.config.depth, self.config.model
        )
    }
}

fn parse_escalation_decision(answers: &Answers, question_text: &str) -> Escalation {
    match answers.get(question_text).map(String::as_str) {
        Some("retry") => Escalation::Retry,
        Some("skip") => Escalation::Skip,
        _ => Escalation::Abort,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::QuestionOption as QOpt;
    use std::collections::HashMap;

    #[test]
    fn parse_escalation_decision_reads_matching_answer() {
        let mut answers = HashMap::new();
        answers.insert("q".to_string(), "skip".to_string());
        assert!(matches!(
            parse_escalation_decision(&answers, "q"),
            Escalation::Skip
        ));
    }

    #[test]
    fn parse_escalation_decision_defaults_to_abort_on_unknown_answer() {
        let answers = HashMap::new();
        assert!(matches!(
            parse_escalation_decision(&answers, "q"),
            Escalation::Abort
        ));
    }

    #[test]
    fn question_option_label_round_trips() {
        let opt = QOpt {
            label: "retry".to_string(),
            description: "again".to_string(),
        };
        assert_eq!(opt.label, "retry");
    }
}
