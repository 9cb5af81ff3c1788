//! Wraps the external coding agent as a single-flight subprocess command.
//!
//! Grounded on the upstream orchestrator runner: the agent is spawned with
//! piped stdio, the prompt is written to stdin, and stdout is read line by
//! line as a tagged JSON stream, falling back to raw accumulation on a parse
//! failure so non-JSON diagnostic output isn't lost. Extended with: a
//! cooperative timeout, an `AlreadyRunning` single-flight guard, and
//! interception of the question tool routed through the question handler.

pub mod stream;

use crate::errors::AgentError;
use crate::logger::{LogLevel, RingBufferLogger};
use crate::question::{Answers, QuestionHandler, QuestionItem};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use stream::{ContentBlock, StreamEvent, QUESTION_TOOL_NAME};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct CommandOptions {
    pub timeout_ms: u64,
    pub cwd: PathBuf,
    pub phase: Option<String>,
    pub step: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,
}

pub struct AgentIntegration {
    agent_cmd: String,
    agent_flags: Vec<String>,
    logger: Arc<RingBufferLogger>,
    questions: Arc<QuestionHandler>,
    busy: AtomicBool,
}

impl AgentIntegration {
    pub fn new(
        agent_cmd: String,
        agent_flags: Vec<String>,
        logger: Arc<RingBufferLogger>,
        questions: Arc<QuestionHandler>,
    ) -> Self {
        Self {
            agent_cmd,
            agent_flags,
            logger,
            questions,
            busy: AtomicBool::new(false),
        }
    }

    pub async fn run_command(
        &self,
        prompt: &str,
        opts: CommandOptions,
    ) -> Result<CommandResult, AgentError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AgentError::AlreadyRunning);
        }
        let result = self.run_command_inner(prompt, opts).await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    async fn run_command_inner(
        &self,
        prompt: &str,
        opts: CommandOptions,
    ) -> Result<CommandResult, AgentError> {
        let started = std::time::Instant::now();
        let timeout = Duration::from_millis(opts.timeout_ms);

        let mut child = Command::new(&self.agent_cmd)
            .args(&self.agent_flags)
            .current_dir(&opts.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(AgentError::Spawn)?;

        let mut stdin = child.stdin.take().expect("stdin was piped");
        stdin
            .write_all(prompt.as_bytes())
            .await
            .map_err(AgentError::Spawn)?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let reader = BufReader::new(stdout);

        let consume = self.consume_stream(reader, stdin, opts.phase.clone(), opts.step.clone());

        let outcome = tokio::time::timeout(timeout, consume).await;

        match outcome {
            Ok(result) => {
                let _ = child.wait().await;
                let mut result = result?;
                result.duration_ms = started.elapsed().as_millis() as u64;
                Ok(result)
            }
            Err(_) => {
                let _ = child.kill().await;
                self.questions.reject_all().await;
                Err(AgentError::Timeout {
                    timeout_ms: opts.timeout_ms,
                })
            }
        }
    }

    async fn consume_stream(
        &self,
        mut reader: BufReader<tokio::process::ChildStdout>,
        mut stdin: tokio::process::ChildStdin,
        phase: Option<String>,
        step: Option<String>,
    ) -> Result<CommandResult, AgentError> {
        let mut session_id: Option<String> = None;
        let mut final_result: Option<String> = None;
        let mut is_error = false;
        let mut cost_usd = None;
        let mut num_turns = None;
        let mut accumulated = String::new();

        let mut line = String::new();
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .await
                .map_err(|e| AgentError::Stream(e.to_string()))?;
            if read == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<StreamEvent>(trimmed) {
                Ok(StreamEvent::System { session_id: sid, .. }) => {
                    if sid.is_some() {
                        session_id = sid;
                    }
                }
                Ok(StreamEvent::Assistant { message, .. }) => {
                    for block in message.content {
                        match block {
                            ContentBlock::ToolUse { name, input, id } if name == QUESTION_TOOL_NAME => {
                                let (questions, answers) = self
                                    .intercept_question(input, phase.clone(), step.clone())
                                    .await;
                                self.reply_tool_result(&mut stdin, &id, &questions, &answers)
                                    .await?;
                            }
                            ContentBlock::ToolUse { name, input, .. } => {
                                self.logger
                                    .log(
                                        LogLevel::Debug,
                                        "agent",
                                        stream::describe_tool_use(&name, &input),
                                        phase.clone(),
                                        step.clone(),
                                        None,
                                    )
                                    .await;
                            }
                            ContentBlock::Text { text } => {
                                accumulated.push_str(&text);
                            }
                        }
                    }
                }
                Ok(StreamEvent::Result {
                    result,
                    is_error: err,
                    total_cost_usd,
                    num_turns: turns,
                    ..
                }) => {
                    final_result = result;
                    is_error = err;
                    cost_usd = total_cost_usd;
                    num_turns = turns;
                }
                Ok(StreamEvent::User { .. }) => {}
                Err(_) => accumulated.push_str(trimmed),
            }
        }

        let text = final_result.or(if accumulated.is_empty() {
            None
        } else {
            Some(accumulated)
        });

        Ok(CommandResult {
            success: !is_error,
            result: if is_error { None } else { text.clone() },
            error: if is_error { text } else { None },
            session_id,
            duration_ms: 0,
            cost_usd,
            num_turns,
        })
    }

    async fn intercept_question(
        &self,
        input: serde_json::Value,
        phase: Option<String>,
        step: Option<String>,
    ) -> (Vec<QuestionItem>, Answers) {
        let questions = parse_question_items(&input);
        let (_id, rx) = self
            .questions
            .handle_question(questions.clone(), phase, step)
            .await;
        self.logger
            .log(LogLevel::Info, "question", "awaiting human answer", None, None, None)
            .await;
        (questions, rx.await.unwrap_or_default())
    }

    /// Echoes back both `questions` and `answers`; the agent re-asks if
    /// either is missing from the tool result.
    async fn reply_tool_result(
        &self,
        stdin: &mut tokio::process::ChildStdin,
        tool_use_id: &str,
        questions: &[QuestionItem],
        answers: &Answers,
    ) -> Result<(), AgentError> {
        let payload = build_tool_result_payload(tool_use_id, questions, answers);
        let mut line = serde_json::to_string(&payload).map_err(|e| AgentError::Stream(e.to_string()))?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(AgentError::Spawn)
    }
}

fn build_tool_result_payload(
    tool_use_id: &str,
    questions: &[QuestionItem],
    answers: &Answers,
) -> serde_json::Value {
    serde_json::json!({
        "type": "tool_result",
        "tool_use_id": tool_use_id,
        "content": { "questions": questions, "answers": answers },
    })
}

fn parse_question_items(input: &serde_json::Value) -> Vec<QuestionItem> {
    input
        .get("questions")
        .and_then(|v| serde_json::from_value::<Vec<QuestionItem>>(v.clone()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_question_items_reads_nested_array() {
        let input = serde_json::json!({
            "questions": [
                {
                    "question": "Which database?",
                    "header": "Storage",
                    "multiSelect": false,
                    "options": [{"label": "Postgres", "description": "relational"}]
                }
            ]
        });
        let items = parse_question_items(&input);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].question, "Which database?");
    }

    #[test]
    fn parse_question_items_defaults_to_empty_on_missing_field() {
        let input = serde_json::json!({});
        assert!(parse_question_items(&input).is_empty());
    }

    #[test]
    fn tool_result_payload_carries_both_questions_and_answers() {
        let questions = vec![QuestionItem {
            question: "Which database?".to_string(),
            header: "Storage".to_string(),
            multi_select: false,
            options: vec![],
        }];
        let mut answers = Answers::new();
        answers.insert("Which database?".to_string(), "Postgres".to_string());

        let payload = build_tool_result_payload("tool-1", &questions, &answers);
        let content = &payload["content"];
        assert_eq!(content["questions"][0]["question"], "Which database?");
        assert_eq!(content["answers"]["Which database?"], "Postgres");
    }
}
