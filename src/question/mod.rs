//! Deferred-completion registry correlating question ids to the agent-side
//! callers blocked awaiting a human answer.
//!
//! Grounded on the pack's permission-request-manager pattern: a map from
//! opaque id to a `oneshot::Sender`, behind an async `RwLock` so concurrent
//! HTTP-side resolution and agent-side polling never race.

use crate::errors::QuestionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{RwLock, broadcast, oneshot};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum QuestionEvent {
    Pending(PendingQuestion),
    Answered { id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionItem {
    pub question: String,
    pub header: String,
    #[serde(rename = "multiSelect")]
    pub multi_select: bool,
    pub options: Vec<QuestionOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingQuestion {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub questions: Vec<QuestionItem>,
}

/// Answer map: original question text -> chosen label (multi-select labels
/// joined with `, `).
pub type Answers = HashMap<String, String>;

struct Handle {
    pending: PendingQuestion,
    sender: oneshot::Sender<Answers>,
}

pub struct QuestionHandler {
    handles: RwLock<HashMap<String, Handle>>,
    events: broadcast::Sender<QuestionEvent>,
}

impl QuestionHandler {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            handles: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QuestionEvent> {
        self.events.subscribe()
    }

    /// Register a new pending question and return a receiver the caller
    /// awaits until a human answers (or the registry is rejected wholesale).
    pub async fn handle_question(
        &self,
        questions: Vec<QuestionItem>,
        phase: Option<String>,
        step: Option<String>,
    ) -> (String, oneshot::Receiver<Answers>) {
        let id = Uuid::new_v4().to_string();
        let pending = PendingQuestion {
            id: id.clone(),
            created_at: Utc::now(),
            phase,
            step,
            questions,
        };
        let (tx, rx) = oneshot::channel();
        let handle = Handle {
            pending,
            sender: tx,
        };
        self.handles.write().await.insert(id.clone(), handle);
        let _ = self.events.send(QuestionEvent::Pending(
            self.handles.read().await.get(&id).unwrap().pending.clone(),
        ));
        (id, rx)
    }

    /// Resolve a pending question. Returns an error if the id is unknown (it
    /// may never have existed, or may already have been answered/rejected).
    pub async fn submit_answer(&self, id: &str, answers: Answers) -> Result<(), QuestionError> {
        let handle = self
            .handles
            .write()
            .await
            .remove(id)
            .ok_or_else(|| QuestionError::UnknownId { id: id.to_string() })?;
        // A closed receiver (the awaiting caller gave up) is not an error here;
        // the answer simply has nowhere to go.
        let _ = handle.sender.send(answers);
        let _ = self.events.send(QuestionEvent::Answered { id: id.to_string() });
        Ok(())
    }

    pub async fn get_pending(&self) -> Vec<PendingQuestion> {
        self.handles
            .read()
            .await
            .values()
            .map(|h| h.pending.clone())
            .collect()
    }

    pub async fn get_pending_by_id(&self, id: &str) -> Option<PendingQuestion> {
        self.handles.read().await.get(id).map(|h| h.pending.clone())
    }

    /// Drop every outstanding handle; awaiting callers observe a closed
    /// channel and must treat it as rejection. Idempotent.
    pub async fn reject_all(&self) {
        self.handles.write().await.clear();
    }
}

impl Default for QuestionHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_question() -> QuestionItem {
        QuestionItem {
            question: "Which database?".to_string(),
            header: "Storage choice".to_string(),
            multi_select: false,
            options: vec![
                QuestionOption {
                    label: "Postgres".to_string(),
                    description: "relational".to_string(),
                },
                QuestionOption {
                    label: "SQLite".to_string(),
                    description: "embedded".to_string(),
                },
            ],
        }
    }

    #[tokio::test]
    async fn handle_question_then_submit_answer_resolves_the_receiver() {
        let handler = QuestionHandler::new();
        let (id, rx) = handler
            .handle_question(vec![sample_question()], None, None)
            .await;
        let mut answers = Answers::new();
        answers.insert("Which database?".to_string(), "Postgres".to_string());
        handler.submit_answer(&id, answers.clone()).await.unwrap();
        let resolved = rx.await.unwrap();
        assert_eq!(resolved, answers);
    }

    #[tokio::test]
    async fn submit_answer_for_unknown_id_errors() {
        let handler = QuestionHandler::new();
        let result = handler.submit_answer("nope", Answers::new()).await;
        assert!(matches!(result, Err(QuestionError::UnknownId { .. })));
    }

    #[tokio::test]
    async fn submit_answer_twice_fails_the_second_time() {
        let handler = QuestionHandler::new();
        let (id, _rx) = handler
            .handle_question(vec![sample_question()], None, None)
            .await;
        handler.submit_answer(&id, Answers::new()).await.unwrap();
        let second = handler.submit_answer(&id, Answers::new()).await;
        assert!(matches!(second, Err(QuestionError::UnknownId { .. })));
    }

    #[tokio::test]
    async fn reject_all_closes_outstanding_receivers() {
        let handler = QuestionHandler::new();
        let (_id, rx) = handler
            .handle_question(vec![sample_question()], None, None)
            .await;
        handler.reject_all().await;
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn generated_ids_are_unique() {
        let handler = QuestionHandler::new();
        let (id1, _) = handler
            .handle_question(vec![sample_question()], None, None)
            .await;
        let (id2, _) = handler
            .handle_question(vec![sample_question()], None, None)
            .await;
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn get_pending_lists_all_outstanding_questions() {
        let handler = QuestionHandler::new();
        handler
            .handle_question(vec![sample_question()], Some("1".to_string()), None)
            .await;
        let pending = handler.get_pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].phase.as_deref(), Some("1"));
    }
}
