//! The `/api/log/stream` SSE endpoint.
//!
//! On connect, snapshot-and-subscribe to the ring buffer as one indivisible
//! operation (see `RingBufferLogger::snapshot_and_subscribe`), then fan out
//! that snapshot as an initial burst of `log-entry` events, followed by a
//! live merge of the logger, question, and orchestrator broadcast channels.
//! A lagging subscriber (`RecvError::Lagged`) skips to latest rather than
//! dropping the connection, matching a bounded broadcast channel's natural
//! backpressure behavior.

use super::AppState;
use crate::logger::LogEntry;
use crate::orchestrator::OrchestratorEvent;
use crate::question::QuestionEvent;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

pub async fn log_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (snapshot, log_rx) = state.logger.snapshot_and_subscribe().await;
    let question_rx = state.questions.subscribe();
    let orchestrator_rx = state.orchestrator.subscribe();

    let retry = stream::once(async { Ok(Event::default().retry(Duration::from_millis(10_000))) });
    let burst = stream::iter(snapshot.into_iter().map(|entry| Ok(log_event(&entry))));
    let live = stream::unfold(
        (log_rx, question_rx, orchestrator_rx),
        |mut rxs| async move {
            loop {
                let event = tokio::select! {
                    res = rxs.0.recv() => match res {
                        Ok(entry) => log_event(&entry),
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => return None,
                    },
                    res = rxs.1.recv() => match res {
                        Ok(event) => question_event(&event),
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => return None,
                    },
                    res = rxs.2.recv() => match res {
                        Ok(event) => orchestrator_event(&event),
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => return None,
                    },
                };
                return Some((Ok(event), rxs));
            }
        },
    );

    let body = retry.chain(burst).chain(live);
    let sse = Sse::new(body).keep_alive(KeepAlive::default());
    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        sse,
    )
}

fn log_event(entry: &LogEntry) -> Event {
    Event::default()
        .event("log-entry")
        .json_data(entry)
        .unwrap_or_else(|_| Event::default().event("log-entry").data("{}"))
}

fn question_event(event: &QuestionEvent) -> Event {
    match event {
        QuestionEvent::Pending(pending) => Event::default()
            .event("question-pending")
            .json_data(pending)
            .unwrap_or_else(|_| Event::default().event("question-pending").data("{}")),
        QuestionEvent::Answered { id } => Event::default()
            .event("question-answered")
            .json_data(serde_json::json!({ "id": id }))
            .unwrap_or_else(|_| Event::default().event("question-answered").data("{}")),
    }
}

fn orchestrator_event(event: &OrchestratorEvent) -> Event {
    match event {
        OrchestratorEvent::PhaseStarted { phase } => Event::default()
            .event("phase-started")
            .json_data(serde_json::json!({ "phase": phase }))
            .unwrap_or_else(|_| Event::default().event("phase-started").data("{}")),
        OrchestratorEvent::PhaseCompleted { phase } => Event::default()
            .event("phase-completed")
            .json_data(serde_json::json!({ "phase": phase }))
            .unwrap_or_else(|_| Event::default().event("phase-completed").data("{}")),
        OrchestratorEvent::StepStarted { phase, step } => Event::default()
            .event("phase-started")
            .json_data(serde_json::json!({ "phase": phase, "step": step }))
            .unwrap_or_else(|_| Event::default().event("phase-started").data("{}")),
        OrchestratorEvent::StepCompleted { phase, step } => Event::default()
            .event("phase-completed")
            .json_data(serde_json::json!({ "phase": phase, "step": step }))
            .unwrap_or_else(|_| Event::default().event("phase-completed").data("{}")),
        OrchestratorEvent::ErrorEscalation {
            phase,
            step,
            message,
        } => Event::default()
            .event("error")
            .json_data(serde_json::json!({ "phase": phase, "step": step, "message": message }))
            .unwrap_or_else(|_| Event::default().event("error").data("{}")),
        OrchestratorEvent::BuildComplete => Event::default().event("build-complete").data("{}"),
    }
}
