//! Thin REST handlers: read a C2/C3 snapshot or invoke C3, return JSON.
//!
//! Grounded on the upstream `api.rs` router shape (an `ApiError` enum
//! implementing `IntoResponse`, handlers taking `State<SharedState>`), with
//! the route table replaced by the one this spec names.

use super::AppState;
use super::sse;
use crate::errors::QuestionError;
use crate::milestones;
use crate::question::Answers;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/phases", get(phases))
        .route("/api/questions", get(list_questions))
        .route(
            "/api/questions/:id",
            get(get_question).post(answer_question),
        )
        .route("/api/milestones", get(get_milestones))
        .route("/api/log/stream", get(sse::log_stream))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct StatusResponse {
    status: crate::state::RunStatus,
    current_phase: Option<String>,
    current_step: Option<String>,
    progress: u32,
    started_at: chrono::DateTime<chrono::Utc>,
    last_updated_at: chrono::DateTime<chrono::Utc>,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let snapshot = state.state.get_state().await;
    Json(StatusResponse {
        status: snapshot.status,
        current_phase: snapshot.current_phase.clone(),
        current_step: snapshot.current_step.clone(),
        progress: snapshot.progress(),
        started_at: snapshot.started_at,
        last_updated_at: snapshot.last_updated_at,
    })
}

#[derive(Serialize)]
struct PhasesResponse {
    phases: Vec<crate::phase::Phase>,
}

async fn phases(State(state): State<Arc<AppState>>) -> Json<PhasesResponse> {
    let snapshot = state.state.get_state().await;
    Json(PhasesResponse {
        phases: snapshot.phases,
    })
}

#[derive(Serialize)]
struct QuestionsResponse {
    questions: Vec<crate::question::PendingQuestion>,
}

async fn list_questions(State(state): State<Arc<AppState>>) -> Json<QuestionsResponse> {
    Json(QuestionsResponse {
        questions: state.questions.get_pending().await,
    })
}

async fn get_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<crate::question::PendingQuestion>, ApiError> {
    state
        .questions
        .get_pending_by_id(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no pending question with id {id}")))
}

#[derive(Deserialize)]
struct AnswerRequest {
    answers: Answers,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

async fn answer_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<AnswerRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(payload) = body.map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state
        .questions
        .submit_answer(&id, payload.answers)
        .await
        .map_err(|e| match e {
            QuestionError::UnknownId { id } => {
                ApiError::NotFound(format!("no pending question with id {id}"))
            }
            QuestionError::AlreadyAnswered { id } => {
                ApiError::NotFound(format!("question {id} was already answered"))
            }
        })?;
    Ok(Json(OkResponse { ok: true }))
}

async fn get_milestones(State(state): State<Arc<AppState>>) -> Response {
    match milestones::load(&state.project_dir) {
        Some(m) => Json(m).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentIntegration;
    use crate::config::{Config, ConfigArgs};
    use crate::logger::RingBufferLogger;
    use crate::orchestrator::Orchestrator;
    use crate::question::QuestionHandler;
    use crate::state::StateStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::time::Instant;
    use tower::ServiceExt;

    fn test_state(dir: &std::path::Path) -> Arc<AppState> {
        std::fs::write(dir.join("PRD.md"), "# Test PRD").unwrap();
        let config = Config::new(dir.to_path_buf(), ConfigArgs::default()).unwrap();
        let logger = Arc::new(RingBufferLogger::new(10));
        let questions = Arc::new(QuestionHandler::new());
        let state = Arc::new(StateStore::load(config.state_file.clone()).unwrap());
        let agent = Arc::new(AgentIntegration::new(
            config.agent_cmd.clone(),
            config.agent_flags(),
            logger.clone(),
            questions.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            config.clone(),
            state.clone(),
            logger.clone(),
            agent,
            questions.clone(),
            None,
        ));
        Arc::new(AppState {
            state,
            logger,
            questions,
            orchestrator,
            project_dir: config.project_dir.clone(),
            started_at: Instant::now(),
        })
    }

    #[tokio::test]
    async fn status_reports_idle_progress_with_no_phases() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router().with_state(test_state(dir.path()));
        let req = Request::builder()
            .uri("/api/status")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["progress"], 0);
    }

    #[tokio::test]
    async fn unknown_question_id_returns_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router().with_state(test_state(dir.path()));
        let req = Request::builder()
            .uri("/api/questions/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn answering_a_pending_question_resolves_it() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let (id, _rx) = state
            .questions
            .handle_question(
                vec![crate::question::QuestionItem {
                    question: "Which database?".to_string(),
                    header: "Storage".to_string(),
                    multi_select: false,
                    options: vec![],
                }],
                None,
                None,
            )
            .await;
        let app = api_router().with_state(state);
        let req = Request::builder()
            .method("POST")
            .uri(format!("/api/questions/{id}"))
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"answers": {"Which database?": "Postgres"}}).to_string(),
            ))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn milestones_route_returns_no_content_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router().with_state(test_state(dir.path()));
        let req = Request::builder()
            .uri("/api/milestones")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
