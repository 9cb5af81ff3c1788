//! The HTTP+SSE response server.
//!
//! Grounded on the upstream factory server: `AppState` behind `Arc`,
//! a thin API router, a static-file fallback, and `axum::serve` wrapped in
//! graceful shutdown. Adapted for a server whose routes read three
//! independently-constructible snapshots (`StateStore`, `RingBufferLogger`,
//! `QuestionHandler`) rather than a SQLite-backed `AppState`, and whose
//! static fallback serves a pre-built dashboard directory next to the
//! binary instead of an embedded `rust-embed` bundle (this crate does not
//! own or ship that dashboard).

pub mod routes;
pub mod sse;

use crate::logger::RingBufferLogger;
use crate::orchestrator::Orchestrator;
use crate::question::QuestionHandler;
use crate::state::StateStore;
use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub struct AppState {
    pub state: Arc<StateStore>,
    pub logger: Arc<RingBufferLogger>,
    pub questions: Arc<QuestionHandler>,
    pub orchestrator: Arc<Orchestrator>,
    pub project_dir: PathBuf,
    pub started_at: Instant,
}

pub struct ServerConfig {
    pub port: u16,
}

/// Build the full router: API routes, the SSE stream, and the dashboard fallback.
pub fn build_router(state: Arc<AppState>) -> Router {
    routes::api_router()
        .fallback(static_handler)
        .with_state(state)
}

/// Serve a pre-built dashboard directory next to the running binary, if
/// present; any path that isn't an exact file falls back to its index.html.
async fn static_handler(State(_state): State<Arc<AppState>>, req: Request<Body>) -> Response {
    let Some(dir) = dashboard_dir() else {
        return (
            StatusCode::NOT_FOUND,
            "dashboard assets not installed next to this binary",
        )
            .into_response();
    };

    let path = req.uri().path().trim_start_matches('/');
    if !path.is_empty() {
        let candidate = dir.join(path);
        if let Ok(bytes) = tokio::fs::read(&candidate).await {
            let mime = mime_guess::from_path(&candidate).first_or_octet_stream();
            return Response::builder()
                .header(header::CONTENT_TYPE, mime.as_ref())
                .body(Body::from(bytes))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    }

    match tokio::fs::read(dir.join("index.html")).await {
        Ok(bytes) => Html(String::from_utf8_lossy(&bytes).to_string()).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "dashboard assets not installed").into_response(),
    }
}

fn dashboard_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?.join("dashboard");
    dir.is_dir().then_some(dir)
}

/// Bind and serve, registering the bind error before accepting connections
/// (an address-in-use error surfaces as a rejection, not a later crash) and
/// running until `shutdown` resolves.
pub async fn start_server(
    config: ServerConfig,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(state);
    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "response server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("response server error")?;

    tracing::info!("response server drained and shut down");
    Ok(())
}
