//! HTTP surface for frame ingest and event queries.
//!
//! This module provides an HTTP server that:
//! - Accepts per-frame detections via POST /sessions/{id}/frames
//! - Runs them through the session coordinator
//! - Serves stored events and per-candidate summaries
//!
//! # Architecture
//!
//! ```text
//! Perception client ──→ POST /sessions/{id}/frames ──→ coordinator ──→ event sink
//!                                                                         ↓
//! Dashboard ←────────── GET /logs/{id}, GET /report/{id} ←────────────────┘
//! ```

use crate::coordinator::{CoordinatorError, SessionCoordinator};
use crate::core::{Event, SessionSnapshot};
use crate::perception::RawDetection;
use crate::sink::EventSummary;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Default number of events returned by /logs.
pub const DEFAULT_LOG_LIMIT: usize = 1000;

/// Events considered when building a report.
pub const REPORT_LIMIT: usize = 10_000;

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Coordinator owning all session state
    pub coordinator: Arc<SessionCoordinator>,
    /// How often idle sessions are swept
    pub idle_sweep_interval: Duration,
}

impl ServerConfig {
    pub fn new(port: u16, coordinator: Arc<SessionCoordinator>) -> Self {
        Self {
            port,
            coordinator,
            idle_sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Shared server state
struct ServerState {
    coordinator: Arc<SessionCoordinator>,
}

/// One frame's detections, optionally stamped with its capture time.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameRequest {
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub detection: RawDetection,
}

/// Response from the frame ingest endpoint
#[derive(Debug, Clone, Serialize)]
pub struct FrameResponse {
    pub status: String,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    pub events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_sessions: usize,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

impl From<CoordinatorError> for ApiError {
    fn from(e: CoordinatorError) -> Self {
        match e {
            CoordinatorError::ClockWentBackwards { .. } => {
                api_error(StatusCode::CONFLICT, "CLOCK_SKEW", e)
            }
            CoordinatorError::Sink { .. } | CoordinatorError::Query(_) => {
                api_error(StatusCode::BAD_GATEWAY, "SINK_ERROR", e)
            }
            CoordinatorError::SessionPoisoned(_) => {
                api_error(StatusCode::INTERNAL_SERVER_ERROR, "SESSION_POISONED", e)
            }
        }
    }
}

/// Run blocking coordinator work (sinks may do IO) off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, CoordinatorError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "TASK_FAILED", e))?
        .map_err(ApiError::from)
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: state.coordinator.active_sessions().len(),
    })
}

/// POST /sessions/{id}/frames
async fn ingest_frame(
    State(state): State<Arc<ServerState>>,
    Path(candidate_id): Path<String>,
    Json(frame): Json<FrameRequest>,
) -> Result<Json<FrameResponse>, ApiError> {
    let coordinator = Arc::clone(&state.coordinator);
    let now = frame.captured_at.unwrap_or_else(Utc::now);

    let events =
        blocking(move || coordinator.process_raw(&candidate_id, frame.detection, now)).await?;

    Ok(Json(FrameResponse {
        status: "ok".to_string(),
        events,
    }))
}

/// GET /sessions/{id}
async fn session_state(
    State(state): State<Arc<ServerState>>,
    Path(candidate_id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .coordinator
        .snapshot(&candidate_id)
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "NO_SESSION", "no active session"))
}

/// DELETE /sessions/{id}
async fn close_session(
    State(state): State<Arc<ServerState>>,
    Path(candidate_id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let coordinator = Arc::clone(&state.coordinator);
    blocking(move || Ok(coordinator.close_session(&candidate_id)))
        .await?
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "NO_SESSION", "no active session"))
}

/// GET /logs/{id}?limit=N
async fn logs(
    State(state): State<Arc<ServerState>>,
    Path(candidate_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, ApiError> {
    let coordinator = Arc::clone(&state.coordinator);
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    let events = blocking(move || coordinator.query(&candidate_id, limit)).await?;
    Ok(Json(LogsResponse { events }))
}

/// GET /report/{id}
async fn report(
    State(state): State<Arc<ServerState>>,
    Path(candidate_id): Path<String>,
) -> Result<Json<EventSummary>, ApiError> {
    let coordinator = Arc::clone(&state.coordinator);
    let summary = blocking(move || coordinator.summary(&candidate_id, REPORT_LIMIT)).await?;
    Ok(Json(summary))
}

/// Build the router without binding a socket.
pub fn router(coordinator: Arc<SessionCoordinator>) -> Router {
    let state = Arc::new(ServerState { coordinator });

    Router::new()
        .route("/health", get(health))
        .route("/sessions/:id/frames", post(ingest_frame))
        .route("/sessions/:id", get(session_state).delete(close_session))
        .route("/logs/:id", get(logs))
        .route("/report/:id", get(report))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                    HeaderValue::from_static("http://localhost:3000"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(Arc::clone(&config.coordinator));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Proctor Watch server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let sweeper = {
        let coordinator = Arc::clone(&config.coordinator);
        let period = config.idle_sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let coordinator = Arc::clone(&coordinator);
                let closed =
                    tokio::task::spawn_blocking(move || coordinator.close_idle(Utc::now())).await;
                if let Ok(closed) = closed {
                    if !closed.is_empty() {
                        tracing::info!("Closed {} idle session(s)", closed.len());
                    }
                }
            }
        })
    };

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
        sweeper.abort();
    });

    Ok((actual_addr, shutdown_tx))
}
