//! HTTP surface over [`MatchEngine`].
//!
//! Errors come back as `{code, message, suggestions}` with the stable
//! code from [`MatchError::status_code`].

use crate::accounts::{Account, Registration};
use crate::batch::BatchReport;
use crate::engine::{HealthReport, MatchEngine, MatchQuery, MatchView, OnboardReport};
use crate::error::MatchError;
use crate::feedback::{FeedbackRecord, FeedbackSubmission};
use crate::types::{MatchType, UserId};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<MatchEngine>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(engine: Arc<MatchEngine>, shutdown: CancellationToken) -> Self {
        Self { engine, shutdown }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct MatchParams {
    #[serde(default)]
    pub match_type: Option<MatchType>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub min_threshold: Option<f64>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/matches/{user_id}", get(matches))
        .route("/feedback", post(feedback))
        .route("/users", post(register))
        .route("/users/{user_id}/onboard", post(onboard))
        .route("/batch/run", post(run_batch))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` fires, then write the snapshot once.
pub async fn serve(
    engine: Arc<MatchEngine>,
    bind: &str,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    use anyhow::Context;

    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "http server listening");

    let app = router(AppState::new(Arc::clone(&engine), shutdown.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("server shutdown")?;

    engine.save_state().context("failed to save state on shutdown")?;
    info!("http server stopped");
    Ok(())
}

async fn health(State(state): State<AppState>) -> ApiResult<HealthReport> {
    state.engine.health().map(Json).map_err(api_error)
}

async fn matches(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<MatchParams>,
) -> ApiResult<Vec<MatchView>> {
    let query = MatchQuery {
        user_id: UserId::from(user_id),
        match_type: params
            .match_type
            .unwrap_or(MatchType::RequirementsToOfferings),
        top_k: params.top_k,
        min_threshold: params.min_threshold,
    };
    state.engine.matches(&query).map(Json).map_err(api_error)
}

async fn feedback(
    State(state): State<AppState>,
    Json(submission): Json<FeedbackSubmission>,
) -> ApiResult<FeedbackRecord> {
    state
        .engine
        .submit_feedback(&submission)
        .map(Json)
        .map_err(api_error)
}

async fn register(
    State(state): State<AppState>,
    Json(registration): Json<Registration>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    state
        .engine
        .register(registration)
        .map(|account| (StatusCode::CREATED, Json(account)))
        .map_err(api_error)
}

async fn onboard(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<OnboardReport> {
    state
        .engine
        .onboard_user(&UserId::from(user_id))
        .await
        .map(Json)
        .map_err(api_error)
}

async fn run_batch(State(state): State<AppState>) -> ApiResult<BatchReport> {
    let cancel = state.shutdown.child_token();
    state
        .engine
        .run_batch(&cancel)
        .await
        .map(Json)
        .map_err(api_error)
}

fn http_status(error: &MatchError) -> StatusCode {
    match error {
        MatchError::UnknownUser { .. } => StatusCode::NOT_FOUND,
        MatchError::EmptyInput { .. }
        | MatchError::InvalidProfile { .. }
        | MatchError::Config { .. }
        | MatchError::Vector(_) => StatusCode::BAD_REQUEST,
        MatchError::Cancelled { .. } | MatchError::BatchInProgress { .. } => StatusCode::CONFLICT,
        MatchError::EmbeddingUnavailable { .. } | MatchError::StoreUnavailable { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        MatchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(error: MatchError) -> ApiError {
    let status = http_status(&error);
    if status.is_server_error() {
        warn!(code = %error.status_code(), error = %error, "request failed");
    }
    (
        status,
        Json(ErrorBody {
            code: error.status_code(),
            message: error.to_string(),
            suggestions: error
                .recovery_suggestions()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }),
    )
}
