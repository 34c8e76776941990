//! Service status handlers.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::errors::ApiError;
use crate::AppState;

/// Collaborator liveness.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub db: bool,
    pub sessions: bool,
}

/// Collection sizes.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub users: u64,
    pub files: u64,
}

/// `GET /status` -- whether the document store and session store answer.
#[utoipa::path(
    get,
    path = "/status",
    tag = "App",
    operation_id = "GetStatus",
    responses((status = 200, description = "Collaborator liveness", body = StatusResponse))
)]
pub async fn get_status(state: Arc<AppState>) -> Response {
    let db = match state.metadata.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Metadata store ping failed: {}", e);
            false
        }
    };
    let sessions = match state.sessions.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Session store ping failed: {}", e);
            false
        }
    };
    (StatusCode::OK, Json(StatusResponse { db, sessions })).into_response()
}

/// `GET /stats` -- number of users and files.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "App",
    operation_id = "GetStats",
    responses(
        (status = 200, description = "Collection counts", body = StatsResponse),
        (status = 500, description = "Store failure")
    )
)]
pub async fn get_stats(state: Arc<AppState>) -> Result<Response, ApiError> {
    let users = state.metadata.count_users().await?;
    let files = state.metadata.count_files().await?;
    Ok((StatusCode::OK, Json(StatsResponse { users, files })).into_response())
}

/// `GET /health` -- process liveness.
#[utoipa::path(
    get,
    path = "/health",
    tag = "App",
    operation_id = "HealthCheck",
    responses((status = 200, description = "Health check OK"))
)]
pub async fn health_check() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}
