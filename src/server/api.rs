use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use super::SharedState;
use crate::errors::StagingError;
use crate::inspect::{self, DiskUsage, InstanceSummary};

pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

impl From<StagingError> for ApiError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::NotFound(msg) => ApiError::NotFound(msg),
            StagingError::Validation(msg) => ApiError::BadRequest(msg),
            other => {
                warn!("Request failed: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

pub async fn list_servers(
    State(state): State<SharedState>,
) -> Result<Json<Vec<InstanceSummary>>, ApiError> {
    let servers = inspect::list_instances(state.runner.as_ref(), &state.settings).await?;
    Ok(Json(servers))
}

pub async fn disk_space(State(state): State<SharedState>) -> Result<Json<DiskUsage>, ApiError> {
    let usage = inspect::disk_usage(state.runner.as_ref(), &state.settings.root_dir).await?;
    Ok(Json(usage))
}
