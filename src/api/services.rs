use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::{
    error::ApiError,
    models::{ApprovedProjectsResponse, HealthResponse},
    state::AppState,
};
use crate::model::{Address, ProjectRecord};
use crate::observability::SyncState;

/// Project lookup endpoint (GET /projects/{owner})
///
/// Returns the mirrored record for `owner`, or 404 when the mirror has never
/// seen a submission for it. The answer is as fresh as the last synced
/// position reported by `/health`.
pub async fn get_project(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<ProjectRecord>, ApiError> {
    let owner: Address = owner
        .parse()
        .map_err(|e| ApiError::InvalidAddress(format!("{owner}: {e}")))?;

    let record = state
        .store
        .get_project(&owner)?
        .ok_or_else(|| ApiError::NotFound(format!("project {owner}")))?;

    Ok(Json(record))
}

/// Approved projects endpoint (GET /projects/approved)
///
/// Lists every project that is approved and not revoked.
pub async fn list_approved(
    State(state): State<AppState>,
) -> Result<Json<ApprovedProjectsResponse>, ApiError> {
    let projects = state.store.list_approved()?;
    Ok(Json(ApprovedProjectsResponse {
        count: projects.len(),
        projects,
    }))
}

/// Health check endpoint (GET /health)
///
/// Returns 200 while the supervisor follows the live feed, 503 while it is
/// catching up, disconnected, or stopped. The body carries the last synced
/// position so callers can judge staleness themselves.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let sync = state.status.borrow().clone();
    let live = sync.state == SyncState::Live;

    let status_code = if live {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if live { "healthy" } else { "degraded" }.to_string(),
        sync,
        metrics: state.metrics.snapshot(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}
