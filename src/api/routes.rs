use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;

use crate::engine::SyncOrchestrator;
use crate::models::{Contest, ContestWinner, Submission, SyncReport};
use crate::store::ContestStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: ContestStore,
    pub orchestrator: SyncOrchestrator,
}

/// Create the API router
pub fn create_router(store: ContestStore, orchestrator: SyncOrchestrator) -> Router {
    let state = AppState {
        store,
        orchestrator,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/sync/run", post(run_sync))
        .route("/api/sync/last", get(last_sync))
        .route("/api/contests/:id", get(get_contest))
        .with_state(state)
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Trigger a sync cycle and return its report
async fn run_sync(State(state): State<AppState>) -> Result<Json<SyncReport>, ApiError> {
    let report = state.orchestrator.run_cycle().await?;
    Ok(Json(report))
}

/// Report from the most recent completed cycle
async fn last_sync(State(state): State<AppState>) -> Result<Json<SyncReport>, ApiError> {
    state
        .orchestrator
        .last_report()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No sync cycle has completed yet".to_string()))
}

/// Contest detail with its winner (if settled) and submissions
async fn get_contest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContestDetailResponse>, ApiError> {
    let Some(contest) = state.store.get_contest(&id).await? else {
        return Err(ApiError::NotFound(format!("Contest {} not found", id)));
    };
    let winner = state.store.winner_for_contest(&id).await?;
    let submissions = state.store.list_submissions(&id).await?;

    Ok(Json(ContestDetailResponse {
        contest,
        winner,
        submissions,
    }))
}

// ===== Response Types =====

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ContestDetailResponse {
    contest: Contest,
    #[serde(skip_serializing_if = "Option::is_none")]
    winner: Option<ContestWinner>,
    submissions: Vec<Submission>,
}

// ===== Error Handling =====

#[derive(Debug)]
enum ApiError {
    Internal(anyhow::Error),
    NotFound(String),
    #[allow(dead_code)] // Reserved for input validation
    BadRequest(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Internal(err) => {
                tracing::error!("Request failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err = anyhow::anyhow!("boom");
        let api_err: ApiError = err.into();

        match api_err {
            ApiError::Internal(_) => (),
            _ => panic!("Expected Internal error"),
        }
    }
}
