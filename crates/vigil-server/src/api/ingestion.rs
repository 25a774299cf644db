use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use vigil_core::error::ServerError;
use vigil_core::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/run", post(run_now))
}

/// GET /api/ingestion/status — scheduler state and cadence.
async fn get_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.scheduler.config();
    Json(serde_json::json!({
        "running": state.scheduler.is_running(),
        "enabled": config.enabled,
        "cadence": config.cadence,
        "intervalSecs": config.interval().as_secs(),
    }))
}

/// POST /api/ingestion/run — trigger one ingestion cycle immediately.
/// Skipped (not queued) when a cycle is already in flight.
async fn run_now(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ServerError> {
    match state.scheduler.run_cycle().await? {
        Some(created) => Ok(Json(serde_json::json!({
            "ran": true,
            "created": created,
        }))),
        None => Ok(Json(serde_json::json!({
            "ran": false,
            "message": "Ingestion already running",
        }))),
    }
}
