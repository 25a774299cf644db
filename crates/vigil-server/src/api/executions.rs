use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use vigil_core::error::ServerError;
use vigil_core::state::AppState;
use vigil_core::store::ExecutionFilter;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_executions))
        .route("/trigger", post(trigger_workflow))
        .route("/{id}", get(get_execution))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    workflow_id: Option<String>,
    anomaly_id: Option<String>,
    limit: Option<u32>,
}

async fn list_executions(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let executions = state
        .execution_store
        .list(ExecutionFilter {
            workflow_id: q.workflow_id,
            anomaly_id: q.anomaly_id,
            limit: q.limit,
        })
        .await?;
    Ok(Json(serde_json::json!({ "executions": executions })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerBody {
    #[serde(default = "default_trigger")]
    trigger: String,
    #[serde(default)]
    data: serde_json::Value,
}

fn default_trigger() -> String {
    "manual".to_string()
}

/// POST /api/executions/trigger — fire the active workflow immediately.
/// Returns the execution id; clients poll GET /api/executions/{id}.
async fn trigger_workflow(
    State(state): State<AppState>,
    Json(body): Json<TriggerBody>,
) -> Result<Json<serde_json::Value>, ServerError> {
    match state.executor.trigger(&body.trigger, body.data).await? {
        Some(execution_id) => Ok(Json(serde_json::json!({
            "triggered": true,
            "executionId": execution_id,
        }))),
        None => Err(ServerError::NotFound(
            "No active workflow to trigger".to_string(),
        )),
    }
}

async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    match state.execution_store.get(&id).await? {
        Some(e) => Ok(Json(serde_json::json!({ "execution": e }))),
        None => Err(ServerError::NotFound(format!("Execution {} not found", id))),
    }
}
