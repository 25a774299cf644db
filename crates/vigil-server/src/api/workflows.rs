use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use vigil_core::error::ServerError;
use vigil_core::models::workflow::{
    workflow_templates, CreateWorkflowInput, UpdateWorkflowInput,
};
use vigil_core::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_workflows).post(create_workflow))
        .route("/templates", get(get_templates))
        .route(
            "/{id}",
            get(get_workflow).patch(update_workflow).delete(delete_workflow),
        )
}

async fn list_workflows(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let workflows = state.workflow_store.list().await?;
    Ok(Json(serde_json::json!({ "workflows": workflows })))
}

async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<CreateWorkflowInput>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let workflow = state.workflow_store.create(body).await?;
    Ok(Json(serde_json::json!({ "workflow": workflow })))
}

async fn get_templates() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "templates": workflow_templates() }))
}

async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    match state.workflow_store.get(&id).await? {
        Some(w) => Ok(Json(serde_json::json!({ "workflow": w }))),
        None => Err(ServerError::NotFound(format!("Workflow {} not found", id))),
    }
}

async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateWorkflowInput>,
) -> Result<Json<serde_json::Value>, ServerError> {
    match state.workflow_store.update(&id, body).await? {
        Some(w) => Ok(Json(serde_json::json!({ "workflow": w }))),
        None => Err(ServerError::NotFound(format!("Workflow {} not found", id))),
    }
}

async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let deleted = state.workflow_store.delete(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
