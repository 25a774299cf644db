use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use vigil_core::error::ServerError;
use vigil_core::events::topic;
use vigil_core::models::anomaly::{
    AnomalyKind, AnomalyStatus, CreateAnomalyInput, Severity, UpdateAnomalyInput,
};
use vigil_core::state::AppState;
use vigil_core::store::AnomalyFilter;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_anomalies).post(create_anomaly))
        .route(
            "/{id}",
            get(get_anomaly).patch(update_anomaly).delete(delete_anomaly),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    status: Option<String>,
    severity: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    limit: Option<u32>,
}

async fn list_anomalies(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let filter = AnomalyFilter {
        status: q.status.as_deref().map(AnomalyStatus::parse),
        severity: q.severity.as_deref().map(Severity::parse),
        kind: q.kind.as_deref().map(AnomalyKind::parse),
        limit: q.limit,
    };
    let anomalies = state.anomaly_store.list(filter).await?;
    Ok(Json(serde_json::json!({ "anomalies": anomalies })))
}

/// Manual anomaly submission. The oracle enriches the submission and
/// high-severity results trigger the active workflow, same as ingested
/// detections.
async fn create_anomaly(
    State(state): State<AppState>,
    Json(body): Json<CreateAnomalyInput>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let (anomaly, execution_id) = state.submit_anomaly(body).await?;
    Ok(Json(serde_json::json!({
        "anomaly": anomaly,
        "executionId": execution_id,
    })))
}

async fn get_anomaly(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    match state.anomaly_store.get(&id).await? {
        Some(a) => Ok(Json(serde_json::json!({ "anomaly": a }))),
        None => Err(ServerError::NotFound(format!("Anomaly {} not found", id))),
    }
}

async fn update_anomaly(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateAnomalyInput>,
) -> Result<Json<serde_json::Value>, ServerError> {
    match state.anomaly_store.update(&id, body).await? {
        Some(a) => {
            let value =
                serde_json::to_value(&a).map_err(|e| ServerError::Internal(e.to_string()))?;
            state.event_bus.publish(topic::ANOMALY_UPDATED, value);
            Ok(Json(serde_json::json!({ "anomaly": a })))
        }
        None => Err(ServerError::NotFound(format!("Anomaly {} not found", id))),
    }
}

async fn delete_anomaly(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let deleted = state.anomaly_store.delete(&id).await?;
    if deleted {
        state
            .event_bus
            .publish(topic::ANOMALY_DELETED, serde_json::json!({ "id": id }));
    }
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
