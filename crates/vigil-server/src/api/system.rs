use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use vigil_core::error::ServerError;
use vigil_core::state::AppState;
use vigil_core::workflow::AutonomySettings;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/autonomy", get(get_autonomy).patch(update_autonomy))
        .route("/events", get(subscribe_events))
}

async fn get_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let autonomy = *state.autonomy.read().await;
    let uptime = (chrono::Utc::now() - state.started_at).num_seconds();
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": uptime,
        "autonomy": autonomy,
        "ingestionRunning": state.scheduler.is_running(),
        "eventSubscribers": state.event_bus.subscriber_count(),
    }))
}

async fn get_autonomy(State(state): State<AppState>) -> Json<AutonomySettings> {
    Json(*state.autonomy.read().await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutonomyPatch {
    autonomous_mode: Option<bool>,
    auto_approve_threshold: Option<f64>,
}

/// PATCH /api/system/autonomy — change the decision policy settings at
/// runtime. Takes effect for the next decision step; in-flight executions
/// that already passed their decision step are unaffected.
async fn update_autonomy(
    State(state): State<AppState>,
    Json(body): Json<AutonomyPatch>,
) -> Result<Json<AutonomySettings>, ServerError> {
    if let Some(threshold) = body.auto_approve_threshold {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(ServerError::BadRequest(
                "autoApproveThreshold must be between 0 and 1".to_string(),
            ));
        }
    }

    let mut settings = state.autonomy.write().await;
    if let Some(mode) = body.autonomous_mode {
        settings.autonomous_mode = mode;
    }
    if let Some(threshold) = body.auto_approve_threshold {
        settings.auto_approve_threshold = threshold;
    }
    tracing::info!(
        autonomous_mode = settings.autonomous_mode,
        auto_approve_threshold = settings.auto_approve_threshold,
        "autonomy settings updated"
    );
    Ok(Json(*settings))
}

/// GET /api/system/events — live event stream over SSE. Lagged messages
/// are dropped, matching the broadcast bus semantics.
async fn subscribe_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.event_bus.subscribe()).filter_map(|result| {
        result.ok().map(|event| {
            Ok(Event::default()
                .event(event.topic.clone())
                .data(serde_json::to_string(&event).unwrap_or_default()))
        })
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
