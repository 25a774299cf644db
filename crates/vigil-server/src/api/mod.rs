pub mod anomalies;
pub mod executions;
pub mod ingestion;
pub mod system;
pub mod workflows;

use axum::Router;

use vigil_core::state::AppState;

/// Build the complete API router with all sub-routes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/api/anomalies", anomalies::router())
        .nest("/api/workflows", workflows::router())
        .nest("/api/executions", executions::router())
        .nest("/api/ingestion", ingestion::router())
        .nest("/api/system", system::router())
}
