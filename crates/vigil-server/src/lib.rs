//! Vigil Server - Anomaly Detection Platform Backend
//!
//! A standalone Rust backend server for the Vigil platform, providing:
//! - RESTful HTTP API via axum
//! - SQLite database with rusqlite
//! - Scheduled ingestion of external anomaly feeds
//! - AI-assisted workflow execution with autonomous decisioning
//!
//! This crate can be used standalone or embedded in other applications.

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use vigil_core::config::Settings;
use vigil_core::models::workflow::{workflow_templates, WorkflowStatus};
use vigil_core::state::{AppState, AppStateInner};

/// Configuration for the Vigil backend server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub settings: Settings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3210,
            settings: Settings::default(),
        }
    }
}

/// Create a shared `AppState` from settings.
///
/// Seeds the built-in workflow templates on first run, activating the
/// default one so ingestion-triggered workflows work out of the box.
pub async fn create_app_state(settings: Settings) -> Result<AppState, String> {
    let state: AppState = Arc::new(
        AppStateInner::new(settings).map_err(|e| format!("Failed to build app state: {}", e))?,
    );

    for (index, mut template) in workflow_templates().into_iter().enumerate() {
        let existing = state
            .workflow_store
            .find_by_name(&template.name)
            .await
            .map_err(|e| format!("Failed to check workflow templates: {}", e))?;
        if existing.is_none() {
            if index == 0 {
                template.status = WorkflowStatus::Active;
            }
            let name = template.name.clone();
            state
                .workflow_store
                .create(template)
                .await
                .map_err(|e| format!("Failed to seed workflow '{}': {}", name, e))?;
            tracing::info!(workflow = %name, "seeded workflow template");
        }
    }

    Ok(state)
}

/// Start the backend server: tracing, state, ingestion scheduler, HTTP.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig) -> Result<SocketAddr, String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil_server=info,vigil_core=info,tower_http=info".into()),
        )
        .init();

    tracing::info!(
        "Starting Vigil backend server on {}:{}",
        config.host,
        config.port
    );

    let state = create_app_state(config.settings.clone()).await?;
    state.scheduler.spawn();

    start_server_with_state(config, state).await
}

/// Start the HTTP server with a pre-built `AppState`.
///
/// This variant does not start the ingestion scheduler and is useful for
/// tests and embedders that manage background work themselves.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("Vigil backend server listening on {}", local_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "vigil-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
