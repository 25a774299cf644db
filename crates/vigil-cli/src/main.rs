//! Vigil CLI — command-line interface for the anomaly detection platform.
//!
//! Reuses the same core domain logic (vigil-core) and server bootstrap
//! (vigil-server) that power the HTTP API.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use vigil_core::config::Settings;
use vigil_server::{create_app_state, start_server, ServerConfig};

/// Vigil CLI — Anomaly detection platform
#[derive(Parser)]
#[command(name = "vigil", version, about = "Vigil CLI — Anomaly detection platform")]
struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "VIGIL_DB_PATH", default_value = "vigil.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Vigil HTTP backend server
    Server {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3210)]
        port: u16,
    },

    /// Run one ingestion cycle and exit
    Ingest,

    /// Trigger the active workflow and wait for the execution to finish
    Trigger {
        /// Trigger name recorded on the execution
        #[arg(long, default_value = "manual")]
        trigger: String,
        /// Input data as a JSON string
        #[arg(long, default_value = "{}")]
        data: String,
    },

    /// Read or change autonomy settings on a running server
    Autonomy {
        /// Base URL of the running server
        #[arg(long, default_value = "http://127.0.0.1:3210")]
        url: String,
        /// Enable or disable autonomous mode
        #[arg(long)]
        mode: Option<bool>,
        /// Auto-approval confidence threshold (0 to 1)
        #[arg(long)]
        threshold: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Server { host, port } => run_server(&cli.db, host, port).await,
        Commands::Ingest => run_ingest(&cli.db).await,
        Commands::Trigger { trigger, data } => run_trigger(&cli.db, &trigger, &data).await,
        Commands::Autonomy { url, mode, threshold } => run_autonomy(&url, mode, threshold).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn settings_for(db: &str) -> Settings {
    let mut settings = Settings::from_env();
    settings.db_path = db.to_string();
    settings
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

async fn run_server(db: &str, host: String, port: u16) -> Result<(), String> {
    let config = ServerConfig {
        host,
        port,
        settings: settings_for(db),
    };
    start_server(config).await?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for shutdown signal: {}", e))?;
    tracing::info!("shutting down");
    Ok(())
}

async fn run_ingest(db: &str) -> Result<(), String> {
    init_tracing("vigil_core=info");
    let mut settings = settings_for(db);
    settings.ingestion.enabled = true;

    let state = create_app_state(settings).await?;
    match state
        .scheduler
        .run_cycle()
        .await
        .map_err(|e| e.to_string())?
    {
        Some(created) => println!("Ingestion complete: {created} anomalies created"),
        None => println!("Ingestion already running, skipped"),
    }
    Ok(())
}

async fn run_trigger(db: &str, trigger: &str, data: &str) -> Result<(), String> {
    init_tracing("vigil_core=warn");
    let data: serde_json::Value =
        serde_json::from_str(data).map_err(|e| format!("--data is not valid JSON: {}", e))?;

    let state = create_app_state(settings_for(db)).await?;
    let Some(execution_id) = state
        .executor
        .trigger(trigger, data)
        .await
        .map_err(|e| e.to_string())?
    else {
        return Err("No active workflow to trigger".to_string());
    };

    // Poll until the background run reaches a terminal state.
    for _ in 0..240 {
        let execution = state
            .execution_store
            .get(&execution_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("Execution {} disappeared", execution_id))?;
        if execution.status.is_terminal() {
            let rendered = serde_json::to_string_pretty(&execution)
                .map_err(|e| format!("Failed to render execution: {}", e))?;
            println!("{rendered}");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    Err(format!("Execution {} did not finish in time", execution_id))
}

async fn run_autonomy(url: &str, mode: Option<bool>, threshold: Option<f64>) -> Result<(), String> {
    let client = reqwest::Client::new();
    let endpoint = format!("{}/api/system/autonomy", url.trim_end_matches('/'));

    let response = if mode.is_none() && threshold.is_none() {
        client.get(&endpoint).send().await
    } else {
        let mut body = serde_json::Map::new();
        if let Some(mode) = mode {
            body.insert("autonomousMode".to_string(), mode.into());
        }
        if let Some(threshold) = threshold {
            body.insert("autoApproveThreshold".to_string(), threshold.into());
        }
        client.patch(&endpoint).json(&body).send().await
    }
    .map_err(|e| format!("Request failed: {}", e))?;

    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| format!("Response was not JSON: {}", e))?;
    if !status.is_success() {
        return Err(format!("Server returned {}: {}", status, body));
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string())
    );
    Ok(())
}
