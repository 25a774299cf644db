//! End-to-end API tests against a real server bound to an ephemeral port.
//!
//! The oracle is unconfigured, so analysis uses its deterministic fallback;
//! no external network access is needed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use vigil_core::config::Settings;
use vigil_core::db::Database;
use vigil_core::error::ServerError;
use vigil_core::models::anomaly::Severity;
use vigil_core::oracle::{
    fallback_impact, fallback_verification, AiAnalysis, AiOracle, AnalysisRequest, GeminiOracle,
    VerificationReport,
};
use vigil_core::state::{AppState, AppStateInner};
use vigil_server::{start_server_with_state, ServerConfig};

/// Oracle that echoes back fixed values so tests control the severity
/// resolution instead of the deterministic fallback.
struct StubOracle {
    severity: Option<Severity>,
    confidence: f64,
}

#[async_trait]
impl AiOracle for StubOracle {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AiAnalysis, ServerError> {
        Ok(AiAnalysis {
            summary: format!("summary of {}", request.title),
            severity: self.severity,
            confidence: self.confidence,
            categories: vec![request.kind.clone()],
            entities: vec![],
            sentiment: "neutral".to_string(),
            risk_factors: vec![],
            recommendations: vec![],
            related_anomalies: vec![],
            metadata: json!({}),
        })
    }

    async fn cross_verify(
        &self,
        _anomaly_id: &str,
        sources: &[Value],
    ) -> Result<VerificationReport, ServerError> {
        Ok(fallback_verification(sources))
    }

    async fn impact_assessment(&self, _anomaly: &Value) -> Result<Value, ServerError> {
        Ok(fallback_impact())
    }
}

async fn spawn_server_with_oracle(oracle: Arc<dyn AiOracle>) -> (SocketAddr, AppState) {
    let mut settings = Settings::default();
    settings.ingestion.enabled = false;

    let db = Database::open_in_memory().unwrap();
    let state: AppState = Arc::new(AppStateInner::with_parts(settings, db, oracle, vec![]));

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        settings: Settings::default(),
    };
    let addr = start_server_with_state(config, state.clone()).await.unwrap();
    (addr, state)
}

async fn spawn_server() -> (SocketAddr, AppState) {
    spawn_server_with_oracle(Arc::new(GeminiOracle::new(None, "test-model"))).await
}

fn anomaly_body(title: &str, severity: &str) -> Value {
    json!({
        "title": title,
        "description": "integration test event",
        "type": "seismic",
        "severity": severity,
        "latitude": 35.0,
        "longitude": 139.0,
        "location": "Test Bay"
    })
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (addr, _state) = spawn_server().await;
    let body: Value = reqwest::get(format!("http://{addr}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["server"], "vigil-server");
}

#[tokio::test]
async fn anomaly_crud_round_trip() {
    let (addr, _state) = spawn_server().await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}/api/anomalies");

    let created: Value = client
        .post(&base)
        .json(&anomaly_body("Quake A", "low"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["anomaly"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["anomaly"]["status"], "detected");
    // Fallback severity is medium, below the workflow trigger threshold.
    assert!(created["executionId"].is_null());

    let fetched: Value = client
        .get(format!("{base}/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["anomaly"]["title"], "Quake A");

    let patched: Value = client
        .patch(format!("{base}/{id}"))
        .json(&json!({ "status": "resolved" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(patched["anomaly"]["status"], "resolved");

    let listed: Value = client
        .get(format!("{base}?status=resolved"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["anomalies"].as_array().unwrap().len(), 1);

    let deleted: Value = client
        .delete(format!("{base}/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["deleted"], true);

    let missing = client.get(format!("{base}/{id}")).send().await.unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn manual_create_applies_fallback_analysis() {
    let (addr, _state) = spawn_server().await;
    let client = reqwest::Client::new();

    // No severity or confidence supplied: the unconfigured oracle's
    // deterministic fallback fills both in.
    let created: Value = client
        .post(format!("http://{addr}/api/anomalies"))
        .json(&json!({
            "title": "Unlabeled report",
            "description": "phoned-in sighting, no details",
            "type": "other",
            "latitude": 35.0,
            "longitude": 139.0,
            "location": "Test Bay"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(created["anomaly"]["severity"], "medium");
    assert_eq!(created["anomaly"]["confidence"], 0.65);
    assert_eq!(created["anomaly"]["aiAnalysis"]["metadata"]["fallback"], true);
    assert!(created["executionId"].is_null());
}

#[tokio::test]
async fn trigger_without_active_workflow_is_not_found() {
    let (addr, _state) = spawn_server().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/api/executions/trigger"))
        .json(&json!({ "trigger": "manual", "data": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn high_severity_anomaly_runs_active_workflow() {
    // Oracle that does not commit to a severity, so the submitted
    // "critical" stands and escalates.
    let (addr, _state) = spawn_server_with_oracle(Arc::new(StubOracle {
        severity: None,
        confidence: 0.9,
    }))
    .await;
    let client = reqwest::Client::new();

    // Activate a workflow from the built-in templates.
    let templates: Value = client
        .get(format!("http://{addr}/api/workflows/templates"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let mut template = templates["templates"][0].clone();
    template["status"] = json!("active");
    let workflow: Value = client
        .post(format!("http://{addr}/api/workflows"))
        .json(&template)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(workflow["workflow"]["version"], 1);

    let created: Value = client
        .post(format!("http://{addr}/api/anomalies"))
        .json(&anomaly_body("Quake B", "critical"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let execution_id = created["executionId"].as_str().unwrap().to_string();

    // Poll until the background run reaches a terminal state.
    let mut last = json!(null);
    for _ in 0..100 {
        last = client
            .get(format!("http://{addr}/api/executions/{execution_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let status = last["execution"]["status"].as_str().unwrap_or_default();
        if status == "completed" || status == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(last["execution"]["status"], "completed");
    assert_eq!(last["execution"]["stepResults"].as_array().unwrap().len(), 8);

    // Autonomy defaults are off, so the anomaly ends up queued for review.
    let anomaly_id = created["anomaly"]["id"].as_str().unwrap();
    let anomaly: Value = client
        .get(format!("http://{addr}/api/anomalies/{anomaly_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(anomaly["anomaly"]["status"], "pending_review");
}

#[tokio::test]
async fn autonomy_settings_validate_and_persist() {
    let (addr, _state) = spawn_server().await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/api/system/autonomy");

    let current: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(current["autonomousMode"], false);
    assert_eq!(current["autoApproveThreshold"], 0.95);

    let rejected = client
        .patch(&url)
        .json(&json!({ "autoApproveThreshold": 1.5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 400);

    let updated: Value = client
        .patch(&url)
        .json(&json!({ "autonomousMode": true, "autoApproveThreshold": 0.9 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["autonomousMode"], true);
    assert_eq!(updated["autoApproveThreshold"], 0.9);
}

#[tokio::test]
async fn ingestion_status_reflects_configuration() {
    let (addr, _state) = spawn_server().await;
    let body: Value = reqwest::get(format!("http://{addr}/api/ingestion/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["running"], false);
    assert_eq!(body["enabled"], false);
    assert_eq!(body["cadence"], "*/15 * * * *");
    assert_eq!(body["intervalSecs"], 900);
}
