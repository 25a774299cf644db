//! AI oracle boundary — analysis, cross-verification, and impact assessment.
//!
//! The executor and ingestion scheduler only ever see the `AiOracle` trait,
//! so tests substitute fakes. The production implementation (`GeminiOracle`)
//! degrades to a deterministic, clearly-flagged fallback whenever the
//! upstream model is unreachable or unconfigured; oracle unavailability is
//! never allowed to fail a caller.

pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ServerError;
use crate::models::anomaly::Severity;

pub use gemini::GeminiOracle;

/// Descriptive fields handed to the oracle for analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: String,
    pub raw_data: Value,
}

/// Structured assessment returned by the oracle.
///
/// `severity` is `None` when the model did not commit to one; callers fall
/// back to the candidate's own severity guess in that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnalysis {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub confidence: f64,
    pub categories: Vec<String>,
    pub entities: Vec<String>,
    pub sentiment: String,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
    pub related_anomalies: Vec<String>,
    pub metadata: Value,
}

/// Verdict of cross-checking an anomaly against supporting sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub verified: bool,
    pub confidence: f64,
    pub matching_sources: i64,
    pub discrepancies: Vec<String>,
}

/// External inference capability with a narrow contract.
#[async_trait]
pub trait AiOracle: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AiAnalysis, ServerError>;

    async fn cross_verify(
        &self,
        anomaly_id: &str,
        sources: &[Value],
    ) -> Result<VerificationReport, ServerError>;

    async fn impact_assessment(&self, anomaly: &Value) -> Result<Value, ServerError>;
}

/// Clamp a confidence value into [0, 1]; non-finite values collapse to 0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Deterministic analysis used when the model is unavailable.
pub fn fallback_analysis(request: &AnalysisRequest) -> AiAnalysis {
    let excerpt: String = request.description.chars().take(100).collect();
    AiAnalysis {
        summary: format!("Analysis of {} anomaly: {excerpt}", request.kind),
        severity: Some(Severity::Medium),
        confidence: 0.65,
        categories: vec![request.kind.clone()],
        entities: vec![request.location.clone()],
        sentiment: "neutral".to_string(),
        risk_factors: vec![
            "Requires further monitoring".to_string(),
            "Potential escalation".to_string(),
        ],
        recommendations: vec![
            "Continue monitoring".to_string(),
            "Verify with additional sources".to_string(),
        ],
        related_anomalies: vec![],
        metadata: json!({ "fallback": true, "reason": "model not configured or unavailable" }),
    }
}

/// Deterministic verification used when the model is unavailable:
/// two or more corroborating sources count as verified.
pub fn fallback_verification(sources: &[Value]) -> VerificationReport {
    let corroborated = sources.len() >= 2;
    VerificationReport {
        verified: corroborated,
        confidence: if corroborated { 0.75 } else { 0.5 },
        matching_sources: sources.len() as i64,
        discrepancies: vec![],
    }
}

/// Deterministic impact assessment used when the model is unavailable.
pub fn fallback_impact() -> Value {
    json!({
        "overallImpact": "medium",
        "affectedAreas": ["local"],
        "estimatedDuration": "hours",
        "populationAffected": "unknown",
        "economicImpact": "unknown",
        "environmentalImpact": "unknown",
        "recommendations": ["Monitor situation", "Prepare contingency plans"],
        "fallback": true,
    })
}
