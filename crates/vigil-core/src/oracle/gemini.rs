//! Gemini-backed implementation of the `AiOracle` contract.
//!
//! Prompts ask the model for a single JSON object; the response text is
//! scanned for the first `{ ... }` block and parsed leniently with
//! per-field defaults. Any transport, quota, or parse failure downgrades to
//! the deterministic fallback rather than surfacing an error.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ServerError;
use crate::models::anomaly::Severity;

use super::{
    clamp_confidence, fallback_analysis, fallback_impact, fallback_verification, AiAnalysis,
    AiOracle, AnalysisRequest, VerificationReport,
};

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiOracle {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl GeminiOracle {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        if api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not configured - AI analysis will use fallbacks");
        }
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            api_key,
            model: model.into(),
        }
    }

    /// Send one prompt and return the model's text reply.
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, ServerError> {
        let url = format!(
            "{GEMINI_ENDPOINT}/{}:generateContent?key={api_key}",
            self.model
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServerError::Oracle(format!("Gemini request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(ServerError::Oracle(format!(
                "Gemini returned status {}",
                response.status()
            )));
        }
        let parsed: Value = response
            .json()
            .await
            .map_err(|e| ServerError::Oracle(format!("Gemini response not JSON: {}", e)))?;
        parsed["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ServerError::Oracle("Gemini response missing text".to_string()))
    }
}

#[async_trait]
impl AiOracle for GeminiOracle {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AiAnalysis, ServerError> {
        let Some(api_key) = self.api_key.clone() else {
            return Ok(fallback_analysis(request));
        };

        let prompt = format!(
            "Analyze this anomaly detection event and provide a structured assessment:\n\n\
             Title: {}\nDescription: {}\nType: {}\nLocation: {}\nRaw Data: {}\n\n\
             Provide analysis in the following JSON format:\n\
             {{\"summary\": \"...\", \"severity\": \"low|medium|high|critical\", \
             \"confidence\": 0.0, \"categories\": [], \"entities\": [], \
             \"sentiment\": \"positive|negative|neutral\", \"riskFactors\": [], \
             \"recommendations\": [], \"relatedAnomalies\": [], \"metadata\": {{}}}}",
            request.title, request.description, request.kind, request.location, request.raw_data
        );

        match self.generate(&api_key, &prompt).await {
            Ok(text) => match extract_json_block(&text) {
                Some(raw) => Ok(raw_to_analysis(raw, request)),
                None => {
                    tracing::error!("Gemini analysis reply contained no JSON block");
                    Ok(fallback_analysis(request))
                }
            },
            Err(e) => {
                tracing::error!("Gemini analysis error: {}", e);
                Ok(fallback_analysis(request))
            }
        }
    }

    async fn cross_verify(
        &self,
        anomaly_id: &str,
        sources: &[Value],
    ) -> Result<VerificationReport, ServerError> {
        let Some(api_key) = self.api_key.clone() else {
            return Ok(fallback_verification(sources));
        };

        let prompt = format!(
            "Cross-verify these data sources about anomaly {anomaly_id} and determine \
             if they corroborate each other:\n\nSources: {}\n\n\
             Respond in JSON format:\n\
             {{\"verified\": false, \"confidence\": 0.0, \"matchingSources\": 0, \
             \"discrepancies\": []}}",
            Value::Array(sources.to_vec())
        );

        match self.generate(&api_key, &prompt).await {
            Ok(text) => {
                let parsed = extract_json_block(&text)
                    .and_then(|raw| serde_json::from_value::<RawVerification>(raw).ok());
                match parsed {
                    Some(raw) => Ok(VerificationReport {
                        verified: raw.verified,
                        confidence: clamp_confidence(raw.confidence),
                        matching_sources: raw.matching_sources,
                        discrepancies: raw.discrepancies,
                    }),
                    None => {
                        tracing::error!("Gemini verification reply was not parseable");
                        Ok(fallback_verification(sources))
                    }
                }
            }
            Err(e) => {
                tracing::error!("Cross-verification error: {}", e);
                Ok(fallback_verification(sources))
            }
        }
    }

    async fn impact_assessment(&self, anomaly: &Value) -> Result<Value, ServerError> {
        let Some(api_key) = self.api_key.clone() else {
            return Ok(fallback_impact());
        };

        let prompt = format!(
            "Generate an impact assessment for this anomaly:\n\n{anomaly}\n\n\
             Respond in JSON format with: overallImpact, affectedAreas, estimatedDuration, \
             populationAffected, economicImpact, environmentalImpact, recommendations."
        );

        match self.generate(&api_key, &prompt).await {
            Ok(text) => Ok(extract_json_block(&text).unwrap_or_else(fallback_impact)),
            Err(e) => {
                tracing::error!("Impact assessment error: {}", e);
                Ok(fallback_impact())
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawAnalysis {
    summary: Option<String>,
    severity: Option<String>,
    confidence: Option<f64>,
    categories: Option<Vec<String>>,
    entities: Option<Vec<String>>,
    sentiment: Option<String>,
    risk_factors: Option<Vec<String>>,
    recommendations: Option<Vec<String>>,
    related_anomalies: Option<Vec<String>>,
    metadata: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawVerification {
    verified: bool,
    confidence: f64,
    matching_sources: i64,
    discrepancies: Vec<String>,
}

fn raw_to_analysis(raw: Value, request: &AnalysisRequest) -> AiAnalysis {
    let raw: RawAnalysis = serde_json::from_value(raw).unwrap_or_default();
    AiAnalysis {
        summary: raw.summary.unwrap_or_else(|| request.description.clone()),
        severity: raw.severity.as_deref().map(Severity::parse),
        confidence: clamp_confidence(raw.confidence.unwrap_or(0.5)),
        categories: raw
            .categories
            .unwrap_or_else(|| vec![request.kind.clone()]),
        entities: raw.entities.unwrap_or_default(),
        sentiment: raw.sentiment.unwrap_or_else(|| "neutral".to_string()),
        risk_factors: raw.risk_factors.unwrap_or_default(),
        recommendations: raw.recommendations.unwrap_or_default(),
        related_anomalies: raw.related_anomalies.unwrap_or_default(),
        metadata: raw.metadata.unwrap_or_else(|| json!({})),
    }
}

/// Extract the first `{ ... }` block from a model reply (models often wrap
/// JSON in prose or code fences).
fn extract_json_block(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_fenced_reply() {
        let reply = "Here is the analysis:\n```json\n{\"confidence\": 0.9}\n```\nDone.";
        let block = extract_json_block(reply).unwrap();
        assert_eq!(block["confidence"], 0.9);
    }

    #[test]
    fn malformed_reply_yields_none() {
        assert!(extract_json_block("no json here").is_none());
        assert!(extract_json_block("} backwards {").is_none());
    }

    #[test]
    fn raw_analysis_defaults_fill_missing_fields() {
        let request = AnalysisRequest {
            title: "t".to_string(),
            description: "desc".to_string(),
            kind: "weather".to_string(),
            location: "loc".to_string(),
            raw_data: json!({}),
        };
        let analysis = raw_to_analysis(json!({"confidence": 2.0}), &request);
        assert_eq!(analysis.summary, "desc");
        assert_eq!(analysis.confidence, 1.0);
        assert_eq!(analysis.categories, vec!["weather".to_string()]);
        assert_eq!(analysis.severity, None);
    }

    #[tokio::test]
    async fn unconfigured_oracle_uses_deterministic_fallbacks() {
        let oracle = GeminiOracle::new(None, "gemini-1.5-pro");
        let request = AnalysisRequest {
            title: "t".to_string(),
            description: "desc".to_string(),
            kind: "seismic".to_string(),
            location: "loc".to_string(),
            raw_data: json!({}),
        };
        let analysis = oracle.analyze(&request).await.unwrap();
        assert_eq!(analysis.metadata["fallback"], true);

        let report = oracle.cross_verify("a-1", &[]).await.unwrap();
        assert!(!report.verified);

        let impact = oracle.impact_assessment(&json!({})).await.unwrap();
        assert_eq!(impact["fallback"], true);
    }
}
