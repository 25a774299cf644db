//! OpenWeatherMap alerts adapter.
//!
//! Requires an API key; without one the adapter reports no candidates
//! rather than failing every cycle.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ServerError;
use crate::models::anomaly::{AnomalyKind, Severity};

use super::adapter::{Candidate, SourceAdapter};
use super::USER_AGENT;

const DEFAULT_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/onecall";

pub struct OpenWeatherAdapter {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenWeatherAdapter {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl SourceAdapter for OpenWeatherAdapter {
    fn name(&self) -> &'static str {
        "OpenWeatherMap Alerts"
    }

    async fn fetch(&self) -> Result<Vec<Candidate>, ServerError> {
        let Some(api_key) = &self.api_key else {
            tracing::debug!("OPENWEATHERMAP_API_KEY not configured, skipping weather alerts");
            return Ok(Vec::new());
        };

        let body: Value = self
            .http
            .get(&self.endpoint)
            .query(&[("appid", api_key.as_str())])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| ServerError::Source(format!("OpenWeatherMap request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| {
                ServerError::Source(format!("OpenWeatherMap response not JSON: {}", e))
            })?;
        Ok(parse_weather_alerts(&body))
    }
}

pub fn parse_weather_alerts(data: &Value) -> Vec<Candidate> {
    let Some(alerts) = data.get("alerts").and_then(Value::as_array) else {
        return Vec::new();
    };
    let lat = data["lat"].as_f64().unwrap_or(0.0);
    let lon = data["lon"].as_f64().unwrap_or(0.0);

    alerts
        .iter()
        .map(|alert| {
            let event = alert["event"].as_str().unwrap_or_default().to_string();
            let severity = if event.to_lowercase().contains("warning") {
                Severity::High
            } else {
                Severity::Medium
            };

            Candidate {
                title: event.clone(),
                description: alert["description"]
                    .as_str()
                    .filter(|d| !d.is_empty())
                    .unwrap_or(&event)
                    .to_string(),
                kind: AnomalyKind::Weather,
                severity,
                latitude: lat,
                longitude: lon,
                location: format!("{lat}, {lon}"),
                raw_data: alert.clone(),
                media_urls: vec![],
            }
        })
        .collect()
}
