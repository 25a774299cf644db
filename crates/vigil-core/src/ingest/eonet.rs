//! NASA EONET natural-event feed adapter.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ServerError;
use crate::models::anomaly::{AnomalyKind, Severity};

use super::adapter::{Candidate, SourceAdapter};
use super::USER_AGENT;

const DEFAULT_ENDPOINT: &str = "https://eonet.gsfc.nasa.gov/api/v3/events?limit=10";

pub struct EonetAdapter {
    http: reqwest::Client,
    endpoint: String,
}

impl EonetAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for EonetAdapter {
    fn name(&self) -> &'static str {
        "NASA EONET"
    }

    async fn fetch(&self) -> Result<Vec<Candidate>, ServerError> {
        let body: Value = self
            .http
            .get(&self.endpoint)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| ServerError::Source(format!("EONET request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| ServerError::Source(format!("EONET response not JSON: {}", e)))?;
        Ok(parse_eonet(&body))
    }
}

/// Keyword mapping from the event's first category title onto an anomaly
/// kind. Unmatched categories stay environmental.
fn category_kind(category: &str) -> AnomalyKind {
    let lowered = category.to_lowercase();
    if lowered.contains("storm") {
        AnomalyKind::Weather
    } else if lowered.contains("volcano") {
        AnomalyKind::Seismic
    } else {
        AnomalyKind::Environmental
    }
}

pub fn parse_eonet(data: &Value) -> Vec<Candidate> {
    let Some(events) = data.get("events").and_then(Value::as_array) else {
        return Vec::new();
    };

    events
        .iter()
        .map(|event| {
            let title = event["title"].as_str().unwrap_or_default().to_string();
            let category = event["categories"][0]["title"].as_str().unwrap_or("Unknown");
            let coords = &event["geometry"][0]["coordinates"];

            Candidate {
                title: title.clone(),
                description: format!("{title}. Category: {category}"),
                kind: category_kind(category),
                severity: Severity::Medium,
                latitude: coords[1].as_f64().unwrap_or(0.0),
                longitude: coords[0].as_f64().unwrap_or(0.0),
                location: title,
                raw_data: event.clone(),
                media_urls: vec![],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_feed() -> Value {
        json!({
            "events": [
                {
                    "title": "Wildfire - Jasper National Park, Canada",
                    "categories": [{ "title": "Wildfires" }],
                    "geometry": [{ "coordinates": [-118.08, 52.87] }]
                },
                {
                    "title": "Tropical Storm Helene",
                    "categories": [{ "title": "Severe Storms" }],
                    "geometry": [{ "coordinates": [-84.3, 27.8] }]
                },
                {
                    "title": "Kilauea Volcano",
                    "categories": [{ "title": "Volcanoes" }],
                    "geometry": []
                }
            ]
        })
    }

    #[test]
    fn maps_categories_onto_kinds() {
        let candidates = parse_eonet(&sample_feed());
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].kind, AnomalyKind::Environmental);
        assert_eq!(candidates[1].kind, AnomalyKind::Weather);
        assert_eq!(candidates[2].kind, AnomalyKind::Seismic);
        assert_eq!(candidates[0].severity, Severity::Medium);
        assert_eq!(candidates[1].latitude, 27.8);
        assert_eq!(candidates[1].longitude, -84.3);
    }

    #[test]
    fn missing_geometry_defaults_to_origin() {
        let candidates = parse_eonet(&sample_feed());
        assert_eq!(candidates[2].latitude, 0.0);
        assert_eq!(candidates[2].longitude, 0.0);
    }

    #[test]
    fn missing_events_yield_nothing() {
        assert!(parse_eonet(&json!({})).is_empty());
    }
}
