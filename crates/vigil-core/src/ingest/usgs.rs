//! USGS earthquake feed adapter (GeoJSON summary endpoint).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ServerError;
use crate::models::anomaly::{AnomalyKind, Severity};

use super::adapter::{Candidate, SourceAdapter};
use super::USER_AGENT;

const DEFAULT_ENDPOINT: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_hour.geojson";

pub struct UsgsAdapter {
    http: reqwest::Client,
    endpoint: String,
}

impl UsgsAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for UsgsAdapter {
    fn name(&self) -> &'static str {
        "USGS Earthquakes"
    }

    async fn fetch(&self) -> Result<Vec<Candidate>, ServerError> {
        let body: Value = self
            .http
            .get(&self.endpoint)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| ServerError::Source(format!("USGS request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| ServerError::Source(format!("USGS response not JSON: {}", e)))?;
        Ok(parse_usgs(&body))
    }
}

/// Map quake magnitude onto the severity scale.
fn magnitude_severity(mag: f64) -> Severity {
    if mag >= 7.0 {
        Severity::Critical
    } else if mag >= 5.0 {
        Severity::High
    } else if mag >= 3.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub fn parse_usgs(data: &Value) -> Vec<Candidate> {
    let Some(features) = data.get("features").and_then(Value::as_array) else {
        return Vec::new();
    };

    features
        .iter()
        .map(|feature| {
            let props = &feature["properties"];
            let coords = &feature["geometry"]["coordinates"];
            let mag = props["mag"].as_f64().unwrap_or(0.0);
            let place = props["place"].as_str().unwrap_or("Unknown location");
            let depth = coords[2].as_f64().unwrap_or(0.0);
            let tsunami = props["tsunami"].as_i64().unwrap_or(0) != 0;

            let mut raw_data = props.clone();
            if let Value::Object(map) = &mut raw_data {
                map.insert("coordinates".to_string(), coords.clone());
            }

            Candidate {
                title: format!("Earthquake M{mag} - {place}"),
                description: format!(
                    "A magnitude {mag} earthquake occurred at {place}. Depth: {depth}km.{}",
                    if tsunami { " Tsunami warning issued." } else { "" }
                ),
                kind: AnomalyKind::Seismic,
                severity: magnitude_severity(mag),
                latitude: coords[1].as_f64().unwrap_or(0.0),
                longitude: coords[0].as_f64().unwrap_or(0.0),
                location: place.to_string(),
                raw_data: if raw_data.is_object() { raw_data } else { json!({}) },
                media_urls: vec![],
            }
        })
        .collect()
}
