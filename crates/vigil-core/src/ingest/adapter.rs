//! Source adapter contract for external anomaly feeds.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ServerError;
use crate::models::anomaly::{AnomalyKind, Severity};

/// A raw anomaly candidate parsed from an external feed, before AI
/// enrichment and deduplication.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub title: String,
    pub description: String,
    pub kind: AnomalyKind,
    /// Heuristic severity from the feed; the oracle's assessment wins when
    /// it commits to one.
    pub severity: Severity,
    pub latitude: f64,
    pub longitude: f64,
    pub location: String,
    pub raw_data: Value,
    pub media_urls: Vec<String>,
}

/// One external feed. Adapters own their transport details; the scheduler
/// only sees parsed candidates. A fetch error fails that source for the
/// cycle and nothing else.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Display name, recorded as `source_type` on created anomalies.
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> Result<Vec<Candidate>, ServerError>;
}
