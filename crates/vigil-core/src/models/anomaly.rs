use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Broad category of a detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Weather,
    Seismic,
    Traffic,
    Environmental,
    Security,
    Health,
    Infrastructure,
    #[serde(other)]
    Other,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::Weather => "weather",
            AnomalyKind::Seismic => "seismic",
            AnomalyKind::Traffic => "traffic",
            AnomalyKind::Environmental => "environmental",
            AnomalyKind::Security => "security",
            AnomalyKind::Health => "health",
            AnomalyKind::Infrastructure => "infrastructure",
            AnomalyKind::Other => "other",
        }
    }

    /// Parse a stored string; unknown values map to `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "weather" => AnomalyKind::Weather,
            "seismic" => AnomalyKind::Seismic,
            "traffic" => AnomalyKind::Traffic,
            "environmental" => AnomalyKind::Environmental,
            "security" => AnomalyKind::Security,
            "health" => AnomalyKind::Health,
            "infrastructure" => AnomalyKind::Infrastructure,
            _ => AnomalyKind::Other,
        }
    }
}

/// Severity ranking. Variant order matters: `Ord` is used for
/// threshold checks (e.g. "high or worse triggers a workflow").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse a stored string; unknown values map to `Medium`.
    pub fn parse(s: &str) -> Self {
        match s {
            "low" => Severity::Low,
            "medium" => Severity::Medium,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Medium,
        }
    }
}

/// Review lifecycle of an anomaly. Transitions are monotonic along the
/// workflow (detected → analyzing → verified/pending_review →
/// approved/rejected → resolved), though manual edits via the admin API may
/// set status directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyStatus {
    Detected,
    Analyzing,
    Verified,
    PendingReview,
    Approved,
    Rejected,
    Resolved,
}

impl AnomalyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyStatus::Detected => "detected",
            AnomalyStatus::Analyzing => "analyzing",
            AnomalyStatus::Verified => "verified",
            AnomalyStatus::PendingReview => "pending_review",
            AnomalyStatus::Approved => "approved",
            AnomalyStatus::Rejected => "rejected",
            AnomalyStatus::Resolved => "resolved",
        }
    }

    /// Parse a stored string; unknown values map to `Detected`.
    pub fn parse(s: &str) -> Self {
        match s {
            "detected" => AnomalyStatus::Detected,
            "analyzing" => AnomalyStatus::Analyzing,
            "verified" => AnomalyStatus::Verified,
            "pending_review" => AnomalyStatus::PendingReview,
            "approved" => AnomalyStatus::Approved,
            "rejected" => AnomalyStatus::Rejected,
            "resolved" => AnomalyStatus::Resolved,
            _ => AnomalyStatus::Detected,
        }
    }
}

/// A detected event subject to classification and review.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub status: AnomalyStatus,
    /// Confidence in [0, 1]; clamped on every AI write.
    pub confidence: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub source_type: String,
    pub raw_data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact_assessment: Option<Value>,
    pub media_urls: Vec<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new anomaly (manual submission or ingestion).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnomalyInput {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub confidence: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub location: String,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    #[serde(default = "default_object")]
    pub raw_data: Value,
    #[serde(default)]
    pub ai_analysis: Option<Value>,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_severity() -> Severity {
    Severity::Medium
}

fn default_source_type() -> String {
    "manual".to_string()
}

fn default_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Partial update input for PATCH.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnomalyInput {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<AnomalyKind>,
    pub severity: Option<Severity>,
    pub status: Option<AnomalyStatus>,
    pub confidence: Option<f64>,
    pub location: Option<String>,
    pub ai_analysis: Option<Value>,
    pub verification_data: Option<Value>,
    pub impact_assessment: Option<Value>,
    pub tags: Option<Vec<String>>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in [
            AnomalyKind::Weather,
            AnomalyKind::Seismic,
            AnomalyKind::Infrastructure,
            AnomalyKind::Other,
        ] {
            assert_eq!(AnomalyKind::parse(kind.as_str()), kind);
        }
        assert_eq!(AnomalyKind::parse("volcanic"), AnomalyKind::Other);
    }

    #[test]
    fn severity_ordering_supports_threshold_checks() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::High >= Severity::High);
        assert_eq!(Severity::parse("bogus"), Severity::Medium);
    }

    #[test]
    fn status_serializes_snake_case() {
        let s = serde_json::to_string(&AnomalyStatus::PendingReview).unwrap();
        assert_eq!(s, "\"pending_review\"");
        assert_eq!(AnomalyStatus::parse("pending_review"), AnomalyStatus::PendingReview);
    }
}
