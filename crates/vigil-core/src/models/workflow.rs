use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Workflow flavor — informational grouping only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Default,
    Emergency,
    Verification,
    Escalation,
    #[serde(other)]
    Custom,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Default => "default",
            WorkflowKind::Emergency => "emergency",
            WorkflowKind::Verification => "verification",
            WorkflowKind::Escalation => "escalation",
            WorkflowKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "default" => WorkflowKind::Default,
            "emergency" => WorkflowKind::Emergency,
            "verification" => WorkflowKind::Verification,
            "escalation" => WorkflowKind::Escalation,
            _ => WorkflowKind::Custom,
        }
    }
}

/// Only `Active` definitions may be triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Active,
    Inactive,
    Draft,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Active => "active",
            WorkflowStatus::Inactive => "inactive",
            WorkflowStatus::Draft => "draft",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => WorkflowStatus::Active,
            "inactive" => WorkflowStatus::Inactive,
            _ => WorkflowStatus::Draft,
        }
    }
}

/// Dispatch tag for a workflow step. Unrecognized tags deserialize to
/// `Custom`, which the executor treats as a successful no-op
/// (forward-compatibility policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Intake,
    AiAnalysis,
    Verification,
    Decision,
    HumanReview,
    Approval,
    Response,
    Notification,
    #[serde(other)]
    Custom,
}

/// A single step descriptor inside a workflow definition.
///
/// `next_steps` is descriptive metadata carried over from the schema; the
/// executor runs steps strictly in declared order and ignores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

/// A named, versioned, ordered list of step descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: WorkflowKind,
    pub status: WorkflowStatus,
    pub version: i64,
    pub steps: Vec<WorkflowStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: WorkflowKind,
    #[serde(default = "default_status")]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

fn default_kind() -> WorkflowKind {
    WorkflowKind::Default
}

fn default_status() -> WorkflowStatus {
    WorkflowStatus::Draft
}

/// Partial update input for PATCH. Every edit bumps the version counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkflowInput {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<WorkflowKind>,
    pub status: Option<WorkflowStatus>,
    pub steps: Option<Vec<WorkflowStep>>,
}

fn step(id: &str, name: &str, step_type: StepType, next: &[&str]) -> WorkflowStep {
    WorkflowStep {
        id: id.to_string(),
        name: name.to_string(),
        step_type,
        config: json!({}),
        next_steps: next.iter().map(|s| s.to_string()).collect(),
    }
}

/// Built-in workflow templates offered by the administrative API.
pub fn workflow_templates() -> Vec<CreateWorkflowInput> {
    vec![
        CreateWorkflowInput {
            name: "Default Anomaly Workflow".to_string(),
            description: "Standard anomaly processing with AI analysis and human review"
                .to_string(),
            kind: WorkflowKind::Default,
            status: WorkflowStatus::Draft,
            steps: vec![
                step("intake", "Intake", StepType::Intake, &["ai_analysis"]),
                step("ai_analysis", "AI Analysis", StepType::AiAnalysis, &["verification"]),
                step("verification", "Cross-Verification", StepType::Verification, &["decision"]),
                step("decision", "Decision", StepType::Decision, &["human_review", "approval"]),
                step("human_review", "Human Review", StepType::HumanReview, &["approval"]),
                step("approval", "Approval", StepType::Approval, &["response"]),
                step("response", "Response", StepType::Response, &["notification"]),
                step("notification", "Notification", StepType::Notification, &[]),
            ],
        },
        CreateWorkflowInput {
            name: "Emergency Response Workflow".to_string(),
            description: "Fast-track workflow for critical anomalies".to_string(),
            kind: WorkflowKind::Emergency,
            status: WorkflowStatus::Draft,
            steps: vec![
                step("emergency_intake", "Emergency Intake", StepType::Intake, &["ai_triage"]),
                step("ai_triage", "AI Triage", StepType::AiAnalysis, &["impact"]),
                step("impact", "Impact Assessment", StepType::Response, &["notification"]),
                step("notification", "Emergency Notification", StepType::Notification, &[]),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_step_type_deserializes_to_custom() {
        let raw = json!({
            "id": "s1",
            "name": "Mystery",
            "type": "quantum_entanglement",
        });
        let parsed: WorkflowStep = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.step_type, StepType::Custom);
        assert!(parsed.next_steps.is_empty());
    }

    #[test]
    fn templates_cover_default_and_emergency() {
        let templates = workflow_templates();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].steps.len(), 8);
        assert_eq!(templates[1].steps.len(), 4);
        assert_eq!(templates[0].steps[3].step_type, StepType::Decision);
        assert_eq!(
            templates[0].steps[3].next_steps,
            vec!["human_review".to_string(), "approval".to_string()]
        );
    }
}
