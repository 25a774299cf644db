//! Decision policy — pure confidence/verification/threshold function.
//!
//! No I/O and no ambient state: the autonomous-mode flag and threshold are
//! passed in explicitly, so the policy is deterministic and unit-testable.
//! The settings live in app state behind a lock and are changed only
//! through the administrative API.

use serde::{Deserialize, Serialize};

/// Configuration permitting auto-approval without human input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutonomySettings {
    pub autonomous_mode: bool,
    pub auto_approve_threshold: f64,
}

impl Default for AutonomySettings {
    fn default() -> Self {
        Self {
            autonomous_mode: false,
            auto_approve_threshold: 0.95,
        }
    }
}

/// Verdict of the decision step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoApproved,
    RequiresReview,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::AutoApproved => "auto_approved",
            Decision::RequiresReview => "requires_review",
        }
    }
}

/// Serializable outcome stored in the execution context for downstream
/// steps (approval reads `decision`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub reason: String,
    pub requires_human_review: bool,
}

/// Auto-approve iff autonomous mode is on, confidence meets the threshold,
/// and cross-verification succeeded. Everything else escalates to a human.
pub fn decide(confidence: f64, verified: bool, settings: &AutonomySettings) -> DecisionOutcome {
    if settings.autonomous_mode && confidence >= settings.auto_approve_threshold && verified {
        DecisionOutcome {
            decision: Decision::AutoApproved,
            reason: "High confidence and verified".to_string(),
            requires_human_review: false,
        }
    } else {
        DecisionOutcome {
            decision: Decision::RequiresReview,
            reason: "Does not meet auto-approval criteria".to_string(),
            requires_human_review: true,
        }
    }
}
