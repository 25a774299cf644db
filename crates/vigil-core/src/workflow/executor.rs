//! Workflow executor — advances an execution through its definition's step
//! list, one step at a time.
//!
//! The executor:
//! 1. Marks the execution `running` and stamps `started_at`
//! 2. Persists `current_step` *before* each step body runs, so a crash
//!    mid-step is observable as "in progress at step X"
//! 3. Dispatches on the step-type tag, sharing an execution-scoped context
//! 4. Appends step results in strict declaration order
//! 5. Records the terminal outcome (`completed` with an output snapshot, or
//!    `failed` with the captured error), including the run duration
//!
//! A step handler error is fatal to that execution only; distinct
//! executions share nothing but the store and the event bus.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use crate::error::ServerError;
use crate::events::{topic, EventBus};
use crate::models::anomaly::AnomalyStatus;
use crate::models::anomaly::UpdateAnomalyInput;
use crate::models::execution::{
    CreateExecutionInput, ExecutionPatch, ExecutionStatus, StepRecord,
};
use crate::models::workflow::{StepType, WorkflowDefinition, WorkflowStep};
use crate::oracle::{AiOracle, AnalysisRequest};
use crate::store::{AnomalyStore, ExecutionStore, WorkflowStore};

use super::decision::{decide, AutonomySettings, Decision};

/// Execution-scoped state shared across step handlers.
struct ExecutionContext {
    anomaly_id: Option<String>,
    anomaly: Value,
    variables: Map<String, Value>,
}

impl ExecutionContext {
    fn new(input: Value) -> Self {
        let anomaly_id = input
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            anomaly_id,
            anomaly: input,
            variables: Map::new(),
        }
    }

    fn field(&self, key: &str) -> String {
        self.anomaly
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

/// Result of one step: an opaque payload plus an early-termination flag.
/// None of the default step types set `terminate`; the loop honors it for
/// definitions that opt into short-circuiting via custom handlers.
struct StepOutcome {
    result: Value,
    terminate: bool,
}

impl StepOutcome {
    fn ok(result: Value) -> Self {
        Self {
            result,
            terminate: false,
        }
    }
}

/// The step-state-machine core. Explicitly constructed with its
/// collaborators so tests can substitute fakes for the store, oracle, and
/// event bus.
#[derive(Clone)]
pub struct WorkflowExecutor {
    anomalies: AnomalyStore,
    workflows: WorkflowStore,
    executions: ExecutionStore,
    oracle: Arc<dyn AiOracle>,
    bus: EventBus,
    autonomy: Arc<RwLock<AutonomySettings>>,
}

impl WorkflowExecutor {
    pub fn new(
        anomalies: AnomalyStore,
        workflows: WorkflowStore,
        executions: ExecutionStore,
        oracle: Arc<dyn AiOracle>,
        bus: EventBus,
        autonomy: Arc<RwLock<AutonomySettings>>,
    ) -> Self {
        Self {
            anomalies,
            workflows,
            executions,
            oracle,
            bus,
            autonomy,
        }
    }

    /// Trigger entry point shared by the ingestion scheduler and the HTTP
    /// API. Selects the single globally-active definition (the trigger name
    /// is recorded for audit but does not route), creates a pending
    /// execution, and begins the run in a supervised background task.
    /// Returns the execution id immediately so callers can poll.
    pub async fn trigger(
        &self,
        trigger: &str,
        data: Value,
    ) -> Result<Option<String>, ServerError> {
        let Some(workflow) = self.workflows.find_active().await? else {
            tracing::warn!(trigger, "no active workflow found for trigger");
            return Ok(None);
        };

        let anomaly_id = data.get("id").and_then(Value::as_str).map(str::to_string);
        let execution = self
            .executions
            .create(CreateExecutionInput {
                workflow_id: workflow.id.clone(),
                anomaly_id,
                input: json!({ "trigger": trigger, "data": data.clone() }),
                triggered_by: trigger.to_string(),
            })
            .await?;

        let this = self.clone();
        let execution_id = execution.id.clone();
        tokio::spawn(async move {
            if let Err(e) = this.run(&execution_id, &workflow, data).await {
                tracing::error!(%execution_id, "workflow execution error: {}", e);
            }
        });

        Ok(Some(execution.id))
    }

    /// Run one execution to a terminal state. The failure branch persists
    /// before the error propagates, so callers only ever observe the
    /// execution as `failed` with its message recorded.
    pub async fn run(
        &self,
        execution_id: &str,
        workflow: &WorkflowDefinition,
        input: Value,
    ) -> Result<(), ServerError> {
        let started_at = Utc::now();
        self.executions
            .update(
                execution_id,
                ExecutionPatch {
                    status: Some(ExecutionStatus::Running),
                    started_at: Some(started_at),
                    ..Default::default()
                },
            )
            .await?;

        let mut ctx = ExecutionContext::new(input);
        let mut records: Vec<StepRecord> = Vec::new();

        for step in &workflow.steps {
            // Persist the marker first: a crash mid-step is observable.
            self.executions
                .update(
                    execution_id,
                    ExecutionPatch {
                        current_step: Some(step.id.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            self.bus.publish(
                topic::WORKFLOW_PROGRESS,
                json!({
                    "executionId": execution_id,
                    "workflowId": workflow.id,
                    "stepId": step.id,
                    "stepName": step.name,
                    "status": "running",
                }),
            );

            match self.execute_step(step, &mut ctx).await {
                Ok(outcome) => {
                    records.push(StepRecord {
                        step_id: step.id.clone(),
                        step_name: step.name.clone(),
                        result: outcome.result,
                    });
                    self.executions
                        .update(
                            execution_id,
                            ExecutionPatch {
                                step_results: Some(records.clone()),
                                ..Default::default()
                            },
                        )
                        .await?;
                    if outcome.terminate {
                        break;
                    }
                }
                Err(e) => {
                    let completed_at = Utc::now();
                    let duration = (completed_at - started_at).num_milliseconds();
                    self.executions
                        .update(
                            execution_id,
                            ExecutionPatch {
                                status: Some(ExecutionStatus::Failed),
                                error: Some(e.to_string()),
                                completed_at: Some(completed_at),
                                duration_ms: Some(duration),
                                ..Default::default()
                            },
                        )
                        .await?;
                    self.bus.publish(
                        topic::WORKFLOW_PROGRESS,
                        json!({
                            "executionId": execution_id,
                            "workflowId": workflow.id,
                            "stepId": step.id,
                            "status": "failed",
                            "error": e.to_string(),
                        }),
                    );
                    return Err(e);
                }
            }
        }

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds();
        self.executions
            .update(
                execution_id,
                ExecutionPatch {
                    status: Some(ExecutionStatus::Completed),
                    output: Some(json!({ "finalContext": Value::Object(ctx.variables) })),
                    completed_at: Some(completed_at),
                    duration_ms: Some(duration),
                    ..Default::default()
                },
            )
            .await?;
        self.bus.publish(
            topic::WORKFLOW_PROGRESS,
            json!({
                "executionId": execution_id,
                "workflowId": workflow.id,
                "status": "completed",
                "durationMs": duration,
            }),
        );
        tracing::info!(
            workflow = %workflow.name,
            execution_id,
            duration_ms = duration,
            "workflow completed"
        );
        Ok(())
    }

    async fn execute_step(
        &self,
        step: &WorkflowStep,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, ServerError> {
        tracing::debug!(step = %step.name, step_type = ?step.step_type, "executing step");

        match step.step_type {
            StepType::Intake => self.intake_step(ctx),
            StepType::AiAnalysis => self.ai_analysis_step(ctx).await,
            StepType::Verification => self.verification_step(ctx).await,
            StepType::Decision => self.decision_step(ctx).await,
            StepType::HumanReview => self.human_review_step(ctx).await,
            StepType::Approval => self.approval_step(ctx).await,
            StepType::Response => self.response_step(ctx).await,
            StepType::Notification => self.notification_step(ctx),
            StepType::Custom => Ok(StepOutcome::ok(json!({
                "success": true,
                "message": "Step type not implemented",
            }))),
        }
    }

    /// Validate and prepare the input; no external calls.
    fn intake_step(&self, ctx: &ExecutionContext) -> Result<StepOutcome, ServerError> {
        Ok(StepOutcome::ok(json!({
            "success": true,
            "validated": true,
            "anomalyId": ctx.anomaly_id,
            "timestamp": Utc::now().to_rfc3339(),
        })))
    }

    async fn ai_analysis_step(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, ServerError> {
        if !ctx.anomaly.is_object() {
            return Ok(StepOutcome::ok(json!({
                "success": false,
                "error": "No anomaly data available",
            })));
        }

        let request = AnalysisRequest {
            title: ctx.field("title"),
            description: ctx.field("description"),
            kind: ctx.field("type"),
            location: ctx.field("location"),
            raw_data: ctx.anomaly.get("rawData").cloned().unwrap_or(json!({})),
        };
        let analysis = self.oracle.analyze(&request).await?;
        let analysis_value = serde_json::to_value(&analysis)
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        if let Some(anomaly_id) = &ctx.anomaly_id {
            self.anomalies
                .update(
                    anomaly_id,
                    UpdateAnomalyInput {
                        ai_analysis: Some(analysis_value.clone()),
                        confidence: Some(analysis.confidence),
                        status: Some(AnomalyStatus::Analyzing),
                        ..Default::default()
                    },
                )
                .await?;
        }

        ctx.variables
            .insert("aiAnalysis".to_string(), analysis_value.clone());

        Ok(StepOutcome::ok(json!({
            "success": true,
            "analysis": analysis_value,
            "confidence": analysis.confidence,
        })))
    }

    /// Cross-verify against the `sources` context variable (supporting
    /// evidence accumulated upstream; defaults to empty).
    async fn verification_step(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, ServerError> {
        let sources: Vec<Value> = ctx
            .variables
            .get("sources")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let report = self
            .oracle
            .cross_verify(ctx.anomaly_id.as_deref().unwrap_or(""), &sources)
            .await?;
        let report_value =
            serde_json::to_value(&report).map_err(|e| ServerError::Internal(e.to_string()))?;

        if let Some(anomaly_id) = &ctx.anomaly_id {
            self.anomalies
                .update(
                    anomaly_id,
                    UpdateAnomalyInput {
                        verification_data: Some(report_value.clone()),
                        status: Some(if report.verified {
                            AnomalyStatus::Verified
                        } else {
                            AnomalyStatus::PendingReview
                        }),
                        ..Default::default()
                    },
                )
                .await?;
        }

        ctx.variables
            .insert("verification".to_string(), report_value);

        Ok(StepOutcome::ok(json!({
            "success": true,
            "verified": report.verified,
            "confidence": report.confidence,
        })))
    }

    /// Pure policy call: reads context variables and the injected autonomy
    /// settings, performs no I/O.
    async fn decision_step(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, ServerError> {
        let confidence = ctx
            .variables
            .get("aiAnalysis")
            .and_then(|a| a.get("confidence"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let verified = ctx
            .variables
            .get("verification")
            .and_then(|v| v.get("verified"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let settings = *self.autonomy.read().await;
        let outcome = decide(confidence, verified, &settings);
        let outcome_value =
            serde_json::to_value(&outcome).map_err(|e| ServerError::Internal(e.to_string()))?;

        ctx.variables
            .insert("decision".to_string(), outcome_value.clone());

        let mut result = json!({ "success": true });
        if let (Value::Object(target), Value::Object(fields)) = (&mut result, &outcome_value) {
            target.extend(fields.clone());
        }
        Ok(StepOutcome::ok(result))
    }

    /// Queue for human review. Non-blocking by design: the human acts
    /// out-of-band through the admin API, mutating the anomaly directly;
    /// the execution is not paused or resumed.
    async fn human_review_step(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, ServerError> {
        if let Some(anomaly_id) = &ctx.anomaly_id {
            self.anomalies
                .update(
                    anomaly_id,
                    UpdateAnomalyInput {
                        status: Some(AnomalyStatus::PendingReview),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Ok(StepOutcome::ok(json!({
            "success": true,
            "status": "pending_review",
            "message": "Anomaly queued for human review",
        })))
    }

    async fn approval_step(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, ServerError> {
        let auto_approved = ctx
            .variables
            .get("decision")
            .and_then(|d| d.get("decision"))
            .and_then(Value::as_str)
            == Some(Decision::AutoApproved.as_str());

        if auto_approved {
            if let Some(anomaly_id) = &ctx.anomaly_id {
                self.anomalies
                    .update(
                        anomaly_id,
                        UpdateAnomalyInput {
                            status: Some(AnomalyStatus::Approved),
                            reviewed_at: Some(Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            return Ok(StepOutcome::ok(json!({
                "success": true,
                "approved": true,
                "method": "automatic",
            })));
        }

        Ok(StepOutcome::ok(json!({
            "success": true,
            "approved": false,
            "method": "manual_required",
        })))
    }

    async fn response_step(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, ServerError> {
        if !ctx.anomaly.is_object() {
            return Ok(StepOutcome::ok(json!({
                "success": false,
                "error": "No anomaly data",
            })));
        }

        let impact = self.oracle.impact_assessment(&ctx.anomaly).await?;

        if let Some(anomaly_id) = &ctx.anomaly_id {
            self.anomalies
                .update(
                    anomaly_id,
                    UpdateAnomalyInput {
                        impact_assessment: Some(impact.clone()),
                        ..Default::default()
                    },
                )
                .await?;
        }

        Ok(StepOutcome::ok(json!({
            "success": true,
            "impactAssessment": impact,
        })))
    }

    /// Notification fan-out is an external collaborator concern; the core
    /// publishes on the bus and reports zero delivery channels.
    fn notification_step(&self, ctx: &ExecutionContext) -> Result<StepOutcome, ServerError> {
        self.bus.publish(
            topic::SYSTEM,
            json!({
                "event": "workflow_notification",
                "anomalyId": ctx.anomaly_id,
            }),
        );
        Ok(StepOutcome::ok(json!({
            "success": true,
            "notificationsSent": 0,
            "channels": [],
        })))
    }
}
