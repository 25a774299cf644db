use chrono::{TimeZone, Utc};
use rusqlite::OptionalExtension;
use serde_json::Value;
use uuid::Uuid;

use crate::db::Database;
use crate::error::ServerError;
use crate::models::execution::{
    CreateExecutionInput, ExecutionPatch, ExecutionStatus, WorkflowExecution,
};

const SELECT_COLUMNS: &str = "id, workflow_id, anomaly_id, status, current_step, step_results, \
     input, output, error, triggered_by, started_at, completed_at, duration_ms, created_at";

/// Filters for listing executions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub workflow_id: Option<String>,
    pub anomaly_id: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Clone)]
pub struct ExecutionStore {
    db: Database,
}

impl ExecutionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        input: CreateExecutionInput,
    ) -> Result<WorkflowExecution, ServerError> {
        let e = WorkflowExecution {
            id: Uuid::new_v4().to_string(),
            workflow_id: input.workflow_id,
            anomaly_id: input.anomaly_id,
            status: ExecutionStatus::Pending,
            current_step: None,
            step_results: Vec::new(),
            input: input.input,
            output: None,
            error: None,
            triggered_by: input.triggered_by,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            created_at: Utc::now(),
        };
        let ec = e.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflow_executions (id, workflow_id, anomaly_id, status, \
                     current_step, step_results, input, output, error, triggered_by, started_at, \
                     completed_at, duration_ms, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    rusqlite::params![
                        ec.id,
                        ec.workflow_id,
                        ec.anomaly_id,
                        ec.status.as_str(),
                        ec.current_step,
                        serde_json::to_string(&ec.step_results).unwrap_or_else(|_| "[]".into()),
                        ec.input.to_string(),
                        ec.output.as_ref().map(|v| v.to_string()),
                        ec.error,
                        ec.triggered_by,
                        ec.started_at.map(|t| t.timestamp_millis()),
                        ec.completed_at.map(|t| t.timestamp_millis()),
                        ec.duration_ms,
                        ec.created_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(e)
    }

    pub async fn get(&self, id: &str) -> Result<Option<WorkflowExecution>, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM workflow_executions WHERE id = ?1"),
                    rusqlite::params![id],
                    |row| Ok(row_to_execution(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn list(
        &self,
        filter: ExecutionFilter,
    ) -> Result<Vec<WorkflowExecution>, ServerError> {
        self.db
            .with_conn_async(move |conn| {
                let mut clauses: Vec<String> = Vec::new();
                let mut params: Vec<String> = Vec::new();
                if let Some(workflow_id) = filter.workflow_id {
                    params.push(workflow_id);
                    clauses.push(format!("workflow_id = ?{}", params.len()));
                }
                if let Some(anomaly_id) = filter.anomaly_id {
                    params.push(anomaly_id);
                    clauses.push(format!("anomaly_id = ?{}", params.len()));
                }
                let where_clause = if clauses.is_empty() {
                    String::new()
                } else {
                    format!("WHERE {}", clauses.join(" AND "))
                };
                let limit = filter.limit.unwrap_or(100);
                let sql = format!(
                    "SELECT {SELECT_COLUMNS} FROM workflow_executions {where_clause} \
                     ORDER BY created_at DESC LIMIT {limit}"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                        Ok(row_to_execution(row))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Apply a progress patch. Only the executor writes through this path.
    pub async fn update(
        &self,
        id: &str,
        patch: ExecutionPatch,
    ) -> Result<Option<WorkflowExecution>, ServerError> {
        let existing = self.get(id).await?;
        let Some(mut e) = existing else { return Ok(None) };
        if let Some(v) = patch.status { e.status = v; }
        if let Some(v) = patch.current_step { e.current_step = Some(v); }
        if let Some(v) = patch.step_results { e.step_results = v; }
        if let Some(v) = patch.output { e.output = Some(v); }
        if let Some(v) = patch.error { e.error = Some(v); }
        if let Some(v) = patch.started_at { e.started_at = Some(v); }
        if let Some(v) = patch.completed_at { e.completed_at = Some(v); }
        if let Some(v) = patch.duration_ms { e.duration_ms = Some(v); }
        let ec = e.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE workflow_executions SET status=?2, current_step=?3, step_results=?4, \
                     output=?5, error=?6, started_at=?7, completed_at=?8, duration_ms=?9 \
                     WHERE id=?1",
                    rusqlite::params![
                        ec.id,
                        ec.status.as_str(),
                        ec.current_step,
                        serde_json::to_string(&ec.step_results).unwrap_or_else(|_| "[]".into()),
                        ec.output.as_ref().map(|v| v.to_string()),
                        ec.error,
                        ec.started_at.map(|t| t.timestamp_millis()),
                        ec.completed_at.map(|t| t.timestamp_millis()),
                        ec.duration_ms,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(Some(e))
    }
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> WorkflowExecution {
    let to_dt = |ms: Option<i64>| ms.and_then(|v| Utc.timestamp_millis_opt(v).single());

    WorkflowExecution {
        id: row.get(0).unwrap_or_default(),
        workflow_id: row.get(1).unwrap_or_default(),
        anomaly_id: row.get(2).unwrap_or(None),
        status: ExecutionStatus::parse(&row.get::<_, String>(3).unwrap_or_default()),
        current_step: row.get(4).unwrap_or(None),
        step_results: serde_json::from_str(
            &row.get::<_, String>(5).unwrap_or_else(|_| "[]".into()),
        )
        .unwrap_or_default(),
        input: row
            .get::<_, String>(6)
            .ok()
            .and_then(|t| serde_json::from_str(&t).ok())
            .unwrap_or(Value::Object(serde_json::Map::new())),
        output: row
            .get::<_, Option<String>>(7)
            .unwrap_or(None)
            .and_then(|t| serde_json::from_str(&t).ok()),
        error: row.get(8).unwrap_or(None),
        triggered_by: row.get(9).unwrap_or_default(),
        started_at: to_dt(row.get(10).unwrap_or(None)),
        completed_at: to_dt(row.get(11).unwrap_or(None)),
        duration_ms: row.get(12).unwrap_or(None),
        created_at: to_dt(row.get(13).ok()).unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::execution::StepRecord;
    use serde_json::json;

    async fn seeded_store() -> (ExecutionStore, WorkflowExecution) {
        let db = Database::open_in_memory().unwrap();
        let workflows = crate::store::WorkflowStore::new(db.clone());
        let workflow = workflows
            .create(crate::models::workflow::workflow_templates().remove(0))
            .await
            .unwrap();
        let store = ExecutionStore::new(db);
        let execution = store
            .create(CreateExecutionInput {
                workflow_id: workflow.id,
                anomaly_id: Some("anomaly-1".to_string()),
                input: json!({"trigger": "manual"}),
                triggered_by: "manual".to_string(),
            })
            .await
            .unwrap();
        (store, execution)
    }

    #[tokio::test]
    async fn new_executions_start_pending() {
        let (store, execution) = seeded_store().await;
        let fetched = store.get(&execution.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ExecutionStatus::Pending);
        assert!(fetched.started_at.is_none());
        assert!(fetched.step_results.is_empty());
    }

    #[tokio::test]
    async fn patch_preserves_step_result_order() {
        let (store, execution) = seeded_store().await;
        let records = vec![
            StepRecord {
                step_id: "intake".to_string(),
                step_name: "Intake".to_string(),
                result: json!({"success": true}),
            },
            StepRecord {
                step_id: "ai_analysis".to_string(),
                step_name: "AI Analysis".to_string(),
                result: json!({"success": true, "confidence": 0.9}),
            },
        ];
        store
            .update(
                &execution.id,
                ExecutionPatch {
                    status: Some(ExecutionStatus::Running),
                    step_results: Some(records),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let fetched = store.get(&execution.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ExecutionStatus::Running);
        assert_eq!(fetched.step_results.len(), 2);
        assert_eq!(fetched.step_results[0].step_id, "intake");
        assert_eq!(fetched.step_results[1].step_id, "ai_analysis");
    }

    #[tokio::test]
    async fn list_filters_by_anomaly() {
        let (store, execution) = seeded_store().await;
        let by_anomaly = store
            .list(ExecutionFilter {
                anomaly_id: Some("anomaly-1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_anomaly.len(), 1);
        assert_eq!(by_anomaly[0].id, execution.id);

        let none = store
            .list(ExecutionFilter {
                anomaly_id: Some("other".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
