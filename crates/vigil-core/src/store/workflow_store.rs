use chrono::{TimeZone, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::db::Database;
use crate::error::ServerError;
use crate::models::workflow::{
    CreateWorkflowInput, UpdateWorkflowInput, WorkflowDefinition, WorkflowKind, WorkflowStatus,
};

const SELECT_COLUMNS: &str =
    "id, name, description, kind, status, version, steps, created_at, updated_at";

#[derive(Clone)]
pub struct WorkflowStore {
    db: Database,
}

impl WorkflowStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        input: CreateWorkflowInput,
    ) -> Result<WorkflowDefinition, ServerError> {
        if self.find_by_name(&input.name).await?.is_some() {
            return Err(ServerError::Conflict(format!(
                "Workflow '{}' already exists",
                input.name
            )));
        }
        let now = Utc::now();
        let w = WorkflowDefinition {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            description: input.description,
            kind: input.kind,
            status: input.status,
            version: 1,
            steps: input.steps,
            created_at: now,
            updated_at: now,
        };
        let wc = w.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflows (id, name, description, kind, status, version, steps, \
                     created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        wc.id,
                        wc.name,
                        wc.description,
                        wc.kind.as_str(),
                        wc.status.as_str(),
                        wc.version,
                        serde_json::to_string(&wc.steps).unwrap_or_else(|_| "[]".into()),
                        wc.created_at.timestamp_millis(),
                        wc.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(w)
    }

    pub async fn get(&self, id: &str) -> Result<Option<WorkflowDefinition>, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM workflows WHERE id = ?1"),
                    rusqlite::params![id],
                    |row| Ok(row_to_workflow(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn find_by_name(
        &self,
        name: &str,
    ) -> Result<Option<WorkflowDefinition>, ServerError> {
        let name = name.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM workflows WHERE name = ?1"),
                    rusqlite::params![name],
                    |row| Ok(row_to_workflow(row)),
                )
                .optional()
            })
            .await
    }

    /// Baseline trigger routing: the first active definition, regardless of
    /// trigger name. Multi-trigger routing is intentionally not wired.
    pub async fn find_active(&self) -> Result<Option<WorkflowDefinition>, ServerError> {
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM workflows WHERE status = 'active' \
                         ORDER BY created_at ASC LIMIT 1"
                    ),
                    [],
                    |row| Ok(row_to_workflow(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<WorkflowDefinition>, ServerError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM workflows ORDER BY created_at DESC"
                ))?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_workflow(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Apply a partial update. Every successful edit increments `version`.
    pub async fn update(
        &self,
        id: &str,
        input: UpdateWorkflowInput,
    ) -> Result<Option<WorkflowDefinition>, ServerError> {
        let existing = self.get(id).await?;
        let Some(mut w) = existing else { return Ok(None) };
        if let Some(v) = input.name { w.name = v; }
        if let Some(v) = input.description { w.description = v; }
        if let Some(v) = input.kind { w.kind = v; }
        if let Some(v) = input.status { w.status = v; }
        if let Some(v) = input.steps { w.steps = v; }
        w.version += 1;
        w.updated_at = Utc::now();
        let wc = w.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE workflows SET name=?2, description=?3, kind=?4, status=?5, \
                     version=?6, steps=?7, updated_at=?8 WHERE id=?1",
                    rusqlite::params![
                        wc.id,
                        wc.name,
                        wc.description,
                        wc.kind.as_str(),
                        wc.status.as_str(),
                        wc.version,
                        serde_json::to_string(&wc.steps).unwrap_or_else(|_| "[]".into()),
                        wc.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(Some(w))
    }

    pub async fn delete(&self, id: &str) -> Result<bool, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let n = conn.execute("DELETE FROM workflows WHERE id = ?1", rusqlite::params![id])?;
                Ok(n > 0)
            })
            .await
    }
}

fn row_to_workflow(row: &rusqlite::Row<'_>) -> WorkflowDefinition {
    let to_dt = |ms: Option<i64>| ms.and_then(|v| Utc.timestamp_millis_opt(v).single());

    WorkflowDefinition {
        id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        description: row.get(2).unwrap_or_default(),
        kind: WorkflowKind::parse(&row.get::<_, String>(3).unwrap_or_default()),
        status: WorkflowStatus::parse(&row.get::<_, String>(4).unwrap_or_default()),
        version: row.get(5).unwrap_or(1),
        steps: serde_json::from_str(&row.get::<_, String>(6).unwrap_or_else(|_| "[]".into()))
            .unwrap_or_default(),
        created_at: to_dt(row.get(7).ok()).unwrap_or_else(Utc::now),
        updated_at: to_dt(row.get(8).ok()).unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::workflow::workflow_templates;

    #[tokio::test]
    async fn create_enforces_unique_names() {
        let store = WorkflowStore::new(Database::open_in_memory().unwrap());
        let mut template = workflow_templates().remove(0);
        store.create(template.clone()).await.unwrap();

        template.status = WorkflowStatus::Active;
        let err = store.create(template).await.unwrap_err();
        assert!(matches!(err, ServerError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_bumps_version() {
        let store = WorkflowStore::new(Database::open_in_memory().unwrap());
        let created = store.create(workflow_templates().remove(0)).await.unwrap();
        assert_eq!(created.version, 1);

        let updated = store
            .update(
                &created.id,
                UpdateWorkflowInput {
                    status: Some(WorkflowStatus::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.status, WorkflowStatus::Active);
        assert_eq!(updated.steps.len(), 8);
    }

    #[tokio::test]
    async fn find_active_ignores_drafts() {
        let store = WorkflowStore::new(Database::open_in_memory().unwrap());
        let templates = workflow_templates();
        let draft = store.create(templates[0].clone()).await.unwrap();
        store.create(templates[1].clone()).await.unwrap();

        assert!(store.find_active().await.unwrap().is_none());

        store
            .update(
                &draft.id,
                UpdateWorkflowInput {
                    status: Some(WorkflowStatus::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let active = store.find_active().await.unwrap().unwrap();
        assert_eq!(active.id, draft.id);
    }
}
