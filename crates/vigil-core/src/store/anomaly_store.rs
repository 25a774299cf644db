use chrono::{TimeZone, Utc};
use rusqlite::OptionalExtension;
use serde_json::Value;
use uuid::Uuid;

use crate::db::Database;
use crate::error::ServerError;
use crate::models::anomaly::{
    Anomaly, AnomalyKind, AnomalyStatus, CreateAnomalyInput, Severity, UpdateAnomalyInput,
};
use crate::oracle::clamp_confidence;

const SELECT_COLUMNS: &str = "id, title, description, kind, severity, status, confidence, \
     latitude, longitude, location, source_id, source_type, raw_data, ai_analysis, \
     verification_data, impact_assessment, media_urls, tags, reviewed_by, reviewed_at, \
     resolved_at, created_at, updated_at";

/// Filters for listing anomalies.
#[derive(Debug, Clone, Default)]
pub struct AnomalyFilter {
    pub status: Option<AnomalyStatus>,
    pub severity: Option<Severity>,
    pub kind: Option<AnomalyKind>,
    pub limit: Option<u32>,
}

#[derive(Clone)]
pub struct AnomalyStore {
    db: Database,
}

impl AnomalyStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: CreateAnomalyInput) -> Result<Anomaly, ServerError> {
        let now = Utc::now();
        let a = Anomaly {
            id: Uuid::new_v4().to_string(),
            title: input.title,
            description: input.description,
            kind: input.kind,
            severity: input.severity,
            status: AnomalyStatus::Detected,
            confidence: clamp_confidence(input.confidence),
            latitude: input.latitude,
            longitude: input.longitude,
            location: input.location,
            source_id: input.source_id,
            source_type: input.source_type,
            raw_data: input.raw_data,
            ai_analysis: input.ai_analysis,
            verification_data: None,
            impact_assessment: None,
            media_urls: input.media_urls,
            tags: input.tags,
            reviewed_by: None,
            reviewed_at: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        let ac = a.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO anomalies (id, title, description, kind, severity, status, \
                     confidence, latitude, longitude, location, source_id, source_type, raw_data, \
                     ai_analysis, verification_data, impact_assessment, media_urls, tags, \
                     reviewed_by, reviewed_at, resolved_at, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
                     ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
                    rusqlite::params![
                        ac.id,
                        ac.title,
                        ac.description,
                        ac.kind.as_str(),
                        ac.severity.as_str(),
                        ac.status.as_str(),
                        ac.confidence,
                        ac.latitude,
                        ac.longitude,
                        ac.location,
                        ac.source_id,
                        ac.source_type,
                        ac.raw_data.to_string(),
                        ac.ai_analysis.as_ref().map(|v| v.to_string()),
                        ac.verification_data.as_ref().map(|v| v.to_string()),
                        ac.impact_assessment.as_ref().map(|v| v.to_string()),
                        serde_json::to_string(&ac.media_urls).unwrap_or_else(|_| "[]".into()),
                        serde_json::to_string(&ac.tags).unwrap_or_else(|_| "[]".into()),
                        ac.reviewed_by,
                        ac.reviewed_at.map(|t| t.timestamp_millis()),
                        ac.resolved_at.map(|t| t.timestamp_millis()),
                        ac.created_at.timestamp_millis(),
                        ac.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(a)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Anomaly>, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM anomalies WHERE id = ?1"),
                    rusqlite::params![id],
                    |row| Ok(row_to_anomaly(row)),
                )
                .optional()
            })
            .await
    }

    /// Dedup lookup used by the ingestion scheduler: exact match on the
    /// (title, latitude, longitude) triple.
    pub async fn find_duplicate(
        &self,
        title: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<Anomaly>, ServerError> {
        let title = title.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM anomalies \
                         WHERE title = ?1 AND latitude = ?2 AND longitude = ?3"
                    ),
                    rusqlite::params![title, latitude, longitude],
                    |row| Ok(row_to_anomaly(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn list(&self, filter: AnomalyFilter) -> Result<Vec<Anomaly>, ServerError> {
        self.db
            .with_conn_async(move |conn| {
                let mut clauses: Vec<String> = Vec::new();
                let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
                if let Some(status) = filter.status {
                    params.push(Box::new(status.as_str().to_string()));
                    clauses.push(format!("status = ?{}", params.len()));
                }
                if let Some(severity) = filter.severity {
                    params.push(Box::new(severity.as_str().to_string()));
                    clauses.push(format!("severity = ?{}", params.len()));
                }
                if let Some(kind) = filter.kind {
                    params.push(Box::new(kind.as_str().to_string()));
                    clauses.push(format!("kind = ?{}", params.len()));
                }
                let where_clause = if clauses.is_empty() {
                    String::new()
                } else {
                    format!("WHERE {}", clauses.join(" AND "))
                };
                let limit = filter.limit.unwrap_or(100);
                let sql = format!(
                    "SELECT {SELECT_COLUMNS} FROM anomalies {where_clause} \
                     ORDER BY created_at DESC LIMIT {limit}"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(
                        rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
                        |row| Ok(row_to_anomaly(row)),
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn update(
        &self,
        id: &str,
        input: UpdateAnomalyInput,
    ) -> Result<Option<Anomaly>, ServerError> {
        // Fetch first, then apply patches, then save
        let existing = self.get(id).await?;
        let Some(mut a) = existing else { return Ok(None) };
        if let Some(v) = input.title { a.title = v; }
        if let Some(v) = input.description { a.description = v; }
        if let Some(v) = input.kind { a.kind = v; }
        if let Some(v) = input.severity { a.severity = v; }
        if let Some(v) = input.status { a.status = v; }
        if let Some(v) = input.confidence { a.confidence = clamp_confidence(v); }
        if let Some(v) = input.location { a.location = v; }
        if let Some(v) = input.ai_analysis { a.ai_analysis = Some(v); }
        if let Some(v) = input.verification_data { a.verification_data = Some(v); }
        if let Some(v) = input.impact_assessment { a.impact_assessment = Some(v); }
        if let Some(v) = input.tags { a.tags = v; }
        if let Some(v) = input.reviewed_by { a.reviewed_by = Some(v); }
        if let Some(v) = input.reviewed_at { a.reviewed_at = Some(v); }
        if let Some(v) = input.resolved_at { a.resolved_at = Some(v); }
        a.updated_at = Utc::now();
        let ac = a.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE anomalies SET title=?2, description=?3, kind=?4, severity=?5, \
                     status=?6, confidence=?7, location=?8, ai_analysis=?9, \
                     verification_data=?10, impact_assessment=?11, tags=?12, reviewed_by=?13, \
                     reviewed_at=?14, resolved_at=?15, updated_at=?16 WHERE id=?1",
                    rusqlite::params![
                        ac.id,
                        ac.title,
                        ac.description,
                        ac.kind.as_str(),
                        ac.severity.as_str(),
                        ac.status.as_str(),
                        ac.confidence,
                        ac.location,
                        ac.ai_analysis.as_ref().map(|v| v.to_string()),
                        ac.verification_data.as_ref().map(|v| v.to_string()),
                        ac.impact_assessment.as_ref().map(|v| v.to_string()),
                        serde_json::to_string(&ac.tags).unwrap_or_else(|_| "[]".into()),
                        ac.reviewed_by,
                        ac.reviewed_at.map(|t| t.timestamp_millis()),
                        ac.resolved_at.map(|t| t.timestamp_millis()),
                        ac.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(Some(a))
    }

    pub async fn delete(&self, id: &str) -> Result<bool, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let n = conn.execute("DELETE FROM anomalies WHERE id = ?1", rusqlite::params![id])?;
                Ok(n > 0)
            })
            .await
    }
}

fn parse_json(text: Option<String>) -> Option<Value> {
    text.and_then(|t| serde_json::from_str(&t).ok())
}

fn parse_list(text: String) -> Vec<String> {
    serde_json::from_str(&text).unwrap_or_default()
}

fn row_to_anomaly(row: &rusqlite::Row<'_>) -> Anomaly {
    let to_dt = |ms: Option<i64>| ms.and_then(|v| Utc.timestamp_millis_opt(v).single());

    Anomaly {
        id: row.get(0).unwrap_or_default(),
        title: row.get(1).unwrap_or_default(),
        description: row.get(2).unwrap_or_default(),
        kind: AnomalyKind::parse(&row.get::<_, String>(3).unwrap_or_default()),
        severity: Severity::parse(&row.get::<_, String>(4).unwrap_or_default()),
        status: AnomalyStatus::parse(&row.get::<_, String>(5).unwrap_or_default()),
        confidence: row.get(6).unwrap_or(0.0),
        latitude: row.get(7).unwrap_or(0.0),
        longitude: row.get(8).unwrap_or(0.0),
        location: row.get(9).unwrap_or_default(),
        source_id: row.get(10).unwrap_or(None),
        source_type: row.get(11).unwrap_or_default(),
        raw_data: parse_json(row.get(12).unwrap_or(None))
            .unwrap_or(Value::Object(serde_json::Map::new())),
        ai_analysis: parse_json(row.get(13).unwrap_or(None)),
        verification_data: parse_json(row.get(14).unwrap_or(None)),
        impact_assessment: parse_json(row.get(15).unwrap_or(None)),
        media_urls: parse_list(row.get(16).unwrap_or_else(|_| "[]".into())),
        tags: parse_list(row.get(17).unwrap_or_else(|_| "[]".into())),
        reviewed_by: row.get(18).unwrap_or(None),
        reviewed_at: to_dt(row.get(19).unwrap_or(None)),
        resolved_at: to_dt(row.get(20).unwrap_or(None)),
        created_at: to_dt(row.get(21).ok()).unwrap_or_else(Utc::now),
        updated_at: to_dt(row.get(22).ok()).unwrap_or_else(Utc::now),
    }
}
