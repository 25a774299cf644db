//! Shared application state for the axum server and CLI.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::config::Settings;
use crate::db::Database;
use crate::error::ServerError;
use crate::events::{topic, EventBus};
use crate::ingest::{default_sources, IngestionScheduler, SourceAdapter};
use crate::models::anomaly::{Anomaly, CreateAnomalyInput, Severity};
use crate::oracle::{AiOracle, AnalysisRequest, GeminiOracle};
use crate::store::{AnomalyStore, ExecutionStore, WorkflowStore};
use crate::workflow::{AutonomySettings, WorkflowExecutor};

/// Shared state accessible by all API handlers.
pub struct AppStateInner {
    pub settings: Settings,
    pub db: Database,
    pub anomaly_store: AnomalyStore,
    pub workflow_store: WorkflowStore,
    pub execution_store: ExecutionStore,
    pub oracle: Arc<dyn AiOracle>,
    pub executor: WorkflowExecutor,
    pub scheduler: IngestionScheduler,
    pub autonomy: Arc<RwLock<AutonomySettings>>,
    pub event_bus: EventBus,
    pub started_at: DateTime<Utc>,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Wire the full production stack from settings.
    pub fn new(settings: Settings) -> Result<Self, ServerError> {
        let db = Database::open(&settings.db_path)?;
        let oracle: Arc<dyn AiOracle> = Arc::new(GeminiOracle::new(
            settings.gemini_api_key.clone(),
            settings.gemini_model.clone(),
        ));
        let sources = default_sources(&settings);
        Ok(Self::with_parts(settings, db, oracle, sources))
    }

    /// Wire state from pre-built collaborators. Tests use this to inject an
    /// in-memory database, a scripted oracle, or static feed adapters.
    pub fn with_parts(
        settings: Settings,
        db: Database,
        oracle: Arc<dyn AiOracle>,
        sources: Vec<Arc<dyn SourceAdapter>>,
    ) -> Self {
        let anomaly_store = AnomalyStore::new(db.clone());
        let workflow_store = WorkflowStore::new(db.clone());
        let execution_store = ExecutionStore::new(db.clone());
        let event_bus = EventBus::new();
        let autonomy = Arc::new(RwLock::new(AutonomySettings {
            autonomous_mode: settings.autonomous_mode,
            auto_approve_threshold: settings.auto_approve_threshold,
        }));

        let executor = WorkflowExecutor::new(
            anomaly_store.clone(),
            workflow_store.clone(),
            execution_store.clone(),
            Arc::clone(&oracle),
            event_bus.clone(),
            Arc::clone(&autonomy),
        );
        let scheduler = IngestionScheduler::new(
            sources,
            anomaly_store.clone(),
            Arc::clone(&oracle),
            executor.clone(),
            event_bus.clone(),
            settings.ingestion.clone(),
        );

        Self {
            settings,
            db,
            anomaly_store,
            workflow_store,
            execution_store,
            oracle,
            executor,
            scheduler,
            autonomy,
            event_bus,
            started_at: Utc::now(),
        }
    }

    /// Manual anomaly submission: the same oracle enrichment and severity
    /// escalation the ingestion pipeline applies. The oracle's severity and
    /// confidence are authoritative; the submitted severity only stands
    /// when the oracle does not commit to one. Returns the stored anomaly
    /// and the execution id when a workflow was triggered.
    pub async fn submit_anomaly(
        &self,
        input: CreateAnomalyInput,
    ) -> Result<(Anomaly, Option<String>), ServerError> {
        let analysis = self
            .oracle
            .analyze(&AnalysisRequest {
                title: input.title.clone(),
                description: input.description.clone(),
                kind: input.kind.as_str().to_string(),
                location: input.location.clone(),
                raw_data: input.raw_data.clone(),
            })
            .await?;
        let analysis_value =
            serde_json::to_value(&analysis).map_err(|e| ServerError::Internal(e.to_string()))?;

        let mut create = input;
        create.severity = analysis.severity.unwrap_or(create.severity);
        create.confidence = analysis.confidence;
        if create.tags.is_empty() {
            create.tags = analysis.categories.clone();
        }
        create.ai_analysis = Some(analysis_value);

        let severity = create.severity;
        let anomaly = self.anomaly_store.create(create).await?;

        let anomaly_value =
            serde_json::to_value(&anomaly).map_err(|e| ServerError::Internal(e.to_string()))?;
        self.event_bus
            .publish(topic::ANOMALY_CREATED, anomaly_value.clone());

        let mut execution_id = None;
        if severity >= Severity::High {
            execution_id = self
                .executor
                .trigger("anomaly_detected", anomaly_value)
                .await?;
        }

        Ok((anomaly, execution_id))
    }
}
