//! Scheduled ingestion of external anomaly feeds.
//!
//! A fixed-cadence scheduler fans out to source adapters, enriches each
//! candidate through the AI oracle, deduplicates against stored anomalies,
//! and triggers the workflow engine for high-severity detections. At most
//! one cycle runs at a time; an overlapping trigger is skipped, not queued.

pub mod adapter;
pub mod eonet;
pub mod usgs;
pub mod weather;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinSet;

use crate::config::{IngestionConfig, Settings};
use crate::error::ServerError;
use crate::events::{topic, EventBus};
use crate::models::anomaly::{CreateAnomalyInput, Severity};
use crate::oracle::{AiOracle, AnalysisRequest};
use crate::store::AnomalyStore;
use crate::workflow::WorkflowExecutor;

pub use adapter::{Candidate, SourceAdapter};
pub use eonet::EonetAdapter;
pub use usgs::UsgsAdapter;
pub use weather::OpenWeatherAdapter;

pub(crate) const USER_AGENT: &str = "vigil/0.1 anomaly detection platform";

/// Feed adapters used in production deployments.
pub fn default_sources(settings: &Settings) -> Vec<Arc<dyn SourceAdapter>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default();
    vec![
        Arc::new(UsgsAdapter::new(http.clone())),
        Arc::new(EonetAdapter::new(http.clone())),
        Arc::new(OpenWeatherAdapter::new(
            http,
            settings.openweather_api_key.clone(),
        )),
    ]
}

#[derive(Clone)]
pub struct IngestionScheduler {
    sources: Vec<Arc<dyn SourceAdapter>>,
    anomalies: AnomalyStore,
    oracle: Arc<dyn AiOracle>,
    executor: WorkflowExecutor,
    bus: EventBus,
    config: IngestionConfig,
    running: Arc<AtomicBool>,
}

impl IngestionScheduler {
    pub fn new(
        sources: Vec<Arc<dyn SourceAdapter>>,
        anomalies: AnomalyStore,
        oracle: Arc<dyn AiOracle>,
        executor: WorkflowExecutor,
        bus: EventBus,
        config: IngestionConfig,
    ) -> Self {
        Self {
            sources,
            anomalies,
            oracle,
            executor,
            bus,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Start the periodic loop: one cycle after the startup grace delay,
    /// then one per cadence interval. The ticker keeps a fixed cadence
    /// regardless of how long a cycle takes; ticks that fall due while a
    /// cycle is still running are skipped, not queued.
    pub fn spawn(&self) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if !this.config.enabled {
                tracing::info!("data ingestion disabled by configuration");
                return;
            }
            let interval = this.config.interval();
            tracing::info!(
                cadence = %this.config.cadence,
                interval_secs = interval.as_secs(),
                "data ingestion scheduled"
            );

            tokio::time::sleep(this.config.grace_delay).await;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                // First tick fires immediately, so the initial cycle runs
                // right after the grace delay.
                ticker.tick().await;
                if let Err(e) = this.run_cycle().await {
                    tracing::error!("ingestion cycle error: {}", e);
                }
            }
        })
    }

    /// Run one ingestion cycle. Returns `Ok(None)` when a cycle is already
    /// in flight (the overlapping trigger is dropped), otherwise the number
    /// of anomalies created.
    pub async fn run_cycle(&self) -> Result<Option<u64>, ServerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("ingestion already running, skipping");
            return Ok(None);
        }

        let result = self.cycle_inner().await;
        self.running.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    async fn cycle_inner(&self) -> Result<u64, ServerError> {
        tracing::info!("starting data ingestion cycle");

        let mut tasks = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            tasks.spawn(async move {
                let name = source.name();
                (name, source.fetch().await)
            });
        }

        let mut created = 0u64;
        while let Some(joined) = tasks.join_next().await {
            let Ok((name, fetched)) = joined else {
                tracing::error!("source fetch task panicked");
                continue;
            };
            let candidates = match fetched {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::error!(source = name, "source fetch failed: {}", e);
                    continue;
                }
            };
            tracing::info!(source = name, count = candidates.len(), "fetched candidates");
            for candidate in candidates {
                match self.process_candidate(candidate, name).await {
                    Ok(true) => created += 1,
                    Ok(false) => {}
                    Err(e) => tracing::error!(source = name, "error processing candidate: {}", e),
                }
            }
        }

        tracing::info!(created, "ingestion cycle complete");
        if created > 0 {
            self.bus.publish(
                topic::SYSTEM,
                json!({ "event": "ingestion_complete", "count": created }),
            );
        }
        Ok(created)
    }

    /// Enrich, deduplicate, store, and optionally trigger a workflow for
    /// one candidate. Returns whether an anomaly was created.
    async fn process_candidate(
        &self,
        candidate: Candidate,
        source: &str,
    ) -> Result<bool, ServerError> {
        if self
            .anomalies
            .find_duplicate(&candidate.title, candidate.latitude, candidate.longitude)
            .await?
            .is_some()
        {
            tracing::debug!(title = %candidate.title, "skipping duplicate candidate");
            return Ok(false);
        }

        let analysis = self
            .oracle
            .analyze(&AnalysisRequest {
                title: candidate.title.clone(),
                description: candidate.description.clone(),
                kind: candidate.kind.as_str().to_string(),
                location: candidate.location.clone(),
                raw_data: candidate.raw_data.clone(),
            })
            .await?;

        let severity = analysis.severity.unwrap_or(candidate.severity);
        let analysis_value =
            serde_json::to_value(&analysis).map_err(|e| ServerError::Internal(e.to_string()))?;

        let anomaly = self
            .anomalies
            .create(CreateAnomalyInput {
                title: candidate.title,
                description: candidate.description,
                kind: candidate.kind,
                severity,
                confidence: analysis.confidence,
                latitude: candidate.latitude,
                longitude: candidate.longitude,
                location: candidate.location,
                source_id: None,
                source_type: source.to_string(),
                raw_data: candidate.raw_data,
                ai_analysis: Some(analysis_value),
                media_urls: candidate.media_urls,
                tags: analysis.categories,
            })
            .await?;

        let anomaly_value =
            serde_json::to_value(&anomaly).map_err(|e| ServerError::Internal(e.to_string()))?;
        self.bus.publish(topic::ANOMALY_CREATED, anomaly_value.clone());

        if severity >= Severity::High {
            self.executor
                .trigger("anomaly_detected", anomaly_value)
                .await?;
        }

        tracing::debug!(id = %anomaly.id, "created anomaly");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::anomaly::AnomalyKind;
    use crate::models::workflow::{workflow_templates, UpdateWorkflowInput, WorkflowStatus};
    use crate::oracle::{
        fallback_impact, fallback_verification, AiAnalysis, VerificationReport,
    };
    use crate::store::{AnomalyFilter, ExecutionFilter, ExecutionStore, WorkflowStore};
    use crate::workflow::AutonomySettings;
    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::RwLock;

    struct StaticAdapter {
        candidates: Vec<Candidate>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl SourceAdapter for StaticAdapter {
        fn name(&self) -> &'static str {
            "Static Feed"
        }

        async fn fetch(&self) -> Result<Vec<Candidate>, ServerError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.candidates.clone())
        }
    }

    struct FailingAdapter;

    #[async_trait]
    impl SourceAdapter for FailingAdapter {
        fn name(&self) -> &'static str {
            "Broken Feed"
        }

        async fn fetch(&self) -> Result<Vec<Candidate>, ServerError> {
            Err(ServerError::Source("connection refused".to_string()))
        }
    }

    struct StubOracle {
        severity: Option<Severity>,
        confidence: f64,
    }

    #[async_trait]
    impl AiOracle for StubOracle {
        async fn analyze(&self, request: &AnalysisRequest) -> Result<AiAnalysis, ServerError> {
            Ok(AiAnalysis {
                summary: format!("summary of {}", request.title),
                severity: self.severity,
                confidence: self.confidence,
                categories: vec![request.kind.clone()],
                entities: vec![],
                sentiment: "neutral".to_string(),
                risk_factors: vec![],
                recommendations: vec![],
                related_anomalies: vec![],
                metadata: json!({}),
            })
        }

        async fn cross_verify(
            &self,
            _anomaly_id: &str,
            sources: &[Value],
        ) -> Result<VerificationReport, ServerError> {
            Ok(fallback_verification(sources))
        }

        async fn impact_assessment(&self, _anomaly: &Value) -> Result<Value, ServerError> {
            Ok(fallback_impact())
        }
    }

    fn candidate(title: &str, severity: Severity) -> Candidate {
        Candidate {
            title: title.to_string(),
            description: format!("{title} description"),
            kind: AnomalyKind::Seismic,
            severity,
            latitude: 10.0,
            longitude: 20.0,
            location: "Test Region".to_string(),
            raw_data: json!({}),
            media_urls: vec![],
        }
    }

    struct Harness {
        scheduler: IngestionScheduler,
        anomalies: AnomalyStore,
        executions: ExecutionStore,
    }

    async fn harness(
        sources: Vec<Arc<dyn SourceAdapter>>,
        oracle: StubOracle,
        with_active_workflow: bool,
        config: IngestionConfig,
    ) -> Harness {
        let db = Database::open_in_memory().unwrap();
        let anomalies = AnomalyStore::new(db.clone());
        let workflows = WorkflowStore::new(db.clone());
        let executions = ExecutionStore::new(db.clone());

        if with_active_workflow {
            let w = workflows
                .create(workflow_templates().remove(0))
                .await
                .unwrap();
            workflows
                .update(
                    &w.id,
                    UpdateWorkflowInput {
                        status: Some(WorkflowStatus::Active),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let oracle: Arc<dyn AiOracle> = Arc::new(oracle);
        let executor = WorkflowExecutor::new(
            anomalies.clone(),
            workflows,
            executions.clone(),
            Arc::clone(&oracle),
            EventBus::new(),
            Arc::new(RwLock::new(AutonomySettings::default())),
        );
        let scheduler = IngestionScheduler::new(
            sources,
            anomalies.clone(),
            oracle,
            executor,
            EventBus::new(),
            config,
        );
        Harness {
            scheduler,
            anomalies,
            executions,
        }
    }

    #[tokio::test]
    async fn repeated_cycles_deduplicate_candidates() {
        let h = harness(
            vec![Arc::new(StaticAdapter {
                candidates: vec![candidate("Earthquake M4.0 - Testville", Severity::Medium)],
                delay: None,
            })],
            StubOracle {
                severity: None,
                confidence: 0.7,
            },
            false,
            IngestionConfig::default(),
        )
        .await;

        assert_eq!(h.scheduler.run_cycle().await.unwrap(), Some(1));
        assert_eq!(h.scheduler.run_cycle().await.unwrap(), Some(0));

        let stored = h.anomalies.list(AnomalyFilter::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].confidence, 0.7);
        assert_eq!(stored[0].source_type, "Static Feed");
    }

    #[tokio::test]
    async fn high_severity_candidate_triggers_workflow() {
        let h = harness(
            vec![Arc::new(StaticAdapter {
                candidates: vec![
                    candidate("Earthquake M6.5 - Coast", Severity::High),
                    candidate("Minor tremor", Severity::Low),
                ],
                delay: None,
            })],
            StubOracle {
                severity: None,
                confidence: 0.8,
            },
            true,
            IngestionConfig::default(),
        )
        .await;

        assert_eq!(h.scheduler.run_cycle().await.unwrap(), Some(2));

        let stored = h.anomalies.list(AnomalyFilter::default()).await.unwrap();
        let high = stored
            .iter()
            .find(|a| a.severity == Severity::High)
            .unwrap();
        let low = stored.iter().find(|a| a.severity == Severity::Low).unwrap();

        let triggered = h
            .executions
            .list(ExecutionFilter {
                anomaly_id: Some(high.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].triggered_by, "anomaly_detected");

        let untriggered = h
            .executions
            .list(ExecutionFilter {
                anomaly_id: Some(low.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(untriggered.is_empty());
    }

    #[tokio::test]
    async fn oracle_severity_overrides_candidate_guess() {
        let h = harness(
            vec![Arc::new(StaticAdapter {
                candidates: vec![candidate("Overstated event", Severity::Critical)],
                delay: None,
            })],
            StubOracle {
                severity: Some(Severity::Low),
                confidence: 0.6,
            },
            true,
            IngestionConfig::default(),
        )
        .await;

        h.scheduler.run_cycle().await.unwrap();

        let stored = h.anomalies.list(AnomalyFilter::default()).await.unwrap();
        assert_eq!(stored[0].severity, Severity::Low);
        // Downgraded below the trigger threshold, so no execution starts.
        let executions = h.executions.list(ExecutionFilter::default()).await.unwrap();
        assert!(executions.is_empty());
    }

    #[tokio::test]
    async fn one_failing_source_does_not_abort_the_cycle() {
        let h = harness(
            vec![
                Arc::new(FailingAdapter),
                Arc::new(StaticAdapter {
                    candidates: vec![candidate("Survivor event", Severity::Low)],
                    delay: None,
                }),
            ],
            StubOracle {
                severity: None,
                confidence: 0.5,
            },
            false,
            IngestionConfig::default(),
        )
        .await;

        assert_eq!(h.scheduler.run_cycle().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn overlapping_cycle_is_skipped() {
        let h = harness(
            vec![Arc::new(StaticAdapter {
                candidates: vec![candidate("Slow event", Severity::Low)],
                delay: Some(Duration::from_millis(200)),
            })],
            StubOracle {
                severity: None,
                confidence: 0.5,
            },
            false,
            IngestionConfig::default(),
        )
        .await;

        let first = {
            let scheduler = h.scheduler.clone();
            tokio::spawn(async move { scheduler.run_cycle().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(h.scheduler.is_running());
        assert_eq!(h.scheduler.run_cycle().await.unwrap(), None);

        assert_eq!(first.await.unwrap().unwrap(), Some(1));
        assert!(!h.scheduler.is_running());
    }

    #[tokio::test]
    async fn spawn_runs_initial_cycle_after_grace_delay() {
        let h = harness(
            vec![Arc::new(StaticAdapter {
                candidates: vec![candidate("Scheduled event", Severity::Low)],
                delay: None,
            })],
            StubOracle {
                severity: None,
                confidence: 0.5,
            },
            false,
            IngestionConfig {
                grace_delay: Duration::from_millis(10),
                ..IngestionConfig::default()
            },
        )
        .await;

        let handle = h.scheduler.spawn();

        let mut stored = vec![];
        for _ in 0..100 {
            stored = h.anomalies.list(AnomalyFilter::default()).await.unwrap();
            if !stored.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Scheduled event");
    }

    #[tokio::test]
    async fn spawn_respects_disabled_flag() {
        let h = harness(
            vec![Arc::new(StaticAdapter {
                candidates: vec![candidate("Should never land", Severity::Low)],
                delay: None,
            })],
            StubOracle {
                severity: None,
                confidence: 0.5,
            },
            false,
            IngestionConfig {
                enabled: false,
                grace_delay: Duration::from_millis(0),
                ..IngestionConfig::default()
            },
        )
        .await;

        let handle = h.scheduler.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
        let stored = h.anomalies.list(AnomalyFilter::default()).await.unwrap();
        assert!(stored.is_empty());
    }
}
