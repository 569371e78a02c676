//! Longitudinal metrics engine: snapshots, trends, milestones and plans.
//!
//! `EvolutionTracker` is the explicit engine object. Callers hold it and
//! pass it by reference; nothing here is process-global.

pub mod anomaly;
pub mod milestone;
pub mod roadmap;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod trajectory;
pub mod trend;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{CompletionStatus, PipelineRun, PipelineScheduler};

pub use anomaly::{AnomalyDetector, AnomalyKind, AnomalyRecord, AnomalyReport};
pub use milestone::{EvolutionMilestone, MilestoneDetector, MilestoneType};
pub use roadmap::{GapDrivenStrategy, MetricTargets, Roadmap, RoadmapStrategy, Timeline};
pub use snapshot::{Analysis, CognitiveSnapshot, Evaluation, Metric, SnapshotContext, TimeWindow};
pub use storage::{EvolutionStorage, JsonFileStorage, MemoryStorage, PersistedEvolution};
pub use store::SnapshotStore;
pub use trajectory::{MetaCognitiveEvolution, TrajectoryReport};
pub use trend::{EvolutionTrend, GrowthPattern, TrendAnalyzer, TrendDirection};

/// A pipeline run and the snapshot it produced, if it completed.
#[derive(Debug, Clone, Serialize)]
pub struct Judgment {
    pub run: PipelineRun,
    pub snapshot: Option<CognitiveSnapshot>,
}

pub struct EvolutionTracker {
    store: SnapshotStore,
    analyzer: TrendAnalyzer,
    scheduler: PipelineScheduler,
    anomaly_detector: Box<dyn AnomalyDetector>,
    roadmap_strategy: Box<dyn RoadmapStrategy>,
    /// Only the most recent trend table is kept
    latest_trends: RwLock<Vec<EvolutionTrend>>,
}

impl EvolutionTracker {
    /// Open with JSON file storage at the configured path.
    pub async fn open(config: &Config) -> Self {
        let storage = Arc::new(JsonFileStorage::new(config.evolution.storage_path.clone()));
        Self::with_storage(config, storage).await
    }

    pub async fn with_storage(config: &Config, storage: Arc<dyn EvolutionStorage>) -> Self {
        let store = SnapshotStore::open(&config.evolution, storage).await;
        let tracker = Self {
            store,
            analyzer: TrendAnalyzer::new(&config.evolution),
            scheduler: PipelineScheduler::new(config.pipeline.clone()),
            anomaly_detector: anomaly::detector_for(config.evolution.anomaly_strategy),
            roadmap_strategy: Box::new(GapDrivenStrategy),
            latest_trends: RwLock::new(Vec::new()),
        };
        tracker.refresh_trends().await;
        tracing::info!(
            snapshots = tracker.store.len().await,
            detector = tracker.anomaly_detector.name(),
            "evolution tracker ready"
        );
        tracker
    }

    pub fn with_scheduler(mut self, scheduler: PipelineScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_anomaly_detector(mut self, detector: Box<dyn AnomalyDetector>) -> Self {
        self.anomaly_detector = detector;
        self
    }

    pub fn with_roadmap_strategy(mut self, strategy: Box<dyn RoadmapStrategy>) -> Self {
        self.roadmap_strategy = strategy;
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn scheduler(&self) -> &PipelineScheduler {
        &self.scheduler
    }

    async fn refresh_trends(&self) {
        let snapshots = self.store.snapshots().await;
        let trends = trend::all_trends(&snapshots, Utc::now());
        *self.latest_trends.write().await = trends;
    }

    /// Record a snapshot, run milestone checks, and recompute the trend table.
    pub async fn record_snapshot(
        &self,
        evaluation: &Evaluation,
        context: &SnapshotContext,
    ) -> Result<CognitiveSnapshot> {
        let snapshot = self.store.record(evaluation, context).await?;
        self.refresh_trends().await;
        tracing::info!(
            overall = snapshot.overall_intelligence,
            session = %snapshot.session_id,
            "cognitive state recorded"
        );
        Ok(snapshot)
    }

    /// Run the concurrent pipeline and record a snapshot from its result.
    ///
    /// Failed runs are returned without a snapshot.
    pub async fn judge(&self, input_text: &str, session: Map<String, Value>) -> Result<Judgment> {
        let run = self
            .scheduler
            .run_pipeline_concurrent(input_text, session)
            .await;
        if run.completion_status != CompletionStatus::Completed {
            tracing::warn!(run_id = %run.run_id, "run did not complete, no snapshot recorded");
            return Ok(Judgment {
                run,
                snapshot: None,
            });
        }

        let evaluation = Evaluation::from_run(&run)?;
        let mut context = SnapshotContext::from_map(&run.session).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring malformed session context");
            SnapshotContext::default()
        });
        if context.session_id.is_none() {
            context.session_id = Some(run.run_id.to_string());
        }
        let snapshot = self.record_snapshot(&evaluation, &context).await?;
        Ok(Judgment {
            run,
            snapshot: Some(snapshot),
        })
    }

    pub async fn get_trajectory(&self, window: Option<TimeWindow>) -> Analysis<TrajectoryReport> {
        self.analyzer.analyze_trajectory(&self.store, window).await
    }

    pub async fn get_meta_cognitive_evolution(&self) -> Analysis<MetaCognitiveEvolution> {
        let recent = self.store.recent(trajectory::META_LOOKBACK).await;
        let total = self.store.len().await;
        match trajectory::meta_cognitive_evolution(&recent) {
            // report the full history depth, not the lookback slice
            Analysis::InsufficientData { required, .. } => Analysis::InsufficientData {
                required,
                available: total,
            },
            ready => ready,
        }
    }

    pub async fn detect_anomalies(&self) -> Analysis<AnomalyReport> {
        let history = self.store.recent(anomaly::ANOMALY_LOOKBACK).await;
        anomaly::run_detector(self.anomaly_detector.as_ref(), &history)
    }

    /// Plan from the latest snapshot toward `targets`, or the default increments.
    pub async fn generate_roadmap(
        &self,
        targets: Option<MetricTargets>,
        timeline: Timeline,
    ) -> Result<Analysis<Roadmap>> {
        let Some(current) = self.store.latest().await else {
            return Ok(Analysis::InsufficientData {
                required: 1,
                available: 0,
            });
        };
        let targets = match targets {
            Some(t) => {
                t.validate()?;
                t
            }
            None => MetricTargets::default_for(&current),
        };
        let trends = self.latest_trends().await;
        let roadmap = self
            .roadmap_strategy
            .plan(&current, &targets, timeline, &trends);
        tracing::info!(
            roadmap_id = %roadmap.roadmap_id,
            strategy = self.roadmap_strategy.name(),
            "improvement roadmap generated"
        );
        Ok(Analysis::Ready(roadmap))
    }

    pub async fn latest_trends(&self) -> Vec<EvolutionTrend> {
        self.latest_trends.read().await.clone()
    }

    pub async fn milestones(&self) -> Vec<EvolutionMilestone> {
        self.store.milestones().await
    }

    pub async fn save(&self) -> Result<()> {
        self.store.save().await
    }
}
