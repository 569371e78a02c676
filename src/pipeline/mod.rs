//! Hybrid scheduler for the eight-stage judgment pipeline.
//!
//! Phase 1 runs the independent stages on a bounded worker pool. Their
//! results are merged into the context in one step, then phase 2 runs the
//! dependent stages one at a time, each seeing everything before it.

mod executor;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{JudgmentError, Result};
use crate::stages::{PipelineContext, StageRegistry, StageResult};
use crate::utils::mean;
use executor::{StageLimits, invoke_stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sequential,
    ConcurrentEnhanced,
}

/// Wall-clock timings for a run, in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Only set for concurrent runs
    pub parallel_phase_ms: Option<f64>,
    pub sequential_phase_ms: f64,
    pub total_ms: f64,
    pub stage_durations_ms: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleSummary {
    pub stages_executed: usize,
    pub successful_stages: usize,
    pub average_confidence: f64,
    /// First insight of each stage, in execution order
    pub key_insights: Vec<String>,
    pub final_recommendation: Option<String>,
}

impl CycleSummary {
    fn from_results(results: &[StageResult]) -> Self {
        let confidences: Vec<f64> = results.iter().map(|r| r.confidence).collect();
        Self {
            stages_executed: results.len(),
            successful_stages: results.iter().filter(|r| !r.is_failed()).count(),
            average_confidence: mean(&confidences),
            key_insights: results
                .iter()
                .filter_map(|r| r.insights.first().cloned())
                .collect(),
            final_recommendation: results
                .last()
                .and_then(|r| r.recommendations.first().cloned()),
        }
    }
}

/// Outcome of one pass through the pipeline.
///
/// Starts `Pending` while the scheduler fills it; terminal once finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub input_text: String,
    /// blake3 of the input text, hex encoded
    pub input_digest: String,
    pub session: Map<String, Value>,
    pub execution_mode: ExecutionMode,
    pub execution_order: Vec<String>,
    pub results: Vec<StageResult>,
    pub overall_confidence: f64,
    pub completion_status: CompletionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub performance: PerformanceMetrics,
    pub summary: CycleSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    fn begin(
        input_text: &str,
        session: Map<String, Value>,
        mode: ExecutionMode,
        registry: &StageRegistry,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            input_text: input_text.to_string(),
            input_digest: blake3::hash(input_text.as_bytes()).to_hex().to_string(),
            session,
            execution_mode: mode,
            execution_order: registry
                .execution_order()
                .into_iter()
                .map(String::from)
                .collect(),
            results: Vec::new(),
            overall_confidence: 0.0,
            completion_status: CompletionStatus::Pending,
            failure_reason: None,
            performance: PerformanceMetrics::default(),
            summary: CycleSummary::default(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn finish(mut self, fault: Option<String>, started: Instant) -> Self {
        let confidences: Vec<f64> = self.results.iter().map(|r| r.confidence).collect();
        self.overall_confidence = mean(&confidences);
        self.performance.total_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.performance.stage_durations_ms = self
            .results
            .iter()
            .map(|r| (r.stage.clone(), r.duration_ms))
            .collect();
        self.summary = CycleSummary::from_results(&self.results);
        self.completion_status = if fault.is_some() {
            CompletionStatus::Failed
        } else {
            CompletionStatus::Completed
        };
        self.failure_reason = fault;
        self.finished_at = Some(Utc::now());
        self
    }

    /// Look up a stage result by name.
    pub fn result(&self, stage: &str) -> Option<&StageResult> {
        self.results.iter().find(|r| r.stage == stage)
    }

    pub fn is_terminal(&self) -> bool {
        self.completion_status != CompletionStatus::Pending
    }
}

/// Drives the registered stages through the two-phase schedule.
#[derive(Debug, Clone)]
pub struct PipelineScheduler {
    registry: StageRegistry,
    config: PipelineConfig,
}

impl PipelineScheduler {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_registry(StageRegistry::standard(), config)
    }

    pub fn with_registry(registry: StageRegistry, config: PipelineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    fn limits(&self) -> StageLimits {
        StageLimits {
            timeout_ms: self.config.stage_timeout_ms,
            failure_confidence: self.config.failure_confidence,
        }
    }

    /// Run all eight stages strictly in order on a single path.
    pub async fn run_pipeline(&self, input_text: &str, session: Map<String, Value>) -> PipelineRun {
        let started = Instant::now();
        let mut run = PipelineRun::begin(input_text, session, ExecutionMode::Sequential, &self.registry);
        let mut ctx = PipelineContext::new(input_text, run.session.clone());
        tracing::info!(run_id = %run.run_id, mode = "sequential", "pipeline started");

        let stages = self
            .registry
            .independent()
            .iter()
            .chain(self.registry.dependent().iter());
        for stage in stages {
            let result = invoke_stage(stage.clone(), ctx.clone(), self.limits(), None).await;
            ctx.merge([&result]);
            ctx.iteration += 1;
            run.results.push(result);
        }
        run.performance.sequential_phase_ms = started.elapsed().as_secs_f64() * 1000.0;

        let run = run.finish(None, started);
        log_finished(&run);
        run
    }

    /// Run the independent stages concurrently, then the dependent stages in order.
    ///
    /// A scheduling fault yields a `Failed` run carrying whatever results
    /// were produced before it.
    pub async fn run_pipeline_concurrent(
        &self,
        input_text: &str,
        session: Map<String, Value>,
    ) -> PipelineRun {
        let started = Instant::now();
        let mut run = PipelineRun::begin(
            input_text,
            session,
            ExecutionMode::ConcurrentEnhanced,
            &self.registry,
        );
        let mut ctx = PipelineContext::new(input_text, run.session.clone());
        tracing::info!(
            run_id = %run.run_id,
            mode = "concurrent_enhanced",
            workers = self.config.worker_pool_size,
            "pipeline started"
        );

        let phase_one = self.run_independent_phase(&ctx).await;
        run.performance.parallel_phase_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
        let independent = match phase_one {
            Ok(results) => results,
            Err((partial, fault)) => {
                tracing::error!(run_id = %run.run_id, error = %fault, "scheduling fault");
                run.results = partial;
                let run = run.finish(Some(fault.to_string()), started);
                log_finished(&run);
                return run;
            }
        };

        // single merge step before any dependent stage starts
        ctx.merge(independent.iter());
        ctx.iteration += 1;
        run.results = independent;

        let sequential_start = Instant::now();
        for stage in self.registry.dependent() {
            let result = invoke_stage(stage.clone(), ctx.clone(), self.limits(), None).await;
            ctx.merge([&result]);
            ctx.iteration += 1;
            run.results.push(result);
        }
        run.performance.sequential_phase_ms = sequential_start.elapsed().as_secs_f64() * 1000.0;

        let run = run.finish(None, started);
        log_finished(&run);
        run
    }

    /// Results come back in registry order regardless of completion order.
    async fn run_independent_phase(
        &self,
        ctx: &PipelineContext,
    ) -> std::result::Result<Vec<StageResult>, (Vec<StageResult>, JudgmentError)> {
        if self.config.worker_pool_size == 0 {
            return Err((
                Vec::new(),
                JudgmentError::Scheduling {
                    message: "worker pool cannot be constructed with zero workers".into(),
                },
            ));
        }

        let pool = Arc::new(Semaphore::new(self.config.worker_pool_size));
        let limits = self.limits();
        let mut tasks = JoinSet::new();
        for (idx, stage) in self.registry.independent().iter().enumerate() {
            let pool = pool.clone();
            let stage = stage.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let permit = pool.acquire_owned().await.map_err(|_| JudgmentError::Scheduling {
                    message: "worker pool closed".into(),
                })?;
                Ok::<_, JudgmentError>((idx, invoke_stage(stage, ctx, limits, Some(permit)).await))
            });
        }

        let mut slots: Vec<Option<StageResult>> = vec![None; self.registry.independent().len()];
        let mut fault = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((idx, result))) => slots[idx] = Some(result),
                Ok(Err(e)) => fault = Some(e),
                Err(e) => {
                    fault = Some(JudgmentError::Scheduling {
                        message: format!("worker task lost: {}", e),
                    })
                }
            }
        }

        let results: Vec<StageResult> = slots.into_iter().flatten().collect();
        match fault {
            Some(e) => Err((results, e)),
            None => Ok(results),
        }
    }

    /// Run one registered stage against an empty context.
    pub async fn run_single_stage(&self, name: &str, input_text: &str) -> Result<StageResult> {
        let stage = self
            .registry
            .get(name)
            .ok_or_else(|| JudgmentError::InvalidParams {
                message: format!(
                    "unknown stage '{}', expected one of {}",
                    name,
                    self.registry.execution_order().join(", ")
                ),
            })?;
        let ctx = PipelineContext::new(input_text, Map::new());
        Ok(invoke_stage(stage, ctx, self.limits(), None).await)
    }
}

fn log_finished(run: &PipelineRun) {
    tracing::info!(
        run_id = %run.run_id,
        status = ?run.completion_status,
        stages = run.results.len(),
        confidence = run.overall_confidence,
        total_ms = run.performance.total_ms,
        "pipeline finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequential_run_orders_results() {
        let scheduler = PipelineScheduler::new(PipelineConfig::default());
        let run = scheduler
            .run_pipeline("Should I take the offer?", Map::new())
            .await;
        let names: Vec<&str> = run.results.iter().map(|r| r.stage.as_str()).collect();
        assert_eq!(names, run.execution_order.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(run.execution_mode, ExecutionMode::Sequential);
        assert!(run.is_terminal());
        assert!(run.performance.parallel_phase_ms.is_none());
    }

    #[tokio::test]
    async fn test_digest_is_stable_per_input() {
        let scheduler = PipelineScheduler::new(PipelineConfig::default());
        let a = scheduler.run_pipeline_concurrent("same text", Map::new()).await;
        let b = scheduler.run_pipeline_concurrent("same text", Map::new()).await;
        assert_eq!(a.input_digest, b.input_digest);
        assert_ne!(a.run_id, b.run_id);
    }

    #[tokio::test]
    async fn test_summary_takes_final_recommendation_from_last_stage() {
        let scheduler = PipelineScheduler::new(PipelineConfig::default());
        let run = scheduler.run_pipeline_concurrent("Plan the migration.", Map::new()).await;
        let judge = run.result("JUDGE").unwrap();
        assert_eq!(
            run.summary.final_recommendation.as_deref(),
            judge.recommendations.first().map(String::as_str)
        );
        assert_eq!(run.summary.stages_executed, 8);
        assert_eq!(run.summary.key_insights.len(), 8);
    }
}
