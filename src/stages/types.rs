//! Types shared by stages and the scheduler.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{JudgmentError, Result};

/// Ordered key/value output of a single stage
pub type StageOutput = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Partial,
    Failed,
}

/// Whether a stage may run alongside its siblings or must see all prior output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Independent,
    Dependent,
}

/// What a stage body returns; the scheduler stamps timing on top.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub status: StageStatus,
    pub output: StageOutput,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence: f64,
}

impl StageOutcome {
    pub fn success(
        output: StageOutput,
        insights: Vec<String>,
        recommendations: Vec<String>,
        confidence: f64,
    ) -> Self {
        Self {
            status: StageStatus::Success,
            output,
            insights,
            recommendations,
            confidence,
        }
    }
}

/// Immutable record of one stage invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub status: StageStatus,
    pub output: StageOutput,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence: f64,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl StageResult {
    /// Build a result from a stage outcome, rejecting confidences outside [0, 1].
    pub fn from_outcome(stage: &str, outcome: StageOutcome, duration_ms: f64) -> Result<Self> {
        if !outcome.confidence.is_finite() || !(0.0..=1.0).contains(&outcome.confidence) {
            return Err(JudgmentError::Validation {
                message: format!(
                    "stage {} reported confidence {} outside [0, 1]",
                    stage, outcome.confidence
                ),
            });
        }
        Ok(Self {
            stage: stage.to_string(),
            status: outcome.status,
            output: outcome.output,
            insights: outcome.insights,
            recommendations: outcome.recommendations,
            confidence: outcome.confidence,
            duration_ms,
            timestamp: Utc::now(),
        })
    }

    /// Failed stages keep their key in the context with an error-only output.
    pub fn failed(stage: &str, error: &str, confidence: f64, duration_ms: f64) -> Self {
        let mut output = Map::new();
        output.insert("error".into(), Value::String(error.to_string()));
        Self {
            stage: stage.to_string(),
            status: StageStatus::Failed,
            output,
            insights: vec![error.to_string()],
            recommendations: Vec::new(),
            confidence,
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }
}

/// Accumulated state handed to each stage.
///
/// `previous_results` only ever grows; the scheduler is its sole writer.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineContext {
    pub input_text: String,
    pub current_stage: String,
    /// stage name -> that stage's output
    pub previous_results: Map<String, Value>,
    /// merged stages whose status was `Failed`
    pub failed_stages: BTreeSet<String>,
    pub session: Map<String, Value>,
    pub iteration: u32,
    pub created_at: DateTime<Utc>,
}

impl PipelineContext {
    pub fn new(input_text: impl Into<String>, session: Map<String, Value>) -> Self {
        Self {
            input_text: input_text.into(),
            current_stage: String::new(),
            previous_results: Map::new(),
            failed_stages: BTreeSet::new(),
            session,
            iteration: 0,
            created_at: Utc::now(),
        }
    }

    /// Output of an earlier stage, if it has been merged.
    pub fn output_of(&self, stage: &str) -> Option<&Map<String, Value>> {
        self.previous_results.get(stage).and_then(Value::as_object)
    }

    /// Merge a batch of results in one step. Existing keys are never removed.
    pub(crate) fn merge<'a>(&mut self, results: impl IntoIterator<Item = &'a StageResult>) {
        let mut batch: Vec<(String, Value)> = Vec::new();
        for r in results {
            if r.is_failed() {
                self.failed_stages.insert(r.stage.clone());
            }
            batch.push((r.stage.clone(), Value::Object(r.output.clone())));
        }
        self.previous_results.extend(batch);
    }

    /// Whether a merged stage ended in `Failed`.
    pub fn stage_failed(&self, stage: &str) -> bool {
        self.failed_stages.contains(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_outcome_rejects_out_of_range_confidence() {
        let outcome = StageOutcome::success(Map::new(), vec![], vec![], 1.2);
        assert!(StageResult::from_outcome("FIST", outcome, 1.0).is_err());
    }

    #[test]
    fn test_failed_result_carries_error_output() {
        let r = StageResult::failed("DIR", "boom", 0.1, 3.0);
        assert!(r.is_failed());
        assert_eq!(r.output["error"], "boom");
        assert_eq!(r.insights, vec!["boom".to_string()]);
        assert_eq!(r.confidence, 0.1);
    }

    #[test]
    fn test_merge_keeps_existing_entries() {
        let mut ctx = PipelineContext::new("x", Map::new());
        let a = StageResult::failed("A", "e", 0.1, 0.0);
        ctx.merge([&a]);
        let b = StageResult::failed("B", "e", 0.1, 0.0);
        ctx.merge([&b]);
        assert!(ctx.output_of("A").is_some());
        assert!(ctx.output_of("B").is_some());
    }

    #[test]
    fn test_merge_tracks_failed_status_not_output_keys() {
        let mut ctx = PipelineContext::new("x", Map::new());
        let mut output = Map::new();
        output.insert("error".into(), Value::from("margin of error is small"));
        let ok = StageResult::from_outcome(
            "FIST",
            StageOutcome::success(output, vec![], vec![], 0.9),
            1.0,
        )
        .unwrap();
        let bad = StageResult::failed("DIR", "boom", 0.1, 0.0);
        ctx.merge([&ok, &bad]);
        assert!(!ctx.stage_failed("FIST"));
        assert!(ctx.stage_failed("DIR"));
    }
}
