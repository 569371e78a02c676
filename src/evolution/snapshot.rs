//! Snapshot records, their inputs, and the window/metric vocabulary.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{JudgmentError, Result};
use crate::pipeline::PipelineRun;
use crate::stages::PHASE_WIDTH;
use crate::utils::{clamp_unit, closest_match, mean, std_dev};

/// Result of an analysis that needs a minimum amount of history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analysis<T> {
    Ready(T),
    InsufficientData { required: usize, available: usize },
}

impl<T> Analysis<T> {
    pub fn require(available: usize, required: usize) -> Option<Self> {
        (available < required).then_some(Self::InsufficientData {
            required,
            available,
        })
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(v) => Some(v),
            Self::InsufficientData { .. } => None,
        }
    }

    pub fn as_ready(&self) -> Option<&T> {
        match self {
            Self::Ready(v) => Some(v),
            Self::InsufficientData { .. } => None,
        }
    }
}

/// The four scalar metrics tracked per snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    OverallIntelligence,
    CognitiveCoherence,
    AdaptiveCapacity,
    MetaCognitiveLevel,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::OverallIntelligence,
        Metric::CognitiveCoherence,
        Metric::AdaptiveCapacity,
        Metric::MetaCognitiveLevel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::OverallIntelligence => "overall_intelligence",
            Metric::CognitiveCoherence => "cognitive_coherence",
            Metric::AdaptiveCapacity => "adaptive_capacity",
            Metric::MetaCognitiveLevel => "meta_cognitive_level",
        }
    }

    pub fn value_of(&self, snapshot: &CognitiveSnapshot) -> f64 {
        match self {
            Metric::OverallIntelligence => snapshot.overall_intelligence,
            Metric::CognitiveCoherence => snapshot.cognitive_coherence,
            Metric::AdaptiveCapacity => snapshot.adaptive_capacity,
            Metric::MetaCognitiveLevel => snapshot.meta_cognitive_level,
        }
    }

    /// Ordered series of this metric across `snapshots`.
    pub fn series(&self, snapshots: &[CognitiveSnapshot]) -> Vec<f64> {
        snapshots.iter().map(|s| self.value_of(s)).collect()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookback windows used to filter snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeWindow {
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "1d")]
    Day,
    #[serde(rename = "1w")]
    Week,
    #[serde(rename = "1m")]
    Month,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 4] = [
        TimeWindow::Hour,
        TimeWindow::Day,
        TimeWindow::Week,
        TimeWindow::Month,
    ];
    const LABELS: [&'static str; 4] = ["1h", "1d", "1w", "1m"];

    pub fn label(&self) -> &'static str {
        match self {
            TimeWindow::Hour => "1h",
            TimeWindow::Day => "1d",
            TimeWindow::Week => "1w",
            TimeWindow::Month => "1m",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            TimeWindow::Hour => 3_600,
            TimeWindow::Day => 86_400,
            TimeWindow::Week => 604_800,
            TimeWindow::Month => 2_592_000,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Earliest timestamp inside the window ending at `now`
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimeWindow {
    type Err = JudgmentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "1h" => Ok(TimeWindow::Hour),
            "1d" => Ok(TimeWindow::Day),
            "1w" => Ok(TimeWindow::Week),
            "1m" => Ok(TimeWindow::Month),
            _ => {
                let hint = closest_match(s, &Self::LABELS)
                    .map(|m| format!("; did you mean '{}'?", m))
                    .unwrap_or_default();
                Err(JudgmentError::InvalidParams {
                    message: format!(
                        "unknown time window '{}', expected one of {}{}",
                        s,
                        Self::LABELS.join(", "),
                        hint
                    ),
                })
            }
        }
    }
}

fn half() -> f64 {
    0.5
}

fn default_pressure() -> f64 {
    0.3
}

fn default_confidence_level() -> f64 {
    0.7
}

fn default_context_type() -> String {
    "general".to_string()
}

/// Metric input for a new snapshot. Missing metrics default to 0.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(default = "half")]
    pub overall_intelligence: f64,
    #[serde(default = "half")]
    pub cognitive_coherence: f64,
    #[serde(default = "half")]
    pub adaptive_capacity: f64,
    #[serde(default = "half")]
    pub meta_cognitive_level: f64,
    #[serde(default)]
    pub dimension_scores: BTreeMap<String, f64>,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    #[serde(default)]
    pub self_assessment: Map<String, Value>,
}

impl Default for Evaluation {
    fn default() -> Self {
        Self {
            overall_intelligence: half(),
            cognitive_coherence: half(),
            adaptive_capacity: half(),
            meta_cognitive_level: half(),
            dimension_scores: BTreeMap::new(),
            confidence_level: default_confidence_level(),
            self_assessment: Map::new(),
        }
    }
}

impl Evaluation {
    /// Build from a loosely-typed map, applying defaults for absent keys.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map.clone())).map_err(|e| {
            JudgmentError::Validation {
                message: format!("invalid evaluation: {}", e),
            }
        })
    }

    /// Derive snapshot metrics from a finished pipeline run.
    pub fn from_run(run: &PipelineRun) -> Result<Self> {
        if run.results.is_empty() {
            return Err(JudgmentError::Validation {
                message: format!("run {} produced no stage results", run.run_id),
            });
        }
        let confidences: Vec<f64> = run.results.iter().map(|r| r.confidence).collect();
        let independent: Vec<f64> = confidences.iter().take(PHASE_WIDTH).copied().collect();
        let meta = run
            .result("META")
            .map(|r| r.confidence)
            .unwrap_or_else(|| mean(&confidences));

        let mut self_assessment = Map::new();
        self_assessment.insert("run_id".into(), Value::String(run.run_id.to_string()));
        self_assessment.insert("input_digest".into(), Value::String(run.input_digest.clone()));
        self_assessment.insert(
            "successful_stages".into(),
            Value::from(run.summary.successful_stages),
        );

        Ok(Self {
            overall_intelligence: run.overall_confidence,
            cognitive_coherence: clamp_unit(1.0 - std_dev(&confidences)),
            adaptive_capacity: mean(&independent),
            meta_cognitive_level: meta,
            dimension_scores: run
                .results
                .iter()
                .map(|r| (r.stage.clone(), r.confidence))
                .collect(),
            confidence_level: confidences.iter().copied().fold(f64::INFINITY, f64::min),
            self_assessment,
        })
    }
}

/// Context input for a new snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotContext {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_context_type", alias = "type")]
    pub context_type: String,
    #[serde(default = "half", alias = "complexity")]
    pub task_complexity: f64,
    #[serde(default = "default_pressure", alias = "pressure")]
    pub performance_pressure: f64,
}

impl Default for SnapshotContext {
    fn default() -> Self {
        Self {
            session_id: None,
            context_type: default_context_type(),
            task_complexity: half(),
            performance_pressure: default_pressure(),
        }
    }
}

impl SnapshotContext {
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map.clone())).map_err(|e| {
            JudgmentError::Validation {
                message: format!("invalid snapshot context: {}", e),
            }
        })
    }
}

/// One timestamped record of the four metrics plus context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitiveSnapshot {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub overall_intelligence: f64,
    pub cognitive_coherence: f64,
    pub adaptive_capacity: f64,
    pub meta_cognitive_level: f64,
    #[serde(default)]
    pub dimension_scores: BTreeMap<String, f64>,
    #[serde(default = "default_context_type")]
    pub context_type: String,
    #[serde(default = "half")]
    pub task_complexity: f64,
    #[serde(default = "default_pressure")]
    pub performance_pressure: f64,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    #[serde(default)]
    pub self_assessment: Map<String, Value>,
}

impl CognitiveSnapshot {
    pub fn new(
        timestamp: DateTime<Utc>,
        evaluation: &Evaluation,
        context: &SnapshotContext,
    ) -> Result<Self> {
        let snapshot = Self {
            timestamp,
            session_id: context
                .session_id
                .clone()
                .unwrap_or_else(|| format!("session-{}", timestamp.timestamp())),
            overall_intelligence: evaluation.overall_intelligence,
            cognitive_coherence: evaluation.cognitive_coherence,
            adaptive_capacity: evaluation.adaptive_capacity,
            meta_cognitive_level: evaluation.meta_cognitive_level,
            dimension_scores: evaluation.dimension_scores.clone(),
            context_type: context.context_type.clone(),
            task_complexity: context.task_complexity,
            performance_pressure: context.performance_pressure,
            confidence_level: evaluation.confidence_level,
            self_assessment: evaluation.self_assessment.clone(),
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Every scalar must be finite and inside [0, 1].
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("overall_intelligence", self.overall_intelligence),
            ("cognitive_coherence", self.cognitive_coherence),
            ("adaptive_capacity", self.adaptive_capacity),
            ("meta_cognitive_level", self.meta_cognitive_level),
            ("task_complexity", self.task_complexity),
            ("performance_pressure", self.performance_pressure),
            ("confidence_level", self.confidence_level),
        ];
        let dims = self
            .dimension_scores
            .iter()
            .map(|(k, v)| (k.as_str(), *v));
        for (name, value) in fields.into_iter().chain(dims) {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(JudgmentError::Validation {
                    message: format!("{} = {} is outside [0, 1]", name, value),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_take_defaults() {
        let eval = Evaluation::from_map(&Map::new()).unwrap();
        assert_eq!(eval.overall_intelligence, 0.5);
        assert_eq!(eval.confidence_level, 0.7);
        let ctx = SnapshotContext::from_map(&Map::new()).unwrap();
        assert_eq!(ctx.context_type, "general");
        assert_eq!(ctx.performance_pressure, 0.3);
    }

    #[test]
    fn test_context_accepts_short_keys() {
        let map = json!({"type": "planning", "complexity": 0.9, "pressure": 0.1});
        let ctx = SnapshotContext::from_map(map.as_object().unwrap()).unwrap();
        assert_eq!(ctx.context_type, "planning");
        assert_eq!(ctx.task_complexity, 0.9);
        assert_eq!(ctx.performance_pressure, 0.1);
    }

    #[test]
    fn test_snapshot_rejects_out_of_range_metric() {
        let eval = Evaluation {
            adaptive_capacity: 1.4,
            ..Evaluation::default()
        };
        let err = CognitiveSnapshot::new(Utc::now(), &eval, &SnapshotContext::default());
        assert!(matches!(err, Err(JudgmentError::Validation { .. })));
    }

    #[test]
    fn test_window_parse_suggests_closest_label() {
        assert_eq!("1W".parse::<TimeWindow>().unwrap(), TimeWindow::Week);
        let err = "1dd".parse::<TimeWindow>().unwrap_err().to_string();
        assert!(err.contains("did you mean '1d'"), "{}", err);
    }

    #[test]
    fn test_window_seconds() {
        assert_eq!(TimeWindow::Month.seconds(), 2_592_000);
        assert_eq!(TimeWindow::Week.seconds(), 604_800);
    }

    #[test]
    fn test_analysis_serializes_status_tag() {
        let a: Analysis<BTreeMap<String, f64>> = Analysis::InsufficientData {
            required: 3,
            available: 1,
        };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["status"], "insufficient_data");
        assert_eq!(v["required"], 3);
    }
}
