//! Pluggable anomaly detection over recent snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::{Analysis, CognitiveSnapshot, Metric};
use super::trend;
use crate::config::AnomalyStrategy;
use crate::utils::math::{mean, min_max, std_dev};

/// Snapshots needed before anomaly detection runs
pub const MIN_ANOMALY_POINTS: usize = 10;
/// Most recent snapshots handed to a detector
pub const ANOMALY_LOOKBACK: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    PerformanceDrop,
    CognitiveInconsistency,
    LearningStagnation,
    ExcessiveVolatility,
    MetacognitiveRegression,
    StatisticalOutlier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub kind: AnomalyKind,
    pub metric: Metric,
    pub timestamp: DateTime<Utc>,
    pub severity_score: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub detector: String,
    pub snapshots_examined: usize,
    /// Highest severity first
    pub anomalies: Vec<AnomalyRecord>,
}

pub trait AnomalyDetector: Send + Sync {
    fn name(&self) -> &'static str;
    /// `recent` is oldest-first and never shorter than the minimum depth.
    fn detect(&self, recent: &[CognitiveSnapshot]) -> Vec<AnomalyRecord>;
}

/// Run `detector` over the tail of `history` and order findings by severity.
pub fn run_detector(
    detector: &dyn AnomalyDetector,
    history: &[CognitiveSnapshot],
) -> Analysis<AnomalyReport> {
    if let Some(short) = Analysis::require(history.len(), MIN_ANOMALY_POINTS) {
        return short;
    }
    let recent = &history[history.len().saturating_sub(ANOMALY_LOOKBACK)..];
    let mut anomalies = detector.detect(recent);
    anomalies.sort_by(|a, b| b.severity_score.total_cmp(&a.severity_score));
    tracing::info!(
        detector = detector.name(),
        found = anomalies.len(),
        "anomaly detection completed"
    );
    Analysis::Ready(AnomalyReport {
        detector: detector.name().to_string(),
        snapshots_examined: recent.len(),
        anomalies,
    })
}

pub fn detector_for(strategy: AnomalyStrategy) -> Box<dyn AnomalyDetector> {
    match strategy {
        AnomalyStrategy::None => Box::new(NoAnomalyDetector),
        AnomalyStrategy::Threshold => Box::new(ThresholdDetector::default()),
        AnomalyStrategy::Statistical => Box::new(StatisticalDetector::default()),
    }
}

pub struct NoAnomalyDetector;

impl AnomalyDetector for NoAnomalyDetector {
    fn name(&self) -> &'static str {
        "none"
    }

    fn detect(&self, _recent: &[CognitiveSnapshot]) -> Vec<AnomalyRecord> {
        Vec::new()
    }
}

/// Fixed-threshold checks on drops, gaps, stagnation and volatility.
#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    /// Single-step fall in overall intelligence
    pub drop: f64,
    /// Gap between overall intelligence and coherence
    pub inconsistency_gap: f64,
    pub stagnation_window: usize,
    pub stagnation_range: f64,
    /// Coefficient of variation of overall intelligence
    pub volatility: f64,
    /// Fall in mean meta-cognitive level, first five vs last five
    pub meta_drop: f64,
}

impl Default for ThresholdDetector {
    fn default() -> Self {
        Self {
            drop: 0.15,
            inconsistency_gap: 0.3,
            stagnation_window: 10,
            stagnation_range: 0.02,
            volatility: 0.25,
            meta_drop: 0.1,
        }
    }
}

impl AnomalyDetector for ThresholdDetector {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn detect(&self, recent: &[CognitiveSnapshot]) -> Vec<AnomalyRecord> {
        let mut out = Vec::new();
        let Some(latest) = recent.last() else {
            return out;
        };

        for pair in recent.windows(2) {
            let fall = pair[0].overall_intelligence - pair[1].overall_intelligence;
            if fall > self.drop {
                out.push(AnomalyRecord {
                    kind: AnomalyKind::PerformanceDrop,
                    metric: Metric::OverallIntelligence,
                    timestamp: pair[1].timestamp,
                    severity_score: (fall * 2.0).min(1.0),
                    description: format!(
                        "overall intelligence fell {:.3} -> {:.3}",
                        pair[0].overall_intelligence, pair[1].overall_intelligence
                    ),
                });
            }
        }

        for s in recent {
            let gap = (s.overall_intelligence - s.cognitive_coherence).abs();
            if gap > self.inconsistency_gap {
                out.push(AnomalyRecord {
                    kind: AnomalyKind::CognitiveInconsistency,
                    metric: Metric::CognitiveCoherence,
                    timestamp: s.timestamp,
                    severity_score: gap.min(1.0),
                    description: format!("coherence diverges from overall by {:.3}", gap),
                });
            }
        }

        let overall = Metric::OverallIntelligence.series(recent);
        if overall.len() >= self.stagnation_window {
            let tail = &overall[overall.len() - self.stagnation_window..];
            if let Some((lo, hi)) = min_max(tail) {
                if hi - lo < self.stagnation_range {
                    out.push(AnomalyRecord {
                        kind: AnomalyKind::LearningStagnation,
                        metric: Metric::OverallIntelligence,
                        timestamp: latest.timestamp,
                        severity_score: 0.4,
                        description: format!(
                            "no movement beyond {:.3} over the last {} snapshots",
                            hi - lo,
                            self.stagnation_window
                        ),
                    });
                }
            }
        }

        let cv = trend::volatility(&overall);
        if cv > self.volatility {
            out.push(AnomalyRecord {
                kind: AnomalyKind::ExcessiveVolatility,
                metric: Metric::OverallIntelligence,
                timestamp: latest.timestamp,
                severity_score: cv.min(1.0),
                description: format!("coefficient of variation {:.3}", cv),
            });
        }

        let meta = Metric::MetaCognitiveLevel.series(recent);
        if meta.len() >= 10 {
            let fall = mean(&meta[..5]) - mean(&meta[meta.len() - 5..]);
            if fall > self.meta_drop {
                out.push(AnomalyRecord {
                    kind: AnomalyKind::MetacognitiveRegression,
                    metric: Metric::MetaCognitiveLevel,
                    timestamp: latest.timestamp,
                    severity_score: (fall * 3.0).min(1.0),
                    description: format!("meta-cognitive level down {:.3}", fall),
                });
            }
        }
        out
    }
}

/// Flags points whose z-score within the window exceeds a threshold.
#[derive(Debug, Clone)]
pub struct StatisticalDetector {
    pub z_threshold: f64,
}

impl Default for StatisticalDetector {
    fn default() -> Self {
        Self { z_threshold: 2.5 }
    }
}

impl AnomalyDetector for StatisticalDetector {
    fn name(&self) -> &'static str {
        "statistical"
    }

    fn detect(&self, recent: &[CognitiveSnapshot]) -> Vec<AnomalyRecord> {
        let mut out = Vec::new();
        for metric in Metric::ALL {
            let values = metric.series(recent);
            let sd = std_dev(&values);
            if sd < 1e-9 {
                continue;
            }
            let m = mean(&values);
            for (s, v) in recent.iter().zip(&values) {
                let z = (v - m) / sd;
                if z.abs() <= self.z_threshold {
                    continue;
                }
                let kind = match (metric, z < 0.0) {
                    (Metric::OverallIntelligence, true) => AnomalyKind::PerformanceDrop,
                    (Metric::MetaCognitiveLevel, true) => AnomalyKind::MetacognitiveRegression,
                    _ => AnomalyKind::StatisticalOutlier,
                };
                out.push(AnomalyRecord {
                    kind,
                    metric,
                    timestamp: s.timestamp,
                    severity_score: (z.abs() / 5.0).min(1.0),
                    description: format!("{} = {:.3} is {:.1} sd from mean {:.3}", metric, v, z, m),
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::snapshot::{Evaluation, SnapshotContext};
    use chrono::Duration;

    fn snaps(values: &[f64]) -> Vec<CognitiveSnapshot> {
        let start = Utc::now() - Duration::hours(2);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let eval = Evaluation {
                    overall_intelligence: *v,
                    cognitive_coherence: *v,
                    ..Evaluation::default()
                };
                CognitiveSnapshot::new(start + Duration::minutes(i as i64), &eval, &SnapshotContext::default())
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_requires_ten_snapshots() {
        let out = run_detector(&ThresholdDetector::default(), &snaps(&[0.5; 9]));
        assert!(!out.is_ready());
    }

    #[test]
    fn test_none_detector_finds_nothing() {
        let out = run_detector(&NoAnomalyDetector, &snaps(&[0.9, 0.1, 0.9, 0.1, 0.9, 0.1, 0.9, 0.1, 0.9, 0.1]))
            .ready()
            .unwrap();
        assert!(out.anomalies.is_empty());
        assert_eq!(out.detector, "none");
    }

    #[test]
    fn test_threshold_results_sorted_by_severity() {
        let mut v = vec![0.6; 10];
        v.extend([0.4, 0.6, 0.2]);
        let report = run_detector(&ThresholdDetector::default(), &snaps(&v)).ready().unwrap();
        let drops: Vec<&AnomalyRecord> = report
            .anomalies
            .iter()
            .filter(|a| a.kind == AnomalyKind::PerformanceDrop)
            .collect();
        assert_eq!(drops.len(), 2);
        let severities: Vec<f64> = report.anomalies.iter().map(|a| a.severity_score).collect();
        assert!(severities.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_stagnation_flagged() {
        let report = run_detector(&ThresholdDetector::default(), &snaps(&[0.5; 12])).ready().unwrap();
        assert!(report
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::LearningStagnation));
    }

    #[test]
    fn test_statistical_flags_outlier() {
        let mut v = vec![0.6; 20];
        v.push(0.05);
        let report = run_detector(&StatisticalDetector::default(), &snaps(&v)).ready().unwrap();
        assert!(report
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::PerformanceDrop && a.metric == Metric::OverallIntelligence));
    }
}
