//! Trajectory and meta-cognitive reports built from a snapshot series.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::milestone::{EvolutionMilestone, MilestoneType};
use super::snapshot::{Analysis, CognitiveSnapshot, Metric, TimeWindow};
use super::trend::{self, GrowthPattern, TrendDirection};
use crate::utils::clamp_unit;
use crate::utils::math::{deltas, mean, std_dev};

/// Snapshots needed before meta-cognitive evolution is reported
pub const MIN_META_POINTS: usize = 5;
/// How many recent snapshots the meta-cognitive report looks at
pub const META_LOOKBACK: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionPhase {
    Nascent,
    Developing,
    Maturing,
    Advanced,
    Transcendent,
}

impl EvolutionPhase {
    pub fn from_score(score: f64) -> Self {
        if score > 0.9 {
            EvolutionPhase::Transcendent
        } else if score > 0.8 {
            EvolutionPhase::Advanced
        } else if score > 0.6 {
            EvolutionPhase::Maturing
        } else if score > 0.4 {
            EvolutionPhase::Developing
        } else {
            EvolutionPhase::Nascent
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallTrend {
    Improving,
    Declining,
    Steady,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySummary {
    pub total_snapshots: usize,
    pub time_span_secs: f64,
    pub overall_trend: OverallTrend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthPatterns {
    pub dominant_pattern: GrowthPattern,
    pub pattern_strength: f64,
    pub per_metric: BTreeMap<Metric, GrowthPattern>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stability {
    pub stability_score: f64,
    pub volatility: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MilestoneCounts {
    pub breakthroughs: usize,
    pub plateaus: usize,
    pub recoveries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionAnalysis {
    pub regression_detected: bool,
    pub declining_metrics: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FutureProjections {
    pub one_month: f64,
    pub three_month: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryReport {
    /// `None` means all history
    pub window: Option<TimeWindow>,
    pub summary: TrajectorySummary,
    pub growth_patterns: GrowthPatterns,
    pub stability: Stability,
    pub phase: EvolutionPhase,
    pub milestones: MilestoneCounts,
    pub regression: RegressionAnalysis,
    pub meta_learning_trend: TrendDirection,
    pub optimization_opportunities: Vec<String>,
    pub projections: FutureProjections,
}

/// Build the report; the caller guarantees at least two snapshots.
pub(crate) fn build_report(
    snapshots: &[CognitiveSnapshot],
    milestones: &[EvolutionMilestone],
    window: Option<TimeWindow>,
) -> TrajectoryReport {
    let overall = Metric::OverallIntelligence.series(snapshots);
    let first = overall.first().copied().unwrap_or(0.0);
    let current = overall.last().copied().unwrap_or(0.0);

    let time_span_secs = match (snapshots.first(), snapshots.last()) {
        (Some(a), Some(b)) => (b.timestamp - a.timestamp).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    };
    let overall_trend = if current > first {
        OverallTrend::Improving
    } else if current < first {
        OverallTrend::Declining
    } else {
        OverallTrend::Steady
    };

    let per_metric: BTreeMap<Metric, GrowthPattern> = Metric::ALL
        .iter()
        .map(|m| (*m, trend::classify(&m.series(snapshots))))
        .collect();
    let dominant = per_metric
        .get(&Metric::OverallIntelligence)
        .copied()
        .unwrap_or(GrowthPattern::Linear);

    let volatility = trend::volatility(&overall);

    let since = snapshots.first().map(|s| s.timestamp);
    let mut counts = MilestoneCounts::default();
    for m in milestones
        .iter()
        .filter(|m| since.is_none_or(|t| m.timestamp >= t))
    {
        match m.milestone_type {
            MilestoneType::Breakthrough => counts.breakthroughs += 1,
            MilestoneType::Plateau => counts.plateaus += 1,
            MilestoneType::Recovery => counts.recoveries += 1,
        }
    }

    let declining_metrics: Vec<Metric> = Metric::ALL
        .iter()
        .filter(|m| {
            let series = m.series(snapshots);
            per_metric.get(*m) == Some(&GrowthPattern::Regression)
                || trend::direction(&series) == TrendDirection::Down
        })
        .copied()
        .collect();

    TrajectoryReport {
        window,
        summary: TrajectorySummary {
            total_snapshots: snapshots.len(),
            time_span_secs,
            overall_trend,
        },
        growth_patterns: GrowthPatterns {
            dominant_pattern: dominant,
            pattern_strength: trend::pattern_confidence(&overall, dominant),
            per_metric,
        },
        stability: Stability {
            stability_score: (1.0 - volatility).max(0.0),
            volatility,
        },
        phase: EvolutionPhase::from_score(current),
        milestones: counts,
        regression: RegressionAnalysis {
            regression_detected: !declining_metrics.is_empty(),
            declining_metrics,
        },
        meta_learning_trend: trend::direction(&Metric::MetaCognitiveLevel.series(snapshots)),
        optimization_opportunities: optimization_opportunities(snapshots, volatility, dominant),
        projections: FutureProjections {
            one_month: (current + 0.05).min(1.0),
            three_month: (current + 0.12).min(1.0),
            confidence: 0.6,
        },
    }
}

fn optimization_opportunities(
    snapshots: &[CognitiveSnapshot],
    volatility: f64,
    dominant: GrowthPattern,
) -> Vec<String> {
    let mut out = Vec::new();
    if volatility > 0.1 {
        out.push("improve_consistency".to_string());
    }
    if matches!(dominant, GrowthPattern::Plateau) {
        out.push("vary_learning_strategy".to_string());
    }
    if let Some(latest) = snapshots.last() {
        for metric in Metric::ALL {
            if metric.value_of(latest) < 0.6 {
                out.push(format!("strengthen_{}", metric.as_str()));
            }
        }
    }
    if out.is_empty() {
        out.push("enhance_peak_performance".to_string());
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelTrend {
    pub trend: TrendDirection,
    pub current_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionQuality {
    /// Direction of the reported confidence level
    pub quality_trend: TrendDirection,
    pub depth_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEfficiency {
    pub efficiency_trend: TrendDirection,
    /// Mean change in overall intelligence per snapshot
    pub gain_per_snapshot: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationPace {
    Slow,
    Moderate,
    Fast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationSpeed {
    pub adaptation_speed: AdaptationPace,
    pub mean_step: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitiveFlexibility {
    pub flexibility_score: f64,
    pub contexts_seen: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaCognitiveEvolution {
    pub snapshots_examined: usize,
    pub self_awareness: LevelTrend,
    pub reflection_quality: ReflectionQuality,
    pub strategy_sophistication: f64,
    pub learning_efficiency: LearningEfficiency,
    pub adaptation_speed: AdaptationSpeed,
    pub cognitive_flexibility: CognitiveFlexibility,
    pub meta_learning_indicators: Vec<String>,
    pub breakthrough_predictors: Vec<String>,
}

/// Meta-cognitive report over the most recent snapshots of `history`.
pub fn meta_cognitive_evolution(history: &[CognitiveSnapshot]) -> Analysis<MetaCognitiveEvolution> {
    if let Some(short) = Analysis::require(history.len(), MIN_META_POINTS) {
        return short;
    }
    let recent = &history[history.len().saturating_sub(META_LOOKBACK)..];
    let n = recent.len();

    let meta = Metric::MetaCognitiveLevel.series(recent);
    let overall = Metric::OverallIntelligence.series(recent);
    let coherence = Metric::CognitiveCoherence.series(recent);
    let adaptive = Metric::AdaptiveCapacity.series(recent);
    let confidence: Vec<f64> = recent.iter().map(|s| s.confidence_level).collect();

    let depth: Vec<f64> = meta
        .iter()
        .zip(&coherence)
        .map(|(m, c)| (m + c) / 2.0)
        .collect();
    let sophistication: Vec<f64> = recent
        .iter()
        .map(|s| s.adaptive_capacity * (0.5 + 0.5 * s.task_complexity))
        .collect();

    let mean_step = mean(
        &deltas(&adaptive)
            .iter()
            .map(|d| d.abs())
            .collect::<Vec<_>>(),
    );
    let pace = if mean_step > 0.05 {
        AdaptationPace::Fast
    } else if mean_step > 0.02 {
        AdaptationPace::Moderate
    } else {
        AdaptationPace::Slow
    };

    // spread of mean performance across context types
    let mut by_context: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for s in recent {
        by_context
            .entry(s.context_type.as_str())
            .or_default()
            .push(s.overall_intelligence);
    }
    let context_means: Vec<f64> = by_context.values().map(|v| mean(v)).collect();
    let contexts_seen = by_context.len();

    let meta_dir = trend::direction(&meta);
    let overall_dir = trend::direction(&overall);

    let mut indicators = Vec::new();
    if meta_dir == TrendDirection::Up {
        indicators.push("meta_cognition_rising".to_string());
    }
    if trend::direction(&adaptive) == TrendDirection::Up {
        indicators.push("adaptation_improving".to_string());
    }
    let mid = n / 2;
    if std_dev(&overall[mid..]) < std_dev(&overall[..mid]) {
        indicators.push("consistency_improving".to_string());
    }

    let mut predictors = Vec::new();
    if meta.last().copied().unwrap_or(0.0) > 0.7 {
        predictors.push("high_meta_cognitive_activity".to_string());
    }
    if matches!(
        trend::classify(&overall),
        GrowthPattern::Exponential | GrowthPattern::Breakthrough
    ) {
        predictors.push("accelerating_growth".to_string());
    }
    if trend::acceleration(&overall) > 0.0 {
        predictors.push("positive_acceleration".to_string());
    }

    Analysis::Ready(MetaCognitiveEvolution {
        snapshots_examined: n,
        self_awareness: LevelTrend {
            trend: meta_dir,
            current_level: meta.last().copied().unwrap_or(0.0),
        },
        reflection_quality: ReflectionQuality {
            quality_trend: trend::direction(&confidence),
            depth_score: mean(&depth),
        },
        strategy_sophistication: clamp_unit(mean(&sophistication)),
        learning_efficiency: LearningEfficiency {
            efficiency_trend: overall_dir,
            gain_per_snapshot: (overall[n - 1] - overall[0]) / (n - 1) as f64,
        },
        adaptation_speed: AdaptationSpeed {
            adaptation_speed: pace,
            mean_step,
        },
        cognitive_flexibility: CognitiveFlexibility {
            flexibility_score: clamp_unit(1.0 - std_dev(&context_means)),
            contexts_seen,
        },
        meta_learning_indicators: indicators,
        breakthrough_predictors: predictors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::snapshot::{Evaluation, SnapshotContext};
    use chrono::{Duration, Utc};

    fn series(values: &[(f64, f64)]) -> Vec<CognitiveSnapshot> {
        let start = Utc::now() - Duration::hours(1);
        values
            .iter()
            .enumerate()
            .map(|(i, (overall, meta))| {
                let eval = Evaluation {
                    overall_intelligence: *overall,
                    meta_cognitive_level: *meta,
                    ..Evaluation::default()
                };
                CognitiveSnapshot::new(
                    start + Duration::minutes(i as i64),
                    &eval,
                    &SnapshotContext::default(),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_phase_boundaries() {
        assert_eq!(EvolutionPhase::from_score(0.4), EvolutionPhase::Nascent);
        assert_eq!(EvolutionPhase::from_score(0.41), EvolutionPhase::Developing);
        assert_eq!(EvolutionPhase::from_score(0.8), EvolutionPhase::Maturing);
        assert_eq!(EvolutionPhase::from_score(0.95), EvolutionPhase::Transcendent);
    }

    #[test]
    fn test_report_projections_are_clamped() {
        let snaps = series(&[(0.9, 0.5), (0.95, 0.5)]);
        let report = build_report(&snaps, &[], None);
        assert_eq!(report.summary.overall_trend, OverallTrend::Improving);
        assert_eq!(report.projections.one_month, 1.0);
        assert_eq!(report.projections.three_month, 1.0);
        assert_eq!(report.phase, EvolutionPhase::Transcendent);
    }

    #[test]
    fn test_meta_needs_five_snapshots() {
        let snaps = series(&[(0.5, 0.5); 4]);
        assert_eq!(
            meta_cognitive_evolution(&snaps),
            Analysis::InsufficientData {
                required: 5,
                available: 4
            }
        );
    }

    #[test]
    fn test_meta_reports_rising_self_awareness() {
        let snaps = series(&[(0.5, 0.4), (0.5, 0.5), (0.5, 0.6), (0.5, 0.7), (0.5, 0.8), (0.5, 0.9)]);
        let meta = meta_cognitive_evolution(&snaps).ready().unwrap();
        assert_eq!(meta.self_awareness.trend, TrendDirection::Up);
        assert!((meta.self_awareness.current_level - 0.9).abs() < 1e-9);
        assert!(meta
            .meta_learning_indicators
            .contains(&"meta_cognition_rising".to_string()));
        assert!(meta
            .breakthrough_predictors
            .contains(&"high_meta_cognitive_activity".to_string()));
        assert_eq!(meta.cognitive_flexibility.contexts_seen, 1);
    }

    #[test]
    fn test_meta_looks_at_recent_twenty() {
        let snaps = series(&[(0.5, 0.5); 30]);
        let meta = meta_cognitive_evolution(&snaps).ready().unwrap();
        assert_eq!(meta.snapshots_examined, 20);
        assert_eq!(meta.adaptation_speed.adaptation_speed, AdaptationPace::Slow);
    }
}
