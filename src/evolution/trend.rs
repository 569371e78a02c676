//! Per-metric trend statistics and growth-pattern classification.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::snapshot::{Analysis, CognitiveSnapshot, Metric, TimeWindow};
use super::store::SnapshotStore;
use super::trajectory::{self, TrajectoryReport};
use crate::config::EvolutionConfig;
use crate::utils::math::{autocorrelation, deltas, mean, min_max, relative_change, std_dev, variance};

/// Minimum points before any trend is reported
pub const MIN_TREND_POINTS: usize = 3;
/// Minimum snapshots in a window before a trajectory is reported
pub const MIN_TRAJECTORY_POINTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthPattern {
    Linear,
    Exponential,
    Logarithmic,
    Cyclical,
    Plateau,
    Breakthrough,
    Regression,
}

impl GrowthPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthPattern::Linear => "linear",
            GrowthPattern::Exponential => "exponential",
            GrowthPattern::Logarithmic => "logarithmic",
            GrowthPattern::Cyclical => "cyclical",
            GrowthPattern::Plateau => "plateau",
            GrowthPattern::Breakthrough => "breakthrough",
            GrowthPattern::Regression => "regression",
        }
    }
}

/// Derived statistics for one metric over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionTrend {
    pub metric_name: String,
    pub time_window: String,
    pub direction: TrendDirection,
    pub change_rate: f64,
    pub acceleration: f64,
    pub volatility: f64,
    pub growth_pattern: GrowthPattern,
    pub pattern_confidence: f64,
    pub predicted_next_value: f64,
    pub prediction_confidence: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub mean_value: f64,
    pub std_deviation: f64,
}

/// Compare the first and last thirds; +/-5% relative change decides.
pub fn direction(values: &[f64]) -> TrendDirection {
    if values.len() < MIN_TREND_POINTS {
        return TrendDirection::Stable;
    }
    let k = (values.len() / 3).max(1);
    let early = mean(&values[..k]);
    let late = mean(&values[values.len() - k..]);
    let change = relative_change(early, late);
    if change > 0.05 {
        TrendDirection::Up
    } else if change < -0.05 {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    }
}

/// Relative change of the second half minus that of the first half.
pub fn acceleration(values: &[f64]) -> f64 {
    if values.len() < 4 {
        return 0.0;
    }
    let mid = values.len() / 2;
    let early = relative_change(values[0], values[mid - 1]);
    let late = relative_change(values[mid], values[values.len() - 1]);
    late - early
}

/// Coefficient of variation, denominator floored at 0.01
pub fn volatility(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    std_dev(values) / mean(values).abs().max(0.01)
}

pub(crate) fn is_linear(values: &[f64]) -> bool {
    if values.len() < 3 {
        return true;
    }
    variance(&deltas(values)) < 0.01
}

pub(crate) fn is_exponential(values: &[f64]) -> bool {
    if values.len() < 4 {
        return false;
    }
    let ratios: Vec<f64> = values.windows(2).map(|w| w[1] / w[0].max(0.01)).collect();
    let head = mean(&ratios[..3]);
    let tail = mean(&ratios[ratios.len() - 3..]);
    tail - head > 0.05
}

pub(crate) fn is_logarithmic(values: &[f64]) -> bool {
    if values.len() < 4 {
        return false;
    }
    let d = deltas(values);
    let half = d.len() / 2;
    let early = mean(&d[..half]);
    let late = mean(&d[half..]);
    early > late * 1.5
}

pub(crate) fn is_cyclical(values: &[f64]) -> bool {
    if values.len() < 8 {
        return false;
    }
    let max_lag = (values.len() / 2).min(6);
    (1..max_lag)
        .map(|lag| autocorrelation(values, lag))
        .fold(f64::NEG_INFINITY, f64::max)
        > 0.6
}

pub(crate) fn is_plateau(values: &[f64]) -> bool {
    if values.len() < 5 {
        return false;
    }
    match min_max(&values[values.len() - 5..]) {
        Some((lo, hi)) => hi - lo < 0.05,
        None => false,
    }
}

pub(crate) fn is_breakthrough(values: &[f64]) -> bool {
    if values.len() < 6 {
        return false;
    }
    (0..values.len() - 3).any(|i| {
        let before = mean(&values[..=i]);
        values[i + 1..i + 4].iter().all(|v| *v >= before * 1.10)
    })
}

pub(crate) fn is_regression(values: &[f64]) -> bool {
    if values.len() < 4 {
        return false;
    }
    let steps = values.len() - 1;
    let falling = values.windows(2).filter(|w| w[1] < w[0]).count();
    falling as f64 >= steps as f64 * 0.7
}

/// First matching pattern in priority order; linear when nothing matches.
pub fn classify(values: &[f64]) -> GrowthPattern {
    if values.len() < 4 || is_linear(values) {
        return GrowthPattern::Linear;
    }
    let checks: [(fn(&[f64]) -> bool, GrowthPattern); 6] = [
        (is_exponential, GrowthPattern::Exponential),
        (is_logarithmic, GrowthPattern::Logarithmic),
        (is_cyclical, GrowthPattern::Cyclical),
        (is_plateau, GrowthPattern::Plateau),
        (is_breakthrough, GrowthPattern::Breakthrough),
        (is_regression, GrowthPattern::Regression),
    ];
    checks
        .iter()
        .find(|(test, _)| test(values))
        .map(|(_, p)| *p)
        .unwrap_or(GrowthPattern::Linear)
}

pub fn pattern_confidence(values: &[f64], pattern: GrowthPattern) -> f64 {
    match pattern {
        GrowthPattern::Linear if is_linear(values) => 0.8,
        GrowthPattern::Linear => 0.4,
        GrowthPattern::Exponential if is_exponential(values) => 0.9,
        GrowthPattern::Exponential => 0.3,
        GrowthPattern::Plateau if is_plateau(values) => 0.85,
        GrowthPattern::Plateau => 0.3,
        _ => 0.6,
    }
}

/// Next value under the given pattern, clamped to [0, 1].
pub fn predict_next(values: &[f64], pattern: GrowthPattern) -> f64 {
    let Some(&last) = values.last() else {
        return 0.5;
    };
    let prev = if values.len() >= 2 {
        Some(values[values.len() - 2])
    } else {
        None
    };
    let next = match (pattern, prev) {
        (GrowthPattern::Linear, Some(p)) => last + (last - p),
        (GrowthPattern::Exponential, Some(p)) => last * (last / p.max(0.01)),
        (GrowthPattern::Breakthrough, _) => last + 0.05,
        (GrowthPattern::Regression, _) => last - 0.03,
        _ => last,
    };
    next.clamp(0.0, 1.0)
}

/// Full trend for one ordered series; needs at least three points.
pub fn compute_trend(metric: Metric, window: TimeWindow, values: &[f64]) -> Analysis<EvolutionTrend> {
    if let Some(short) = Analysis::require(values.len(), MIN_TREND_POINTS) {
        return short;
    }
    let pattern = classify(values);
    let confidence = pattern_confidence(values, pattern);
    let (min_value, max_value) = min_max(values).unwrap_or((0.0, 0.0));
    Analysis::Ready(EvolutionTrend {
        metric_name: metric.as_str().to_string(),
        time_window: window.label().to_string(),
        direction: direction(values),
        change_rate: relative_change(values[0], values[values.len() - 1]),
        acceleration: acceleration(values),
        volatility: volatility(values),
        growth_pattern: pattern,
        pattern_confidence: confidence,
        predicted_next_value: predict_next(values, pattern),
        prediction_confidence: (confidence * 0.8).min(0.9),
        min_value,
        max_value,
        mean_value: mean(values),
        std_deviation: std_dev(values),
    })
}

/// Trends for every metric and window that has enough points at `now`.
pub fn all_trends(snapshots: &[CognitiveSnapshot], now: DateTime<Utc>) -> Vec<EvolutionTrend> {
    let mut out = Vec::new();
    for metric in Metric::ALL {
        for window in TimeWindow::ALL {
            let cutoff = window.cutoff(now);
            let values: Vec<f64> = snapshots
                .iter()
                .filter(|s| s.timestamp >= cutoff)
                .map(|s| metric.value_of(s))
                .collect();
            if let Analysis::Ready(trend) = compute_trend(metric, window, &values) {
                out.push(trend);
            }
        }
    }
    out
}

type CacheKey = (String, u64);

/// Trajectory analysis over a store, with a short-lived result cache.
pub struct TrendAnalyzer {
    ttl: Duration,
    cache: Mutex<LruCache<CacheKey, (Instant, TrajectoryReport)>>,
}

impl TrendAnalyzer {
    pub fn new(config: &EvolutionConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.analysis_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl: Duration::from_secs(config.analysis_cache_ttl_secs),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Trajectory for the given window (all history when `None`).
    ///
    /// Cached per (window, store revision) for the configured TTL.
    pub async fn analyze_trajectory(
        &self,
        store: &SnapshotStore,
        window: Option<TimeWindow>,
    ) -> Analysis<TrajectoryReport> {
        let revision = store.revision().await;
        let key = (
            window.map(|w| w.label()).unwrap_or("all").to_string(),
            revision,
        );

        {
            let mut cache = self.cache.lock().await;
            let fresh = cache
                .get(&key)
                .filter(|(at, _)| at.elapsed() < self.ttl)
                .map(|(_, report)| report.clone());
            if let Some(report) = fresh {
                tracing::debug!(window = %key.0, revision, "trajectory cache hit");
                return Analysis::Ready(report);
            }
            // expired or absent
            cache.pop(&key);
        }

        let snapshots = match window {
            Some(w) => store.filter_by_window(w).await,
            None => store.snapshots().await,
        };
        if let Some(short) = Analysis::require(snapshots.len(), MIN_TRAJECTORY_POINTS) {
            return short;
        }
        let milestones = store.milestones().await;
        let report = trajectory::build_report(&snapshots, &milestones, window);

        self.cache
            .lock()
            .await
            .put(key, (Instant::now(), report.clone()));
        tracing::info!(snapshots = snapshots.len(), "trajectory analysis completed");
        Analysis::Ready(report)
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Series whose consecutive deltas alternate d+a, d-a, giving delta variance a^2.
    fn alternating(a: f64) -> Vec<f64> {
        let mut v = vec![0.2];
        for i in 0..8 {
            let step = if i % 2 == 0 { 0.02 + a } else { 0.02 - a };
            let last = *v.last().unwrap();
            v.push(last + step);
        }
        v
    }

    #[test]
    fn test_linearity_boundary() {
        let below = alternating(0.009_f64.sqrt());
        assert!((variance(&deltas(&below)) - 0.009).abs() < 1e-9);
        assert!(is_linear(&below));
        assert_eq!(classify(&below), GrowthPattern::Linear);

        let above = alternating(0.011_f64.sqrt());
        assert!((variance(&deltas(&above)) - 0.011).abs() < 1e-9);
        assert!(!is_linear(&above));
    }

    #[test]
    fn test_short_series_is_linear() {
        assert_eq!(classify(&[0.9, 0.1, 0.9]), GrowthPattern::Linear);
    }

    #[test]
    fn test_exponential_detected_from_rising_ratios() {
        let v = [0.05, 0.05, 0.05, 0.05, 0.1, 0.3, 0.9];
        assert!(!is_linear(&v));
        assert!(is_exponential(&v));
        assert_eq!(classify(&v), GrowthPattern::Exponential);
    }

    #[test]
    fn test_plateau_on_flat_tail() {
        assert!(is_plateau(&[0.1, 0.9, 0.5, 0.51, 0.52, 0.5, 0.53]));
        assert!(!is_plateau(&[0.5, 0.51, 0.52, 0.5]));
    }

    #[test]
    fn test_cyclical_on_alternation() {
        let v = [0.1, 0.9, 0.1, 0.9, 0.1, 0.9, 0.1, 0.9];
        assert!(is_cyclical(&v));
    }

    #[test]
    fn test_regression_counts_steps() {
        assert!(is_regression(&[0.9, 0.8, 0.7, 0.75, 0.6]));
        assert!(!is_regression(&[0.9, 0.8, 0.85, 0.86, 0.6]));
    }

    #[test]
    fn test_breakthrough_jump() {
        assert!(is_breakthrough(&[0.5, 0.5, 0.5, 0.56, 0.6, 0.6]));
        assert!(!is_breakthrough(&[0.5, 0.5, 0.5, 0.5, 0.5, 0.5]));
    }

    #[test]
    fn test_each_pattern_wins_in_priority_order() {
        let cases: [(&[f64], GrowthPattern); 5] = [
            (&[0.1, 0.5, 0.7, 0.75, 0.78, 0.8], GrowthPattern::Logarithmic),
            (&[0.9, 0.1, 0.9, 0.1, 0.9, 0.1, 0.9, 0.1], GrowthPattern::Cyclical),
            (&[0.8, 0.2, 0.5, 0.5, 0.51, 0.5, 0.52], GrowthPattern::Plateau),
            (&[0.5, 0.2, 0.5, 0.5, 0.8, 0.8, 0.8], GrowthPattern::Breakthrough),
            (&[0.9, 0.5, 0.45, 0.15, 0.1, 0.05], GrowthPattern::Regression),
        ];
        for (values, expected) in cases {
            assert!(!is_linear(values), "{:?} should not be linear", values);
            assert!(!is_exponential(values), "{:?} should not be exponential", values);
            assert_eq!(classify(values), expected, "{:?}", values);
        }
    }

    #[test]
    fn test_acceleration_splits_at_midpoint() {
        // early 0.4 -> 0.6, late 0.8 -> 1.0
        let a = acceleration(&[0.4, 0.5, 0.6, 0.8, 0.9, 1.0]);
        assert!((a - (-0.25)).abs() < 1e-9);
        assert_eq!(acceleration(&[0.4, 0.5, 0.6]), 0.0);
    }

    #[test]
    fn test_direction_and_change_rate() {
        let v = [0.4, 0.45, 0.5, 0.55, 0.6, 0.65];
        assert_eq!(direction(&v), TrendDirection::Up);
        let t = compute_trend(Metric::OverallIntelligence, TimeWindow::Day, &v)
            .ready()
            .unwrap();
        assert!((t.change_rate - 0.625).abs() < 1e-9);
        assert_eq!(t.growth_pattern, GrowthPattern::Linear);
        assert_eq!(t.pattern_confidence, 0.8);
        assert!((t.predicted_next_value - 0.7).abs() < 1e-9);
        assert!((t.prediction_confidence - 0.64).abs() < 1e-9);
    }

    #[test]
    fn test_prediction_is_clamped() {
        assert_eq!(predict_next(&[0.9, 0.99], GrowthPattern::Exponential), 1.0);
        assert_eq!(predict_next(&[0.01], GrowthPattern::Regression), 0.0);
        assert_eq!(predict_next(&[], GrowthPattern::Linear), 0.5);
    }

    #[test]
    fn test_trend_needs_three_points() {
        let a = compute_trend(Metric::AdaptiveCapacity, TimeWindow::Hour, &[0.1, 0.2]);
        assert_eq!(
            a,
            Analysis::InsufficientData {
                required: 3,
                available: 2
            }
        );
    }
}
