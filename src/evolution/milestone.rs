//! Breakthrough, plateau and recovery detection against snapshot history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::snapshot::CognitiveSnapshot;
use crate::utils::math::{mean, min_max};

/// Guards the strict `>` comparisons against float noise at the exact threshold.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneType {
    Breakthrough,
    Plateau,
    Recovery,
}

impl MilestoneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneType::Breakthrough => "breakthrough",
            MilestoneType::Plateau => "plateau",
            MilestoneType::Recovery => "recovery",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionMilestone {
    pub milestone_id: String,
    pub timestamp: DateTime<Utc>,
    pub milestone_type: MilestoneType,
    pub description: String,
    pub significance_score: f64,
    pub trigger_conditions: Vec<String>,
    pub achievement_metrics: BTreeMap<String, f64>,
    pub impact_areas: Vec<String>,
    pub long_term_implications: Vec<String>,
    pub lessons_learned: Vec<String>,
    pub optimization_opportunities: Vec<String>,
}

impl EvolutionMilestone {
    fn new(kind: MilestoneType, at: &CognitiveSnapshot, description: String, significance: f64) -> Self {
        Self {
            milestone_id: format!("{}-{}", kind.as_str(), Uuid::new_v4()),
            timestamp: at.timestamp,
            milestone_type: kind,
            description,
            significance_score: significance.clamp(0.0, 1.0),
            trigger_conditions: Vec::new(),
            achievement_metrics: BTreeMap::new(),
            impact_areas: Vec::new(),
            long_term_implications: Vec::new(),
            lessons_learned: Vec::new(),
            optimization_opportunities: Vec::new(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Thresholds for the three milestone checks.
///
/// History lengths count the snapshot being checked.
#[derive(Debug, Clone)]
pub struct MilestoneDetector {
    pub breakthrough_depth: usize,
    pub breakthrough_margin: f64,
    pub plateau_depth: usize,
    pub plateau_range: f64,
    pub recovery_depth: usize,
    /// Most recent snapshots left out of the recovery low-point search
    pub recovery_exclude_recent: usize,
    pub recovery_margin: f64,
}

impl Default for MilestoneDetector {
    fn default() -> Self {
        Self {
            breakthrough_depth: 10,
            breakthrough_margin: 0.10,
            plateau_depth: 15,
            plateau_range: 0.05,
            recovery_depth: 20,
            recovery_exclude_recent: 5,
            recovery_margin: 0.08,
        }
    }
}

impl MilestoneDetector {
    /// Run every check against `history`, whose last entry is the new snapshot.
    pub fn detect(&self, history: &[CognitiveSnapshot]) -> Vec<EvolutionMilestone> {
        let Some(latest) = history.last() else {
            return Vec::new();
        };
        [
            self.check_breakthrough(history, latest),
            self.check_plateau(history, latest),
            self.check_recovery(history, latest),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn check_breakthrough(
        &self,
        history: &[CognitiveSnapshot],
        latest: &CognitiveSnapshot,
    ) -> Option<EvolutionMilestone> {
        let n = history.len();
        if n < self.breakthrough_depth {
            return None;
        }
        let baseline: Vec<f64> = history[n - self.breakthrough_depth..n - 1]
            .iter()
            .map(|s| s.overall_intelligence)
            .collect();
        let recent_avg = mean(&baseline);
        let gain = latest.overall_intelligence - recent_avg;
        if gain <= self.breakthrough_margin + EPSILON {
            return None;
        }

        let mut m = EvolutionMilestone::new(
            MilestoneType::Breakthrough,
            latest,
            format!(
                "Significant intelligence breakthrough: {:.3}",
                latest.overall_intelligence
            ),
            (2.0 * gain).min(1.0),
        );
        m.trigger_conditions = strings(&["intelligence_jump"]);
        m.achievement_metrics.insert("intelligence_gain".into(), gain);
        m.achievement_metrics.insert("baseline_average".into(), recent_avg);
        m.impact_areas = strings(&["overall_performance"]);
        m.long_term_implications = strings(&["accelerated_learning_potential"]);
        m.lessons_learned = strings(&["breakthrough_conditions_identified"]);
        m.optimization_opportunities = strings(&["leverage_breakthrough_momentum"]);
        Some(m)
    }

    fn check_plateau(
        &self,
        history: &[CognitiveSnapshot],
        latest: &CognitiveSnapshot,
    ) -> Option<EvolutionMilestone> {
        let n = history.len();
        if n < self.plateau_depth {
            return None;
        }
        let values: Vec<f64> = history[n - self.plateau_depth..]
            .iter()
            .map(|s| s.overall_intelligence)
            .collect();
        let (lo, hi) = min_max(&values)?;
        let spread = hi - lo;
        if spread >= self.plateau_range {
            return None;
        }

        let mut m = EvolutionMilestone::new(
            MilestoneType::Plateau,
            latest,
            format!(
                "Learning plateau detected: stability at {:.3}",
                latest.overall_intelligence
            ),
            0.6,
        );
        m.trigger_conditions = strings(&["minimal_change_period"]);
        m.achievement_metrics
            .insert("stability_duration".into(), self.plateau_depth as f64);
        m.achievement_metrics.insert("change_magnitude".into(), spread);
        m.impact_areas = strings(&["learning_efficiency"]);
        m.long_term_implications = strings(&["need_for_strategy_change"]);
        m.lessons_learned = strings(&["current_approach_limitations"]);
        m.optimization_opportunities = strings(&["explore_new_learning_strategies"]);
        Some(m)
    }

    fn check_recovery(
        &self,
        history: &[CognitiveSnapshot],
        latest: &CognitiveSnapshot,
    ) -> Option<EvolutionMilestone> {
        let n = history.len();
        if n < self.recovery_depth || self.recovery_exclude_recent >= self.recovery_depth {
            return None;
        }
        let window = &history[n - self.recovery_depth..];
        let earlier: Vec<f64> = window[..window.len() - self.recovery_exclude_recent]
            .iter()
            .map(|s| s.overall_intelligence)
            .collect();
        let (low, _) = min_max(&earlier)?;
        let gain = latest.overall_intelligence - low;
        if gain <= self.recovery_margin + EPSILON {
            return None;
        }

        let mut m = EvolutionMilestone::new(
            MilestoneType::Recovery,
            latest,
            format!(
                "Recovery from low point: {:.3} -> {:.3}",
                low, latest.overall_intelligence
            ),
            0.7,
        );
        m.trigger_conditions = strings(&["recovery_from_decline"]);
        m.achievement_metrics.insert("recovery_amount".into(), gain);
        m.impact_areas = strings(&["resilience", "adaptive_capacity"]);
        m.long_term_implications = strings(&["improved_recovery_mechanisms"]);
        m.lessons_learned = strings(&["recovery_strategies_effective"]);
        m.optimization_opportunities = strings(&["strengthen_resilience_further"]);
        Some(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::snapshot::{Evaluation, SnapshotContext};
    use chrono::Duration;

    fn history(values: &[f64]) -> Vec<CognitiveSnapshot> {
        let start = Utc::now() - Duration::minutes(values.len() as i64);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let eval = Evaluation {
                    overall_intelligence: *v,
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
    fn test_no_milestones_on_short_history() {
        let d = MilestoneDetector::default();
        assert!(d.detect(&history(&[0.1, 0.9])).is_empty());
        assert!(d.detect(&[]).is_empty());
    }

    #[test]
    fn test_breakthrough_needs_depth() {
        let d = MilestoneDetector::default();
        let mut v = vec![0.5; 8];
        v.push(0.9);
        assert!(d.detect(&history(&v)).is_empty());
        let mut v = vec![0.5; 9];
        v.push(0.9);
        let found = d.detect(&history(&v));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].milestone_type, MilestoneType::Breakthrough);
        assert!(found[0].milestone_id.starts_with("breakthrough-"));
    }

    #[test]
    fn test_recovery_ignores_recent_lows() {
        let d = MilestoneDetector::default();
        // low point sits in the excluded tail, so the earlier floor is 0.6
        let mut v = vec![0.6; 15];
        v.extend([0.2, 0.2, 0.2, 0.2, 0.65]);
        let found = d.detect(&history(&v));
        assert!(found.iter().all(|m| m.milestone_type != MilestoneType::Recovery));

        let mut v = vec![0.6; 14];
        v.push(0.4);
        v.extend([0.5, 0.5, 0.5, 0.5, 0.5]);
        let found = d.detect(&history(&v));
        let recovery = found
            .iter()
            .find(|m| m.milestone_type == MilestoneType::Recovery)
            .unwrap();
        assert_eq!(recovery.significance_score, 0.7);
        assert!((recovery.achievement_metrics["recovery_amount"] - 0.1).abs() < 1e-9);
    }
}
