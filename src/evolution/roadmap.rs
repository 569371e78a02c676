//! Improvement roadmaps from current metrics toward targets.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::snapshot::{CognitiveSnapshot, Metric};
use super::trend::{EvolutionTrend, GrowthPattern, TrendDirection};
use crate::error::{JudgmentError, Result};
use crate::utils::closest_match;

/// Planning horizon for a roadmap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeline {
    #[serde(rename = "2w")]
    TwoWeeks,
    #[serde(rename = "1m")]
    OneMonth,
    #[default]
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
}

impl Timeline {
    const LABELS: [&'static str; 5] = ["2w", "1m", "3m", "6m", "1y"];

    pub fn label(&self) -> &'static str {
        match self {
            Timeline::TwoWeeks => "2w",
            Timeline::OneMonth => "1m",
            Timeline::ThreeMonths => "3m",
            Timeline::SixMonths => "6m",
            Timeline::OneYear => "1y",
        }
    }

    pub fn days(&self) -> u32 {
        match self {
            Timeline::TwoWeeks => 14,
            Timeline::OneMonth => 30,
            Timeline::ThreeMonths => 90,
            Timeline::SixMonths => 180,
            Timeline::OneYear => 365,
        }
    }
}

impl fmt::Display for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeline {
    type Err = JudgmentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "2w" => Ok(Timeline::TwoWeeks),
            "1m" => Ok(Timeline::OneMonth),
            "3m" => Ok(Timeline::ThreeMonths),
            "6m" => Ok(Timeline::SixMonths),
            "1y" => Ok(Timeline::OneYear),
            _ => {
                let hint = closest_match(s, &Self::LABELS)
                    .map(|m| format!("; did you mean '{}'?", m))
                    .unwrap_or_default();
                Err(JudgmentError::InvalidParams {
                    message: format!(
                        "unknown timeline '{}', expected one of {}{}",
                        s,
                        Self::LABELS.join(", "),
                        hint
                    ),
                })
            }
        }
    }
}

/// Values for the four tracked metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricTargets {
    pub overall_intelligence: f64,
    pub cognitive_coherence: f64,
    pub adaptive_capacity: f64,
    pub meta_cognitive_level: f64,
}

impl MetricTargets {
    pub fn of(snapshot: &CognitiveSnapshot) -> Self {
        Self {
            overall_intelligence: snapshot.overall_intelligence,
            cognitive_coherence: snapshot.cognitive_coherence,
            adaptive_capacity: snapshot.adaptive_capacity,
            meta_cognitive_level: snapshot.meta_cognitive_level,
        }
    }

    /// Current values raised by fixed per-metric increments, capped at 1.0.
    pub fn default_for(snapshot: &CognitiveSnapshot) -> Self {
        Self {
            overall_intelligence: (snapshot.overall_intelligence + 0.15).min(1.0),
            cognitive_coherence: (snapshot.cognitive_coherence + 0.10).min(1.0),
            adaptive_capacity: (snapshot.adaptive_capacity + 0.12).min(1.0),
            meta_cognitive_level: (snapshot.meta_cognitive_level + 0.20).min(1.0),
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::OverallIntelligence => self.overall_intelligence,
            Metric::CognitiveCoherence => self.cognitive_coherence,
            Metric::AdaptiveCapacity => self.adaptive_capacity,
            Metric::MetaCognitiveLevel => self.meta_cognitive_level,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for metric in Metric::ALL {
            let v = self.get(metric);
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(JudgmentError::InvalidParams {
                    message: format!("target {} = {} is outside [0, 1]", metric, v),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    fn for_gap(gap: f64) -> Self {
        if gap >= 0.15 {
            Priority::High
        } else if gap >= 0.08 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentState {
    pub metrics: MetricTargets,
    pub strengths: Vec<Metric>,
    pub improvement_areas: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapPhase {
    pub name: String,
    pub duration_days: u32,
    pub focus: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStrategy {
    pub strategy: String,
    pub metric: Metric,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedMilestone {
    pub description: String,
    pub metric: Metric,
    pub target_value: f64,
    pub due_in_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub low: Vec<String>,
    pub medium: Vec<String>,
    pub high: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub time_investment: String,
    pub complexity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessMetric {
    pub metric: Metric,
    pub current: f64,
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roadmap {
    pub roadmap_id: String,
    pub created_at: DateTime<Utc>,
    pub timeline: Timeline,
    pub strategy: String,
    pub current_state: CurrentState,
    pub target_state: MetricTargets,
    pub gaps: BTreeMap<Metric, f64>,
    pub phases: Vec<RoadmapPhase>,
    pub strategic_priorities: Vec<Metric>,
    pub learning_strategies: Vec<LearningStrategy>,
    pub milestone_plan: Vec<PlannedMilestone>,
    pub risks: RiskAssessment,
    pub resources: ResourceRequirements,
    pub success_metrics: Vec<SuccessMetric>,
    pub adaptation_triggers: Vec<String>,
}

/// Turns the current state and targets into a plan.
pub trait RoadmapStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn plan(
        &self,
        current: &CognitiveSnapshot,
        targets: &MetricTargets,
        timeline: Timeline,
        trends: &[EvolutionTrend],
    ) -> Roadmap;
}

/// Orders work by the size of each metric's gap to its target.
#[derive(Debug, Clone, Default)]
pub struct GapDrivenStrategy;

impl GapDrivenStrategy {
    fn learning_strategy(metric: Metric) -> &'static str {
        match metric {
            Metric::OverallIntelligence => "deliberate_practice",
            Metric::CognitiveCoherence => "consistency_review",
            Metric::AdaptiveCapacity => "varied_context_exposure",
            Metric::MetaCognitiveLevel => "reflective_practice",
        }
    }

    fn phases(ranked: &[Metric], days: u32) -> Vec<RoadmapPhase> {
        let foundation = (days / 4).max(1);
        let consolidation = (days / 4).max(1);
        let growth = days.saturating_sub(foundation + consolidation).max(1);
        vec![
            RoadmapPhase {
                name: "foundation".into(),
                duration_days: foundation,
                focus: ranked.iter().take(1).copied().collect(),
            },
            RoadmapPhase {
                name: "growth".into(),
                duration_days: growth,
                focus: ranked.iter().take(2).copied().collect(),
            },
            RoadmapPhase {
                name: "consolidation".into(),
                duration_days: consolidation,
                focus: ranked.to_vec(),
            },
        ]
    }

    fn risks(gaps: &BTreeMap<Metric, f64>, trends: &[EvolutionTrend]) -> RiskAssessment {
        let mut risks = RiskAssessment::default();
        for (metric, gap) in gaps {
            // the widest window available for this metric
            let trend = trends
                .iter()
                .rev()
                .find(|t| t.metric_name == metric.as_str());
            let declining = trend.is_some_and(|t| {
                t.direction == TrendDirection::Down || t.growth_pattern == GrowthPattern::Regression
            });
            if declining {
                risks.high.push(format!("declining_{}", metric));
            } else if trend.is_some_and(|t| t.volatility > 0.2) {
                risks.medium.push(format!("unstable_{}", metric));
            } else if *gap >= 0.15 {
                risks.medium.push(format!("ambitious_target_{}", metric));
            } else {
                risks.low.push(format!("steady_{}", metric));
            }
        }
        risks
    }
}

impl RoadmapStrategy for GapDrivenStrategy {
    fn name(&self) -> &'static str {
        "gap_driven"
    }

    fn plan(
        &self,
        current: &CognitiveSnapshot,
        targets: &MetricTargets,
        timeline: Timeline,
        trends: &[EvolutionTrend],
    ) -> Roadmap {
        let now_values = MetricTargets::of(current);
        let gaps: BTreeMap<Metric, f64> = Metric::ALL
            .iter()
            .map(|m| (*m, (targets.get(*m) - now_values.get(*m)).max(0.0)))
            .collect();

        let mut ranked: Vec<Metric> = Metric::ALL
            .iter()
            .copied()
            .filter(|m| gaps[m] > 0.0)
            .collect();
        ranked.sort_by(|a, b| gaps[b].total_cmp(&gaps[a]));

        let days = timeline.days();
        let total_gap: f64 = gaps.values().sum();
        let (time_investment, complexity) = if total_gap > 0.4 {
            ("high", "high")
        } else if total_gap > 0.2 {
            ("moderate", "medium")
        } else {
            ("light", "low")
        };

        let mut triggers = vec![
            "plateau_detected".to_string(),
            "regression_detected".to_string(),
        ];
        if let Some(top) = ranked.first() {
            triggers.push(format!("behind_schedule_on_{}", top));
        }

        Roadmap {
            roadmap_id: format!("roadmap-{}", Uuid::new_v4()),
            created_at: Utc::now(),
            timeline,
            strategy: self.name().to_string(),
            current_state: CurrentState {
                metrics: now_values,
                strengths: Metric::ALL
                    .iter()
                    .copied()
                    .filter(|m| now_values.get(*m) > 0.7)
                    .collect(),
                improvement_areas: Metric::ALL
                    .iter()
                    .copied()
                    .filter(|m| now_values.get(*m) < 0.6)
                    .collect(),
            },
            target_state: *targets,
            phases: Self::phases(&ranked, days),
            learning_strategies: ranked
                .iter()
                .map(|m| LearningStrategy {
                    strategy: Self::learning_strategy(*m).to_string(),
                    metric: *m,
                    priority: Priority::for_gap(gaps[m]),
                })
                .collect(),
            milestone_plan: ranked
                .iter()
                .flat_map(|m| {
                    let now = now_values.get(*m);
                    [
                        PlannedMilestone {
                            description: format!("halfway to {} target", m),
                            metric: *m,
                            target_value: now + gaps[m] / 2.0,
                            due_in_days: days / 2,
                        },
                        PlannedMilestone {
                            description: format!("{} target reached", m),
                            metric: *m,
                            target_value: targets.get(*m),
                            due_in_days: days,
                        },
                    ]
                })
                .collect(),
            risks: Self::risks(&gaps, trends),
            resources: ResourceRequirements {
                time_investment: time_investment.to_string(),
                complexity: complexity.to_string(),
            },
            success_metrics: Metric::ALL
                .iter()
                .map(|m| SuccessMetric {
                    metric: *m,
                    current: now_values.get(*m),
                    target: targets.get(*m),
                })
                .collect(),
            adaptation_triggers: triggers,
            strategic_priorities: ranked,
            gaps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::snapshot::{Evaluation, SnapshotContext};

    fn snapshot(overall: f64, meta: f64) -> CognitiveSnapshot {
        let eval = Evaluation {
            overall_intelligence: overall,
            meta_cognitive_level: meta,
            ..Evaluation::default()
        };
        CognitiveSnapshot::new(Utc::now(), &eval, &SnapshotContext::default()).unwrap()
    }

    #[test]
    fn test_default_targets_are_capped() {
        let t = MetricTargets::default_for(&snapshot(0.9, 0.85));
        assert_eq!(t.overall_intelligence, 1.0);
        assert_eq!(t.meta_cognitive_level, 1.0);
        assert!((t.cognitive_coherence - 0.6).abs() < 1e-9);
        assert!((t.adaptive_capacity - 0.62).abs() < 1e-9);
    }

    #[test]
    fn test_priorities_follow_gap_size() {
        let current = snapshot(0.5, 0.5);
        let targets = MetricTargets::default_for(&current);
        let plan = GapDrivenStrategy.plan(&current, &targets, Timeline::ThreeMonths, &[]);
        assert_eq!(plan.strategic_priorities[0], Metric::MetaCognitiveLevel);
        assert_eq!(plan.strategic_priorities.len(), 4);
        let meta = plan
            .learning_strategies
            .iter()
            .find(|s| s.metric == Metric::MetaCognitiveLevel)
            .unwrap();
        assert_eq!(meta.priority, Priority::High);
        assert_eq!(meta.strategy, "reflective_practice");
        let days: u32 = plan.phases.iter().map(|p| p.duration_days).sum();
        assert_eq!(days, 90);
        assert_eq!(plan.milestone_plan.len(), 8);
    }

    #[test]
    fn test_timeline_parse() {
        assert_eq!("6M".parse::<Timeline>().unwrap(), Timeline::SixMonths);
        let err = "2ww".parse::<Timeline>().unwrap_err().to_string();
        assert!(err.contains("did you mean '2w'"), "{}", err);
    }
}
