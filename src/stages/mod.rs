//! The eight judgment stages and the registry that orders them.
//! Stage bodies are deterministic heuristics over the input text.

pub mod dir;
pub mod fist;
pub mod flow;
pub mod judge;
pub mod meta;
pub mod pir;
pub mod quantum;
pub mod rise;
pub mod stage;
pub mod types;

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{JudgmentError, Result};
pub use stage::Stage;
pub use types::{PipelineContext, StageKind, StageOutcome, StageOutput, StageResult, StageStatus};

type StageTable = (Vec<Arc<dyn Stage>>, Vec<Arc<dyn Stage>>);

static BUILTIN: Lazy<StageTable> = Lazy::new(|| {
    (
        vec![
            Arc::new(fist::Fist),
            Arc::new(rise::Rise),
            Arc::new(dir::Dir),
            Arc::new(pir::Pir),
        ],
        vec![
            Arc::new(meta::Meta),
            Arc::new(flow::Flow),
            Arc::new(quantum::Quantum),
            Arc::new(judge::Judge),
        ],
    )
});

/// Number of stages in each phase.
pub const PHASE_WIDTH: usize = 4;

/// Fixed ordering of the eight stages: four independent, then four dependent.
#[derive(Clone)]
pub struct StageRegistry {
    independent: Vec<Arc<dyn Stage>>,
    dependent: Vec<Arc<dyn Stage>>,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("order", &self.execution_order())
            .finish()
    }
}

impl StageRegistry {
    /// FIST, RISE, DIR, PIR then META, FLOW, QUANTUM, JUDGE.
    pub fn standard() -> Self {
        let (independent, dependent) = BUILTIN.clone();
        Self {
            independent,
            dependent,
        }
    }

    pub fn new(independent: Vec<Arc<dyn Stage>>, dependent: Vec<Arc<dyn Stage>>) -> Result<Self> {
        if independent.len() != PHASE_WIDTH || dependent.len() != PHASE_WIDTH {
            return Err(JudgmentError::InvalidParams {
                message: format!(
                    "registry needs {} independent and {} dependent stages (got {} and {})",
                    PHASE_WIDTH,
                    PHASE_WIDTH,
                    independent.len(),
                    dependent.len()
                ),
            });
        }
        let mut seen = HashSet::new();
        for stage in independent.iter().chain(dependent.iter()) {
            if !seen.insert(stage.name()) {
                return Err(JudgmentError::InvalidParams {
                    message: format!("duplicate stage name '{}'", stage.name()),
                });
            }
        }
        Ok(Self {
            independent,
            dependent,
        })
    }

    /// Swap the registered stage that shares `stage`'s name, keeping its slot.
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Result<Self> {
        let name = stage.name();
        let slot = self
            .independent
            .iter_mut()
            .chain(self.dependent.iter_mut())
            .find(|s| s.name() == name)
            .ok_or_else(|| JudgmentError::InvalidParams {
                message: format!("no registered stage named '{}'", name),
            })?;
        *slot = stage;
        Ok(self)
    }

    pub fn independent(&self) -> &[Arc<dyn Stage>] {
        &self.independent
    }

    pub fn dependent(&self) -> &[Arc<dyn Stage>] {
        &self.dependent
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.independent
            .iter()
            .chain(self.dependent.iter())
            .find(|s| s.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn kind_of(&self, name: &str) -> Option<StageKind> {
        if self.independent.iter().any(|s| s.name() == name) {
            Some(StageKind::Independent)
        } else if self.dependent.iter().any(|s| s.name() == name) {
            Some(StageKind::Dependent)
        } else {
            None
        }
    }

    pub fn execution_order(&self) -> Vec<&'static str> {
        self.independent
            .iter()
            .chain(self.dependent.iter())
            .map(|s| s.name())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    struct Renamed(&'static str);

    impl Stage for Renamed {
        fn name(&self) -> &'static str {
            self.0
        }
        fn execute(&self, _ctx: &PipelineContext) -> Result<StageOutcome> {
            Ok(StageOutcome::success(Map::new(), vec![], vec![], 0.5))
        }
    }

    #[test]
    fn test_standard_order() {
        let reg = StageRegistry::standard();
        assert_eq!(
            reg.execution_order(),
            vec!["FIST", "RISE", "DIR", "PIR", "META", "FLOW", "QUANTUM", "JUDGE"]
        );
        assert_eq!(reg.kind_of("DIR"), Some(StageKind::Independent));
        assert_eq!(reg.kind_of("JUDGE"), Some(StageKind::Dependent));
        assert_eq!(reg.kind_of("NOPE"), None);
    }

    #[test]
    fn test_with_stage_replaces_in_place() {
        let reg = StageRegistry::standard()
            .with_stage(Arc::new(Renamed("RISE")))
            .unwrap();
        assert_eq!(reg.execution_order()[1], "RISE");
        let ctx = PipelineContext::new("x", Map::new());
        let out = reg.get("rise").unwrap().execute(&ctx).unwrap();
        assert_eq!(out.confidence, 0.5);
        assert!(StageRegistry::standard()
            .with_stage(Arc::new(Renamed("OTHER")))
            .is_err());
    }

    #[test]
    fn test_new_rejects_duplicates_and_wrong_width() {
        let four = || -> Vec<Arc<dyn Stage>> {
            vec![
                Arc::new(Renamed("A")),
                Arc::new(Renamed("B")),
                Arc::new(Renamed("C")),
                Arc::new(Renamed("D")),
            ]
        };
        assert!(StageRegistry::new(four(), four()).is_err());
        assert!(StageRegistry::new(four(), vec![]).is_err());
    }

    #[test]
    fn test_builtin_stages_report_documented_confidence() {
        let reg = StageRegistry::standard();
        let ctx = PipelineContext::new("Should I change teams? The deadline is tight.", Map::new());
        for (name, expected) in [("FIST", 0.85), ("RISE", 0.88), ("DIR", 0.87), ("PIR", 0.89)] {
            let out = reg.get(name).unwrap().execute(&ctx).unwrap();
            assert_eq!(out.confidence, expected, "{}", name);
            assert_eq!(out.insights.len(), 3);
            assert_eq!(out.recommendations.len(), 1);
        }
    }
}
