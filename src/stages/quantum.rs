//! QUANTUM: quality, understanding, analysis, networks, transformation, unity, meaning.

use serde_json::{Map, json};

use super::stage::{Stage, UpstreamReport};
use super::types::{PipelineContext, StageOutcome};
use crate::error::Result;

pub struct Quantum;

impl Stage for Quantum {
    fn name(&self) -> &'static str {
        "QUANTUM"
    }

    fn execute(&self, ctx: &PipelineContext) -> Result<StageOutcome> {
        let upstream = UpstreamReport::from_context(ctx);
        // connections between every pair of healthy upstream stages
        let healthy: Vec<&String> = upstream
            .observed
            .iter()
            .filter(|s| !upstream.failed.contains(s))
            .collect();
        let links = healthy.len() * healthy.len().saturating_sub(1) / 2;

        let mut output = Map::new();
        output.insert(
            "quality".into(),
            json!({ "dimensions": ["accuracy", "completeness", "elegance", "effectiveness"] }),
        );
        output.insert(
            "analysis".into(),
            json!({ "dimensions": ["time", "space", "cause", "relation", "meaning", "value"] }),
        );
        output.insert(
            "networks".into(),
            json!({ "stages": healthy, "connections": links }),
        );
        output.insert(
            "transformation".into(),
            json!({ "shift": "qualitative leap from combined perspectives" }),
        );
        output.insert(
            "meaning".into(),
            json!({ "purpose": "clear direction and value" }),
        );

        let outcome = StageOutcome::success(
            output,
            vec![
                "Analyzed the problem across dimensions".to_string(),
                format!("Linked {} perspective pair(s)", links),
                "Derived meaning from the combined view".to_string(),
            ],
            vec!["Integrate the final judgment in JUDGE".to_string()],
            0.95,
        );
        Ok(upstream.apply(outcome))
    }
}
