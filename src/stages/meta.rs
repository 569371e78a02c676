//! META: metacognition, evaluation, transcendence, adaptation.

use serde_json::{Map, json};

use super::stage::{Stage, UpstreamReport, upstream_str};
use super::types::{PipelineContext, StageOutcome};
use crate::error::Result;

pub struct Meta;

impl Stage for Meta {
    fn name(&self) -> &'static str {
        "META"
    }

    fn execute(&self, ctx: &PipelineContext) -> Result<StageOutcome> {
        let upstream = UpstreamReport::from_context(ctx);
        let core_issue = upstream_str(ctx, "FIST", &["focus", "core_issue"])
            .unwrap_or("the stated problem");
        let quadrant = upstream_str(ctx, "PIR", &["prioritization", "quadrant"]).unwrap_or("unranked");
        let healthy = upstream.observed.len() - upstream.failed.len();

        let mut output = Map::new();
        output.insert(
            "metacognition".into(),
            json!({
                "self_awareness": format!("Reasoning so far centers on '{}'", core_issue),
                "healthy_upstream": healthy,
            }),
        );
        output.insert(
            "evaluation".into(),
            json!({
                "dimensions": ["logic", "creativity", "practicality", "ethics"],
                "priority_quadrant": quadrant,
            }),
        );
        output.insert(
            "transcendence".into(),
            json!({ "perspective": "wider context beyond the single problem" }),
        );
        output.insert(
            "adaptation".into(),
            json!({ "direction": "continuous learning under changing conditions" }),
        );

        let outcome = StageOutcome::success(
            output,
            vec![
                "Examined the reasoning process itself".to_string(),
                format!("{} upstream perspective(s) available", healthy),
                "Set an adaptive direction".to_string(),
            ],
            vec!["Shape a natural flow in FLOW".to_string()],
            0.92,
        );
        Ok(upstream.apply(outcome))
    }
}
