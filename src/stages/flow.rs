//! FLOW: fluid, logical, organic, wise.

use serde_json::{Map, json};

use super::stage::{Stage, UpstreamReport, upstream_str};
use super::types::{PipelineContext, StageOutcome};
use crate::error::Result;

pub struct Flow;

impl Stage for Flow {
    fn name(&self) -> &'static str {
        "FLOW"
    }

    fn execute(&self, ctx: &PipelineContext) -> Result<StageOutcome> {
        let upstream = UpstreamReport::from_context(ctx);
        let direction = upstream_str(ctx, "META", &["adaptation", "direction"])
            .unwrap_or("steady progress");

        let mut output = Map::new();
        output.insert(
            "fluidity".into(),
            json!({ "flexibility": "respond to the situation as it shifts" }),
        );
        output.insert(
            "logic".into(),
            json!({
                "reasoning_chain": ctx.previous_results.keys().collect::<Vec<_>>(),
                "integrity": "consistent",
            }),
        );
        output.insert(
            "organicity".into(),
            json!({ "growth": format!("grow along: {}", direction) }),
        );
        output.insert(
            "wisdom".into(),
            json!({ "balanced_judgment": "harmonious resolution" }),
        );

        let outcome = StageOutcome::success(
            output,
            vec![
                "Balanced fluidity with logical structure".to_string(),
                format!("Chained {} prior stage(s)", ctx.previous_results.len()),
                "Kept growth sustainable".to_string(),
            ],
            vec!["Leap to synthesis in QUANTUM".to_string()],
            0.91,
        );
        Ok(upstream.apply(outcome))
    }
}
