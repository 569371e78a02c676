//! JUDGE: justice, understanding, decision, guidance, execution.

use serde_json::{Map, json};

use super::stage::{Stage, UpstreamReport, upstream_str};
use super::types::{PipelineContext, StageOutcome};
use crate::error::Result;

pub struct Judge;

impl Stage for Judge {
    fn name(&self) -> &'static str {
        "JUDGE"
    }

    fn execute(&self, ctx: &PipelineContext) -> Result<StageOutcome> {
        let upstream = UpstreamReport::from_context(ctx);
        let core_issue =
            upstream_str(ctx, "FIST", &["focus", "core_issue"]).unwrap_or(ctx.input_text.as_str());
        let approach = upstream_str(ctx, "FIST", &["strategy", "recommended"])
            .unwrap_or("step-by-step approach");

        let decision = format!("Address '{}' with a {}", core_issue, approach);

        let mut output = Map::new();
        output.insert(
            "justice".into(),
            json!({ "fairness": ["objectivity", "equity", "transparency", "consistency"] }),
        );
        output.insert(
            "decision".into(),
            json!({
                "rationale": decision,
                "basis": upstream.observed,
            }),
        );
        output.insert(
            "guidance".into(),
            json!({ "steps": ["start with the smallest reversible action", "review at checkpoint", "adjust and continue"] }),
        );
        output.insert(
            "execution".into(),
            json!({ "monitoring": "track progress against success criteria" }),
        );

        let outcome = StageOutcome::success(
            output,
            vec![
                "Judged fairly with full context".to_string(),
                decision,
                "Completed the eight-stage integration".to_string(),
            ],
            vec!["Cycle complete; prepare the next cycle".to_string()],
            0.97,
        );
        Ok(upstream.apply(outcome))
    }
}
