//! PIR: prioritize, implement, review.

use serde_json::{Map, json};

use super::stage::{Stage, top_keywords};
use super::types::{PipelineContext, StageOutcome};
use crate::error::Result;

const URGENT_MARKERS: &[&str] = &["now", "urgent", "today", "asap", "immediately", "soon"];

pub struct Pir;

impl Stage for Pir {
    fn name(&self) -> &'static str {
        "PIR"
    }

    fn execute(&self, ctx: &PipelineContext) -> Result<StageOutcome> {
        let lower = ctx.input_text.to_lowercase();
        let urgent = URGENT_MARKERS.iter().any(|m| lower.contains(m));
        let quadrant = if urgent {
            "urgent+important"
        } else {
            "important+not-urgent"
        };
        let priorities = top_keywords(&ctx.input_text, 4);

        let mut output = Map::new();
        output.insert(
            "prioritization".into(),
            json!({
                "quadrant": quadrant,
                "ranking_criteria": ["impact", "feasibility", "resource efficiency"],
                "priorities": priorities,
            }),
        );
        output.insert(
            "implementation".into(),
            json!({
                "methodology": "systematic and incremental",
                "milestone_tracking": "interim checks and adjustment",
            }),
        );
        output.insert(
            "review".into(),
            json!({
                "criteria": ["effectiveness", "efficiency", "quality", "satisfaction"],
            }),
        );

        Ok(StageOutcome::success(
            output,
            vec![
                format!("Classified as {}", quadrant),
                "Laid out a systematic implementation".to_string(),
                "Defined review criteria".to_string(),
            ],
            vec!["Reflect metacognitively in META".to_string()],
            0.89,
        ))
    }
}
