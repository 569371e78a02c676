//! DIR: deliberate, investigate, resolve.

use serde_json::{Map, json};

use super::stage::{Stage, split_sentences};
use super::types::{PipelineContext, StageOutcome};
use crate::error::Result;

const CONSTRAINT_MARKERS: &[&str] = &["must", "cannot", "can't", "only", "deadline", "budget"];

pub struct Dir;

impl Stage for Dir {
    fn name(&self) -> &'static str {
        "DIR"
    }

    fn execute(&self, ctx: &PipelineContext) -> Result<StageOutcome> {
        let lower = ctx.input_text.to_lowercase();
        let constraints: Vec<String> = split_sentences(&ctx.input_text)
            .into_iter()
            .filter(|s| {
                let s = s.to_lowercase();
                CONSTRAINT_MARKERS.iter().any(|m| s.contains(m))
            })
            .collect();
        let has_tradeoff = lower.contains(" or ") || lower.contains("whether");

        let mut output = Map::new();
        output.insert(
            "deliberation".into(),
            json!({
                "factors": ["pros and cons", "risks", "opportunities", "constraints"],
                "criteria": "objective and reasoned",
                "tradeoff_detected": has_tradeoff,
            }),
        );
        output.insert(
            "precise_investigation".into(),
            json!({
                "constraints": constraints,
                "focus": ["details", "verified data", "concrete conditions"],
            }),
        );
        output.insert(
            "resolution".into(),
            json!({
                "decisive_factors": ["key decision factor", "execution conditions", "success criteria"],
                "commitment": "firm",
            }),
        );

        Ok(StageOutcome::success(
            output,
            vec![
                "Deliberated carefully across factors".to_string(),
                format!("Identified {} explicit constraint(s)", constraints.len()),
                "Prepared a decisive resolution".to_string(),
            ],
            vec!["Prioritize execution in PIR".to_string()],
            0.87,
        ))
    }
}
