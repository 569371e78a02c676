//! RISE: reflect, integrate, synthesize, evolve.

use serde_json::{Map, json};

use super::stage::{Stage, split_sentences, top_keywords};
use super::types::{PipelineContext, StageOutcome};
use crate::error::Result;

pub struct Rise;

impl Stage for Rise {
    fn name(&self) -> &'static str {
        "RISE"
    }

    fn execute(&self, ctx: &PipelineContext) -> Result<StageOutcome> {
        let sents = split_sentences(&ctx.input_text);
        let kws = top_keywords(&ctx.input_text, 3);
        let last = sents.last().cloned().unwrap_or_default();

        let mut output = Map::new();
        output.insert(
            "reflection".into(),
            json!({
                "framing": last,
                "gaps": ["missed perspectives", "areas needing support"],
            }),
        );
        output.insert(
            "integration".into(),
            json!({
                "perspectives": ["logical", "emotional", "intuitive", "experiential"],
                "method": "balanced multi-dimensional view",
            }),
        );
        output.insert(
            "synthesis".into(),
            json!({
                "key_patterns": kws,
                "quality": "integrated understanding",
            }),
        );
        output.insert(
            "evolution".into(),
            json!({
                "direction": "more adaptive approach",
                "adaptive_elements": ["flexibility", "learning", "improvement"],
            }),
        );

        Ok(StageOutcome::success(
            output,
            vec![
                "Reflected on the framing of the request".to_string(),
                "Integrated multiple perspectives".to_string(),
                "Set an evolving direction".to_string(),
            ],
            vec!["Move to concrete deliberation in DIR".to_string()],
            0.88,
        ))
    }
}
