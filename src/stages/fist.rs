//! FIST: focus, investigate, strategize, transform.

use serde_json::{Map, json};

use super::stage::{Stage, count_questions, split_sentences, top_keywords};
use super::types::{PipelineContext, StageOutcome};
use crate::error::Result;

pub struct Fist;

impl Stage for Fist {
    fn name(&self) -> &'static str {
        "FIST"
    }

    fn execute(&self, ctx: &PipelineContext) -> Result<StageOutcome> {
        let sents = split_sentences(&ctx.input_text);
        let kws = top_keywords(&ctx.input_text, 5);
        let core_issue = sents
            .iter()
            .find(|s| s.ends_with('?'))
            .or_else(|| sents.first())
            .cloned()
            .unwrap_or_default();

        let mut output = Map::new();
        output.insert(
            "focus".into(),
            json!({
                "core_issue": core_issue,
                "priority_factors": ["urgency", "importance", "impact"],
                "key_signals": kws,
            }),
        );
        output.insert(
            "investigation".into(),
            json!({
                "areas": ["root causes", "context", "related factors"],
                "sentence_count": sents.len(),
                "question_count": count_questions(&ctx.input_text),
            }),
        );
        output.insert(
            "strategy".into(),
            json!({
                "options": ["short-term response", "mid-term plan", "long-term direction"],
                "recommended": "balanced multi-step approach",
            }),
        );
        output.insert(
            "transformation".into(),
            json!({
                "action_items": ["immediate step", "checkpoint", "end goal"],
                "success_metrics": ["progress", "quality", "satisfaction"],
            }),
        );

        Ok(StageOutcome::success(
            output,
            vec![
                "Structured the problem with the FIST method".to_string(),
                format!("Focused on: {}", kws.join(", ")),
                "Derived an actionable solution path".to_string(),
            ],
            vec!["Integrate reflectively in RISE".to_string()],
            0.85,
        ))
    }
}
