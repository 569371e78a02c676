//! Stage trait and common helpers.

use serde_json::{Value, json};
use unicode_normalization::UnicodeNormalization;

use super::types::{PipelineContext, StageOutcome, StageStatus};
use crate::error::Result;

/// One unit of the judgment pipeline.
///
/// Bodies are synchronous and CPU-bound; concurrency comes from the scheduler.
/// Independent stages must not read other stages' output.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(&self, ctx: &PipelineContext) -> Result<StageOutcome>;
}

pub(crate) fn split_sentences(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    for ch in s.chars() {
        cur.push(ch);
        if (ch == '.' || ch == '!' || ch == '?') && !cur.trim().is_empty() {
            out.push(cur.trim().to_string());
            cur.clear();
        }
    }
    if !cur.trim().is_empty() {
        out.push(cur.trim().to_string());
    }
    if out.is_empty() && !s.trim().is_empty() {
        out.push(s.trim().to_string());
    }
    out
}

pub(crate) fn top_keywords(s: &str, n: usize) -> Vec<String> {
    use std::collections::HashMap;
    let normalized: String = s.nfkc().collect();
    let mut freq: HashMap<String, usize> = HashMap::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for (idx, w) in normalized
        .split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        if [
            "the", "and", "or", "a", "an", "to", "of", "in", "on", "for", "with", "is", "are",
            "be", "this", "that", "i", "it", "do", "we", "my",
        ]
        .contains(&w.as_str())
        {
            continue;
        }
        first_seen.entry(w.clone()).or_insert(idx);
        *freq.entry(w).or_insert(0) += 1;
    }
    let mut v: Vec<(String, usize)> = freq.into_iter().collect();
    // ties broken by first appearance so output is deterministic
    v.sort_by(|a, b| b.1.cmp(&a.1).then(first_seen[&a.0].cmp(&first_seen[&b.0])));
    v.into_iter().take(n).map(|(k, _)| k).collect()
}

pub(crate) fn count_questions(s: &str) -> usize {
    s.chars().filter(|c| *c == '?').count()
}

/// Which upstream stages a dependent stage saw, and which of them failed.
#[derive(Debug, Clone, Default)]
pub(crate) struct UpstreamReport {
    pub observed: Vec<String>,
    pub failed: Vec<String>,
}

impl UpstreamReport {
    pub fn from_context(ctx: &PipelineContext) -> Self {
        let mut report = Self::default();
        for name in ctx.previous_results.keys() {
            report.observed.push(name.clone());
            if ctx.stage_failed(name) {
                report.failed.push(name.clone());
            }
        }
        report
    }

    pub fn to_json(&self) -> Value {
        json!({
            "observed_stages": self.observed,
            "failed_stages": self.failed,
        })
    }

    /// Dependent stages degrade by 0.05 per failed upstream stage, floor 0.1.
    pub fn apply(&self, mut outcome: StageOutcome) -> StageOutcome {
        if !self.failed.is_empty() {
            outcome.status = StageStatus::Partial;
            outcome.confidence = (outcome.confidence - 0.05 * self.failed.len() as f64).max(0.1);
            outcome.insights.push(format!(
                "Upstream gaps: {}",
                self.failed.join(", ")
            ));
        }
        outcome
            .output
            .insert("upstream".into(), self.to_json());
        outcome
    }
}

/// Walk a key path into an upstream stage output and return the string there.
pub(crate) fn upstream_str<'a>(
    ctx: &'a PipelineContext,
    stage: &str,
    path: &[&str],
) -> Option<&'a str> {
    let mut value = ctx.previous_results.get(stage)?;
    for key in path {
        value = value.get(*key)?;
    }
    value.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences_keeps_trailing_fragment() {
        let s = split_sentences("First point. Second? trailing");
        assert_eq!(s, vec!["First point.", "Second?", "trailing"]);
    }

    #[test]
    fn test_top_keywords_orders_by_frequency_then_position() {
        let k = top_keywords("career move career risk move career", 3);
        assert_eq!(k, vec!["career", "move", "risk"]);
    }

    #[test]
    fn test_top_keywords_normalizes_fullwidth() {
        let k = top_keywords("ＡＢＣ abc", 1);
        assert_eq!(k, vec!["abc"]);
    }

    #[test]
    fn test_upstream_error_key_on_success_is_not_a_failure() {
        use crate::stages::StageResult;
        use serde_json::Map;

        let mut output = Map::new();
        output.insert("error".into(), json!("estimation error is low"));
        let fine = StageResult::from_outcome(
            "RISE",
            StageOutcome::success(output, vec![], vec![], 0.8),
            1.0,
        )
        .unwrap();
        let broken = StageResult::failed("PIR", "boom", 0.1, 0.0);
        let mut ctx = PipelineContext::new("x", Map::new());
        ctx.merge([&fine, &broken]);

        let report = UpstreamReport::from_context(&ctx);
        assert_eq!(report.observed, vec!["RISE", "PIR"]);
        assert_eq!(report.failed, vec!["PIR"]);

        let degraded = report.apply(StageOutcome::success(Map::new(), vec![], vec![], 0.9));
        assert_eq!(degraded.status, StageStatus::Partial);
        assert!((degraded.confidence - 0.85).abs() < 1e-9);
    }
}
