//! Runs a single stage body off the async runtime with a deadline.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinError;

use crate::stages::{PipelineContext, Stage, StageResult};

/// Limits applied to every stage invocation
#[derive(Debug, Clone, Copy)]
pub(crate) struct StageLimits {
    pub timeout_ms: u64,
    pub failure_confidence: f64,
}

/// Execute one stage on the blocking pool.
///
/// Never returns an error: errors, panics and timeouts all become a failed
/// `StageResult` carrying the failure text as its only insight.
///
/// A pool permit, when given, is owned by the blocking body and released only
/// when that body returns, even if the deadline has already passed.
pub(crate) async fn invoke_stage(
    stage: Arc<dyn Stage>,
    mut ctx: PipelineContext,
    limits: StageLimits,
    permit: Option<OwnedSemaphorePermit>,
) -> StageResult {
    let name = stage.name();
    ctx.current_stage = name.to_string();
    let start = Instant::now();

    let handle = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        stage.execute(&ctx)
    });
    let joined = tokio::time::timeout(Duration::from_millis(limits.timeout_ms), handle).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let failure = match joined {
        Ok(Ok(Ok(outcome))) => match StageResult::from_outcome(name, outcome, elapsed_ms) {
            Ok(result) => {
                tracing::debug!(
                    stage = name,
                    confidence = result.confidence,
                    duration_ms = elapsed_ms,
                    "stage completed"
                );
                return result;
            }
            Err(e) => e.to_string(),
        },
        Ok(Ok(Err(e))) => e.to_string(),
        Ok(Err(join_err)) => describe_join_error(join_err),
        // the blocking thread is detached and finishes on its own
        Err(_) => format!("stage {} timed out after {}ms", name, limits.timeout_ms),
    };

    tracing::warn!(stage = name, error = %failure, "stage failed");
    StageResult::failed(name, &failure, limits.failure_confidence, elapsed_ms)
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_panic() {
        format!("stage panicked: {}", panic_message(err.into_panic()))
    } else {
        "stage task was cancelled".to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
