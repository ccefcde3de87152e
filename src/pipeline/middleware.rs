//! Skip, logging and error-classification wrappers around a stage

use super::Stage;
use crate::core::context::Context;
use crate::core::error::PublishError;
use tracing::{Instrument, debug, info, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Published,
    Skipped,
}

/// Run one stage through every middleware
pub(crate) async fn run_stage(stage: &Stage, ctx: &mut Context) -> Result<Outcome, PublishError> {
    if stage.should_skip(ctx) {
        info!(stage = stage.name(), "skipped");
        return Ok(Outcome::Skipped);
    }

    let span = info_span!("stage", stage = stage.name());
    async {
        info!("publishing");
        handle_error(stage.publisher().publish(ctx).await)
    }
    .instrument(span)
    .await
}

/// A stage reporting it had nothing to do is not a failure
fn handle_error(result: Result<(), PublishError>) -> Result<Outcome, PublishError> {
    match result {
        Ok(()) => Ok(Outcome::Published),
        Err(PublishError::Skipped(reason)) => {
            info!(reason = %reason, "skipped");
            Ok(Outcome::Skipped)
        }
        Err(err) => {
            debug!(error = %err, "stage failed");
            Err(err)
        }
    }
}
