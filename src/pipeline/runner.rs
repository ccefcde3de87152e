//! Pipeline runner
//!
//! Stages run strictly in order because later stages consume what earlier
//! ones published on the context (release id, download URL pattern).

use super::middleware::{Outcome, run_stage};
use super::{ErrorMemo, SkipPredicate, Stage};
use crate::core::context::Context;
use crate::core::error::PublishError;
use tracing::{info, warn};

/// Ordered list of stages with a run-level skip predicate
pub struct Pipeline {
    name: String,
    stages: Vec<Stage>,
    skip_if: Option<SkipPredicate>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            skip_if: None,
        }
    }

    /// Append a stage
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Skip the whole pipeline when the predicate holds
    pub fn skip_if(mut self, predicate: impl Fn(&Context) -> bool + Send + Sync + 'static) -> Self {
        self.skip_if = Some(Box::new(predicate));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Run every stage in order
    ///
    /// A failing stage aborts the run unless it is continuable and the
    /// context is not in fail-fast mode; continued failures are reported
    /// together once all stages ran.
    ///
    /// # Errors
    ///
    /// * `PublishError::Stage` - the first fatal failure, naming the stage
    /// * `PublishError::Multiple` - every continued failure, in stage order
    pub async fn run(&self, ctx: &mut Context) -> Result<(), PublishError> {
        if self.skip_if.as_ref().is_some_and(|skip| skip(ctx)) {
            info!(pipeline = %self.name, "skipped");
            return Ok(());
        }

        let mut memo = ErrorMemo::new();
        let mut published = 0usize;

        for stage in &self.stages {
            match run_stage(stage, ctx).await {
                Ok(Outcome::Published) => published += 1,
                Ok(Outcome::Skipped) => {}
                Err(err) if stage.is_continuable() && !ctx.fail_fast => {
                    warn!(stage = stage.name(), error = %err, "failed, continuing");
                    memo.memorize(stage.name(), err);
                }
                Err(err) => {
                    return Err(PublishError::Stage {
                        stage: stage.name().to_string(),
                        source: Box::new(err),
                    });
                }
            }
        }

        info!(
            pipeline = %self.name,
            published,
            failed = memo.len(),
            "finished"
        );
        memo.into_result()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stages)
            .finish()
    }
}
