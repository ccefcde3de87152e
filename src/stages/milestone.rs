//! Close the milestone named after the release

use crate::client::{ReleaseClient, release_repo};
use crate::core::context::Context;
use crate::core::error::PublishError;
use crate::core::template::Template;
use crate::pipeline::Publisher;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub struct MilestoneStage {
    client: Arc<dyn ReleaseClient>,
}

impl MilestoneStage {
    pub fn new(client: Arc<dyn ReleaseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Publisher for MilestoneStage {
    fn name(&self) -> &str {
        "milestone"
    }

    async fn publish(&self, ctx: &mut Context) -> Result<(), PublishError> {
        let template = Template::new(ctx);

        for config in ctx.config.milestones.iter().filter(|m| m.close) {
            let repo = match &config.repo {
                Some(repo) => repo.to_repo(),
                None => release_repo(ctx)?,
            };
            let title = template.apply(&config.name_template)?;

            match self.client.close_milestone(&repo, &title).await {
                Ok(()) => info!(milestone = %title, repo = %repo, "milestone closed"),
                Err(err @ PublishError::NoMilestoneFound { .. }) if !config.fail_on_error => {
                    warn!(milestone = %title, repo = %repo, error = %err, "ignoring missing milestone");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}
