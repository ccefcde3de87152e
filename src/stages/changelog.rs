//! Release notes from the commits since the previous tag

use crate::client::{ChangelogItem, ReleaseClient, release_repo};
use crate::core::context::Context;
use crate::core::error::PublishError;
use crate::pipeline::Publisher;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct ChangelogStage {
    client: Arc<dyn ReleaseClient>,
}

impl ChangelogStage {
    pub fn new(client: Arc<dyn ReleaseClient>) -> Self {
        Self { client }
    }
}

/// Render commits as a markdown list, keeping their order
pub fn format_changelog(items: &[ChangelogItem]) -> String {
    let mut notes = String::from("## Changelog\n\n");
    for item in items {
        let short: String = item.sha.chars().take(7).collect();
        notes.push_str(&format!("* {} {}\n", short, item.message));
    }
    notes
}

#[async_trait]
impl Publisher for ChangelogStage {
    fn name(&self) -> &str {
        "changelog"
    }

    async fn publish(&self, ctx: &mut Context) -> Result<(), PublishError> {
        if !ctx.release_notes.trim().is_empty() {
            return Err(PublishError::Skipped("release notes were supplied".to_string()));
        }
        let previous = ctx
            .git
            .previous_tag
            .clone()
            .ok_or_else(|| PublishError::Skipped("no previous tag".to_string()))?;

        let repo = release_repo(ctx)?;
        let items = self
            .client
            .changelog(&repo, &previous, &ctx.git.current_tag)
            .await?;

        info!(commits = items.len(), from = %previous, to = %ctx.git.current_tag, "changelog generated");
        ctx.release_notes = format_changelog(&items);
        Ok(())
    }
}
