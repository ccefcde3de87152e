//! Release reconciliation and asset upload
//!
//! Uploads run in a bounded pool and every one of them is awaited before the
//! stage reports, so a failed upload never leaves work running behind the
//! pipeline.

use crate::client::{ReleaseClient, ReleaseRequest, Repo, release_repo};
use crate::core::artifact::Artifact;
use crate::core::context::{Context, PublishedRelease};
use crate::core::error::PublishError;
use crate::core::retry::{RetryManager, RetryOptions};
use crate::core::template::Template;
use crate::pipeline::Publisher;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

pub struct ReleaseStage {
    client: Arc<dyn ReleaseClient>,
}

impl ReleaseStage {
    pub fn new(client: Arc<dyn ReleaseClient>) -> Self {
        Self { client }
    }

    fn request(ctx: &Context, repo: Repo) -> Result<ReleaseRequest, PublishError> {
        let release = &ctx.config.release;
        let template = Template::new(ctx);

        let target_commitish = match &release.target_commitish {
            Some(target) => template.apply(target)?,
            None => ctx.git.commit.clone(),
        };

        Ok(ReleaseRequest {
            repo,
            tag: ctx.git.current_tag.clone(),
            title: template.apply(&release.name_template)?,
            body: ctx.release_notes.clone(),
            draft: release.draft,
            prerelease: ctx.prerelease,
            target_commitish,
            notes_mode: release.release_notes_mode,
        })
    }

    /// Upload every uploadable artifact, waiting for all of them
    async fn upload_all(&self, ctx: &Context, repo: &Repo, release_id: &str) -> Result<(), PublishError> {
        let artifacts = ctx.artifacts.uploadable();
        if artifacts.is_empty() {
            debug!("no artifacts to upload");
            return Ok(());
        }

        let upload = &ctx.config.upload;
        let semaphore = Arc::new(Semaphore::new(upload.max_concurrency.max(1)));
        let retry = Arc::new(RetryManager::new(RetryOptions {
            max_attempts: upload.max_attempts.max(1),
            initial_delay: Duration::from_millis(upload.retry_delay_ms),
            ..RetryOptions::default()
        }));
        info!(count = artifacts.len(), concurrency = upload.max_concurrency, "uploading artifacts");

        let mut tasks = JoinSet::new();
        for artifact in artifacts {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let retry = Arc::clone(&retry);
            let repo = repo.clone();
            let release_id = release_id.to_string();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| PublishError::TaskFailed(e.to_string()))?;
                upload_one(&client, &retry, &repo, &release_id, &artifact).await
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => errors.push(err),
                Err(err) => errors.push(PublishError::TaskFailed(err.to_string())),
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(PublishError::Multiple(errors)),
        }
    }
}

/// Upload one artifact, reopening the file on every attempt
async fn upload_one(
    client: &Arc<dyn ReleaseClient>,
    retry: &RetryManager,
    repo: &Repo,
    release_id: &str,
    artifact: &Artifact,
) -> Result<(), PublishError> {
    retry
        .retry(move || async move {
            let file = File::open(&artifact.path).await?;
            client.upload(repo, release_id, artifact, file).await
        })
        .await?;

    info!(artifact = %artifact.name, "uploaded");
    Ok(())
}

#[async_trait]
impl Publisher for ReleaseStage {
    fn name(&self) -> &str {
        "release"
    }

    async fn publish(&self, ctx: &mut Context) -> Result<(), PublishError> {
        let repo = release_repo(ctx)?;
        let request = Self::request(ctx, repo.clone())?;
        let url_template = self.client.release_url_template(&repo)?;

        let release_id = self.client.create_or_update_release(&request).await?;
        ctx.release = Some(PublishedRelease {
            id: release_id.clone(),
            url_template,
        });

        if ctx.config.release.skip_upload {
            info!("artifact upload disabled");
        } else {
            self.upload_all(ctx, &repo, &release_id).await?;
        }

        if ctx.config.release.draft {
            info!(id = %release_id, "leaving release as draft");
        } else {
            self.client.publish_release(&repo, &release_id).await?;
        }
        Ok(())
    }
}
