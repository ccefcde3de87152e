//! Package-manager manifests committed to a repository
//!
//! Each manifest lists the archives of the release with their download URL
//! and checksum. URLs come from the release URL pattern, so the manifest can
//! be written even when the release stage was skipped.

use crate::client::{CommitAuthor, ReleaseClient, release_repo};
use crate::core::artifact::ArtifactKind;
use crate::core::config::ManifestConfig;
use crate::core::context::Context;
use crate::core::error::PublishError;
use crate::core::template::Template;
use crate::pipeline::Publisher;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Artifact kinds listed in manifests
const MANIFEST_KINDS: &[ArtifactKind] = &[ArtifactKind::Archive, ArtifactKind::Binary];

#[derive(Debug, Serialize, PartialEq)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub artifacts: Vec<ManifestArtifact>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ManifestArtifact {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

pub struct ManifestStage {
    client: Arc<dyn ReleaseClient>,
}

impl ManifestStage {
    pub fn new(client: Arc<dyn ReleaseClient>) -> Self {
        Self { client }
    }

    fn url_template(&self, ctx: &Context) -> Result<String, PublishError> {
        match &ctx.release {
            Some(release) => Ok(release.url_template.clone()),
            None => self.client.release_url_template(&release_repo(ctx)?),
        }
    }
}

/// Build the manifest document for one configuration entry
pub fn render_manifest(
    ctx: &Context,
    config: &ManifestConfig,
    url_template: &str,
) -> Result<Manifest, PublishError> {
    let template = Template::new(ctx);
    let artifacts = ctx
        .artifacts
        .by_kinds(MANIFEST_KINDS)
        .into_iter()
        .map(|artifact| {
            let url = template
                .clone()
                .with_field("ArtifactName", artifact.name.clone())
                .apply(url_template)?;
            Ok(ManifestArtifact {
                name: artifact.name.clone(),
                url,
                checksum: artifact.checksum().map(str::to_string),
            })
        })
        .collect::<Result<Vec<_>, PublishError>>()?;

    Ok(Manifest {
        name: config.name.clone(),
        version: ctx.version.clone(),
        homepage: config.homepage.clone(),
        description: config.description.clone(),
        artifacts,
    })
}

#[async_trait]
impl Publisher for ManifestStage {
    fn name(&self) -> &str {
        "manifest"
    }

    async fn publish(&self, ctx: &mut Context) -> Result<(), PublishError> {
        let url_template = self.url_template(ctx)?;
        let template = Template::new(ctx);

        for config in &ctx.config.manifests {
            let manifest = render_manifest(ctx, config, &url_template)?;
            let content = serde_json::to_vec_pretty(&manifest).map_err(|e| PublishError::Serialization {
                what: format!("manifest {}", config.name),
                message: e.to_string(),
            })?;
            let path = match &config.path {
                Some(path) => template.apply(path)?,
                None => format!("{}.json", config.name),
            };
            let message = template.apply(&config.commit_msg_template)?;

            if config.skip_upload {
                info!(manifest = %config.name, path = %path, "manifest upload disabled");
                continue;
            }

            let repo = config.repository.to_repo();
            let author = CommitAuthor {
                name: config.commit_author.name.clone(),
                email: config.commit_author.email.clone(),
            };
            self.client
                .create_or_update_file(&repo, &author, &content, &path, &message)
                .await?;
            info!(manifest = %config.name, repo = %repo, path = %path, "manifest updated");
        }
        Ok(())
    }
}
