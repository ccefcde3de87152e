//! Concrete publishing stages and the default pipeline
//!
//! Order matters: the changelog feeds the release body, and the manifest
//! stage embeds the download URL pattern published by the release stage.

pub mod changelog;
pub mod manifest;
pub mod milestone;
pub mod release;

pub use changelog::ChangelogStage;
pub use manifest::ManifestStage;
pub use milestone::MilestoneStage;
pub use release::ReleaseStage;

use crate::client::ReleaseClient;
use crate::core::context::Skip;
use crate::pipeline::{Pipeline, Stage};
use std::sync::Arc;

/// The publishing pipeline: changelog, release, manifest, milestone
pub fn publishing_pipeline(client: Arc<dyn ReleaseClient>) -> Pipeline {
    Pipeline::new("publishing")
        .skip_if(|ctx| ctx.skip(Skip::Publish))
        .stage(
            Stage::new(ChangelogStage::new(client.clone()))
                .skip_if(|ctx| ctx.skip(Skip::Changelog) || ctx.config.changelog.disable),
        )
        .stage(
            Stage::new(ReleaseStage::new(client.clone()))
                .skip_if(|ctx| ctx.skip(Skip::Release) || ctx.config.release.disable),
        )
        .stage(
            Stage::new(ManifestStage::new(client.clone()))
                .continue_on_error(true)
                .skip_if(|ctx| ctx.skip(Skip::Manifest) || ctx.config.manifests.is_empty()),
        )
        .stage(
            Stage::new(MilestoneStage::new(client))
                .continue_on_error(true)
                .skip_if(|ctx| ctx.skip(Skip::Milestone) || !ctx.config.milestones.iter().any(|m| m.close)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockClient;
    use crate::core::artifact::{Artifact, ArtifactKind, Artifacts};
    use crate::core::config::{ManifestConfig, MilestoneConfig};
    use crate::testing::{gitea_context, repo_config};
    use crate::ChangelogItem;
    use tempfile::TempDir;

    #[test]
    fn test_stage_order() {
        let pipeline = publishing_pipeline(Arc::new(MockClient::default()));
        assert_eq!(
            pipeline.stage_names(),
            vec!["changelog", "release", "manifest", "milestone"]
        );
    }

    #[tokio::test]
    async fn test_full_run() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("tool_linux_amd64.tar.gz");
        std::fs::write(&archive, b"tarball").unwrap();

        let mock = Arc::new(MockClient::default());
        {
            let mut state = mock.lock();
            state.changelog = vec![ChangelogItem {
                sha: "abcdef0123".to_string(),
                message: "feat: ship it".to_string(),
                ..Default::default()
            }];
            state.milestones.insert("v1.1.0".to_string());
        }

        let mut ctx = gitea_context().with_artifacts(Artifacts::from(vec![
            Artifact::new("tool_linux_amd64.tar.gz", &archive, ArtifactKind::Archive)
                .with_metadata("checksum", "sha256:00ff"),
        ]));
        ctx.config.manifests.push(ManifestConfig {
            name: "tool".to_string(),
            repository: repo_config("acme", "bucket"),
            path: None,
            commit_author: Default::default(),
            commit_msg_template: "Manifest update for {{ .ProjectName }} version {{ .Tag }}".to_string(),
            homepage: None,
            description: None,
            skip_upload: false,
        });
        ctx.config.milestones.push(MilestoneConfig {
            close: true,
            ..Default::default()
        });

        publishing_pipeline(mock.clone()).run(&mut ctx).await.unwrap();

        let state = mock.lock();
        assert_eq!(
            state.calls,
            vec![
                "changelog v1.0.0..v1.1.0",
                "release v1.1.0",
                "publish 42",
                "file acme/bucket tool.json",
                "close_milestone acme/tool v1.1.0",
            ]
        );
        assert!(state.releases[0].body.contains("* abcdef0 feat: ship it"));
        assert_eq!(state.uploads["tool_linux_amd64.tar.gz"], b"tarball");
        assert_eq!(state.closed_milestones, vec!["v1.1.0"]);
    }

    #[tokio::test]
    async fn test_skip_publish_skips_everything() {
        let mock = Arc::new(MockClient::default());
        let mut ctx = gitea_context().with_skips([Skip::Publish]);

        publishing_pipeline(mock.clone()).run(&mut ctx).await.unwrap();

        assert!(mock.lock().calls.is_empty());
    }

    #[tokio::test]
    async fn test_manifest_failure_does_not_stop_milestones() {
        let mock = Arc::new(MockClient::default());
        {
            let mut state = mock.lock();
            state.fail_files = true;
            state.milestones.insert("v1.1.0".to_string());
        }
        let mut ctx = gitea_context().with_skips([Skip::Changelog]);
        ctx.config.manifests.push(ManifestConfig {
            name: "tool".to_string(),
            repository: repo_config("acme", "bucket"),
            path: Some("bucket/tool.json".to_string()),
            commit_author: Default::default(),
            commit_msg_template: "bump".to_string(),
            homepage: None,
            description: None,
            skip_upload: false,
        });
        ctx.config.milestones.push(MilestoneConfig {
            close: true,
            ..Default::default()
        });

        let err = publishing_pipeline(mock.clone()).run(&mut ctx).await.unwrap_err();

        assert_eq!(err.code(), "MULTIPLE_FAILURES");
        assert!(err.to_string().starts_with("manifest: acme/bucket: create file: HTTP 403"));
        assert_eq!(mock.lock().closed_milestones, vec!["v1.1.0"]);
    }

    #[tokio::test]
    async fn test_release_failure_is_fatal() {
        let mock = Arc::new(MockClient::default());
        mock.lock().fail_release = true;
        let mut ctx = gitea_context().with_skips([Skip::Changelog]);
        ctx.config.milestones.push(MilestoneConfig {
            close: true,
            ..Default::default()
        });

        let err = publishing_pipeline(mock.clone()).run(&mut ctx).await.unwrap_err();

        assert_eq!(err.code(), "STAGE_FAILED");
        assert!(err.to_string().starts_with("release: failed to publish artifacts: acme/tool"));
        assert_eq!(mock.lock().calls, vec!["release v1.1.0"]);
    }
}
