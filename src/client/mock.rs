//! Recording `ReleaseClient` for stage and pipeline tests

use super::{ChangelogItem, CommitAuthor, ReleaseClient, ReleaseRequest, Repo};
use crate::core::artifact::Artifact;
use crate::core::error::{ApiError, PublishError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub changelog: Vec<ChangelogItem>,
    pub milestones: HashSet<String>,
    pub closed_milestones: Vec<String>,
    /// path -> (repo, content, message)
    pub files: HashMap<String, (String, Vec<u8>, String)>,
    pub releases: Vec<ReleaseRequest>,
    pub published: Vec<String>,
    /// artifact name -> content
    pub uploads: HashMap<String, Vec<u8>>,
    /// artifact name -> failures left before the upload succeeds
    pub upload_failures: HashMap<String, u32>,
    pub upload_attempts: HashMap<String, u32>,
    pub fail_release: bool,
    pub fail_files: bool,
    pub calls: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct MockClient {
    pub state: Mutex<MockState>,
}

impl MockClient {
    pub fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl ReleaseClient for MockClient {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn changelog(
        &self,
        _repo: &Repo,
        previous: &str,
        current: &str,
    ) -> Result<Vec<ChangelogItem>, PublishError> {
        let mut state = self.lock();
        state.calls.push(format!("changelog {}..{}", previous, current));
        Ok(state.changelog.clone())
    }

    async fn close_milestone(&self, repo: &Repo, title: &str) -> Result<(), PublishError> {
        let mut state = self.lock();
        state.calls.push(format!("close_milestone {} {}", repo, title));
        if !state.milestones.contains(title) {
            return Err(PublishError::NoMilestoneFound {
                title: title.to_string(),
            });
        }
        state.closed_milestones.push(title.to_string());
        Ok(())
    }

    async fn create_or_update_file(
        &self,
        repo: &Repo,
        _author: &CommitAuthor,
        content: &[u8],
        path: &str,
        message: &str,
    ) -> Result<(), PublishError> {
        let mut state = self.lock();
        state.calls.push(format!("file {} {}", repo, path));
        if state.fail_files {
            return Err(PublishError::provider(repo, "create file", ApiError::status(403, "forbidden")));
        }
        state.files.insert(
            path.to_string(),
            (repo.to_string(), content.to_vec(), message.to_string()),
        );
        Ok(())
    }

    async fn create_or_update_release(
        &self,
        request: &ReleaseRequest,
    ) -> Result<String, PublishError> {
        let mut state = self.lock();
        state.calls.push(format!("release {}", request.tag));
        if state.fail_release {
            return Err(PublishError::provider(
                &request.repo,
                "create release",
                ApiError::status(401, "bad credentials"),
            ));
        }
        state.releases.push(request.clone());
        Ok("42".to_string())
    }

    async fn publish_release(&self, _repo: &Repo, release_id: &str) -> Result<(), PublishError> {
        let mut state = self.lock();
        state.calls.push(format!("publish {}", release_id));
        state.published.push(release_id.to_string());
        Ok(())
    }

    fn release_url_template(&self, repo: &Repo) -> Result<String, PublishError> {
        Ok(format!(
            "https://example.com/{}/download/{{{{ urlPathEscape .Tag }}}}/{{{{ .ArtifactName }}}}",
            repo
        ))
    }

    async fn upload(
        &self,
        repo: &Repo,
        _release_id: &str,
        artifact: &Artifact,
        mut file: File,
    ) -> Result<(), PublishError> {
        let mut content = Vec::new();
        file.read_to_end(&mut content).await?;

        let mut state = self.lock();
        *state.upload_attempts.entry(artifact.name.clone()).or_default() += 1;
        if let Some(left) = state.upload_failures.get_mut(&artifact.name) {
            if *left > 0 {
                *left -= 1;
                return Err(PublishError::retriable(PublishError::provider(
                    repo,
                    "upload asset",
                    ApiError::transport(format!("connection reset, {} left", left)),
                )));
            }
        }
        state.uploads.insert(artifact.name.clone(), content);
        Ok(())
    }
}
