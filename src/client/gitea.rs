//! Gitea release client
//!
//! Wire calls go through [`GiteaApi`] (REST v1 under `<root>/api/v1`);
//! [`GiteaClient`] layers the reconciliation rules on top of it.

use super::http::{build_client, endpoint, path_segments, send, send_json};
use super::{
    ChangelogItem, CommitAuthor, FALLBACK_BRANCH, ProviderSettings, ReleaseClient, ReleaseRequest,
    Repo, first_line, release_notes,
};
use crate::core::artifact::Artifact;
use crate::core::error::{ApiError, PublishError};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::fs::File;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GiteaRepository {
    #[serde(default)]
    pub default_branch: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GiteaCompare {
    #[serde(default)]
    pub commits: Vec<GiteaCommit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GiteaCommit {
    pub sha: String,
    pub commit: GiteaRepoCommit,
    #[serde(default)]
    pub author: Option<GiteaUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GiteaRepoCommit {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GiteaUser {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GiteaContents {
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GiteaIdentity {
    pub name: String,
    pub email: String,
}

/// Body of the create and update contents calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GiteaFileOptions {
    pub message: String,
    pub branch: String,
    pub author: GiteaIdentity,
    pub committer: GiteaIdentity,
    /// Base64 encoded
    pub content: String,
    /// Blob hash of the file being replaced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GiteaMilestoneOptions {
    pub title: String,
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiteaRelease {
    pub id: i64,
    pub tag_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub target_commitish: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GiteaReleaseOptions {
    pub tag_name: String,
    pub target_commitish: String,
    pub name: String,
    pub body: String,
    pub draft: bool,
    pub prerelease: bool,
}

impl GiteaReleaseOptions {
    fn new(request: &ReleaseRequest, body: String) -> Self {
        Self {
            tag_name: request.tag.clone(),
            target_commitish: request.target_commitish.clone(),
            name: request.title.clone(),
            body,
            draft: request.draft,
            prerelease: request.prerelease,
        }
    }
}

/// Gitea wire calls used by the release client
#[async_trait]
pub trait GiteaApi: Send + Sync {
    async fn get_repo(&self, repo: &Repo) -> Result<GiteaRepository, ApiError>;

    async fn compare_commits(&self, repo: &Repo, base: &str, head: &str) -> Result<GiteaCompare, ApiError>;

    async fn edit_milestone_by_name(
        &self,
        repo: &Repo,
        title: &str,
        options: &GiteaMilestoneOptions,
    ) -> Result<(), ApiError>;

    async fn get_contents(&self, repo: &Repo, branch: &str, path: &str) -> Result<GiteaContents, ApiError>;

    async fn create_file(&self, repo: &Repo, path: &str, options: &GiteaFileOptions) -> Result<(), ApiError>;

    async fn update_file(&self, repo: &Repo, path: &str, options: &GiteaFileOptions) -> Result<(), ApiError>;

    async fn list_releases(&self, repo: &Repo) -> Result<Vec<GiteaRelease>, ApiError>;

    async fn create_release(&self, repo: &Repo, options: &GiteaReleaseOptions) -> Result<GiteaRelease, ApiError>;

    async fn edit_release(
        &self,
        repo: &Repo,
        id: i64,
        options: &GiteaReleaseOptions,
    ) -> Result<GiteaRelease, ApiError>;

    async fn create_release_attachment(
        &self,
        repo: &Repo,
        id: i64,
        file_name: &str,
        file: File,
    ) -> Result<(), ApiError>;
}

/// `GiteaApi` over HTTP
pub struct HttpGiteaApi {
    client: Client,
    base: Url,
    token: Option<SecretString>,
}

impl HttpGiteaApi {
    /// `root` is the instance root, e.g. `https://gitea.example.com`
    pub fn new(root: &str, token: Option<SecretString>, skip_tls_verify: bool) -> Result<Self, PublishError> {
        let base = Url::parse(&format!("{}/api/v1", root.trim_end_matches('/')))
            .map_err(|e| PublishError::config("giteaUrls.api", e.to_string()))?;
        if skip_tls_verify {
            warn!(root, "TLS certificate verification disabled");
        }

        Ok(Self {
            client: build_client(skip_tls_verify)?,
            base,
            token,
        })
    }

    fn url(&self, repo: &Repo, rest: &[&str]) -> Result<Url, ApiError> {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str()];
        segments.extend_from_slice(rest);
        endpoint(&self.base, &segments)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("token {}", token.expose_secret())),
            None => request,
        }
    }

    fn contents_url(&self, repo: &Repo, path: &str) -> Result<Url, ApiError> {
        let mut rest = vec!["contents"];
        rest.extend(path_segments(path));
        self.url(repo, &rest)
    }
}

#[async_trait]
impl GiteaApi for HttpGiteaApi {
    async fn get_repo(&self, repo: &Repo) -> Result<GiteaRepository, ApiError> {
        let url = self.url(repo, &[])?;
        send_json(self.authorize(self.client.get(url))).await
    }

    async fn compare_commits(&self, repo: &Repo, base: &str, head: &str) -> Result<GiteaCompare, ApiError> {
        let basehead = format!("{}...{}", base, head);
        let url = self.url(repo, &["compare", &basehead])?;
        send_json(self.authorize(self.client.get(url))).await
    }

    async fn edit_milestone_by_name(
        &self,
        repo: &Repo,
        title: &str,
        options: &GiteaMilestoneOptions,
    ) -> Result<(), ApiError> {
        let url = self.url(repo, &["milestones", title])?;
        send(self.authorize(self.client.patch(url).json(options))).await?;
        Ok(())
    }

    async fn get_contents(&self, repo: &Repo, branch: &str, path: &str) -> Result<GiteaContents, ApiError> {
        let url = self.contents_url(repo, path)?;
        send_json(self.authorize(self.client.get(url).query(&[("ref", branch)]))).await
    }

    async fn create_file(&self, repo: &Repo, path: &str, options: &GiteaFileOptions) -> Result<(), ApiError> {
        let url = self.contents_url(repo, path)?;
        send(self.authorize(self.client.post(url).json(options))).await?;
        Ok(())
    }

    async fn update_file(&self, repo: &Repo, path: &str, options: &GiteaFileOptions) -> Result<(), ApiError> {
        let url = self.contents_url(repo, path)?;
        send(self.authorize(self.client.put(url).json(options))).await?;
        Ok(())
    }

    async fn list_releases(&self, repo: &Repo) -> Result<Vec<GiteaRelease>, ApiError> {
        let url = self.url(repo, &["releases"])?;
        send_json(self.authorize(self.client.get(url))).await
    }

    async fn create_release(&self, repo: &Repo, options: &GiteaReleaseOptions) -> Result<GiteaRelease, ApiError> {
        let url = self.url(repo, &["releases"])?;
        send_json(self.authorize(self.client.post(url).json(options))).await
    }

    async fn edit_release(
        &self,
        repo: &Repo,
        id: i64,
        options: &GiteaReleaseOptions,
    ) -> Result<GiteaRelease, ApiError> {
        let id = id.to_string();
        let url = self.url(repo, &["releases", &id])?;
        send_json(self.authorize(self.client.patch(url).json(options))).await
    }

    async fn create_release_attachment(
        &self,
        repo: &Repo,
        id: i64,
        file_name: &str,
        file: File,
    ) -> Result<(), ApiError> {
        let length = file
            .metadata()
            .await
            .map_err(|e| ApiError::transport(format!("reading {}: {}", file_name, e)))?
            .len();
        let id = id.to_string();
        let url = self.url(repo, &["releases", &id, "assets"])?;
        let part = Part::stream_with_length(Body::from(file), length).file_name(file_name.to_string());
        let form = Form::new().part("attachment", part);
        let request = self.client.post(url).query(&[("name", file_name)]).multipart(form);
        send(self.authorize(request)).await?;
        Ok(())
    }
}

/// Release client for Gitea instances
pub struct GiteaClient {
    api: Arc<dyn GiteaApi>,
    download_url: String,
}

impl GiteaClient {
    pub fn new(api: Arc<dyn GiteaApi>, download_url: impl Into<String>) -> Self {
        Self {
            api,
            download_url: download_url.into(),
        }
    }

    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, PublishError> {
        let api = HttpGiteaApi::new(
            &settings.api_url,
            settings.token.clone(),
            settings.skip_tls_verify,
        )?;
        Ok(Self::new(Arc::new(api), settings.download_url.clone()))
    }

    async fn target_branch(&self, repo: &Repo, path: &str) -> String {
        if let Some(branch) = &repo.branch {
            return branch.clone();
        }

        match self.api.get_repo(repo).await {
            Ok(found) if !found.default_branch.is_empty() => found.default_branch,
            Ok(_) => {
                warn!(file = path, repo = %repo, "no default branch reported, using {}", FALLBACK_BRANCH);
                FALLBACK_BRANCH.to_string()
            }
            Err(e) => {
                warn!(
                    file = path,
                    repo = %repo,
                    status = ?e.status,
                    error = %e,
                    "error checking for default branch, using {}",
                    FALLBACK_BRANCH
                );
                FALLBACK_BRANCH.to_string()
            }
        }
    }

    async fn find_release(&self, repo: &Repo, tag: &str) -> Result<Option<GiteaRelease>, PublishError> {
        let releases = self
            .api
            .list_releases(repo)
            .await
            .map_err(|e| PublishError::provider(repo, "list releases", e))?;

        Ok(releases.into_iter().find(|r| r.tag_name == tag))
    }
}

#[async_trait]
impl ReleaseClient for GiteaClient {
    fn name(&self) -> &'static str {
        "gitea"
    }

    async fn changelog(
        &self,
        repo: &Repo,
        previous: &str,
        current: &str,
    ) -> Result<Vec<ChangelogItem>, PublishError> {
        let compare = self
            .api
            .compare_commits(repo, previous, current)
            .await
            .map_err(|e| PublishError::provider(repo, "compare commits", e))?;

        let non_empty = |s: String| Some(s).filter(|s| !s.is_empty());
        Ok(compare
            .commits
            .into_iter()
            .map(|commit| {
                let author = commit.author.unwrap_or_default();
                ChangelogItem {
                    sha: commit.sha,
                    message: first_line(&commit.commit.message),
                    author_name: non_empty(author.full_name),
                    author_email: non_empty(author.email),
                    author_username: non_empty(author.login),
                }
            })
            .collect())
    }

    async fn close_milestone(&self, repo: &Repo, title: &str) -> Result<(), PublishError> {
        let options = GiteaMilestoneOptions {
            title: title.to_string(),
            state: "closed".to_string(),
        };

        match self.api.edit_milestone_by_name(repo, title, &options).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Err(PublishError::NoMilestoneFound {
                title: title.to_string(),
            }),
            Err(e) => Err(PublishError::provider(repo, "close milestone", e)),
        }
    }

    async fn create_or_update_file(
        &self,
        repo: &Repo,
        author: &CommitAuthor,
        content: &[u8],
        path: &str,
        message: &str,
    ) -> Result<(), PublishError> {
        let branch = self.target_branch(repo, path).await;
        let identity = GiteaIdentity {
            name: author.name.clone(),
            email: author.email.clone(),
        };
        let mut options = GiteaFileOptions {
            message: message.to_string(),
            branch: branch.clone(),
            author: identity.clone(),
            committer: identity,
            content: STANDARD.encode(content),
            sha: None,
        };

        info!(repository = %repo, path, branch = %branch, "pushing");

        match self.api.get_contents(repo, &branch, path).await {
            Err(e) if e.is_not_found() => self
                .api
                .create_file(repo, path, &options)
                .await
                .map_err(|e| PublishError::provider(repo, "create file", e)),
            Err(e) => Err(PublishError::provider(repo, "get file contents", e)),
            Ok(current) => {
                options.sha = Some(current.sha);
                self.api
                    .update_file(repo, path, &options)
                    .await
                    .map_err(|e| PublishError::provider(repo, "update file", e))
            }
        }
    }

    async fn create_or_update_release(
        &self,
        request: &ReleaseRequest,
    ) -> Result<String, PublishError> {
        let repo = &request.repo;

        let release = match self.find_release(repo, &request.tag).await? {
            Some(existing) => {
                let body = release_notes(&existing.body, &request.body, request.notes_mode, &request.tag)?;
                let options = GiteaReleaseOptions::new(request, body);
                let release = self
                    .api
                    .edit_release(repo, existing.id, &options)
                    .await
                    .map_err(|e| PublishError::provider(repo, "update release", e))?;
                info!(id = release.id, tag = %request.tag, "Gitea release updated");
                release
            }
            None => {
                let options = GiteaReleaseOptions::new(request, request.body.clone());
                let release = self
                    .api
                    .create_release(repo, &options)
                    .await
                    .map_err(|e| PublishError::provider(repo, "create release", e))?;
                info!(id = release.id, tag = %request.tag, "Gitea release created");
                release
            }
        };

        Ok(release.id.to_string())
    }

    async fn publish_release(&self, _repo: &Repo, release_id: &str) -> Result<(), PublishError> {
        // TODO: create the release as a draft while uploading and flip it here
        debug!(id = release_id, "Gitea releases are published on creation");
        Ok(())
    }

    /// Without a download URL the pattern is host-relative
    fn release_url_template(&self, repo: &Repo) -> Result<String, PublishError> {
        Ok(format!(
            "{}/{}/{}/releases/download/{{{{ urlPathEscape .Tag }}}}/{{{{ .ArtifactName }}}}",
            self.download_url.trim_end_matches('/'),
            repo.owner,
            repo.name
        ))
    }

    async fn upload(
        &self,
        repo: &Repo,
        release_id: &str,
        artifact: &Artifact,
        file: File,
    ) -> Result<(), PublishError> {
        let id: i64 = release_id
            .parse()
            .map_err(|_| PublishError::config("release id", format!("{:?} is not a Gitea release id", release_id)))?;

        self.api
            .create_release_attachment(repo, id, &artifact.name, file)
            .await
            .map_err(|e| PublishError::retriable(PublishError::provider(repo, "upload asset", e)))
    }
}
