//! GitHub release client
//!
//! Created and updated releases are kept as drafts and only made public by
//! `publish_release`, after the release stage has attached every asset.

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
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::fs::File;
use tracing::{debug, info, warn};
use url::Url;

/// Items requested per page when listing
pub const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubRepository {
    #[serde(default)]
    pub default_branch: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubCompare {
    #[serde(default)]
    pub commits: Vec<GithubCommit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubCommit {
    pub sha: String,
    pub commit: GithubGitCommit,
    /// GitHub account of the author, absent for unknown emails
    #[serde(default)]
    pub author: Option<GithubUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubGitCommit {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: Option<GithubIdentity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubIdentity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubUser {
    #[serde(default)]
    pub login: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubMilestone {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubContents {
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GithubFileOptions {
    pub message: String,
    /// Base64 encoded
    pub content: String,
    pub branch: String,
    pub author: GithubIdentity,
    pub committer: GithubIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubRelease {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GithubReleaseOptions {
    pub tag_name: String,
    pub target_commitish: String,
    pub name: String,
    pub body: String,
    pub draft: bool,
    pub prerelease: bool,
}

/// GitHub wire calls used by the release client
#[async_trait]
pub trait GithubApi: Send + Sync {
    async fn get_repo(&self, repo: &Repo) -> Result<GithubRepository, ApiError>;

    async fn compare_commits(&self, repo: &Repo, base: &str, head: &str) -> Result<GithubCompare, ApiError>;

    /// One page of milestones in every state, pages start at 1
    async fn list_milestones(&self, repo: &Repo, page: u32) -> Result<Vec<GithubMilestone>, ApiError>;

    async fn close_milestone(&self, repo: &Repo, number: u64) -> Result<(), ApiError>;

    async fn get_contents(&self, repo: &Repo, branch: &str, path: &str) -> Result<GithubContents, ApiError>;

    /// Create or replace a file; `options.sha` must name the replaced blob
    async fn put_contents(&self, repo: &Repo, path: &str, options: &GithubFileOptions) -> Result<(), ApiError>;

    /// One page of releases, pages start at 1
    async fn list_releases(&self, repo: &Repo, page: u32) -> Result<Vec<GithubRelease>, ApiError>;

    async fn create_release(&self, repo: &Repo, options: &GithubReleaseOptions) -> Result<GithubRelease, ApiError>;

    async fn edit_release(
        &self,
        repo: &Repo,
        id: u64,
        options: &GithubReleaseOptions,
    ) -> Result<GithubRelease, ApiError>;

    async fn set_release_draft(&self, repo: &Repo, id: u64, draft: bool) -> Result<(), ApiError>;

    /// Stream `file` as the asset body
    async fn upload_asset(&self, repo: &Repo, id: u64, name: &str, file: File) -> Result<(), ApiError>;
}

/// `GithubApi` over HTTP
pub struct HttpGithubApi {
    client: Client,
    api: Url,
    upload: Url,
    token: Option<SecretString>,
}

impl HttpGithubApi {
    pub fn new(
        api_url: &str,
        upload_url: &str,
        token: Option<SecretString>,
        skip_tls_verify: bool,
    ) -> Result<Self, PublishError> {
        let api = Url::parse(api_url).map_err(|e| PublishError::config("githubUrls.api", e.to_string()))?;
        let upload =
            Url::parse(upload_url).map_err(|e| PublishError::config("githubUrls.upload", e.to_string()))?;
        if skip_tls_verify {
            warn!(api = api_url, "TLS certificate verification disabled");
        }

        Ok(Self {
            client: build_client(skip_tls_verify)?,
            api,
            upload,
            token,
        })
    }

    fn url(&self, repo: &Repo, rest: &[&str]) -> Result<Url, ApiError> {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str()];
        segments.extend_from_slice(rest);
        endpoint(&self.api, &segments)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret())),
            None => request,
        }
    }

    fn contents_url(&self, repo: &Repo, path: &str) -> Result<Url, ApiError> {
        let mut rest = vec!["contents"];
        rest.extend(path_segments(path));
        self.url(repo, &rest)
    }
}

fn page_query(page: u32) -> [(&'static str, String); 2] {
    [("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())]
}

#[async_trait]
impl GithubApi for HttpGithubApi {
    async fn get_repo(&self, repo: &Repo) -> Result<GithubRepository, ApiError> {
        let url = self.url(repo, &[])?;
        send_json(self.authorize(self.client.get(url))).await
    }

    async fn compare_commits(&self, repo: &Repo, base: &str, head: &str) -> Result<GithubCompare, ApiError> {
        let basehead = format!("{}...{}", base, head);
        let url = self.url(repo, &["compare", &basehead])?;
        send_json(self.authorize(self.client.get(url))).await
    }

    async fn list_milestones(&self, repo: &Repo, page: u32) -> Result<Vec<GithubMilestone>, ApiError> {
        let url = self.url(repo, &["milestones"])?;
        let request = self.client.get(url).query(&[("state", "all")]).query(&page_query(page));
        send_json(self.authorize(request)).await
    }

    async fn close_milestone(&self, repo: &Repo, number: u64) -> Result<(), ApiError> {
        let number = number.to_string();
        let url = self.url(repo, &["milestones", &number])?;
        let body = serde_json::json!({ "state": "closed" });
        send(self.authorize(self.client.patch(url).json(&body))).await?;
        Ok(())
    }

    async fn get_contents(&self, repo: &Repo, branch: &str, path: &str) -> Result<GithubContents, ApiError> {
        let url = self.contents_url(repo, path)?;
        send_json(self.authorize(self.client.get(url).query(&[("ref", branch)]))).await
    }

    async fn put_contents(&self, repo: &Repo, path: &str, options: &GithubFileOptions) -> Result<(), ApiError> {
        let url = self.contents_url(repo, path)?;
        send(self.authorize(self.client.put(url).json(options))).await?;
        Ok(())
    }

    async fn list_releases(&self, repo: &Repo, page: u32) -> Result<Vec<GithubRelease>, ApiError> {
        let url = self.url(repo, &["releases"])?;
        send_json(self.authorize(self.client.get(url).query(&page_query(page)))).await
    }

    async fn create_release(&self, repo: &Repo, options: &GithubReleaseOptions) -> Result<GithubRelease, ApiError> {
        let url = self.url(repo, &["releases"])?;
        send_json(self.authorize(self.client.post(url).json(options))).await
    }

    async fn edit_release(
        &self,
        repo: &Repo,
        id: u64,
        options: &GithubReleaseOptions,
    ) -> Result<GithubRelease, ApiError> {
        let id = id.to_string();
        let url = self.url(repo, &["releases", &id])?;
        send_json(self.authorize(self.client.patch(url).json(options))).await
    }

    async fn set_release_draft(&self, repo: &Repo, id: u64, draft: bool) -> Result<(), ApiError> {
        let id = id.to_string();
        let url = self.url(repo, &["releases", &id])?;
        let body = serde_json::json!({ "draft": draft });
        send(self.authorize(self.client.patch(url).json(&body))).await?;
        Ok(())
    }

    async fn upload_asset(&self, repo: &Repo, id: u64, name: &str, file: File) -> Result<(), ApiError> {
        let length = file
            .metadata()
            .await
            .map_err(|e| ApiError::transport(format!("reading {}: {}", name, e)))?
            .len();
        let id = id.to_string();
        let url = endpoint(
            &self.upload,
            &["repos", repo.owner.as_str(), repo.name.as_str(), "releases", &id, "assets"],
        )?;
        let request = self
            .client
            .post(url)
            .query(&[("name", name)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, length)
            .body(Body::from(file));
        send(self.authorize(request)).await?;
        Ok(())
    }
}

/// Release client for github.com and GitHub Enterprise
pub struct GithubClient {
    api: Arc<dyn GithubApi>,
    download_url: String,
}

impl GithubClient {
    pub fn new(api: Arc<dyn GithubApi>, download_url: impl Into<String>) -> Self {
        Self {
            api,
            download_url: download_url.into(),
        }
    }

    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, PublishError> {
        let api = HttpGithubApi::new(
            &settings.api_url,
            &settings.upload_url,
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

    async fn find_release(&self, repo: &Repo, tag: &str) -> Result<Option<GithubRelease>, PublishError> {
        let mut page = 1;
        loop {
            let releases = self
                .api
                .list_releases(repo, page)
                .await
                .map_err(|e| PublishError::provider(repo, "list releases", e))?;
            let count = releases.len();

            if let Some(found) = releases.into_iter().find(|r| r.tag_name == tag) {
                return Ok(Some(found));
            }
            if count < PAGE_SIZE {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn find_milestone(&self, repo: &Repo, title: &str) -> Result<Option<GithubMilestone>, PublishError> {
        let mut page = 1;
        loop {
            let milestones = self
                .api
                .list_milestones(repo, page)
                .await
                .map_err(|e| PublishError::provider(repo, "list milestones", e))?;
            let count = milestones.len();

            if let Some(found) = milestones.into_iter().find(|m| m.title == title) {
                return Ok(Some(found));
            }
            if count < PAGE_SIZE {
                return Ok(None);
            }
            page += 1;
        }
    }

    fn parse_id(release_id: &str) -> Result<u64, PublishError> {
        release_id
            .parse()
            .map_err(|_| PublishError::config("release id", format!("{:?} is not a GitHub release id", release_id)))
    }
}

#[async_trait]
impl ReleaseClient for GithubClient {
    fn name(&self) -> &'static str {
        "github"
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
                let identity = commit.commit.author.unwrap_or_default();
                ChangelogItem {
                    sha: commit.sha,
                    message: first_line(&commit.commit.message),
                    author_name: non_empty(identity.name),
                    author_email: non_empty(identity.email),
                    author_username: commit.author.and_then(|u| non_empty(u.login)),
                }
            })
            .collect())
    }

    async fn close_milestone(&self, repo: &Repo, title: &str) -> Result<(), PublishError> {
        let milestone = self
            .find_milestone(repo, title)
            .await?
            .ok_or_else(|| PublishError::NoMilestoneFound {
                title: title.to_string(),
            })?;

        match self.api.close_milestone(repo, milestone.number).await {
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
        let identity = GithubIdentity {
            name: author.name.clone(),
            email: author.email.clone(),
        };
        let mut options = GithubFileOptions {
            message: message.to_string(),
            content: STANDARD.encode(content),
            branch: branch.clone(),
            author: identity.clone(),
            committer: identity,
            sha: None,
        };

        info!(repository = %repo, path, branch = %branch, "pushing");

        match self.api.get_contents(repo, &branch, path).await {
            Ok(current) => options.sha = Some(current.sha),
            Err(e) if e.is_not_found() => debug!(path, "file does not exist yet, creating it"),
            Err(e) => return Err(PublishError::provider(repo, "get file contents", e)),
        }

        let operation = if options.sha.is_some() { "update file" } else { "create file" };
        self.api
            .put_contents(repo, path, &options)
            .await
            .map_err(|e| PublishError::provider(repo, operation, e))
    }

    async fn create_or_update_release(
        &self,
        request: &ReleaseRequest,
    ) -> Result<String, PublishError> {
        let repo = &request.repo;
        let mut options = GithubReleaseOptions {
            tag_name: request.tag.clone(),
            target_commitish: request.target_commitish.clone(),
            name: request.title.clone(),
            body: request.body.clone(),
            // Hidden until publish_release, once the assets are attached
            draft: true,
            prerelease: request.prerelease,
        };

        let release = match self.find_release(repo, &request.tag).await? {
            Some(existing) => {
                let stored = existing.body.unwrap_or_default();
                options.body = release_notes(&stored, &request.body, request.notes_mode, &request.tag)?;
                let release = self
                    .api
                    .edit_release(repo, existing.id, &options)
                    .await
                    .map_err(|e| PublishError::provider(repo, "update release", e))?;
                info!(id = release.id, tag = %request.tag, "GitHub release updated");
                release
            }
            None => {
                let release = self
                    .api
                    .create_release(repo, &options)
                    .await
                    .map_err(|e| PublishError::provider(repo, "create release", e))?;
                info!(id = release.id, tag = %request.tag, "GitHub release created");
                release
            }
        };

        Ok(release.id.to_string())
    }

    async fn publish_release(&self, repo: &Repo, release_id: &str) -> Result<(), PublishError> {
        let id = Self::parse_id(release_id)?;
        self.api
            .set_release_draft(repo, id, false)
            .await
            .map_err(|e| PublishError::provider(repo, "publish release", e))?;
        info!(id, "GitHub release published");
        Ok(())
    }

    fn release_url_template(&self, repo: &Repo) -> Result<String, PublishError> {
        if self.download_url.is_empty() {
            return Err(PublishError::config("githubUrls.download", "URL is empty"));
        }

        Ok(format!(
            "{}/{}/{}/releases/download/{{{{ urlPathEscape .Tag }}}}/{{{{ .ArtifactName }}}}",
            self.download_url, repo.owner, repo.name
        ))
    }

    async fn upload(
        &self,
        repo: &Repo,
        release_id: &str,
        artifact: &Artifact,
        file: File,
    ) -> Result<(), PublishError> {
        let id = Self::parse_id(release_id)?;

        self.api
            .upload_asset(repo, id, &artifact.name, file)
            .await
            .map_err(|e| PublishError::retriable(PublishError::provider(repo, "upload asset", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ReleaseNotesMode;
    use crate::client::http::stub::StubServer;
    use crate::core::artifact::ArtifactKind;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    #[derive(Debug, Default)]
    struct State {
        default_branch: Option<String>,
        commits: Vec<GithubCommit>,
        milestones: Vec<GithubMilestone>,
        files: HashMap<(String, String), (String, Vec<u8>)>,
        releases: Vec<GithubRelease>,
        assets: Vec<(u64, String)>,
        fail_uploads: bool,
        calls: Vec<String>,
        next_sha: u32,
    }

    #[derive(Debug, Default)]
    struct FakeGithub {
        state: Mutex<State>,
    }

    impl FakeGithub {
        fn lock(&self) -> std::sync::MutexGuard<'_, State> {
            self.state.lock().unwrap()
        }
    }

    fn page<T: Clone>(items: &[T], page: u32) -> Vec<T> {
        items
            .iter()
            .skip((page as usize - 1) * PAGE_SIZE)
            .take(PAGE_SIZE)
            .cloned()
            .collect()
    }

    #[async_trait]
    impl GithubApi for FakeGithub {
        async fn get_repo(&self, _repo: &Repo) -> Result<GithubRepository, ApiError> {
            let state = self.lock();
            state
                .default_branch
                .clone()
                .map(|default_branch| GithubRepository { default_branch })
                .ok_or_else(|| ApiError::status(502, "bad gateway"))
        }

        async fn compare_commits(&self, _repo: &Repo, _base: &str, _head: &str) -> Result<GithubCompare, ApiError> {
            Ok(GithubCompare {
                commits: self.lock().commits.clone(),
            })
        }

        async fn list_milestones(&self, _repo: &Repo, n: u32) -> Result<Vec<GithubMilestone>, ApiError> {
            let mut state = self.lock();
            state.calls.push(format!("list_milestones {}", n));
            Ok(page(&state.milestones, n))
        }

        async fn close_milestone(&self, _repo: &Repo, number: u64) -> Result<(), ApiError> {
            let mut state = self.lock();
            let milestone = state
                .milestones
                .iter_mut()
                .find(|m| m.number == number)
                .ok_or_else(|| ApiError::not_found("Not Found"))?;
            milestone.state = "closed".to_string();
            Ok(())
        }

        async fn get_contents(&self, _repo: &Repo, branch: &str, path: &str) -> Result<GithubContents, ApiError> {
            self.lock()
                .files
                .get(&(branch.to_string(), path.to_string()))
                .map(|(sha, _)| GithubContents { sha: sha.clone() })
                .ok_or_else(|| ApiError::not_found("Not Found"))
        }

        async fn put_contents(&self, _repo: &Repo, path: &str, options: &GithubFileOptions) -> Result<(), ApiError> {
            let mut state = self.lock();
            let key = (options.branch.clone(), path.to_string());
            if state.files.get(&key).map(|(sha, _)| sha.clone()) != options.sha {
                return Err(ApiError::status(409, "sha mismatch"));
            }
            state.calls.push(format!(
                "put_contents {} {} {}",
                options.branch,
                path,
                options.sha.as_deref().unwrap_or("-")
            ));
            state.next_sha += 1;
            let sha = format!("blob-{}", state.next_sha);
            state.files.insert(key, (sha, STANDARD.decode(&options.content).unwrap()));
            Ok(())
        }

        async fn list_releases(&self, _repo: &Repo, n: u32) -> Result<Vec<GithubRelease>, ApiError> {
            let mut state = self.lock();
            state.calls.push(format!("list_releases {}", n));
            Ok(page(&state.releases, n))
        }

        async fn create_release(&self, _repo: &Repo, options: &GithubReleaseOptions) -> Result<GithubRelease, ApiError> {
            let mut state = self.lock();
            let release = GithubRelease {
                id: 1000 + state.releases.len() as u64,
                tag_name: options.tag_name.clone(),
                name: Some(options.name.clone()),
                body: Some(options.body.clone()),
                draft: options.draft,
                prerelease: options.prerelease,
            };
            state.calls.push(format!("create_release {}", release.id));
            state.releases.push(release.clone());
            Ok(release)
        }

        async fn edit_release(
            &self,
            _repo: &Repo,
            id: u64,
            options: &GithubReleaseOptions,
        ) -> Result<GithubRelease, ApiError> {
            let mut state = self.lock();
            state.calls.push(format!("edit_release {}", id));
            let release = state
                .releases
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| ApiError::not_found("Not Found"))?;
            release.name = Some(options.name.clone());
            release.body = Some(options.body.clone());
            release.draft = options.draft;
            release.prerelease = options.prerelease;
            Ok(release.clone())
        }

        async fn set_release_draft(&self, _repo: &Repo, id: u64, draft: bool) -> Result<(), ApiError> {
            let mut state = self.lock();
            let release = state
                .releases
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| ApiError::not_found("Not Found"))?;
            release.draft = draft;
            Ok(())
        }

        async fn upload_asset(&self, _repo: &Repo, id: u64, name: &str, _file: File) -> Result<(), ApiError> {
            let mut state = self.lock();
            if state.fail_uploads {
                return Err(ApiError::status(422, "already_exists"));
            }
            state.assets.push((id, name.to_string()));
            Ok(())
        }
    }

    fn client(fake: &Arc<FakeGithub>) -> GithubClient {
        GithubClient::new(fake.clone(), "https://github.com")
    }

    fn repo() -> Repo {
        Repo::new("acme", "tool")
    }

    fn request(tag: &str, body: &str, mode: ReleaseNotesMode) -> ReleaseRequest {
        ReleaseRequest {
            repo: repo(),
            tag: tag.to_string(),
            title: tag.to_string(),
            body: body.to_string(),
            draft: false,
            prerelease: false,
            target_commitish: "main".to_string(),
            notes_mode: mode,
        }
    }

    fn release(id: u64, tag: &str) -> GithubRelease {
        GithubRelease {
            id,
            tag_name: tag.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_new_release_is_draft_until_published() {
        let fake = Arc::new(FakeGithub::default());
        let client = client(&fake);

        let id = client
            .create_or_update_release(&request("v1.0.0", "notes", ReleaseNotesMode::KeepExisting))
            .await
            .unwrap();
        assert!(fake.lock().releases[0].draft);

        client.publish_release(&repo(), &id).await.unwrap();
        assert!(!fake.lock().releases[0].draft);
    }

    #[tokio::test]
    async fn test_updated_release_is_hidden_until_published() {
        let fake = Arc::new(FakeGithub::default());
        fake.lock().releases.push(release(7, "v1.0.0"));
        let client = client(&fake);

        let id = client
            .create_or_update_release(&request("v1.0.0", "notes", ReleaseNotesMode::Replace))
            .await
            .unwrap();
        assert_eq!(id, "7");
        assert!(fake.lock().releases[0].draft);

        client.publish_release(&repo(), &id).await.unwrap();
        assert!(!fake.lock().releases[0].draft);
    }

    #[tokio::test]
    async fn test_release_lookup_walks_pages() {
        let fake = Arc::new(FakeGithub::default());
        {
            let mut state = fake.lock();
            state.releases = (0..PAGE_SIZE as u64).map(|i| release(i, &format!("v0.{}.0", i))).collect();
            let mut target = release(500, "v1.0.0");
            target.body = Some("A".to_string());
            state.releases.push(target);
        }

        let id = client(&fake)
            .create_or_update_release(&request("v1.0.0", "B", ReleaseNotesMode::Prepend))
            .await
            .unwrap();

        assert_eq!(id, "500");
        let state = fake.lock();
        assert_eq!(state.calls, vec!["list_releases 1", "list_releases 2", "edit_release 500"]);
        assert_eq!(state.releases.last().unwrap().body.as_deref(), Some("B\n\nA"));
    }

    #[tokio::test]
    async fn test_second_run_updates_instead_of_duplicating() {
        let fake = Arc::new(FakeGithub::default());
        let client = client(&fake);

        let first = client
            .create_or_update_release(&request("v1.0.0", "A", ReleaseNotesMode::KeepExisting))
            .await
            .unwrap();
        let second = client
            .create_or_update_release(&request("v1.0.0", "B", ReleaseNotesMode::KeepExisting))
            .await
            .unwrap();

        assert_eq!(first, second);
        let state = fake.lock();
        assert_eq!(state.releases.len(), 1);
        assert_eq!(state.releases[0].body.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_close_milestone_by_title() {
        let fake = Arc::new(FakeGithub::default());
        fake.lock().milestones = vec![
            GithubMilestone {
                number: 4,
                title: "v0.9.0".to_string(),
                state: "closed".to_string(),
            },
            GithubMilestone {
                number: 5,
                title: "v1.0.0".to_string(),
                state: "open".to_string(),
            },
        ];
        let client = client(&fake);

        client.close_milestone(&repo(), "v1.0.0").await.unwrap();
        assert_eq!(fake.lock().milestones[1].state, "closed");

        let err = client.close_milestone(&repo(), "v2.0.0").await.unwrap_err();
        assert!(matches!(err, PublishError::NoMilestoneFound { .. }));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_file_create_then_update() {
        let fake = Arc::new(FakeGithub::default());
        fake.lock().default_branch = Some("trunk".to_string());
        let client = client(&fake);
        let author = CommitAuthor {
            name: "bot".to_string(),
            email: "bot@example.com".to_string(),
        };

        client
            .create_or_update_file(&repo(), &author, b"1", "Formula/tool.json", "add")
            .await
            .unwrap();
        client
            .create_or_update_file(&repo(), &author, b"2", "Formula/tool.json", "bump")
            .await
            .unwrap();

        assert_eq!(
            fake.lock().calls,
            vec![
                "put_contents trunk Formula/tool.json -",
                "put_contents trunk Formula/tool.json blob-1",
            ]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_file_branch_fallback_logs_warning() {
        let fake = Arc::new(FakeGithub::default());
        let author = CommitAuthor {
            name: "bot".to_string(),
            email: "bot@example.com".to_string(),
        };

        client(&fake)
            .create_or_update_file(&repo(), &author, b"1", "tool.json", "add")
            .await
            .unwrap();

        assert_eq!(fake.lock().calls, vec!["put_contents master tool.json -"]);
        logs_assert(|lines: &[&str]| {
            match lines.iter().any(|line| line.contains("WARN") && line.contains("using master")) {
                true => Ok(()),
                false => Err("no WARN line mentioning 'using master'".to_string()),
            }
        });
    }

    #[tokio::test]
    async fn test_changelog_authors() {
        let fake = Arc::new(FakeGithub::default());
        fake.lock().commits = vec![
            GithubCommit {
                sha: "b".to_string(),
                commit: GithubGitCommit {
                    message: "second\nmore".to_string(),
                    author: Some(GithubIdentity {
                        name: "Jane".to_string(),
                        email: "jane@example.com".to_string(),
                    }),
                },
                author: Some(GithubUser {
                    login: "jane".to_string(),
                }),
            },
            GithubCommit {
                sha: "a".to_string(),
                commit: GithubGitCommit {
                    message: "first".to_string(),
                    author: None,
                },
                author: None,
            },
        ];

        let items = client(&fake).changelog(&repo(), "v1", "v2").await.unwrap();

        assert_eq!(items[0].sha, "b");
        assert_eq!(items[0].message, "second");
        assert_eq!(items[0].author_username.as_deref(), Some("jane"));
        assert_eq!(items[1].sha, "a");
        assert_eq!(items[1].author_name, None);
    }

    #[tokio::test]
    async fn test_http_upload_streams_file_to_upload_host() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tool 1.zip");
        std::fs::write(&path, b"zip-bytes").unwrap();
        let artifact = Artifact::new("tool 1.zip", &path, ArtifactKind::Archive);
        let server = StubServer::start(vec![(201, r#"{"id":1,"name":"tool 1.zip"}"#)]).await;
        let api = HttpGithubApi::new(
            &format!("{}/api/", server.url),
            &format!("{}/uploads/", server.url),
            None,
            false,
        )
        .unwrap();

        GithubClient::new(Arc::new(api), "https://github.com")
            .upload(&repo(), "1000", &artifact, File::open(&path).await.unwrap())
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(requests[0].line, "POST /uploads/repos/acme/tool/releases/1000/assets?name=tool+1.zip");
        assert!(requests[0].headers.contains("content-length: 9"));
        assert!(requests[0].headers.contains("content-type: application/octet-stream"));
        assert_eq!(requests[0].body, b"zip-bytes");
    }

    #[tokio::test]
    async fn test_upload_errors_are_retriable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tool.zip");
        std::fs::write(&path, b"zip").unwrap();
        let artifact = Artifact::new("tool.zip", &path, ArtifactKind::Archive);
        let fake = Arc::new(FakeGithub::default());
        let client = client(&fake);

        client
            .upload(&repo(), "1000", &artifact, File::open(&path).await.unwrap())
            .await
            .unwrap();
        assert_eq!(fake.lock().assets, vec![(1000, "tool.zip".to_string())]);

        fake.lock().fail_uploads = true;
        let err = client
            .upload(&repo(), "1000", &artifact, File::open(&path).await.unwrap())
            .await
            .unwrap_err();
        assert!(err.is_retriable());

        let err = client
            .upload(&repo(), "not-a-number", &artifact, File::open(&path).await.unwrap())
            .await
            .unwrap_err();
        assert!(!err.is_retriable());
    }
}
