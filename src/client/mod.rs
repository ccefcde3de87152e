//! Release clients for source-control hosting providers
//!
//! Every provider implements [`ReleaseClient`], so stages are written once
//! against the trait. Each adapter re-reads remote state before every
//! mutation and holds nothing between calls: a release is found by exact tag
//! and updated in place, a file is created only when the provider reports it
//! missing.

pub mod gitea;
pub mod github;
mod http;
pub mod token;

#[cfg(test)]
pub(crate) mod mock;

use crate::core::artifact::Artifact;
use crate::core::context::Context;
use crate::core::error::PublishError;
use crate::core::template::Template;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::fs::File;
use tracing::debug;
use url::Url;

pub use gitea::GiteaClient;
pub use github::GithubClient;
pub use token::TokenManager;

/// Branch used when the provider cannot report a default branch
pub const FALLBACK_BRANCH: &str = "master";

/// Repository identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Repo {
    pub owner: String,
    pub name: String,
    pub branch: Option<String>,
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            branch: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Author and committer of file updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

/// One commit between two revisions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangelogItem {
    pub sha: String,
    /// First line of the commit message
    pub message: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_username: Option<String>,
}

/// How to merge an existing release body with freshly rendered notes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseNotesMode {
    /// Keep the stored body when it is not empty
    #[default]
    KeepExisting,
    Append,
    Prepend,
    Replace,
    /// Refuse to touch a release whose stored body differs from the new one
    ErrorIfExists,
}

impl ReleaseNotesMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseNotesMode::KeepExisting => "keep-existing",
            ReleaseNotesMode::Append => "append",
            ReleaseNotesMode::Prepend => "prepend",
            ReleaseNotesMode::Replace => "replace",
            ReleaseNotesMode::ErrorIfExists => "error-if-exists",
        }
    }
}

impl fmt::Display for ReleaseNotesMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseNotesMode {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "keep-existing" => Ok(ReleaseNotesMode::KeepExisting),
            "append" => Ok(ReleaseNotesMode::Append),
            "prepend" => Ok(ReleaseNotesMode::Prepend),
            "replace" => Ok(ReleaseNotesMode::Replace),
            "error-if-exists" => Ok(ReleaseNotesMode::ErrorIfExists),
            other => Err(PublishError::config(
                "releaseNotesMode",
                format!(
                    "unknown mode {:?}, expected keep-existing, append, prepend, replace or error-if-exists",
                    other
                ),
            )),
        }
    }
}

/// Merge the stored release body with the rendered one
pub fn release_notes(
    existing: &str,
    current: &str,
    mode: ReleaseNotesMode,
    tag: &str,
) -> Result<String, PublishError> {
    let existing_trimmed = existing.trim();
    let current_trimmed = current.trim();

    let notes = match mode {
        ReleaseNotesMode::Append if !existing_trimmed.is_empty() => {
            format!("{}\n\n{}", existing_trimmed, current_trimmed)
        }
        ReleaseNotesMode::Prepend if !existing_trimmed.is_empty() => {
            format!("{}\n\n{}", current_trimmed, existing_trimmed)
        }
        ReleaseNotesMode::KeepExisting if !existing_trimmed.is_empty() => existing.to_string(),
        ReleaseNotesMode::ErrorIfExists
            if !existing_trimmed.is_empty() && existing_trimmed != current_trimmed =>
        {
            return Err(PublishError::ReleaseNotesConflict {
                tag: tag.to_string(),
            });
        }
        _ => current.to_string(),
    };

    Ok(notes)
}

/// Everything needed to reconcile one release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRequest {
    pub repo: Repo,
    pub tag: String,
    pub title: String,
    pub body: String,
    pub draft: bool,
    pub prerelease: bool,
    pub target_commitish: String,
    pub notes_mode: ReleaseNotesMode,
}

/// Operations every hosting provider must support
#[async_trait]
pub trait ReleaseClient: Send + Sync {
    /// Provider name, used in logs
    fn name(&self) -> &'static str;

    /// Commits between two revisions, in the order the provider reports them
    async fn changelog(
        &self,
        repo: &Repo,
        previous: &str,
        current: &str,
    ) -> Result<Vec<ChangelogItem>, PublishError>;

    /// Close a milestone by title; fails with `NoMilestoneFound` when absent
    async fn close_milestone(&self, repo: &Repo, title: &str) -> Result<(), PublishError>;

    /// Create the file at `path`, or update it when it already exists
    async fn create_or_update_file(
        &self,
        repo: &Repo,
        author: &CommitAuthor,
        content: &[u8],
        path: &str,
        message: &str,
    ) -> Result<(), PublishError>;

    /// Create the release for the tag or update the existing one; returns its id
    async fn create_or_update_release(
        &self,
        request: &ReleaseRequest,
    ) -> Result<String, PublishError>;

    /// Take a release out of draft once its assets are attached
    async fn publish_release(&self, repo: &Repo, release_id: &str) -> Result<(), PublishError>;

    /// Per-asset download URL pattern with `.Tag` and `.ArtifactName` placeholders
    fn release_url_template(&self, repo: &Repo) -> Result<String, PublishError>;

    /// Attach a file to a release; every failure is retriable
    async fn upload(
        &self,
        repo: &Repo,
        release_id: &str,
        artifact: &Artifact,
        file: File,
    ) -> Result<(), PublishError>;
}

/// Strip the path from a rendered API endpoint, leaving the instance root
///
/// # Examples
///
/// ```
/// use release_publisher::client::resolve_root_url;
///
/// let root = resolve_root_url("https://git.example.com/api/v1", "giteaUrls.api").unwrap();
/// assert_eq!(root, "https://git.example.com");
/// ```
pub fn resolve_root_url(api_url: &str, field: &str) -> Result<String, PublishError> {
    let api_url = api_url.trim();
    if api_url.is_empty() {
        return Err(PublishError::config(field, "URL is empty"));
    }

    let mut url = Url::parse(api_url)
        .map_err(|e| PublishError::config(field, format!("invalid URL {:?}: {}", api_url, e)))?;
    url.set_path("");
    url.set_query(None);
    url.set_fragment(None);

    let root = url.as_str().trim_end_matches('/').to_string();
    if root.is_empty() {
        return Err(PublishError::config(field, format!("invalid URL {:?}", api_url)));
    }
    Ok(root)
}

/// First line of a commit message
pub(crate) fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().to_string()
}

/// Connection settings for one provider, already rendered
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Instance root for Gitea, API base for GitHub
    pub api_url: String,
    pub upload_url: String,
    pub download_url: String,
    pub skip_tls_verify: bool,
    pub token: Option<SecretString>,
}

/// Repository the release is published to
pub fn release_repo(ctx: &Context) -> Result<Repo, PublishError> {
    let release = &ctx.config.release;
    match (&release.gitea, &release.github) {
        (Some(repo), None) | (None, Some(repo)) => Ok(repo.to_repo()),
        (Some(_), Some(_)) => Err(PublishError::config(
            "release",
            "only one of release.gitea and release.github can be set",
        )),
        (None, None) => Err(PublishError::config("release", "no release repository configured")),
    }
}

/// Build the release client for the configured provider
pub fn new_client(ctx: &Context) -> Result<Arc<dyn ReleaseClient>, PublishError> {
    release_repo(ctx)?;
    let template = Template::new(ctx);
    let tokens = TokenManager::new();

    if ctx.config.release.gitea.is_some() {
        let urls = &ctx.config.gitea_urls;
        let api = template.apply(&urls.api)?;
        let settings = ProviderSettings {
            api_url: resolve_root_url(&api, "giteaUrls.api")?,
            upload_url: String::new(),
            download_url: template.apply(&urls.download)?.trim_end_matches('/').to_string(),
            skip_tls_verify: urls.skip_tls_verify,
            token: tokens.get_token(&ctx.env, "gitea"),
        };
        debug!(root = %settings.api_url, "using gitea");
        return Ok(Arc::new(GiteaClient::from_settings(&settings)?));
    }

    let urls = &ctx.config.github_urls;
    let api = template.apply(&urls.api)?;
    resolve_root_url(&api, "githubUrls.api")?;
    let upload = template.apply(&urls.upload)?;
    resolve_root_url(&upload, "githubUrls.upload")?;
    let settings = ProviderSettings {
        api_url: api,
        upload_url: upload,
        download_url: template.apply(&urls.download)?.trim_end_matches('/').to_string(),
        skip_tls_verify: urls.skip_tls_verify,
        token: tokens.get_token(&ctx.env, "github"),
    };
    debug!(api = %settings.api_url, "using github");
    Ok(Arc::new(GithubClient::from_settings(&settings)?))
}
