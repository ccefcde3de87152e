//! Configuration structures and types for release-publisher
//!
//! This module provides type-safe configuration management with serde support.
//! Fields holding templates (`nameTemplate`, `api`, `download`, ...) are stored
//! raw and rendered against the run context right before use.

use crate::client::{ReleaseNotesMode, Repo};
use serde::{Deserialize, Serialize};

/// Current configuration schema version
pub const SCHEMA_VERSION: &str = "1.0";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishConfig {
    /// Schema version
    #[serde(default = "default_schema_version")]
    pub version: String,

    /// Extend from base configuration file (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    /// Project name, available to templates as `.ProjectName`
    #[serde(default)]
    pub project_name: String,

    #[serde(default)]
    pub release: ReleaseConfig,

    #[serde(default)]
    pub gitea_urls: GiteaUrls,

    #[serde(default)]
    pub github_urls: GithubUrls,

    #[serde(default)]
    pub changelog: ChangelogConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    /// Package-manager manifests committed to a repository after the release
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<ManifestConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub milestones: Vec<MilestoneConfig>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            version: default_schema_version(),
            extends: None,
            project_name: String::new(),
            release: ReleaseConfig::default(),
            gitea_urls: GiteaUrls::default(),
            github_urls: GithubUrls::default(),
            changelog: ChangelogConfig::default(),
            upload: UploadConfig::default(),
            manifests: Vec::new(),
            milestones: Vec::new(),
        }
    }
}

/// Repository coordinates as written in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoConfig {
    pub owner: String,
    pub name: String,

    /// Branch to commit files to (default: provider default branch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl RepoConfig {
    pub fn to_repo(&self) -> Repo {
        Repo {
            owner: self.owner.clone(),
            name: self.name.clone(),
            branch: self.branch.clone().filter(|b| !b.is_empty()),
        }
    }
}

/// Prerelease detection mode
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PrereleaseMode {
    /// Prerelease when the tag carries a semver pre-release suffix
    #[default]
    Auto,
    Always,
    Never,
}

/// Release configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitea: Option<RepoConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<RepoConfig>,

    /// Release title template (default: "{{ .Tag }}")
    #[serde(default = "default_name_template")]
    pub name_template: String,

    /// Target commitish template (default: current commit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_commitish: Option<String>,

    #[serde(default)]
    pub draft: bool,

    #[serde(default)]
    pub prerelease: PrereleaseMode,

    #[serde(default)]
    pub release_notes_mode: ReleaseNotesMode,

    /// Do not create or update the release at all
    #[serde(default)]
    pub disable: bool,

    /// Reconcile the release but do not attach artifacts
    #[serde(default)]
    pub skip_upload: bool,
}

fn default_name_template() -> String {
    "{{ .Tag }}".to_string()
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            gitea: None,
            github: None,
            name_template: default_name_template(),
            target_commitish: None,
            draft: false,
            prerelease: PrereleaseMode::default(),
            release_notes_mode: ReleaseNotesMode::default(),
            disable: false,
            skip_upload: false,
        }
    }
}

/// Gitea endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GiteaUrls {
    /// API endpoint template, e.g. "https://gitea.example.com/api/v1"
    #[serde(default)]
    pub api: String,

    /// Download base template, e.g. "https://gitea.example.com"
    #[serde(default)]
    pub download: String,

    #[serde(default)]
    pub skip_tls_verify: bool,
}

/// GitHub endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GithubUrls {
    #[serde(default = "default_github_api")]
    pub api: String,

    #[serde(default = "default_github_upload")]
    pub upload: String,

    #[serde(default = "default_github_download")]
    pub download: String,

    #[serde(default)]
    pub skip_tls_verify: bool,
}

fn default_github_api() -> String {
    "https://api.github.com/".to_string()
}

fn default_github_upload() -> String {
    "https://uploads.github.com/".to_string()
}

fn default_github_download() -> String {
    "https://github.com".to_string()
}

impl Default for GithubUrls {
    fn default() -> Self {
        Self {
            api: default_github_api(),
            upload: default_github_upload(),
            download: default_github_download(),
            skip_tls_verify: false,
        }
    }
}

/// Changelog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChangelogConfig {
    #[serde(default)]
    pub disable: bool,
}

/// Asset upload tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfig {
    /// Maximum concurrent asset uploads (default: 4)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Attempts per asset, first try included (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds (default: 500)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Commit author for file updates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitAuthorConfig {
    #[serde(default = "default_author_name")]
    pub name: String,

    #[serde(default = "default_author_email")]
    pub email: String,
}

fn default_author_name() -> String {
    "release-publisher-bot".to_string()
}

fn default_author_email() -> String {
    "bot@release-publisher.invalid".to_string()
}

impl Default for CommitAuthorConfig {
    fn default() -> Self {
        Self {
            name: default_author_name(),
            email: default_author_email(),
        }
    }
}

/// Package-manager manifest committed to a repository
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestConfig {
    /// Manifest (package) name
    pub name: String,

    /// Repository holding the manifest (a bucket, tap, index, ...)
    pub repository: RepoConfig,

    /// Path inside the repository (default: "<name>.json")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default)]
    pub commit_author: CommitAuthorConfig,

    #[serde(default = "default_commit_msg_template")]
    pub commit_msg_template: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Render the manifest but do not commit it
    #[serde(default)]
    pub skip_upload: bool,
}

fn default_commit_msg_template() -> String {
    "Manifest update for {{ .ProjectName }} version {{ .Tag }}".to_string()
}

/// Milestone handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneConfig {
    /// Repository owning the milestone (default: the release repository)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<RepoConfig>,

    #[serde(default)]
    pub close: bool,

    /// Fail the stage when the milestone does not exist
    #[serde(default)]
    pub fail_on_error: bool,

    #[serde(default = "default_name_template")]
    pub name_template: String,
}

impl Default for MilestoneConfig {
    fn default() -> Self {
        Self {
            repo: None,
            close: false,
            fail_on_error: false,
            name_template: default_name_template(),
        }
    }
}
