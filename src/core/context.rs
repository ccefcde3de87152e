//! Run-scoped context shared by every stage of a publishing run
//!
//! Stages run one after another and may publish state for later stages
//! (release notes, the release id and its download URL pattern).

use crate::core::artifact::Artifacts;
use crate::core::config::{PrereleaseMode, PublishConfig};
use crate::core::error::PublishError;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Git state of the revision being released
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitInfo {
    pub current_tag: String,
    pub previous_tag: Option<String>,
    pub commit: String,
}

/// Parts of the run a user can skip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Skip {
    Publish,
    Changelog,
    Release,
    Manifest,
    Milestone,
}

impl Skip {
    pub fn as_str(&self) -> &'static str {
        match self {
            Skip::Publish => "publish",
            Skip::Changelog => "changelog",
            Skip::Release => "release",
            Skip::Manifest => "manifest",
            Skip::Milestone => "milestone",
        }
    }

    pub fn all() -> &'static [Skip] {
        &[
            Skip::Publish,
            Skip::Changelog,
            Skip::Release,
            Skip::Manifest,
            Skip::Milestone,
        ]
    }
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Skip {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Skip::all()
            .iter()
            .copied()
            .find(|skip| skip.as_str() == s.trim())
            .ok_or_else(|| {
                let valid: Vec<_> = Skip::all().iter().map(Skip::as_str).collect();
                PublishError::config("skip", format!("unknown value {:?}, expected one of {}", s, valid.join(", ")))
            })
    }
}

/// Release published by the release stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRelease {
    pub id: String,

    /// Download URL pattern, see `ReleaseClient::release_url_template`
    pub url_template: String,
}

/// Run context
#[derive(Debug, Clone)]
pub struct Context {
    pub config: PublishConfig,
    pub git: GitInfo,

    /// Tag without the leading `v`
    pub version: String,
    pub prerelease: bool,

    /// Turn every continuable stage failure into a fatal one
    pub fail_fast: bool,
    pub skips: HashSet<Skip>,
    pub artifacts: Artifacts,
    pub env: HashMap<String, String>,
    pub date: DateTime<Utc>,

    /// Release notes body, generated by the changelog stage or supplied by the user
    pub release_notes: String,
    pub release: Option<PublishedRelease>,
}

impl Context {
    pub fn new(config: PublishConfig, git: GitInfo) -> Self {
        let version = git
            .current_tag
            .strip_prefix('v')
            .unwrap_or(&git.current_tag)
            .to_string();
        let prerelease = match config.release.prerelease {
            PrereleaseMode::Always => true,
            PrereleaseMode::Never => false,
            PrereleaseMode::Auto => semver::Version::parse(&version)
                .map(|v| !v.pre.is_empty())
                .unwrap_or(false),
        };

        Self {
            config,
            git,
            version,
            prerelease,
            fail_fast: false,
            skips: HashSet::new(),
            artifacts: Artifacts::new(),
            env: HashMap::new(),
            date: Utc::now(),
            release_notes: String::new(),
            release: None,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_skips(mut self, skips: impl IntoIterator<Item = Skip>) -> Self {
        self.skips.extend(skips);
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn skip(&self, skip: Skip) -> bool {
        self.skips.contains(&skip)
    }
}
