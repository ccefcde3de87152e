//! Test fixtures: ready-made contexts

use crate::core::config::{PublishConfig, RepoConfig};
use crate::core::context::{Context, GitInfo};

pub(crate) fn repo_config(owner: &str, name: &str) -> RepoConfig {
    RepoConfig {
        owner: owner.to_string(),
        name: name.to_string(),
        branch: None,
    }
}

/// Context releasing `acme/tool` v1.1.0 to Gitea
pub(crate) fn gitea_context() -> Context {
    let mut config = PublishConfig::default();
    config.project_name = "tool".to_string();
    config.release.gitea = Some(repo_config("acme", "tool"));
    config.gitea_urls.api = "https://git.example.com/api/v1".to_string();
    config.gitea_urls.download = "https://git.example.com".to_string();

    Context::new(
        config,
        GitInfo {
            current_tag: "v1.1.0".to_string(),
            previous_tag: Some("v1.0.0".to_string()),
            commit: "0123456789abcdef0123".to_string(),
        },
    )
}
