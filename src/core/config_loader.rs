//! Configuration file loader for release-publisher
//!
//! This module provides configuration loading, validation, and merging capabilities.

use super::config::*;
use crate::core::error::PublishError;
use regex::Regex;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".release-publisher.yaml";

/// Environment variable pattern (${VAR_NAME})
const ENV_VAR_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]*)\}";

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Project path to load config from
    pub project_path: PathBuf,

    /// Explicit config file (overrides `<project_path>/.release-publisher.yaml`)
    pub config_file: Option<PathBuf>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "release.gitea.owner")
    pub field: String,
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with priority (high to low):
    /// 1. Environment overrides (`RELEASE_PUBLISHER_*`)
    /// 2. Project config file (and the files it extends)
    /// 3. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<PublishConfig, PublishError> {
        let path = options
            .config_file
            .clone()
            .unwrap_or_else(|| options.project_path.join(CONFIG_FILENAME));

        let mut config = match Self::load_config_file(&path, Vec::new()).await? {
            Some(mut value) => {
                Self::expand_env_vars(&mut value, &options.env)?;
                serde_yaml::from_value(value).map_err(|e| {
                    PublishError::config(path.display().to_string(), format!("failed to parse YAML config: {}", e))
                })?
            }
            None => {
                debug!(path = %path.display(), "no config file, using defaults");
                PublishConfig::default()
            }
        };

        Self::apply_env_overrides(&mut config, &options.env)?;
        Ok(config)
    }

    /// Load a YAML file as a raw value, resolving `extends` recursively
    ///
    /// `chain` holds the canonical paths of the files extending this one.
    fn load_config_file(
        file_path: &Path,
        mut chain: Vec<PathBuf>,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Option<Value>, PublishError>> + Send + '_>,
    > {
        Box::pin(async move {
            if !file_path.exists() {
                return Ok(None);
            }

            let canonical = fs::canonicalize(file_path).await.map_err(|e| {
                PublishError::config(file_path.display().to_string(), format!("failed to resolve config file: {}", e))
            })?;
            if chain.contains(&canonical) {
                let cycle: Vec<_> = chain
                    .iter()
                    .chain(std::iter::once(&canonical))
                    .map(|p| p.display().to_string())
                    .collect();
                return Err(PublishError::config(
                    "extends",
                    format!("circular extends: {}", cycle.join(" -> ")),
                ));
            }
            chain.push(canonical);

            let content = fs::read_to_string(file_path).await.map_err(|e| {
                PublishError::config(file_path.display().to_string(), format!("failed to read config file: {}", e))
            })?;

            let value: Value = serde_yaml::from_str(&content).map_err(|e| {
                PublishError::config(file_path.display().to_string(), format!("failed to parse YAML config: {}", e))
            })?;

            let extends = value
                .get("extends")
                .and_then(Value::as_str)
                .map(str::to_string);

            if let Some(extends_path) = extends {
                let base_path = file_path
                    .parent()
                    .ok_or_else(|| PublishError::config("extends", "invalid config file path"))?
                    .join(&extends_path);

                match Self::load_config_file(&base_path, chain).await? {
                    Some(base) => return Ok(Some(Self::merge_values(base, value))),
                    None => {
                        return Err(PublishError::config(
                            "extends",
                            format!("base config {} not found", base_path.display()),
                        ));
                    }
                }
            }

            Ok(Some(value))
        })
    }

    /// Deep-merge `overlay` into `base`; mappings merge key by key, everything else is replaced
    fn merge_values(base: Value, overlay: Value) -> Value {
        match (base, overlay) {
            (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
                for (key, overlay_value) in overlay_map {
                    let merged = match base_map.remove(&key) {
                        Some(base_value) => Self::merge_values(base_value, overlay_value),
                        None => overlay_value,
                    };
                    base_map.insert(key, merged);
                }
                Value::Mapping(base_map)
            }
            (_, overlay) => overlay,
        }
    }

    /// Expand `${VAR}` placeholders in every string scalar
    fn expand_env_vars(value: &mut Value, env: &HashMap<String, String>) -> Result<(), PublishError> {
        let env_var_regex = Regex::new(ENV_VAR_PATTERN)
            .map_err(|e| PublishError::config("env", e.to_string()))?;
        Self::expand_value(value, env, &env_var_regex);
        Ok(())
    }

    fn expand_value(value: &mut Value, env: &HashMap<String, String>, pattern: &Regex) {
        match value {
            Value::String(s) => *s = Self::expand_string(s, env, pattern),
            Value::Sequence(items) => {
                for item in items {
                    Self::expand_value(item, env, pattern);
                }
            }
            Value::Mapping(map) => {
                for (_, item) in map.iter_mut() {
                    Self::expand_value(item, env, pattern);
                }
            }
            _ => {}
        }
    }

    /// Expand environment variables in a single string
    fn expand_string(input: &str, env: &HashMap<String, String>, pattern: &Regex) -> String {
        let mut result = input.to_string();
        for cap in pattern.captures_iter(input) {
            let var_name = &cap[1];
            match env.get(var_name) {
                Some(value) => result = result.replace(&format!("${{{}}}", var_name), value),
                None => warn!(variable = var_name, "environment variable not found"),
            }
        }
        result
    }

    /// Apply `RELEASE_PUBLISHER_*` environment overrides
    fn apply_env_overrides(
        config: &mut PublishConfig,
        env: &HashMap<String, String>,
    ) -> Result<(), PublishError> {
        if let Some(draft) = env.get("RELEASE_PUBLISHER_DRAFT") {
            config.release.draft = parse_bool("RELEASE_PUBLISHER_DRAFT", draft)?;
        }

        if let Some(mode) = env.get("RELEASE_PUBLISHER_RELEASE_NOTES_MODE") {
            config.release.release_notes_mode = mode.parse()?;
        }

        if let Some(skip) = env.get("RELEASE_PUBLISHER_SKIP_UPLOAD") {
            config.release.skip_upload = parse_bool("RELEASE_PUBLISHER_SKIP_UPLOAD", skip)?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(config: &PublishConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if config.version != SCHEMA_VERSION {
            warnings.push(ConfigValidationWarning {
                field: "version".to_string(),
                message: format!("Unknown version: {}", config.version),
                suggestion: Some(format!("Currently supported version is \"{}\" only", SCHEMA_VERSION)),
            });
        }

        Self::validate_release(config, &mut errors, &mut warnings);

        if config.upload.max_concurrency == 0 {
            errors.push(ConfigValidationError {
                field: "upload.maxConcurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if config.upload.max_attempts == 0 {
            errors.push(ConfigValidationError {
                field: "upload.maxAttempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        for (i, manifest) in config.manifests.iter().enumerate() {
            if manifest.name.is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("manifests[{}].name", i),
                    message: "name is required".to_string(),
                });
            }
            Self::validate_repo(&format!("manifests[{}].repository", i), &manifest.repository, &mut errors);
        }

        for (i, milestone) in config.milestones.iter().enumerate() {
            if let Some(repo) = &milestone.repo {
                Self::validate_repo(&format!("milestones[{}].repo", i), repo, &mut errors);
            }
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    fn validate_release(
        config: &PublishConfig,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        let release = &config.release;
        match (&release.gitea, &release.github) {
            (Some(_), Some(_)) => errors.push(ConfigValidationError {
                field: "release".to_string(),
                message: "only one of release.gitea and release.github may be set".to_string(),
            }),
            (None, None) => errors.push(ConfigValidationError {
                field: "release".to_string(),
                message: "a release repository (release.gitea or release.github) is required".to_string(),
            }),
            (Some(repo), None) => {
                Self::validate_repo("release.gitea", repo, errors);
                if config.gitea_urls.api.is_empty() {
                    errors.push(ConfigValidationError {
                        field: "giteaUrls.api".to_string(),
                        message: "API URL is required for Gitea releases".to_string(),
                    });
                }
                if config.gitea_urls.download.is_empty() {
                    warnings.push(ConfigValidationWarning {
                        field: "giteaUrls.download".to_string(),
                        message: "download URL is empty, asset URLs will be relative".to_string(),
                        suggestion: Some("set giteaUrls.download to the instance root".to_string()),
                    });
                }
            }
            (None, Some(repo)) => Self::validate_repo("release.github", repo, errors),
        }

        if release.disable && release.skip_upload {
            warnings.push(ConfigValidationWarning {
                field: "release.skipUpload".to_string(),
                message: "has no effect while release.disable is set".to_string(),
                suggestion: None,
            });
        }
    }

    fn validate_repo(field: &str, repo: &RepoConfig, errors: &mut Vec<ConfigValidationError>) {
        if repo.owner.is_empty() {
            errors.push(ConfigValidationError {
                field: format!("{}.owner", field),
                message: "owner is required".to_string(),
            });
        }
        if repo.name.is_empty() {
            errors.push(ConfigValidationError {
                field: format!("{}.name", field),
                message: "name is required".to_string(),
            });
        }
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, PublishError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(PublishError::config(field, format!("expected a boolean, got {:?}", other))),
    }
}
