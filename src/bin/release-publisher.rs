//! Release Publisher CLI
//!
//! Publishes a tagged release and its artifacts to Gitea or GitHub

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use release_publisher::core::config::PublishConfig;
use release_publisher::core::config_loader::{ConfigLoadOptions, ConfigLoader};
use release_publisher::core::git::{GitOverrides, resolve_git_info};
use release_publisher::{Artifacts, Context, GitInfo, Skip, new_client, publishing_pipeline};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Artifact list written by the build step, relative to the project
const DEFAULT_ARTIFACTS: &str = "dist/artifacts.json";

/// Publish releases to Gitea or GitHub
#[derive(Parser)]
#[command(name = "release-publisher")]
#[command(version)]
#[command(about = "Publish releases and artifacts to source-control hosts", long_about = None)]
struct Cli {
    /// Verbose logging (overridden by RUST_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the publishing pipeline for the current tag
    Publish {
        /// Project path (defaults to current directory)
        #[arg(value_name = "PROJECT_PATH")]
        project_path: Option<PathBuf>,

        /// Configuration file (defaults to PROJECT_PATH/.release-publisher.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Tag to release (defaults to the latest tag)
        #[arg(long)]
        tag: Option<String>,

        /// Tag the changelog starts from (defaults to the tag before --tag)
        #[arg(long)]
        previous_tag: Option<String>,

        /// Commit the release points at (defaults to HEAD)
        #[arg(long)]
        commit: Option<String>,

        /// Artifact list (defaults to PROJECT_PATH/dist/artifacts.json)
        #[arg(long)]
        artifacts: Option<PathBuf>,

        /// Use this file as release notes instead of generating a changelog
        #[arg(long)]
        release_notes: Option<PathBuf>,

        /// Abort on the first failure, even in continuable stages
        #[arg(long, env = "RELEASE_PUBLISHER_FAIL_FAST")]
        fail_fast: bool,

        /// Comma-separated stages to skip (publish, changelog, release, manifest, milestone)
        #[arg(long, value_delimiter = ',')]
        skip: Vec<Skip>,
    },

    /// Validate the configuration without publishing
    Check {
        /// Project path (defaults to current directory)
        #[arg(value_name = "PROJECT_PATH")]
        project_path: Option<PathBuf>,

        /// Configuration file (defaults to PROJECT_PATH/.release-publisher.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Publish {
            project_path,
            config,
            tag,
            previous_tag,
            commit,
            artifacts,
            release_notes,
            fail_fast,
            skip,
        } => {
            let path = project_path.unwrap_or_else(|| PathBuf::from("."));
            let overrides = GitOverrides {
                tag,
                previous_tag,
                commit,
            };
            publish_command(path, config, overrides, artifacts, release_notes, fail_fast, skip).await
        }
        Commands::Check {
            project_path,
            config,
        } => {
            let path = project_path.unwrap_or_else(|| PathBuf::from("."));
            check_command(path, config).await
        }
    }
}

/// Load and validate the configuration, logging every finding
async fn load_config(
    project_path: &Path,
    config_file: Option<PathBuf>,
    env: &HashMap<String, String>,
) -> Result<(PublishConfig, bool)> {
    let config = ConfigLoader::load(ConfigLoadOptions {
        project_path: project_path.to_path_buf(),
        config_file,
        env: env.clone(),
    })
    .await
    .context("failed to load configuration")?;

    let validation = ConfigLoader::validate(&config);
    for warning in &validation.warnings {
        match &warning.suggestion {
            Some(suggestion) => warn!(field = %warning.field, suggestion = %suggestion, "{}", warning.message),
            None => warn!(field = %warning.field, "{}", warning.message),
        }
    }
    for issue in &validation.errors {
        error!(field = %issue.field, "{}", issue.message);
    }

    Ok((config, validation.valid))
}

async fn load_artifacts(project_path: &Path, explicit: Option<PathBuf>) -> Result<Artifacts> {
    let path = match explicit {
        Some(path) => path,
        None => {
            let default = project_path.join(DEFAULT_ARTIFACTS);
            if !tokio::fs::try_exists(&default).await.unwrap_or(false) {
                debug!(path = %default.display(), "no artifact list, nothing to upload");
                return Ok(Artifacts::new());
            }
            default
        }
    };

    Artifacts::load(&path)
        .await
        .with_context(|| format!("failed to load artifacts from {}", path.display()))
}

async fn publish_command(
    project_path: PathBuf,
    config_file: Option<PathBuf>,
    overrides: GitOverrides,
    artifacts: Option<PathBuf>,
    release_notes: Option<PathBuf>,
    fail_fast: bool,
    skip: Vec<Skip>,
) -> Result<i32> {
    let env: HashMap<String, String> = std::env::vars().collect();

    let (config, valid) = load_config(&project_path, config_file, &env).await?;
    if !valid {
        bail!("configuration is invalid");
    }

    let git = resolve_git_info(&project_path, overrides).await?;
    let artifacts = load_artifacts(&project_path, artifacts).await?;
    info!(tag = %git.current_tag, commit = %git.commit, artifacts = artifacts.len(), "releasing");

    let mut ctx = Context::new(config, git)
        .with_env(env)
        .with_artifacts(artifacts)
        .with_skips(skip)
        .with_fail_fast(fail_fast);

    if let Some(notes) = release_notes {
        ctx.release_notes = tokio::fs::read_to_string(&notes)
            .await
            .with_context(|| format!("failed to read release notes from {}", notes.display()))?;
    }

    let client = new_client(&ctx)?;
    publishing_pipeline(client).run(&mut ctx).await?;

    match &ctx.release {
        Some(release) => info!(id = %release.id, "release succeeded"),
        None => info!("release succeeded"),
    }
    Ok(0)
}

async fn check_command(project_path: PathBuf, config_file: Option<PathBuf>) -> Result<i32> {
    let env: HashMap<String, String> = std::env::vars().collect();

    let (config, valid) = load_config(&project_path, config_file, &env).await?;
    if !valid {
        return Ok(1);
    }

    // Endpoints may reference .Tag; a placeholder is enough to resolve them
    let ctx = Context::new(
        config,
        GitInfo {
            current_tag: "v0.0.0".to_string(),
            previous_tag: None,
            commit: String::new(),
        },
    )
    .with_env(env);
    let client = new_client(&ctx)?;

    info!(provider = client.name(), "configuration is valid");
    Ok(0)
}
