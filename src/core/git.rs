//! Git state lookup through a whitelisted command executor
//!
//! Arguments are passed as a vector to `tokio::process::Command`, never
//! interpolated into a shell string.

use crate::core::context::GitInfo;
use crate::core::error::PublishError;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Only these commands can be executed
const ALLOWED_COMMANDS: &[&str] = &["git"];

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Command executor bound to a working directory
#[derive(Debug)]
pub struct CommandExecutor {
    working_dir: PathBuf,
    timeout: Duration,
}

impl CommandExecutor {
    /// Create an executor; the working directory must exist
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self, PublishError> {
        let working_dir = working_dir.as_ref().to_path_buf();

        if !working_dir.is_dir() {
            return Err(PublishError::Git(format!(
                "working directory does not exist: {}",
                working_dir.display()
            )));
        }

        Ok(Self {
            working_dir,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub async fn execute(&self, command: &str, args: &[&str]) -> Result<Output, PublishError> {
        if !ALLOWED_COMMANDS.contains(&command) {
            return Err(PublishError::Git(format!(
                "command '{}' is not in the allowed whitelist",
                command
            )));
        }

        debug!(command, ?args, "executing");
        let child = Command::new(command)
            .args(args)
            .current_dir(&self.working_dir)
            .kill_on_drop(true)
            .output();

        timeout(self.timeout, child)
            .await
            .map_err(|_| PublishError::Git(format!("{} timed out after {:?}", command, self.timeout)))?
            .map_err(|e| PublishError::Git(format!("failed to run {}: {}", command, e)))
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit
    async fn git(&self, args: &[&str]) -> Result<String, PublishError> {
        let output = self.execute("git", args).await?;
        if !output.status.success() {
            return Err(PublishError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Values given on the command line take precedence over git lookups
#[derive(Debug, Clone, Default)]
pub struct GitOverrides {
    pub tag: Option<String>,
    pub previous_tag: Option<String>,
    pub commit: Option<String>,
}

/// Resolve the current tag, previous tag and commit of a checkout
pub async fn resolve_git_info(
    project_path: &Path,
    overrides: GitOverrides,
) -> Result<GitInfo, PublishError> {
    let executor = CommandExecutor::new(project_path)?;

    let current_tag = match overrides.tag {
        Some(tag) => tag,
        None => executor.git(&["describe", "--tags", "--abbrev=0"]).await?,
    };

    let commit = match overrides.commit {
        Some(commit) => commit,
        None => executor.git(&["rev-parse", "HEAD"]).await?,
    };

    // The first tag of a repository has no predecessor
    let previous_tag = match overrides.previous_tag {
        Some(tag) => Some(tag),
        None => {
            let parent = format!("{}^", current_tag);
            executor
                .git(&["describe", "--tags", "--abbrev=0", &parent])
                .await
                .ok()
                .filter(|t| !t.is_empty())
        }
    };

    Ok(GitInfo {
        current_tag,
        previous_tag,
        commit,
    })
}
