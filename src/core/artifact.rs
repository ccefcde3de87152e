//! Artifact references produced by upstream build stages
//!
//! Publishing never creates artifacts. It reads the list written by the
//! build step (`dist/artifacts.json`) and picks what to upload from it.

use crate::core::error::PublishError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Metadata key holding the artifact checksum (e.g. `sha256:<hex>`)
pub const CHECKSUM_KEY: &str = "checksum";

/// Kind of artifact, used to select the upload target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Archive,
    Binary,
    Checksum,
    Signature,
    File,
    DockerImage,
}

impl ArtifactKind {
    /// Whether artifacts of this kind are attached to the release
    pub fn is_uploadable(self) -> bool {
        !matches!(self, ArtifactKind::DockerImage)
    }
}

/// A single artifact reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub path: PathBuf,
    pub kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, kind: ArtifactKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn checksum(&self) -> Option<&str> {
        self.metadata_str(CHECKSUM_KEY)
    }
}

/// Run-scoped artifact registry
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    items: Vec<Artifact>,
}

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the artifact list written by the build step
    pub async fn load(path: &Path) -> Result<Self, PublishError> {
        let content = fs::read_to_string(path).await?;
        let items: Vec<Artifact> =
            serde_json::from_str(&content).map_err(|e| PublishError::Serialization {
                what: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { items })
    }

    pub fn add(&mut self, artifact: Artifact) {
        self.items.push(artifact);
    }

    pub fn list(&self) -> &[Artifact] {
        &self.items
    }

    pub fn uploadable(&self) -> Vec<Artifact> {
        self.items
            .iter()
            .filter(|a| a.kind.is_uploadable())
            .cloned()
            .collect()
    }

    pub fn by_kinds(&self, kinds: &[ArtifactKind]) -> Vec<&Artifact> {
        self.items.iter().filter(|a| kinds.contains(&a.kind)).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<Vec<Artifact>> for Artifacts {
    fn from(items: Vec<Artifact>) -> Self {
        Self { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_uploadable_excludes_docker_images() {
        let artifacts = Artifacts::from(vec![
            Artifact::new("tool.tar.gz", "dist/tool.tar.gz", ArtifactKind::Archive),
            Artifact::new("ghcr.io/acme/tool:1.0.0", "", ArtifactKind::DockerImage),
            Artifact::new("checksums.txt", "dist/checksums.txt", ArtifactKind::Checksum),
        ]);

        let names: Vec<_> = artifacts.uploadable().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["tool.tar.gz", "checksums.txt"]);
    }

    #[test]
    fn test_checksum_metadata() {
        let artifact = Artifact::new("tool.zip", "dist/tool.zip", ArtifactKind::Archive)
            .with_metadata(CHECKSUM_KEY, "sha256:abc");
        assert_eq!(artifact.checksum(), Some("sha256:abc"));
        assert_eq!(artifact.metadata_str("missing"), None);
    }

    #[tokio::test]
    async fn test_load_artifacts_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("artifacts.json");
        std::fs::write(
            &path,
            r#"[
                {"name": "tool_linux_amd64.tar.gz", "path": "dist/tool_linux_amd64.tar.gz", "kind": "archive",
                 "metadata": {"checksum": "sha256:1234"}},
                {"name": "tool", "path": "dist/tool", "kind": "binary"}
            ]"#,
        )
        .unwrap();

        let artifacts = Artifacts::load(&path).await.unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts.list()[0].checksum(), Some("sha256:1234"));
        assert_eq!(artifacts.by_kinds(&[ArtifactKind::Binary]).len(), 1);
    }

    #[tokio::test]
    async fn test_load_invalid_json_is_serialization_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("artifacts.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = Artifacts::load(&path).await.unwrap_err();
        assert_eq!(err.code(), "SERIALIZATION_ERROR");
    }
}
