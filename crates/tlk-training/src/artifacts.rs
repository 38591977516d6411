use crate::error::{TrainingError, TrainingResult};
use crate::job::{LossSpec, OptimizerSpec};
use crate::types::UseCaseType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

/// Identifier for one distributed hand-off.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandoffId(pub String);

impl HandoffId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for HandoffId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HandoffId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Model graph and weights, without optimizer state.
    ModelWeights,
    OptimizerState,
    LossDescriptor,
    TrainDataset,
    ValidationDataset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

/// Index of everything a distributed worker needs to rebuild the training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffManifest {
    pub id: HandoffId,
    pub created_at: DateTime<Utc>,
    pub model_name: String,
    pub use_case: UseCaseType,
    pub optimizer: OptimizerSpec,
    pub loss: LossSpec,
    pub artifacts: Vec<HandoffArtifact>,
}

impl HandoffManifest {
    #[must_use]
    pub fn artifact(&self, kind: &ArtifactKind) -> Option<&HandoffArtifact> {
        self.artifacts.iter().find(|a| &a.kind == kind)
    }
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Digest of a directory tree: relative paths and file contents in sorted order.
pub fn sha256_dir(path: &Path) -> TrainingResult<String> {
    let mut hasher = Sha256::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| TrainingError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(path).map_err(|e| TrainingError::Other(e.into()))?;
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(std::fs::read(entry.path())?);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(kind: ArtifactKind, path: PathBuf) -> TrainingResult<HandoffArtifact> {
    if !path.exists() {
        return Err(TrainingError::NotFound(format!(
            "artifact path does not exist: {}",
            path.display()
        )));
    }

    let hash = if path.is_dir() { sha256_dir(&path)? } else { sha256_file(&path)? };
    Ok(HandoffArtifact { kind, path, sha256: hash })
}
