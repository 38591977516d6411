//! File-based hand-off to an out-of-process distributed training job.
//!
//! The work directory holds, side by side:
//!
//! - the saved model (`saved_model.pb`, `variables/`, `assets/`) without optimizer state
//! - `saved_optimizer.json`: optimizer class, learning rate and arguments
//! - `saved_loss.json`: loss class and constructor arguments
//! - `train_data/` and optionally `val_data/`: dataset descriptors
//! - `handoff_manifest.json`: digests of all of the above
//!
//! Workers read the manifest, rebuild optimizer and loss from their
//! descriptors and load the datasets. [`DistributedWorkspace::cleanup`]
//! removes the known entries afterwards.

use crate::artifacts::{make_artifact, ArtifactKind, HandoffId, HandoffManifest};
use crate::dataset::DatasetHandle;
use crate::error::{TrainingError, TrainingResult};
use crate::job::{LossSpec, OptimizerSpec};
use crate::layout::copy_dir;
use crate::types::UseCaseType;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MANIFEST_FILE: &str = "handoff_manifest.json";
pub const OPTIMIZER_FILE: &str = "saved_optimizer.json";
pub const LOSS_FILE: &str = "saved_loss.json";
pub const TRAIN_DATA_DIR: &str = "train_data";
pub const VAL_DATA_DIR: &str = "val_data";

const CLEANUP_DIRS: [&str; 5] = [TRAIN_DATA_DIR, VAL_DATA_DIR, "variables", "assets", "model_checkpoints"];
const CLEANUP_FILES: [&str; 4] = ["checkpoint", "keras_metadata.pb", "saved_model.pb", MANIFEST_FILE];

/// Entries of a source model directory that hold optimizer state.
pub const OPTIMIZER_ENTRIES: [&str; 2] = ["model_checkpoints", "checkpoint"];

/// What the hand-off carries besides the model weights.
#[derive(Debug, Clone, Copy)]
pub struct HandoffPayload<'a> {
    pub model_name: &'a str,
    pub use_case: UseCaseType,
    pub optimizer: &'a OptimizerSpec,
    pub loss: &'a LossSpec,
    pub train_data: &'a DatasetHandle,
    pub val_data: Option<&'a DatasetHandle>,
}

/// The fixed work directory shared with distributed workers.
#[derive(Debug, Clone)]
pub struct DistributedWorkspace {
    root: PathBuf,
}

impl Default for DistributedWorkspace {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("tlk_distributed"))
    }
}

impl DistributedWorkspace {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Write the SavedModel in `model_dir` and the payload into the work directory.
    pub fn export(&self, model_dir: &Path, payload: &HandoffPayload<'_>) -> TrainingResult<HandoffManifest> {
        self.export_with(payload, |root| copy_dir(model_dir, root, &OPTIMIZER_ENTRIES))
    }

    /// Like [`DistributedWorkspace::export`], with `write_model` placing a
    /// SavedModel into the work directory.
    pub fn export_with(
        &self,
        payload: &HandoffPayload<'_>,
        write_model: impl FnOnce(&Path) -> TrainingResult<()>,
    ) -> TrainingResult<HandoffManifest> {
        payload.optimizer.validate()?;
        payload.loss.validate()?;
        std::fs::create_dir_all(&self.root)?;

        write_model(&self.root)?;

        let optimizer_path = self.root.join(OPTIMIZER_FILE);
        std::fs::write(&optimizer_path, serde_json::to_string_pretty(payload.optimizer)?)?;

        let loss_path = self.root.join(LOSS_FILE);
        std::fs::write(&loss_path, serde_json::to_string_pretty(payload.loss)?)?;

        let train_dir = self.root.join(TRAIN_DATA_DIR);
        payload.train_data.save(&train_dir)?;

        let mut artifacts = vec![
            make_artifact(ArtifactKind::ModelWeights, self.root.join("saved_model.pb"))?,
            make_artifact(ArtifactKind::OptimizerState, optimizer_path)?,
            make_artifact(ArtifactKind::LossDescriptor, loss_path)?,
            make_artifact(ArtifactKind::TrainDataset, train_dir)?,
        ];

        if let Some(val_data) = payload.val_data {
            let val_dir = self.root.join(VAL_DATA_DIR);
            val_data.save(&val_dir)?;
            artifacts.push(make_artifact(ArtifactKind::ValidationDataset, val_dir)?);
        }

        let manifest = HandoffManifest {
            id: HandoffId::new(),
            created_at: chrono::Utc::now(),
            model_name: payload.model_name.to_string(),
            use_case: payload.use_case,
            optimizer: payload.optimizer.clone(),
            loss: payload.loss.clone(),
            artifacts,
        };
        std::fs::write(self.manifest_path(), serde_json::to_string_pretty(&manifest)?)?;

        info!(id = %manifest.id, root = %self.root.display(), "Saved objects for distributed training");
        Ok(manifest)
    }

    pub fn load_manifest(&self) -> TrainingResult<HandoffManifest> {
        let path = self.manifest_path();
        let bytes = std::fs::read(&path).map_err(|e| {
            TrainingError::NotFound(format!("no hand-off manifest at {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Remove the hand-off entries. Missing entries are logged, never an error.
    pub fn cleanup(&self) -> TrainingResult<Vec<PathBuf>> {
        let mut removed = Vec::new();

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "Distributed work directory already cleaned up");
                return Ok(removed);
            }
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let path = entry.path();

            let result = if path.is_dir() && CLEANUP_DIRS.contains(&name.as_str()) {
                std::fs::remove_dir_all(&path)
            } else if path.is_file() && (CLEANUP_FILES.contains(&name.as_str()) || name.starts_with("saved")) {
                std::fs::remove_file(&path)
            } else {
                continue;
            };

            match result {
                Ok(()) => removed.push(path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    info!("'{name}' already cleaned up.");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetKind;
    use crate::job::OptimizerClass;
    use crate::types::FrameworkType;
    use tempfile::TempDir;

    fn saved_model(root: &Path) -> PathBuf {
        let dir = root.join("model");
        std::fs::create_dir_all(dir.join("variables")).unwrap();
        std::fs::create_dir_all(dir.join("model_checkpoints")).unwrap();
        std::fs::write(dir.join("saved_model.pb"), "graph").unwrap();
        std::fs::write(dir.join("keras_metadata.pb"), "meta").unwrap();
        std::fs::write(dir.join("variables").join("variables.index"), "idx").unwrap();
        std::fs::write(dir.join("model_checkpoints").join("ckpt-1"), "opt").unwrap();
        dir
    }

    fn dataset(root: &Path) -> DatasetHandle {
        DatasetHandle {
            root: root.join("flowers"),
            use_case: UseCaseType::ImageClassification,
            framework: FrameworkType::TensorFlow,
            batch_size: 64,
            kind: DatasetKind::ImageFolder { class_names: vec!["daisy".to_string(), "roses".to_string()] },
        }
    }

    #[test]
    fn test_export_writes_protocol_files() {
        let temp = TempDir::new().unwrap();
        let model_dir = saved_model(temp.path());
        let workspace = DistributedWorkspace::new(temp.path().join("dist"));
        let optimizer = OptimizerSpec::new(OptimizerClass::Adam, 0.005);
        let loss = LossSpec::default();
        let train = dataset(temp.path());
        let val = dataset(temp.path()).with_batch_size(16);

        let manifest = workspace
            .export(
                &model_dir,
                &HandoffPayload {
                    model_name: "efficientnet_b0",
                    use_case: UseCaseType::ImageClassification,
                    optimizer: &optimizer,
                    loss: &loss,
                    train_data: &train,
                    val_data: Some(&val),
                },
            )
            .unwrap();

        let root = workspace.root();
        assert!(root.join("saved_model.pb").is_file());
        assert!(root.join("variables").join("variables.index").is_file());
        assert!(!root.join("model_checkpoints").exists());
        assert_eq!(DatasetHandle::load(&root.join(VAL_DATA_DIR)).unwrap().batch_size, 16);

        let loaded = workspace.load_manifest().unwrap();
        assert_eq!(loaded.id, manifest.id);
        assert_eq!(loaded.optimizer, optimizer);
        assert_eq!(loaded.artifacts.len(), 5);
        assert!(loaded.artifact(&ArtifactKind::ValidationDataset).is_some());
    }

    #[test]
    fn test_cleanup_removes_known_entries_only() {
        let temp = TempDir::new().unwrap();
        let model_dir = saved_model(temp.path());
        let workspace = DistributedWorkspace::new(temp.path().join("dist"));
        let optimizer = OptimizerSpec::new(OptimizerClass::Sgd, 0.01);
        let loss = LossSpec::default();
        let train = dataset(temp.path());
        workspace
            .export(
                &model_dir,
                &HandoffPayload {
                    model_name: "resnet50",
                    use_case: UseCaseType::ImageClassification,
                    optimizer: &optimizer,
                    loss: &loss,
                    train_data: &train,
                    val_data: None,
                },
            )
            .unwrap();
        std::fs::write(workspace.root().join("hostfile"), "127.0.0.1").unwrap();

        let removed = workspace.cleanup().unwrap();
        assert!(!removed.is_empty());

        let remaining: Vec<String> = std::fs::read_dir(workspace.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(remaining, vec!["hostfile".to_string()]);

        // Second pass has nothing left to remove.
        assert!(workspace.cleanup().unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_of_missing_workspace_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let workspace = DistributedWorkspace::new(temp.path().join("never-created"));
        assert!(workspace.cleanup().unwrap().is_empty());
    }
}
