//! Model and dataset factories.
//!
//! [`ModelRegistry`] reads the embedded model catalog and builds a
//! [`TransferModel`] for a supported (name, framework) pair. The framework
//! realization is chosen here, once; callers only see the trait object.

use crate::backend::{BridgeConfig, ProcessBridge};
use crate::dataset::DatasetHandle;
use crate::distributed::DistributedWorkspace;
use crate::error::{TrainingError, TrainingResult};
use crate::model::TransferModel;
use crate::pytorch::PtModel;
use crate::tensorflow::TfModel;
use crate::types::{FrameworkType, UseCaseType};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const BUILTIN_MODELS: &str = include_str!("../resources/models.toml");

/// Builds model handles by name and framework.
pub trait ModelFactory {
    fn get_model(&self, model_name: &str, framework: FrameworkType) -> TrainingResult<Box<dyn TransferModel>>;
}

/// Loads datasets from a directory for a use case and framework.
pub trait DatasetFactory {
    fn load_dataset(
        &self,
        dataset_dir: &Path,
        use_case: UseCaseType,
        framework: FrameworkType,
    ) -> TrainingResult<DatasetHandle>;
}

/// Catalog entry for a pretrained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub framework: FrameworkType,
    pub use_case: UseCaseType,
    #[serde(default)]
    pub image_size: Option<u32>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelInfo>,
    bridge: BridgeConfig,
    distributed: DistributedWorkspace,
}

impl ModelRegistry {
    /// Registry over the models shipped with the crate.
    pub fn builtin() -> TrainingResult<Self> {
        Self::from_toml(BUILTIN_MODELS)
    }

    pub fn from_toml(contents: &str) -> TrainingResult<Self> {
        let catalog: Catalog = toml::from_str(contents)
            .map_err(|e| TrainingError::InvalidValue(format!("invalid model catalog: {e}")))?;
        Ok(Self {
            models: catalog.models,
            bridge: BridgeConfig::default(),
            distributed: DistributedWorkspace::default(),
        })
    }

    #[must_use]
    pub fn with_bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }

    #[must_use]
    pub fn with_distributed_workspace(mut self, workspace: DistributedWorkspace) -> Self {
        self.distributed = workspace;
        self
    }

    #[must_use]
    pub fn find(&self, model_name: &str, framework: FrameworkType) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.name == model_name && m.framework == framework)
    }

    /// Models matching the optional filters, in catalog order.
    #[must_use]
    pub fn list(&self, framework: Option<FrameworkType>, use_case: Option<UseCaseType>) -> Vec<&ModelInfo> {
        self.models
            .iter()
            .filter(|m| framework.is_none_or(|f| m.framework == f))
            .filter(|m| use_case.is_none_or(|u| m.use_case == u))
            .collect()
    }
}

impl ModelFactory for ModelRegistry {
    fn get_model(&self, model_name: &str, framework: FrameworkType) -> TrainingResult<Box<dyn TransferModel>> {
        let info = self.find(model_name, framework).ok_or_else(|| {
            TrainingError::NotFound(format!("The specified model is not supported for {framework}: {model_name}"))
        })?;
        debug!(model = %info.name, %framework, use_case = %info.use_case, "Building model");

        let bridge = Arc::new(ProcessBridge::new(framework, self.bridge.clone()));
        match framework {
            FrameworkType::TensorFlow => {
                let mut model = TfModel::new(&info.name, info.use_case, bridge.clone(), bridge)?
                    .with_distributed_workspace(self.distributed.clone());
                if let Some(size) = info.image_size {
                    model = model.with_image_size(size);
                }
                Ok(Box::new(model))
            }
            FrameworkType::PyTorch => Ok(Box::new(PtModel::new(&info.name, info.use_case, bridge)?)),
        }
    }
}

/// Dataset factory over local directories.
#[derive(Debug, Clone, Default)]
pub struct DirectoryDatasetFactory {
    batch_size: Option<u32>,
}

impl DirectoryDatasetFactory {
    #[must_use]
    pub fn with_batch_size(batch_size: u32) -> Self {
        Self { batch_size: Some(batch_size) }
    }
}

impl DatasetFactory for DirectoryDatasetFactory {
    fn load_dataset(
        &self,
        dataset_dir: &Path,
        use_case: UseCaseType,
        framework: FrameworkType,
    ) -> TrainingResult<DatasetHandle> {
        let dataset = DatasetHandle::from_directory(dataset_dir, use_case, framework)?;
        Ok(match self.batch_size {
            Some(batch_size) => dataset.with_batch_size(batch_size),
            None => dataset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelState;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_catalog_parses() {
        let registry = ModelRegistry::builtin().unwrap();
        let info = registry.find("efficientnet_b0", FrameworkType::TensorFlow).unwrap();
        assert_eq!(info.image_size, Some(224));
        assert!(registry.find("efficientnet_b0", FrameworkType::PyTorch).is_some());
        assert!(!registry.list(Some(FrameworkType::TensorFlow), Some(UseCaseType::TextClassification)).is_empty());
    }

    #[test]
    fn test_get_model_selects_realization() {
        let registry = ModelRegistry::builtin().unwrap();

        let tf = registry.get_model("resnet_v1_50", FrameworkType::TensorFlow).unwrap();
        assert_eq!(tf.framework(), FrameworkType::TensorFlow);
        assert_eq!(tf.use_case(), UseCaseType::ImageClassification);
        assert_eq!(tf.state(), ModelState::Unloaded);

        let pt = registry.get_model("resnet50", FrameworkType::PyTorch).unwrap();
        assert_eq!(pt.framework(), FrameworkType::PyTorch);
    }

    #[test]
    fn test_unknown_model_message() {
        let registry = ModelRegistry::builtin().unwrap();
        let Err(err) = registry.get_model("foo", FrameworkType::TensorFlow) else {
            panic!("foo is not in the catalog");
        };
        assert_eq!(err.to_string(), "The specified model is not supported for tensorflow: foo");
    }

    #[test]
    fn test_directory_dataset_factory_batch_size() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("daisy")).unwrap();
        std::fs::create_dir_all(temp.path().join("roses")).unwrap();

        let dataset = DirectoryDatasetFactory::with_batch_size(8)
            .load_dataset(temp.path(), UseCaseType::ImageClassification, FrameworkType::TensorFlow)
            .unwrap();
        assert_eq!(dataset.batch_size, 8);
        assert_eq!(dataset.class_names(), ["daisy".to_string(), "roses".to_string()]);
    }
}
