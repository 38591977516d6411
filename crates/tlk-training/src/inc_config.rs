//! Compression (Intel Neural Compressor) configuration descriptors.
//!
//! The descriptor is a YAML file consumed by the compression engine. It
//! carries the dataset location, the dataloader batch size and the tuning
//! policy used to search for an accuracy-preserving quantized model.

use crate::dataset::DatasetHandle;
use crate::error::{TrainingError, TrainingResult};
use crate::types::FrameworkType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name used when a descriptor is generated next to a quantized model.
pub const INC_CONFIG_FILE: &str = "inc_config.yaml";

/// Tuning parameters forwarded to the compression engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningParams {
    /// Maximum number of tuning trials (> 0).
    pub max_trials: u32,
    /// Tuning timeout in seconds; 0 means the engine stops at the first
    /// model that meets the accuracy criterion.
    pub timeout: u64,
    /// Relative accuracy loss allowed, in `[0, 1]`.
    pub accuracy_criterion: f64,
    /// Number of calibration samples.
    pub sampling_size: u32,
}

impl Default for TuningParams {
    fn default() -> Self {
        Self { max_trials: 50, timeout: 0, accuracy_criterion: 0.01, sampling_size: 100 }
    }
}

impl TuningParams {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.max_trials == 0 {
            return Err(TrainingError::InvalidValue("max_trials must be >= 1".to_string()));
        }
        if !self.accuracy_criterion.is_finite() || !(0.0..=1.0).contains(&self.accuracy_criterion) {
            return Err(TrainingError::InvalidValue(format!(
                "accuracy_criterion must be between 0 and 1 (found {})",
                self.accuracy_criterion
            )));
        }
        if self.sampling_size == 0 {
            return Err(TrainingError::InvalidValue("sampling_size must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Where the descriptor used for a run came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Provided(PathBuf),
    Generated(PathBuf),
}

impl ConfigSource {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Provided(p) | Self::Generated(p) => p,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncConfig {
    pub version: f32,
    pub model: IncModel,
    pub device: String,
    pub quantization: IncQuantization,
    pub evaluation: IncEvaluation,
    pub tuning: IncTuning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncModel {
    pub name: String,
    pub framework: FrameworkType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncQuantization {
    pub approach: String,
    pub calibration: IncCalibration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncCalibration {
    pub sampling_size: u32,
    pub dataloader: IncDataloader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncDataloader {
    pub batch_size: u32,
    pub dataset: BTreeMap<String, IncDatasetRoot>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transform: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncDatasetRoot {
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncEvaluation {
    pub accuracy: IncAccuracy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncAccuracy {
    pub metric: BTreeMap<String, u32>,
    pub dataloader: IncDataloader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncTuning {
    pub accuracy_criterion: IncAccuracyCriterion,
    pub exit_policy: IncExitPolicy,
    pub random_seed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncAccuracyCriterion {
    pub relative: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncExitPolicy {
    pub timeout: u64,
    pub max_trials: u32,
}

impl IncConfig {
    /// Build a post-training static quantization descriptor for an image-folder dataset.
    pub fn for_image_folder(
        model_name: &str,
        framework: FrameworkType,
        dataset: &DatasetHandle,
        batch_size: u32,
        image_size: Option<u32>,
        tuning: &TuningParams,
        random_seed: u32,
    ) -> TrainingResult<Self> {
        if batch_size == 0 {
            return Err(TrainingError::InvalidValue("batch_size must be >= 1".to_string()));
        }
        tuning.validate()?;

        let mut transform = BTreeMap::new();
        if let Some(size) = image_size {
            let mut resize = serde_yaml::Mapping::new();
            resize.insert("size".into(), serde_yaml::to_value([size, size])?);
            transform.insert("Resize".to_string(), serde_yaml::Value::Mapping(resize));
        }

        let dataloader = IncDataloader {
            batch_size,
            dataset: BTreeMap::from([(
                "ImageFolder".to_string(),
                IncDatasetRoot { root: dataset.root.clone() },
            )]),
            transform,
        };

        Ok(Self {
            version: 1.0,
            model: IncModel { name: model_name.to_string(), framework },
            device: "cpu".to_string(),
            quantization: IncQuantization {
                approach: "post_training_static_quant".to_string(),
                calibration: IncCalibration {
                    sampling_size: tuning.sampling_size,
                    dataloader: dataloader.clone(),
                },
            },
            evaluation: IncEvaluation {
                accuracy: IncAccuracy { metric: BTreeMap::from([("topk".to_string(), 1)]), dataloader },
            },
            tuning: IncTuning {
                accuracy_criterion: IncAccuracyCriterion { relative: tuning.accuracy_criterion },
                exit_policy: IncExitPolicy { timeout: tuning.timeout, max_trials: tuning.max_trials },
                random_seed,
            },
        })
    }

    /// Write the descriptor. Refuses to replace an existing file unless `overwrite` is set.
    pub fn write(&self, path: &Path, overwrite: bool) -> TrainingResult<()> {
        if path.exists() && !overwrite {
            return Err(TrainingError::FileExists(format!(
                "A file already exists at: {}. Provide a new file path or set overwrite=true",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn read(path: &Path) -> TrainingResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetKind;
    use crate::types::UseCaseType;
    use tempfile::TempDir;

    fn flowers(root: &Path) -> DatasetHandle {
        DatasetHandle {
            root: root.to_path_buf(),
            use_case: UseCaseType::ImageClassification,
            framework: FrameworkType::TensorFlow,
            batch_size: 32,
            kind: DatasetKind::ImageFolder { class_names: vec!["daisy".to_string()] },
        }
    }

    #[test]
    fn test_tuning_params_validation() {
        assert!(TuningParams::default().validate().is_ok());
        assert!(TuningParams { max_trials: 0, ..Default::default() }.validate().is_err());
        assert!(TuningParams { accuracy_criterion: 1.3, ..Default::default() }.validate().is_err());
        assert!(TuningParams { accuracy_criterion: -0.1, ..Default::default() }.validate().is_err());
        assert!(TuningParams { accuracy_criterion: f64::NAN, ..Default::default() }.validate().is_err());
    }

    #[test]
    fn test_write_refuses_existing_file_without_overwrite() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join(INC_CONFIG_FILE);
        let config = IncConfig::for_image_folder(
            "efficientnet_b0",
            FrameworkType::TensorFlow,
            &flowers(temp.path()),
            512,
            Some(224),
            &TuningParams::default(),
            9527,
        )
        .unwrap();

        config.write(&path, false).unwrap();
        let err = config.write(&path, false).unwrap_err();
        assert!(matches!(err, TrainingError::FileExists(_)));
        config.write(&path, true).unwrap();

        let read_back = IncConfig::read(&path).unwrap();
        assert_eq!(read_back.quantization.calibration.dataloader.batch_size, 512);
        assert_eq!(read_back.tuning.exit_policy.max_trials, 50);
        assert_eq!(read_back.model.framework, FrameworkType::TensorFlow);
    }

    #[test]
    fn test_yaml_uses_engine_keys() {
        let temp = TempDir::new().unwrap();
        let config = IncConfig::for_image_folder(
            "inception_v3",
            FrameworkType::TensorFlow,
            &flowers(temp.path()),
            32,
            Some(299),
            &TuningParams { timeout: 120, accuracy_criterion: 0.05, ..Default::default() },
            1,
        )
        .unwrap();

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("ImageFolder"));
        assert!(yaml.contains("framework: tensorflow"));
        assert!(yaml.contains("relative: 0.05"));
        assert!(yaml.contains("timeout: 120"));
        assert!(yaml.contains("Resize"));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let temp = TempDir::new().unwrap();
        let err = IncConfig::for_image_folder(
            "resnet50",
            FrameworkType::TensorFlow,
            &flowers(temp.path()),
            0,
            None,
            &TuningParams::default(),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, TrainingError::InvalidValue(_)));
    }
}
