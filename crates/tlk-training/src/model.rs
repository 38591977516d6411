//! The model contract every framework realization implements.

use crate::dataset::DatasetHandle;
use crate::error::{TrainingError, TrainingResult};
use crate::inc_config::TuningParams;
use crate::types::{FrameworkType, UseCaseType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_LEARNING_RATE: f64 = 0.001;

/// Lifecycle of a model handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Unloaded,
    Loaded,
    Trained,
}

impl ModelState {
    #[must_use]
    pub fn has_weights(self) -> bool {
        matches!(self, Self::Loaded | Self::Trained)
    }
}

/// Metric name to per-epoch values.
pub type TrainingHistory = BTreeMap<String, Vec<f64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f64,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

/// Input accepted by [`TransferModel::predict`].
#[derive(Debug, Clone)]
pub enum PredictInput<'a> {
    Dataset(&'a DatasetHandle),
    Samples(Vec<Vec<f32>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkMode {
    Performance,
    Accuracy,
}

impl FromStr for BenchmarkMode {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "performance" => Ok(Self::Performance),
            "accuracy" => Ok(Self::Accuracy),
            other => Err(TrainingError::InvalidValue(format!(
                "Invalid benchmark mode '{other}'. Expected 'performance' or 'accuracy'."
            ))),
        }
    }
}

impl fmt::Display for BenchmarkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Performance => f.write_str("performance"),
            Self::Accuracy => f.write_str("accuracy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub mode: BenchmarkMode,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

/// Options for [`TransferModel::train`].
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: u32,
    pub initial_checkpoints: Option<PathBuf>,
    pub do_eval: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self { epochs: 1, initial_checkpoints: None, do_eval: true }
    }
}

/// A pretrained model usable for transfer learning, compression and export.
///
/// Realizations are selected once by a model factory; callers only see this
/// trait afterwards.
pub trait TransferModel {
    fn model_name(&self) -> &str;

    fn framework(&self) -> FrameworkType;

    fn use_case(&self) -> UseCaseType;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, value: f64);

    fn state(&self) -> ModelState;

    /// Load saved weights from `model_dir`.
    fn load_from_directory(&mut self, model_dir: &Path) -> TrainingResult<()>;

    /// Fine-tune on `dataset`, writing checkpoints under `output_dir`.
    fn train(
        &mut self,
        dataset: &DatasetHandle,
        output_dir: &Path,
        options: &TrainOptions,
    ) -> TrainingResult<TrainingHistory>;

    /// Loss and metrics in test mode.
    fn evaluate(&self, dataset: &DatasetHandle) -> TrainingResult<Evaluation>;

    fn predict(&self, input: PredictInput<'_>) -> TrainingResult<Vec<Vec<f32>>>;

    /// Save the model into the next numbered directory under
    /// `<output_dir>/<model_name>` and return that directory.
    fn export(&self, output_dir: &Path) -> TrainingResult<PathBuf>;

    /// Write a compression config for `dataset` to `config_path`.
    fn write_inc_config_file(
        &mut self,
        config_path: &Path,
        dataset: &DatasetHandle,
        batch_size: u32,
        overwrite: bool,
        tuning: &TuningParams,
    ) -> TrainingResult<()>;

    /// Post-training quantization of the model in `source_dir` into `output_dir`.
    fn quantize(&self, source_dir: &Path, output_dir: &Path, config_path: &Path) -> TrainingResult<()>;

    /// FP32 graph optimization of the model in `source_dir` into `output_dir`.
    fn optimize_graph(&self, source_dir: &Path, output_dir: &Path) -> TrainingResult<()>;

    /// Benchmark the model in `source_dir` for performance or accuracy.
    fn benchmark(
        &self,
        source_dir: &Path,
        config_path: &Path,
        mode: &str,
    ) -> TrainingResult<BenchmarkReport> {
        let _ = (source_dir, config_path, mode.parse::<BenchmarkMode>()?);
        Err(TrainingError::Unsupported("INC benchmarking is not supported for this model".to_string()))
    }
}

/// Fail unless the model is in one of `allowed` states.
pub fn require_state(
    state: ModelState,
    allowed: &[ModelState],
    action: &str,
) -> TrainingResult<()> {
    if allowed.contains(&state) {
        return Ok(());
    }
    Err(TrainingError::InvalidState(format!(
        "Unable to {action} the model, because it hasn't been loaded or trained yet"
    )))
}

/// Fail unless `dataset` was built for the model's use case and framework.
pub fn check_dataset(
    dataset: &DatasetHandle,
    use_case: UseCaseType,
    framework: FrameworkType,
) -> TrainingResult<()> {
    if dataset.use_case != use_case || dataset.framework != framework {
        return Err(TrainingError::TypeMismatch(format!(
            "The dataset must be a {framework} {use_case} dataset but found a {} {} dataset",
            dataset.framework, dataset.use_case
        )));
    }
    Ok(())
}
