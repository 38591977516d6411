//! End-to-end workflows over a directory of user model artifacts.
//!
//! Each workflow resolves the model identity from the directory, acquires a
//! model handle (and a dataset where needed) from the factories, and writes
//! its result into the next versioned directory of its stage:
//!
//! ```text
//! <output_dir>/quantized/<model_name>/<n>/
//! <output_dir>/optimized/<model_name>/<n>/
//! ```

use crate::dataset::DatasetHandle;
use crate::error::TrainingError;
use crate::inc_config::{ConfigSource, TuningParams, INC_CONFIG_FILE};
use crate::layout::{OutputLayout, OutputStage};
use crate::model::{BenchmarkMode, BenchmarkReport, TransferModel};
use crate::progress::{NullProgressSink, ProgressSink, WorkflowEvent, WorkflowKind};
use crate::registry::{DatasetFactory, ModelFactory};
use crate::types::FrameworkType;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{operation} is currently only implemented for TensorFlow saved_model.pb and PyTorch model.pt models.")]
    UnsupportedModelFile { operation: &'static str, model_dir: PathBuf },

    #[error("An error occurred while getting the model: {0}")]
    ModelLookup(TrainingError),

    #[error("An error occurred while loading the dataset: {0}")]
    DatasetLoad(TrainingError),

    #[error("Unable to {step}: {error}")]
    Step { step: &'static str, error: TrainingError },
}

impl WorkflowError {
    fn step(step: &'static str) -> impl FnOnce(TrainingError) -> Self {
        move |error| Self::Step { step, error }
    }
}

/// Name and framework derived from a model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelIdentity {
    pub model_name: String,
    pub framework: FrameworkType,
}

/// Derive the model identity from the contents and name of `model_dir`.
///
/// The name is the leaf directory name, or its parent's name when the leaf is
/// a numbered version (`.../efficientnet_b0/3`). The framework comes from the
/// single recognized artifact in the directory.
pub fn resolve_model_identity(model_dir: &Path, operation: &'static str) -> Result<ModelIdentity, WorkflowError> {
    let unsupported = || WorkflowError::UnsupportedModelFile { operation, model_dir: model_dir.to_path_buf() };

    let found: Vec<FrameworkType> = FrameworkType::all()
        .into_iter()
        .filter(|f| model_dir.join(f.model_artifact()).is_file())
        .collect();
    let [framework] = found.as_slice() else {
        return Err(unsupported());
    };

    let dir = model_dir.canonicalize().unwrap_or_else(|_| model_dir.to_path_buf());
    let leaf = dir.file_name().and_then(|n| n.to_str()).ok_or_else(unsupported)?;
    let model_name = if leaf.parse::<u64>().is_ok() {
        dir.parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .ok_or_else(unsupported)?
    } else {
        leaf
    };

    debug!(model = model_name, %framework, "Resolved model identity");
    Ok(ModelIdentity { model_name: model_name.to_string(), framework: *framework })
}

#[derive(Debug, Clone)]
pub struct QuantizationRequest {
    pub model_dir: PathBuf,
    pub dataset_dir: PathBuf,
    pub output_dir: PathBuf,
    pub inc_config: Option<PathBuf>,
    pub batch_size: u32,
    pub tuning: TuningParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizationOutcome {
    pub model_name: String,
    pub framework: FrameworkType,
    pub output_dir: PathBuf,
    pub config: ConfigSource,
}

pub struct QuantizationWorkflow<'a> {
    models: &'a dyn ModelFactory,
    datasets: &'a dyn DatasetFactory,
    progress: &'a dyn ProgressSink,
}

impl<'a> QuantizationWorkflow<'a> {
    pub fn new(models: &'a dyn ModelFactory, datasets: &'a dyn DatasetFactory) -> Self {
        Self { models, datasets, progress: &NullProgressSink }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(&self, request: &QuantizationRequest) -> Result<QuantizationOutcome, WorkflowError> {
        let kind = WorkflowKind::Quantization;
        let identity = resolve_model_identity(&request.model_dir, "Quantization")?;
        self.progress.on_event(WorkflowEvent::Started { workflow: kind, model_dir: request.model_dir.clone() });

        let mut model = acquire_model(self.models, &identity)?;
        let dataset = acquire_dataset(self.datasets, &request.dataset_dir, model.as_ref())?;

        let output_dir = OutputLayout::new(request.output_dir.clone())
            .next_stage_dir(OutputStage::Quantized, model.model_name())
            .map_err(WorkflowError::step("select the output directory"))?;
        let created = !output_dir.exists();

        let config = resolve_config(
            request.inc_config.as_deref(),
            &output_dir.join(INC_CONFIG_FILE),
            |path| model.write_inc_config_file(path, &dataset, request.batch_size, false, &request.tuning),
        )
        .inspect_err(|_| discard_version_dir(&output_dir, created))?;
        if let ConfigSource::Generated(path) = &config {
            self.progress.on_event(WorkflowEvent::Message {
                workflow: kind,
                message: format!("Wrote INC config file to {}", path.display()),
            });
        }

        model
            .quantize(&request.model_dir, &output_dir, config.path())
            .inspect_err(|_| discard_version_dir(&output_dir, created))
            .map_err(WorkflowError::step("quantize the model"))?;

        self.progress.on_event(WorkflowEvent::Finished { workflow: kind, output: Some(output_dir.clone()) });
        Ok(QuantizationOutcome {
            model_name: model.model_name().to_string(),
            framework: model.framework(),
            output_dir,
            config,
        })
    }
}

#[derive(Debug, Clone)]
pub struct OptimizationRequest {
    pub model_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationOutcome {
    pub model_name: String,
    pub framework: FrameworkType,
    pub output_dir: PathBuf,
}

/// FP32 graph optimization into the `optimized` stage.
pub struct GraphOptimizationWorkflow<'a> {
    models: &'a dyn ModelFactory,
    progress: &'a dyn ProgressSink,
}

impl<'a> GraphOptimizationWorkflow<'a> {
    pub fn new(models: &'a dyn ModelFactory) -> Self {
        Self { models, progress: &NullProgressSink }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(&self, request: &OptimizationRequest) -> Result<OptimizationOutcome, WorkflowError> {
        let kind = WorkflowKind::GraphOptimization;
        let identity = resolve_model_identity(&request.model_dir, "Graph optimization")?;
        self.progress.on_event(WorkflowEvent::Started { workflow: kind, model_dir: request.model_dir.clone() });

        let model = acquire_model(self.models, &identity)?;
        let output_dir = OutputLayout::new(request.output_dir.clone())
            .next_stage_dir(OutputStage::Optimized, model.model_name())
            .map_err(WorkflowError::step("select the output directory"))?;
        let created = !output_dir.exists();

        model
            .optimize_graph(&request.model_dir, &output_dir)
            .inspect_err(|_| discard_version_dir(&output_dir, created))
            .map_err(WorkflowError::step("optimize the model graph"))?;

        self.progress.on_event(WorkflowEvent::Finished { workflow: kind, output: Some(output_dir.clone()) });
        Ok(OptimizationOutcome {
            model_name: model.model_name().to_string(),
            framework: model.framework(),
            output_dir,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkRequest {
    pub model_dir: PathBuf,
    pub dataset_dir: PathBuf,
    pub inc_config: Option<PathBuf>,
    pub mode: BenchmarkMode,
    pub batch_size: u32,
    pub tuning: TuningParams,
}

/// Benchmark a model directory. A generated config lives in a scratch
/// directory that is removed afterwards.
pub fn run_benchmark(
    models: &dyn ModelFactory,
    datasets: &dyn DatasetFactory,
    progress: &dyn ProgressSink,
    request: &BenchmarkRequest,
) -> Result<BenchmarkReport, WorkflowError> {
    let kind = WorkflowKind::Benchmark;
    let identity = resolve_model_identity(&request.model_dir, "Benchmarking")?;
    progress.on_event(WorkflowEvent::Started { workflow: kind, model_dir: request.model_dir.clone() });

    let mut model = acquire_model(models, &identity)?;
    let dataset = acquire_dataset(datasets, &request.dataset_dir, model.as_ref())?;

    let scratch = std::env::temp_dir().join("tlk_benchmark").join(uuid::Uuid::new_v4().to_string());
    let config = resolve_config(request.inc_config.as_deref(), &scratch.join(INC_CONFIG_FILE), |path| {
        model.write_inc_config_file(path, &dataset, request.batch_size, false, &request.tuning)
    })?;

    let report = model.benchmark(&request.model_dir, config.path(), &request.mode.to_string());

    if let Err(e) = std::fs::remove_dir_all(&scratch) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %scratch.display(), "Unable to remove benchmark scratch directory: {e}");
        }
    }

    let report = report.map_err(WorkflowError::step("benchmark the model"))?;
    progress.on_event(WorkflowEvent::Finished { workflow: kind, output: None });
    Ok(report)
}

/// Remove a version directory created by a failed run, so the next run reuses its number.
fn discard_version_dir(dir: &Path, created: bool) {
    if !created {
        return;
    }
    match std::fs::remove_dir_all(dir) {
        Ok(()) => debug!(path = %dir.display(), "Removed partial output directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dir.display(), "Unable to remove partial output directory: {e}"),
    }
}

fn acquire_model(
    models: &dyn ModelFactory,
    identity: &ModelIdentity,
) -> Result<Box<dyn TransferModel>, WorkflowError> {
    models.get_model(&identity.model_name, identity.framework).map_err(WorkflowError::ModelLookup)
}

fn acquire_dataset(
    datasets: &dyn DatasetFactory,
    dataset_dir: &Path,
    model: &dyn TransferModel,
) -> Result<DatasetHandle, WorkflowError> {
    datasets
        .load_dataset(dataset_dir, model.use_case(), model.framework())
        .map_err(WorkflowError::DatasetLoad)
}

/// Use the provided config when it exists, otherwise generate one at `generated_path`.
fn resolve_config(
    provided: Option<&Path>,
    generated_path: &Path,
    generate: impl FnOnce(&Path) -> Result<(), TrainingError>,
) -> Result<ConfigSource, WorkflowError> {
    match provided {
        Some(path) if !path.as_os_str().is_empty() && path.is_file() => {
            debug!(path = %path.display(), "Using provided INC config file");
            Ok(ConfigSource::Provided(path.to_path_buf()))
        }
        other => {
            if let Some(path) = other {
                warn!(path = %path.display(), "INC config file not found, generating one instead");
            }
            generate(generated_path).map_err(WorkflowError::step("write the INC config file"))?;
            Ok(ConfigSource::Generated(generated_path.to_path_buf()))
        }
    }
}
