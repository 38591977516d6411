//! TensorFlow realization of [`TransferModel`].
//!
//! Numeric work goes through a [`FrameworkRuntime`], compression through a
//! [`CompressionEngine`]. The model itself only tracks its saved weights
//! directory, its lifecycle state and the descriptors needed to rebuild a
//! training run elsewhere.

use crate::artifacts::HandoffManifest;
use crate::backend::{CompressionEngine, CompressionJob, FitRequest, FrameworkRuntime};
use crate::dataset::DatasetHandle;
use crate::distributed::{DistributedWorkspace, HandoffPayload, OPTIMIZER_ENTRIES};
use crate::error::{TrainingError, TrainingResult};
use crate::hostfile::{self, HostfileEntry, SystemResolver};
use crate::inc_config::{IncConfig, TuningParams};
use crate::job::{LossSpec, OptimizerClass, OptimizerSpec, RuntimeOptions};
use crate::layout::{copy_dir, is_empty_dir, validate_model_name, verify_directory, OutputLayout};
use crate::model::{
    check_dataset, require_state, BenchmarkMode, BenchmarkReport, Evaluation, ModelState, PredictInput,
    TrainOptions, TrainingHistory, TransferModel, DEFAULT_LEARNING_RATE,
};
use crate::platform::{CpuInfoDetector, PlatformDetector};
use crate::types::{FrameworkType, UseCaseType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SAVED_MODEL_FILE: &str = "saved_model.pb";
const KERAS_EXTENSIONS: [&str; 2] = ["h5", "keras"];

/// First runtime release with a usable mixed precision policy.
const MIXED_PRECISION_MIN_VERSION: semver::Version = semver::Version::new(2, 9, 0);

/// CPU family where bfloat16 auto mixed precision pays off.
const MIXED_PRECISION_CPU: &str = "SPR";

const LOADED_STATES: [ModelState; 2] = [ModelState::Loaded, ModelState::Trained];

/// Requested auto mixed precision behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoMixedPrecision {
    Enable,
    Disable,
    /// Enable only when the host CPU supports it well.
    Auto,
}

pub struct TfModel {
    model_name: String,
    use_case: UseCaseType,
    image_size: Option<u32>,
    learning_rate: f64,
    state: ModelState,
    model_dir: Option<PathBuf>,
    /// Keras file the weights were loaded from; `None` when `model_dir` is a SavedModel.
    keras_file: Option<PathBuf>,
    history: TrainingHistory,
    optimizer: OptimizerSpec,
    loss: LossSpec,
    options: RuntimeOptions,
    rng: StdRng,
    runtime: Arc<dyn FrameworkRuntime>,
    engine: Arc<dyn CompressionEngine>,
    detector: Arc<dyn PlatformDetector>,
    distributed: DistributedWorkspace,
}

impl std::fmt::Debug for TfModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TfModel")
            .field("model_name", &self.model_name)
            .field("use_case", &self.use_case)
            .field("state", &self.state)
            .field("model_dir", &self.model_dir)
            .finish_non_exhaustive()
    }
}

impl TfModel {
    pub fn new(
        model_name: &str,
        use_case: UseCaseType,
        runtime: Arc<dyn FrameworkRuntime>,
        engine: Arc<dyn CompressionEngine>,
    ) -> TrainingResult<Self> {
        let model_name = validate_model_name(model_name)?;
        Ok(Self {
            model_name,
            use_case,
            image_size: None,
            learning_rate: DEFAULT_LEARNING_RATE,
            state: ModelState::Unloaded,
            model_dir: None,
            keras_file: None,
            history: TrainingHistory::new(),
            optimizer: OptimizerSpec::new(OptimizerClass::Adam, DEFAULT_LEARNING_RATE),
            loss: LossSpec::default(),
            options: RuntimeOptions::default(),
            rng: StdRng::from_entropy(),
            runtime,
            engine,
            detector: Arc::new(CpuInfoDetector::default()),
            distributed: DistributedWorkspace::default(),
        })
    }

    /// Input image edge length, used for the compression dataloader resize.
    #[must_use]
    pub fn with_image_size(mut self, image_size: u32) -> Self {
        self.image_size = Some(image_size);
        self
    }

    #[must_use]
    pub fn with_detector(mut self, detector: Arc<dyn PlatformDetector>) -> Self {
        self.detector = detector;
        self
    }

    #[must_use]
    pub fn with_distributed_workspace(mut self, workspace: DistributedWorkspace) -> Self {
        self.distributed = workspace;
        self
    }

    #[must_use]
    pub fn image_size(&self) -> Option<u32> {
        self.image_size
    }

    #[must_use]
    pub fn model_dir(&self) -> Option<&Path> {
        self.model_dir.as_deref()
    }

    #[must_use]
    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    #[must_use]
    pub fn runtime_options(&self) -> &RuntimeOptions {
        &self.options
    }

    #[must_use]
    pub fn optimizer(&self) -> &OptimizerSpec {
        &self.optimizer
    }

    /// Replace the optimizer. Its learning rate becomes the model's.
    pub fn set_optimizer(&mut self, optimizer: OptimizerSpec) -> TrainingResult<()> {
        optimizer.validate()?;
        self.learning_rate = optimizer.learning_rate;
        self.optimizer = optimizer;
        Ok(())
    }

    #[must_use]
    pub fn loss(&self) -> &LossSpec {
        &self.loss
    }

    pub fn set_loss(&mut self, loss: LossSpec) -> TrainingResult<()> {
        loss.validate()?;
        self.loss = loss;
        Ok(())
    }

    /// Seed the model's RNG and every later runtime call. No-op for `None`.
    pub fn set_seed(&mut self, seed: Option<u64>) {
        let Some(seed) = seed else {
            return;
        };
        self.rng = StdRng::seed_from_u64(seed);
        self.options.seed = Some(seed);
        debug!(model = %self.model_name, seed, "Seeded model");
    }

    /// Resolve and apply the auto mixed precision setting. Returns whether it is enabled.
    pub fn set_auto_mixed_precision(&mut self, mode: AutoMixedPrecision) -> TrainingResult<bool> {
        let wanted = match mode {
            AutoMixedPrecision::Enable => true,
            AutoMixedPrecision::Disable => false,
            AutoMixedPrecision::Auto => match self.detector.cpu_type() {
                Ok(cpu) => cpu == MIXED_PRECISION_CPU,
                Err(e) => {
                    info!("Unable to detect the CPU type, auto mixed precision stays disabled: {e}");
                    false
                }
            },
        };

        if wanted {
            if let Some(version) = self.runtime.version()? {
                if version < MIXED_PRECISION_MIN_VERSION {
                    warn!(
                        "Auto mixed precision requires TensorFlow {MIXED_PRECISION_MIN_VERSION} or later \
                         (found {version}); leaving it unchanged"
                    );
                    return Ok(self.options.auto_mixed_precision);
                }
            }
        }

        self.options.auto_mixed_precision = wanted;
        info!(model = %self.model_name, enabled = wanted, "Auto mixed precision");
        Ok(wanted)
    }

    /// Write the current weights and training descriptors to the distributed work directory.
    pub fn export_for_distributed(
        &self,
        train_data: &DatasetHandle,
        val_data: Option<&DatasetHandle>,
    ) -> TrainingResult<HandoffManifest> {
        let model_dir = self.weights_dir("export")?;
        check_dataset(train_data, self.use_case, FrameworkType::TensorFlow)?;
        if let Some(val) = val_data {
            check_dataset(val, self.use_case, FrameworkType::TensorFlow)?;
        }

        self.distributed.export_with(
            &HandoffPayload {
                model_name: &self.model_name,
                use_case: self.use_case,
                optimizer: &self.optimizer,
                loss: &self.loss,
                train_data,
                val_data,
            },
            |root| self.write_saved_model(model_dir, root, &OPTIMIZER_ENTRIES),
        )
    }

    pub fn cleanup_saved_objects_for_distributed(&self) -> TrainingResult<()> {
        let removed = self.distributed.cleanup()?;
        debug!(count = removed.len(), "Removed distributed hand-off entries");
        Ok(())
    }

    /// Parse a hostfile, resolving hostnames with the system resolver.
    pub fn parse_hostfile(&self, path: &Path) -> TrainingResult<Vec<HostfileEntry>> {
        hostfile::parse_hostfile(path, &SystemResolver)
    }

    /// Write the current weights into `target` as a SavedModel.
    ///
    /// A SavedModel directory is copied, skipping `skip_top_level`. A Keras
    /// file is re-saved through the runtime.
    fn write_saved_model(&self, model_dir: &Path, target: &Path, skip_top_level: &[&str]) -> TrainingResult<()> {
        let Some(keras_file) = &self.keras_file else {
            return copy_dir(model_dir, target, skip_top_level);
        };

        std::fs::create_dir_all(target)?;
        self.runtime.save_model(keras_file, target, &self.options)?;
        if !target.join(SAVED_MODEL_FILE).is_file() {
            return Err(TrainingError::Runtime(format!(
                "converting {} did not produce a saved_model.pb in {}",
                keras_file.display(),
                target.display()
            )));
        }
        debug!(source = %keras_file.display(), target = %target.display(), "Re-saved Keras model as a SavedModel");
        Ok(())
    }

    fn weights_dir(&self, action: &str) -> TrainingResult<&Path> {
        require_state(self.state, &LOADED_STATES, action)?;
        self.model_dir.as_deref().ok_or_else(|| {
            TrainingError::InvalidState(format!(
                "Unable to {action} the model, because it hasn't been loaded or trained yet"
            ))
        })
    }
}

/// Locate a TensorFlow model artifact directly inside `dir`.
fn find_model_artifact(dir: &Path) -> TrainingResult<Option<PathBuf>> {
    let saved_model = dir.join(SAVED_MODEL_FILE);
    if saved_model.is_file() {
        return Ok(Some(saved_model));
    }

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_keras = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| KERAS_EXTENSIONS.contains(&ext));
        if is_keras && path.is_file() {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Directory checks shared by quantization, graph optimization and benchmarking.
fn check_source_dir(source_dir: &Path) -> TrainingResult<()> {
    if !source_dir.is_dir() {
        return Err(TrainingError::NotADirectory(source_dir.to_path_buf()));
    }
    if !source_dir.join(SAVED_MODEL_FILE).is_file() {
        return Err(TrainingError::NotFound(format!(
            "Unable to find a saved_model.pb file in {}",
            source_dir.display()
        )));
    }
    Ok(())
}

fn check_output_dir(output_dir: &Path) -> TrainingResult<()> {
    if output_dir.join(SAVED_MODEL_FILE).exists() {
        return Err(TrainingError::FileExists(format!(
            "A saved model already exists in {}. Provide a new output directory",
            output_dir.display()
        )));
    }
    verify_directory(output_dir, false)
}

fn check_config_file(config_path: &Path) -> TrainingResult<()> {
    if !config_path.is_file() {
        return Err(TrainingError::NotFound(format!(
            "The INC config file was not found at: {}",
            config_path.display()
        )));
    }
    Ok(())
}

impl TransferModel for TfModel {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn framework(&self) -> FrameworkType {
        FrameworkType::TensorFlow
    }

    fn use_case(&self) -> UseCaseType {
        self.use_case
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, value: f64) {
        self.learning_rate = value;
        self.optimizer.learning_rate = value;
    }

    fn state(&self) -> ModelState {
        self.state
    }

    fn load_from_directory(&mut self, model_dir: &Path) -> TrainingResult<()> {
        if !model_dir.is_dir() {
            return Err(TrainingError::NotADirectory(model_dir.to_path_buf()));
        }
        let artifact = find_model_artifact(model_dir)?.ok_or_else(|| {
            TrainingError::NotFound(format!(
                "Unable to find a saved_model.pb or Keras model file in {}",
                model_dir.display()
            ))
        })?;

        info!(model = %self.model_name, artifact = %artifact.display(), "Loaded model weights");
        let is_saved_model = artifact.file_name().is_some_and(|n| n == SAVED_MODEL_FILE);
        self.keras_file = (!is_saved_model).then_some(artifact);
        self.model_dir = Some(model_dir.to_path_buf());
        self.state = ModelState::Loaded;
        Ok(())
    }

    fn train(
        &mut self,
        dataset: &DatasetHandle,
        output_dir: &Path,
        options: &TrainOptions,
    ) -> TrainingResult<TrainingHistory> {
        check_dataset(dataset, self.use_case, FrameworkType::TensorFlow)?;
        if options.epochs == 0 {
            return Err(TrainingError::InvalidValue("epochs must be >= 1".to_string()));
        }
        verify_directory(output_dir, false)?;
        if let Some(checkpoints) = &options.initial_checkpoints {
            verify_directory(checkpoints, true)?;
        }

        self.optimizer.learning_rate = self.learning_rate;
        self.optimizer.validate()?;

        let outcome = self.runtime.fit(&FitRequest {
            model_name: &self.model_name,
            use_case: self.use_case,
            model_dir: self.model_dir.as_deref(),
            dataset,
            output_dir,
            epochs: options.epochs,
            optimizer: &self.optimizer,
            loss: &self.loss,
            initial_checkpoints: options.initial_checkpoints.as_deref(),
            do_eval: options.do_eval,
            options: &self.options,
        })?;

        info!(
            model = %self.model_name,
            epochs = options.epochs,
            model_dir = %outcome.model_dir.display(),
            "Training finished"
        );
        self.model_dir = Some(outcome.model_dir);
        self.keras_file = None;
        self.history = outcome.history;
        self.state = ModelState::Trained;
        Ok(self.history.clone())
    }

    fn evaluate(&self, dataset: &DatasetHandle) -> TrainingResult<Evaluation> {
        let model_dir = self.weights_dir("evaluate")?;
        check_dataset(dataset, self.use_case, FrameworkType::TensorFlow)?;
        self.runtime.evaluate(model_dir, dataset, &self.options)
    }

    fn predict(&self, input: PredictInput<'_>) -> TrainingResult<Vec<Vec<f32>>> {
        let model_dir = self.weights_dir("predict with")?;
        if let PredictInput::Dataset(dataset) = input {
            check_dataset(dataset, self.use_case, FrameworkType::TensorFlow)?;
        }
        self.runtime.predict(model_dir, &input, &self.options)
    }

    fn export(&self, output_dir: &Path) -> TrainingResult<PathBuf> {
        let model_dir = self.weights_dir("export")?;
        verify_directory(output_dir, false)?;

        let target = OutputLayout::new(output_dir.to_path_buf()).next_export_dir(&self.model_name)?;
        if !is_empty_dir(&target)? {
            return Err(TrainingError::FileExists(format!(
                "The export directory is not empty: {}",
                target.display()
            )));
        }

        if let Err(e) = self.write_saved_model(model_dir, &target, &[]) {
            // Leave no partial version behind to shift the numbering.
            if let Err(cleanup) = std::fs::remove_dir_all(&target) {
                warn!(path = %target.display(), "Unable to remove the partial export: {cleanup}");
            }
            return Err(e);
        }
        info!(model = %self.model_name, path = %target.display(), "Saved model directory");
        Ok(target)
    }

    fn write_inc_config_file(
        &mut self,
        config_path: &Path,
        dataset: &DatasetHandle,
        batch_size: u32,
        overwrite: bool,
        tuning: &TuningParams,
    ) -> TrainingResult<()> {
        if config_path.exists() && !overwrite {
            return Err(TrainingError::FileExists(format!(
                "A file already exists at: {}. Provide a new file path or set overwrite=true",
                config_path.display()
            )));
        }
        if self.use_case != UseCaseType::ImageClassification || !dataset.is_image_folder() {
            return Err(TrainingError::Unsupported(format!(
                "Writing an INC config file is only supported for image classification models with an \
                 image folder dataset ({} {} model)",
                self.framework(),
                self.use_case
            )));
        }
        check_dataset(dataset, self.use_case, FrameworkType::TensorFlow)?;

        let random_seed = self.rng.gen_range(0..u32::MAX);
        let config = IncConfig::for_image_folder(
            &self.model_name,
            FrameworkType::TensorFlow,
            dataset,
            batch_size,
            self.image_size,
            tuning,
            random_seed,
        )?;
        config.write(config_path, overwrite)?;

        info!(path = %config_path.display(), "Wrote INC config file");
        Ok(())
    }

    fn quantize(&self, source_dir: &Path, output_dir: &Path, config_path: &Path) -> TrainingResult<()> {
        check_source_dir(source_dir)?;
        check_config_file(config_path)?;
        check_output_dir(output_dir)?;

        self.engine.quantize(&CompressionJob {
            framework: FrameworkType::TensorFlow,
            source_dir,
            output_dir: Some(output_dir),
            config_path: Some(config_path),
        })?;
        info!(model = %self.model_name, path = %output_dir.display(), "Saved quantized model");
        Ok(())
    }

    fn optimize_graph(&self, source_dir: &Path, output_dir: &Path) -> TrainingResult<()> {
        check_source_dir(source_dir)?;
        check_output_dir(output_dir)?;

        self.engine.optimize_graph(&CompressionJob {
            framework: FrameworkType::TensorFlow,
            source_dir,
            output_dir: Some(output_dir),
            config_path: None,
        })?;
        info!(model = %self.model_name, path = %output_dir.display(), "Saved optimized model");
        Ok(())
    }

    fn benchmark(&self, source_dir: &Path, config_path: &Path, mode: &str) -> TrainingResult<BenchmarkReport> {
        let mode: BenchmarkMode = mode.parse()?;
        check_source_dir(source_dir)?;
        check_config_file(config_path)?;

        self.engine.benchmark(
            &CompressionJob {
                framework: FrameworkType::TensorFlow,
                source_dir,
                output_dir: None,
                config_path: Some(config_path),
            },
            mode,
        )
    }
}
