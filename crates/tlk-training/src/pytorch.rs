//! PyTorch realization of [`TransferModel`].
//!
//! Training, evaluation, prediction and export go through the runtime like
//! the TensorFlow model. Compression config generation, quantization and
//! graph optimization are not available for PyTorch models.

use crate::backend::{FitRequest, FrameworkRuntime};
use crate::dataset::DatasetHandle;
use crate::error::{TrainingError, TrainingResult};
use crate::inc_config::TuningParams;
use crate::job::{LossClass, LossSpec, OptimizerClass, OptimizerSpec, RuntimeOptions};
use crate::layout::{copy_dir, is_empty_dir, validate_model_name, verify_directory, OutputLayout};
use crate::model::{
    check_dataset, require_state, Evaluation, ModelState, PredictInput, TrainOptions, TrainingHistory,
    TransferModel, DEFAULT_LEARNING_RATE,
};
use crate::types::{FrameworkType, UseCaseType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const MODEL_FILE: &str = "model.pt";

pub struct PtModel {
    model_name: String,
    use_case: UseCaseType,
    learning_rate: f64,
    state: ModelState,
    model_dir: Option<PathBuf>,
    optimizer: OptimizerSpec,
    loss: LossSpec,
    options: RuntimeOptions,
    runtime: Arc<dyn FrameworkRuntime>,
}

impl std::fmt::Debug for PtModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtModel")
            .field("model_name", &self.model_name)
            .field("use_case", &self.use_case)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PtModel {
    pub fn new(model_name: &str, use_case: UseCaseType, runtime: Arc<dyn FrameworkRuntime>) -> TrainingResult<Self> {
        Ok(Self {
            model_name: validate_model_name(model_name)?,
            use_case,
            learning_rate: DEFAULT_LEARNING_RATE,
            state: ModelState::Unloaded,
            model_dir: None,
            optimizer: OptimizerSpec::new(OptimizerClass::Adam, DEFAULT_LEARNING_RATE),
            loss: LossSpec::new(LossClass::CategoricalCrossentropy, serde_json::json!({})),
            options: RuntimeOptions::default(),
            runtime,
        })
    }

    pub fn set_seed(&mut self, seed: Option<u64>) {
        if seed.is_some() {
            self.options.seed = seed;
        }
    }

    fn weights_dir(&self, action: &str) -> TrainingResult<&Path> {
        require_state(self.state, &[ModelState::Loaded, ModelState::Trained], action)?;
        self.model_dir.as_deref().ok_or_else(|| {
            TrainingError::InvalidState(format!(
                "Unable to {action} the model, because it hasn't been loaded or trained yet"
            ))
        })
    }

    fn unsupported(&self, operation: &str) -> TrainingError {
        TrainingError::Unsupported(format!(
            "{operation} is not supported for PyTorch models ({})",
            self.model_name
        ))
    }
}

impl TransferModel for PtModel {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn framework(&self) -> FrameworkType {
        FrameworkType::PyTorch
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
        if !model_dir.join(MODEL_FILE).is_file() {
            return Err(TrainingError::NotFound(format!(
                "Unable to find a model.pt file in {}",
                model_dir.display()
            )));
        }
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
        check_dataset(dataset, self.use_case, FrameworkType::PyTorch)?;
        if options.epochs == 0 {
            return Err(TrainingError::InvalidValue("epochs must be >= 1".to_string()));
        }
        verify_directory(output_dir, false)?;
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

        self.model_dir = Some(outcome.model_dir);
        self.state = ModelState::Trained;
        Ok(outcome.history)
    }

    fn evaluate(&self, dataset: &DatasetHandle) -> TrainingResult<Evaluation> {
        let model_dir = self.weights_dir("evaluate")?;
        check_dataset(dataset, self.use_case, FrameworkType::PyTorch)?;
        self.runtime.evaluate(model_dir, dataset, &self.options)
    }

    fn predict(&self, input: PredictInput<'_>) -> TrainingResult<Vec<Vec<f32>>> {
        let model_dir = self.weights_dir("predict with")?;
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
        copy_dir(model_dir, &target, &[])?;
        info!(model = %self.model_name, path = %target.display(), "Saved model directory");
        Ok(target)
    }

    fn write_inc_config_file(
        &mut self,
        _config_path: &Path,
        _dataset: &DatasetHandle,
        _batch_size: u32,
        _overwrite: bool,
        _tuning: &TuningParams,
    ) -> TrainingResult<()> {
        Err(self.unsupported("Writing an INC config file"))
    }

    fn quantize(&self, _source_dir: &Path, _output_dir: &Path, _config_path: &Path) -> TrainingResult<()> {
        Err(self.unsupported("Quantization"))
    }

    fn optimize_graph(&self, _source_dir: &Path, _output_dir: &Path) -> TrainingResult<()> {
        Err(self.unsupported("Graph optimization"))
    }
}
