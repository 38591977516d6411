//! Integration tests for the quantization workflow over a real `TfModel`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tlk_training::{
    BenchmarkMode, BenchmarkReport, CompressionEngine, CompressionJob, ConfigSource, DatasetFactory,
    DirectoryDatasetFactory, Evaluation, FitOutcome, FitRequest, FrameworkRuntime, FrameworkType, IncConfig,
    ModelFactory, PredictInput, QuantizationRequest, QuantizationWorkflow, RuntimeOptions, TfModel,
    TrainingError, TrainingResult, TransferModel, TuningParams, UseCaseType, WorkflowError, DatasetHandle,
};

struct OfflineRuntime;

impl FrameworkRuntime for OfflineRuntime {
    fn framework(&self) -> FrameworkType {
        FrameworkType::TensorFlow
    }

    fn version(&self) -> TrainingResult<Option<semver::Version>> {
        Ok(Some(semver::Version::new(2, 13, 0)))
    }

    fn fit(&self, _request: &FitRequest<'_>) -> TrainingResult<FitOutcome> {
        Err(TrainingError::Runtime("not available in tests".to_string()))
    }

    fn evaluate(&self, _: &Path, _: &DatasetHandle, _: &RuntimeOptions) -> TrainingResult<Evaluation> {
        Err(TrainingError::Runtime("not available in tests".to_string()))
    }

    fn predict(&self, _: &Path, _: &PredictInput<'_>, _: &RuntimeOptions) -> TrainingResult<Vec<Vec<f32>>> {
        Err(TrainingError::Runtime("not available in tests".to_string()))
    }
}

/// Engine that writes a marker model and remembers each job's output directory.
#[derive(Default)]
struct MarkerEngine {
    quantized: Mutex<Vec<PathBuf>>,
}

impl CompressionEngine for MarkerEngine {
    fn quantize(&self, job: &CompressionJob<'_>) -> TrainingResult<()> {
        let output = job.output_dir.expect("quantize needs an output directory");
        assert!(job.config_path.expect("quantize needs a config").is_file());
        std::fs::write(output.join("saved_model.pb"), "int8").unwrap();
        self.quantized.lock().unwrap().push(output.to_path_buf());
        Ok(())
    }

    fn optimize_graph(&self, _job: &CompressionJob<'_>) -> TrainingResult<()> {
        Ok(())
    }

    fn benchmark(&self, _job: &CompressionJob<'_>, mode: BenchmarkMode) -> TrainingResult<BenchmarkReport> {
        Ok(BenchmarkReport { mode, metrics: BTreeMap::new() })
    }
}

/// Engine whose every call fails.
struct FailingEngine;

impl CompressionEngine for FailingEngine {
    fn quantize(&self, _job: &CompressionJob<'_>) -> TrainingResult<()> {
        Err(TrainingError::Engine("boom".to_string()))
    }

    fn optimize_graph(&self, _job: &CompressionJob<'_>) -> TrainingResult<()> {
        Err(TrainingError::Engine("boom".to_string()))
    }

    fn benchmark(&self, _job: &CompressionJob<'_>, _mode: BenchmarkMode) -> TrainingResult<BenchmarkReport> {
        Err(TrainingError::Engine("boom".to_string()))
    }
}

struct TestModels {
    engine: Arc<dyn CompressionEngine>,
}

impl ModelFactory for TestModels {
    fn get_model(&self, model_name: &str, framework: FrameworkType) -> TrainingResult<Box<dyn TransferModel>> {
        if framework != FrameworkType::TensorFlow || model_name != "efficientnet_b0" {
            return Err(TrainingError::NotFound(format!(
                "The specified model is not supported for {framework}: {model_name}"
            )));
        }
        let mut model =
            TfModel::new(model_name, UseCaseType::ImageClassification, Arc::new(OfflineRuntime), self.engine.clone())?
                .with_image_size(224);
        model.set_seed(Some(7));
        Ok(Box::new(model))
    }
}

fn setup(temp: &TempDir) -> (PathBuf, PathBuf) {
    let model_dir = temp.path().join("models").join("efficientnet_b0").join("3");
    std::fs::create_dir_all(model_dir.join("variables")).unwrap();
    std::fs::write(model_dir.join("saved_model.pb"), "graph").unwrap();

    let dataset_dir = temp.path().join("flowers");
    for class in ["daisy", "dandelion", "roses"] {
        std::fs::create_dir_all(dataset_dir.join(class)).unwrap();
        std::fs::write(dataset_dir.join(class).join("0.jpg"), "jpg").unwrap();
    }
    (model_dir, dataset_dir)
}

fn request(temp: &TempDir, model_dir: &Path, dataset_dir: &Path) -> QuantizationRequest {
    QuantizationRequest {
        model_dir: model_dir.to_path_buf(),
        dataset_dir: dataset_dir.to_path_buf(),
        output_dir: temp.path().join("output"),
        inc_config: None,
        batch_size: 32,
        tuning: TuningParams { max_trials: 5, ..TuningParams::default() },
    }
}

#[test]
fn test_quantize_versioned_saved_model_without_config() {
    let temp = TempDir::new().unwrap();
    let (model_dir, dataset_dir) = setup(&temp);
    let engine = Arc::new(MarkerEngine::default());
    let models = TestModels { engine: engine.clone() };
    let datasets = DirectoryDatasetFactory::default();

    let outcome = QuantizationWorkflow::new(&models, &datasets)
        .run(&request(&temp, &model_dir, &dataset_dir))
        .unwrap();

    let expected = temp.path().join("output").join("quantized").join("efficientnet_b0").join("1");
    assert_eq!(outcome.model_name, "efficientnet_b0");
    assert_eq!(outcome.framework, FrameworkType::TensorFlow);
    assert_eq!(outcome.output_dir, expected);
    assert_eq!(engine.quantized.lock().unwrap().as_slice(), [expected.clone()]);

    let ConfigSource::Generated(config_path) = &outcome.config else {
        panic!("expected a generated config, got {:?}", outcome.config);
    };
    let config = IncConfig::read(config_path).unwrap();
    assert_eq!(config.tuning.exit_policy.max_trials, 5);
    assert_eq!(config.quantization.calibration.dataloader.batch_size, 32);
    assert_eq!(config.quantization.calibration.dataloader.dataset["ImageFolder"].root, dataset_dir);
}

#[test]
fn test_repeated_quantization_produces_sequential_versions() {
    let temp = TempDir::new().unwrap();
    let (model_dir, dataset_dir) = setup(&temp);
    let models = TestModels { engine: Arc::new(MarkerEngine::default()) };
    let datasets = DirectoryDatasetFactory::default();
    let workflow = QuantizationWorkflow::new(&models, &datasets);

    for expected in 1..=3 {
        let outcome = workflow.run(&request(&temp, &model_dir, &dataset_dir)).unwrap();
        assert_eq!(outcome.output_dir.file_name().unwrap().to_str().unwrap(), expected.to_string());
    }
}

#[test]
fn test_provided_config_is_used_unmodified() {
    let temp = TempDir::new().unwrap();
    let (model_dir, dataset_dir) = setup(&temp);
    let models = TestModels { engine: Arc::new(MarkerEngine::default()) };
    let datasets = DirectoryDatasetFactory::default();

    let config = temp.path().join("custom.yaml");
    std::fs::write(&config, "version: 1.0\n").unwrap();
    let mut req = request(&temp, &model_dir, &dataset_dir);
    req.inc_config = Some(config.clone());

    let outcome = QuantizationWorkflow::new(&models, &datasets).run(&req).unwrap();
    assert_eq!(outcome.config, ConfigSource::Provided(config.clone()));
    assert_eq!(std::fs::read_to_string(&config).unwrap(), "version: 1.0\n");
    assert!(!outcome.output_dir.join("inc_config.yaml").exists());
}

#[test]
fn test_unsupported_model_file() {
    let temp = TempDir::new().unwrap();
    let (_, dataset_dir) = setup(&temp);
    let model_dir = temp.path().join("odd");
    std::fs::create_dir_all(&model_dir).unwrap();
    std::fs::write(model_dir.join("unsupported_model_type.txt"), "?").unwrap();

    let models = TestModels { engine: Arc::new(MarkerEngine::default()) };
    let datasets = DirectoryDatasetFactory::default();
    let err = QuantizationWorkflow::new(&models, &datasets)
        .run(&request(&temp, &model_dir, &dataset_dir))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::UnsupportedModelFile { .. }));
    assert!(!temp.path().join("output").exists());
}

#[test]
fn test_empty_dataset_dir_is_a_dataset_error() {
    let temp = TempDir::new().unwrap();
    let (model_dir, _) = setup(&temp);
    let empty = temp.path().join("empty");
    std::fs::create_dir_all(&empty).unwrap();

    let models = TestModels { engine: Arc::new(MarkerEngine::default()) };
    let datasets = DirectoryDatasetFactory::default();
    let err = QuantizationWorkflow::new(&models, &datasets)
        .run(&request(&temp, &model_dir, &empty))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::DatasetLoad(_)));
}

#[test]
fn test_dataset_factory_matches_model_tags() {
    let temp = TempDir::new().unwrap();
    let (_, dataset_dir) = setup(&temp);
    let dataset = DirectoryDatasetFactory::default()
        .load_dataset(&dataset_dir, UseCaseType::ImageClassification, FrameworkType::TensorFlow)
        .unwrap();
    assert_eq!(dataset.class_names().len(), 3);
}

#[test]
fn test_engine_failure_does_not_consume_a_version() {
    let temp = TempDir::new().unwrap();
    let (model_dir, dataset_dir) = setup(&temp);
    let datasets = DirectoryDatasetFactory::default();
    let stage_dir = temp.path().join("output").join("quantized").join("efficientnet_b0");

    let failing = TestModels { engine: Arc::new(FailingEngine) };
    let err = QuantizationWorkflow::new(&failing, &datasets)
        .run(&request(&temp, &model_dir, &dataset_dir))
        .unwrap_err();
    assert_eq!(err.to_string(), "Unable to quantize the model: compression engine error: boom");
    assert!(!stage_dir.join("1").exists());

    let models = TestModels { engine: Arc::new(MarkerEngine::default()) };
    let outcome = QuantizationWorkflow::new(&models, &datasets)
        .run(&request(&temp, &model_dir, &dataset_dir))
        .unwrap();
    assert_eq!(outcome.output_dir, stage_dir.join("1"));
}
