//! External numeric services: the framework runtime and the compression engine.
//!
//! Both are opaque to this crate. [`ProcessBridge`] fronts them with a child
//! process that reads one JSON request on stdin and answers with one JSON
//! response on stdout.

use crate::dataset::DatasetHandle;
use crate::error::{TrainingError, TrainingResult};
use crate::job::{LossSpec, OptimizerSpec, RuntimeOptions};
use crate::model::{BenchmarkMode, BenchmarkReport, Evaluation, PredictInput, TrainingHistory};
use crate::types::{FrameworkType, UseCaseType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Arguments for a fine-tuning run.
#[derive(Debug, Clone, Serialize)]
pub struct FitRequest<'a> {
    pub model_name: &'a str,
    pub use_case: UseCaseType,
    /// Saved model to start from; `None` starts from the pretrained hub weights.
    pub model_dir: Option<&'a Path>,
    pub dataset: &'a DatasetHandle,
    pub output_dir: &'a Path,
    pub epochs: u32,
    pub optimizer: &'a OptimizerSpec,
    pub loss: &'a LossSpec,
    pub initial_checkpoints: Option<&'a Path>,
    pub do_eval: bool,
    pub options: &'a RuntimeOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOutcome {
    /// Saved model holding the fine-tuned weights.
    pub model_dir: PathBuf,
    #[serde(default)]
    pub history: TrainingHistory,
}

/// Numeric operations of a deep-learning framework.
pub trait FrameworkRuntime {
    fn framework(&self) -> FrameworkType;

    /// Installed framework version, when it can be determined.
    fn version(&self) -> TrainingResult<Option<semver::Version>>;

    fn fit(&self, request: &FitRequest<'_>) -> TrainingResult<FitOutcome>;

    fn evaluate(
        &self,
        model_dir: &Path,
        dataset: &DatasetHandle,
        options: &RuntimeOptions,
    ) -> TrainingResult<Evaluation>;

    fn predict(
        &self,
        model_dir: &Path,
        input: &PredictInput<'_>,
        options: &RuntimeOptions,
    ) -> TrainingResult<Vec<Vec<f32>>>;

    /// Re-save a model file (such as a Keras `.h5`) as a SavedModel in `output_dir`.
    fn save_model(&self, source: &Path, _output_dir: &Path, _options: &RuntimeOptions) -> TrainingResult<()> {
        Err(TrainingError::Unsupported(format!(
            "{} cannot convert {} to a SavedModel",
            self.framework(),
            source.display()
        )))
    }
}

/// A model directory handed to the compression engine.
#[derive(Debug, Clone, Serialize)]
pub struct CompressionJob<'a> {
    pub framework: FrameworkType,
    pub source_dir: &'a Path,
    pub output_dir: Option<&'a Path>,
    pub config_path: Option<&'a Path>,
}

/// Quantization, graph optimization and benchmarking.
pub trait CompressionEngine {
    fn quantize(&self, job: &CompressionJob<'_>) -> TrainingResult<()>;

    fn optimize_graph(&self, job: &CompressionJob<'_>) -> TrainingResult<()>;

    fn benchmark(&self, job: &CompressionJob<'_>, mode: BenchmarkMode) -> TrainingResult<BenchmarkReport>;
}

/// Program used to reach the external libraries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the child process only.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-m".to_string(), "tlk_bridge".to_string()],
            env: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a, P: Serialize> {
    op: &'a str,
    framework: FrameworkType,
    options: &'a RuntimeOptions,
    payload: P,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    ok: bool,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Service {
    Runtime,
    Engine,
}

impl Service {
    fn error(self, message: String) -> TrainingError {
        match self {
            Self::Runtime => TrainingError::Runtime(message),
            Self::Engine => TrainingError::Engine(message),
        }
    }
}

/// Subprocess bridge implementing [`FrameworkRuntime`] and [`CompressionEngine`].
#[derive(Debug, Clone)]
pub struct ProcessBridge {
    framework: FrameworkType,
    config: BridgeConfig,
}

impl ProcessBridge {
    #[must_use]
    pub fn new(framework: FrameworkType, config: BridgeConfig) -> Self {
        Self { framework, config }
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn command(&self, options: &RuntimeOptions) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args);
        // oneDNN optimizations stay on for every framework call.
        cmd.env("TF_ENABLE_ONEDNN_OPTS", "1");
        if let Some(seed) = options.seed {
            cmd.env("PYTHONHASHSEED", seed.to_string());
        }
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }

    fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        service: Service,
        op: &str,
        options: &RuntimeOptions,
        payload: P,
    ) -> TrainingResult<R> {
        let request = BridgeRequest { op, framework: self.framework, options, payload };
        let body = serde_json::to_vec(&request)?;

        debug!(program = %self.config.program, op, framework = %self.framework, "Calling bridge");

        let mut child = self.command(options).spawn().map_err(|e| {
            service.error(format!("failed to start '{}': {e}", self.config.program))
        })?;

        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&body),
            None => Ok(()),
        };
        // Reap the child even when it stopped reading early.
        let output = child
            .wait_with_output()
            .map_err(|e| service.error(format!("failed to wait for '{}': {e}", self.config.program)))?;
        if let Err(e) = written {
            return Err(service.error(format!(
                "failed to send '{op}' to '{}' ({}): {e}",
                self.config.program,
                last_line(&String::from_utf8_lossy(&output.stderr))
            )));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(service.error(format!(
                "'{op}' exited with {}: {}",
                output.status,
                last_line(&stderr)
            )));
        }

        let response: BridgeResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| service.error(format!("invalid response to '{op}': {e}")))?;
        if !response.ok {
            return Err(service.error(
                response.error.unwrap_or_else(|| format!("'{op}' failed without a message")),
            ));
        }

        serde_json::from_value(response.result)
            .map_err(|e| service.error(format!("unexpected result for '{op}': {e}")))
    }
}

fn last_line(stderr: &str) -> &str {
    stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("no output").trim()
}

/// Parse a framework version string such as `2.12.0`, `2.9` or `2.15.0-rc1`.
#[must_use]
pub fn parse_runtime_version(raw: &str) -> Option<semver::Version> {
    let raw = raw.trim().trim_start_matches('v');
    if let Ok(v) = semver::Version::parse(raw) {
        return Some(v);
    }

    let core = raw.split(['-', '+']).next().unwrap_or(raw);
    let mut parts = core.split('.').map(|p| p.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().unwrap_or(Ok(0)).ok()?;
    let patch = parts.next().unwrap_or(Ok(0)).ok()?;
    Some(semver::Version::new(major, minor, patch))
}

#[derive(Debug, Deserialize)]
struct VersionResult {
    version: Option<String>,
}

#[derive(Debug, Serialize)]
struct ModelPayload<'a, T: Serialize> {
    model_dir: &'a Path,
    #[serde(flatten)]
    rest: T,
}

#[derive(Debug, Serialize)]
struct SaveModelPayload<'a> {
    source: &'a Path,
    output_dir: &'a Path,
}

#[derive(Debug, Serialize)]
struct DatasetArgs<'a> {
    dataset: &'a DatasetHandle,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PredictPayload<'a> {
    Dataset { dataset: &'a DatasetHandle },
    Samples { samples: &'a [Vec<f32>] },
}

#[derive(Debug, Serialize)]
struct PredictArgs<'a> {
    input: PredictPayload<'a>,
}

impl FrameworkRuntime for ProcessBridge {
    fn framework(&self) -> FrameworkType {
        self.framework
    }

    fn version(&self) -> TrainingResult<Option<semver::Version>> {
        let result: VersionResult =
            self.call(Service::Runtime, "version", &RuntimeOptions::default(), serde_json::json!({}))?;
        Ok(result.version.as_deref().and_then(parse_runtime_version))
    }

    fn fit(&self, request: &FitRequest<'_>) -> TrainingResult<FitOutcome> {
        info!(model = request.model_name, epochs = request.epochs, "Starting fine-tuning");
        self.call(Service::Runtime, "fit", request.options, request)
    }

    fn evaluate(
        &self,
        model_dir: &Path,
        dataset: &DatasetHandle,
        options: &RuntimeOptions,
    ) -> TrainingResult<Evaluation> {
        let payload = ModelPayload { model_dir, rest: DatasetArgs { dataset } };
        self.call(Service::Runtime, "evaluate", options, payload)
    }

    fn predict(
        &self,
        model_dir: &Path,
        input: &PredictInput<'_>,
        options: &RuntimeOptions,
    ) -> TrainingResult<Vec<Vec<f32>>> {
        let input = match input {
            PredictInput::Dataset(dataset) => PredictPayload::Dataset { dataset },
            PredictInput::Samples(samples) => PredictPayload::Samples { samples },
        };
        let payload = ModelPayload { model_dir, rest: PredictArgs { input } };
        self.call(Service::Runtime, "predict", options, payload)
    }

    fn save_model(&self, source: &Path, output_dir: &Path, options: &RuntimeOptions) -> TrainingResult<()> {
        let _: serde_json::Value =
            self.call(Service::Runtime, "save_model", options, SaveModelPayload { source, output_dir })?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct BenchmarkPayload<'a> {
    #[serde(flatten)]
    job: &'a CompressionJob<'a>,
    mode: BenchmarkMode,
}

impl CompressionEngine for ProcessBridge {
    fn quantize(&self, job: &CompressionJob<'_>) -> TrainingResult<()> {
        let _: serde_json::Value = self.call(Service::Engine, "quantize", &RuntimeOptions::default(), job)?;
        Ok(())
    }

    fn optimize_graph(&self, job: &CompressionJob<'_>) -> TrainingResult<()> {
        let _: serde_json::Value =
            self.call(Service::Engine, "optimize_graph", &RuntimeOptions::default(), job)?;
        Ok(())
    }

    fn benchmark(&self, job: &CompressionJob<'_>, mode: BenchmarkMode) -> TrainingResult<BenchmarkReport> {
        self.call(Service::Engine, "benchmark", &RuntimeOptions::default(), BenchmarkPayload { job, mode })
    }
}
