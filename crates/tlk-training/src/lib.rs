//! tlk training
//!
//! Transfer-learning primitives for:
//! - Loading, fine-tuning and exporting pretrained models (`TransferModel`)
//! - Post-training quantization and graph optimization into versioned output directories
//! - Handing a training run off to an out-of-process distributed launcher
//! - Parsing hostfiles for distributed launch

pub mod artifacts;
pub mod backend;
pub mod dataset;
pub mod distributed;
pub mod error;
pub mod hostfile;
pub mod inc_config;
pub mod job;
pub mod layout;
pub mod model;
pub mod platform;
pub mod progress;
pub mod pytorch;
pub mod registry;
pub mod tensorflow;
pub mod types;
pub mod workflow;

pub use artifacts::{ArtifactKind, HandoffArtifact, HandoffId, HandoffManifest};
pub use backend::{BridgeConfig, CompressionEngine, CompressionJob, FitOutcome, FitRequest, FrameworkRuntime, ProcessBridge};
pub use dataset::{DatasetHandle, DatasetKind, DEFAULT_BATCH_SIZE};
pub use distributed::DistributedWorkspace;
pub use error::{TrainingError, TrainingResult};
pub use hostfile::{host_list, parse_hostfile, HostResolver, HostfileEntry, SystemResolver};
pub use inc_config::{ConfigSource, IncConfig, TuningParams, INC_CONFIG_FILE};
pub use job::{LossClass, LossSpec, OptimizerClass, OptimizerSpec, RuntimeOptions};
pub use layout::{next_version_dir, validate_model_name, verify_directory, OutputLayout, OutputStage};
pub use model::{
    BenchmarkMode, BenchmarkReport, Evaluation, ModelState, PredictInput, TrainOptions, TrainingHistory, TransferModel,
};
pub use platform::{CpuInfoDetector, PlatformDetector};
pub use progress::{NullProgressSink, ProgressSink, TracingProgressSink, WorkflowEvent, WorkflowKind};
pub use pytorch::PtModel;
pub use registry::{DatasetFactory, DirectoryDatasetFactory, ModelFactory, ModelInfo, ModelRegistry};
pub use tensorflow::{AutoMixedPrecision, TfModel};
pub use types::{FrameworkType, UseCaseType};
pub use workflow::{
    resolve_model_identity, run_benchmark, BenchmarkRequest, GraphOptimizationWorkflow, ModelIdentity,
    OptimizationOutcome, OptimizationRequest, QuantizationOutcome, QuantizationRequest, QuantizationWorkflow,
    WorkflowError,
};
