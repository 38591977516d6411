use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Quantization,
    GraphOptimization,
    Benchmark,
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Quantization => "quantize",
            Self::GraphOptimization => "optimize",
            Self::Benchmark => "benchmark",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Started { workflow: WorkflowKind, model_dir: PathBuf },
    Message { workflow: WorkflowKind, message: String },
    Finished { workflow: WorkflowKind, output: Option<PathBuf> },
}

pub trait ProgressSink {
    fn on_event(&self, event: WorkflowEvent);
}

/// Reports workflow progress through `tracing`.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: WorkflowEvent) {
        match event {
            WorkflowEvent::Started { workflow, model_dir } => {
                info!("[{workflow}] started for {}", model_dir.display());
            }
            WorkflowEvent::Message { workflow, message } => info!("[{workflow}] {message}"),
            WorkflowEvent::Finished { workflow, output: Some(output) } => {
                info!("[{workflow}] finished: {}", output.display());
            }
            WorkflowEvent::Finished { workflow, output: None } => info!("[{workflow}] finished"),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: WorkflowEvent) {}
}
