//! Command implementations for the tlk CLI.

pub mod benchmark;
pub mod hostfile;
pub mod list;
pub mod optimize;
pub mod quantize;

use anyhow::Result;
use tlk_training::ModelRegistry;

use crate::config::TlkConfig;

/// Model registry wired to the configured bridge and distributed work directory.
fn registry(config: &TlkConfig) -> Result<ModelRegistry> {
    Ok(ModelRegistry::builtin()?
        .with_bridge(config.bridge_config())
        .with_distributed_workspace(config.distributed_workspace()))
}
