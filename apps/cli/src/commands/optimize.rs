//! `tlk optimize`: FP32 graph optimization of an exported model.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tlk_training::{GraphOptimizationWorkflow, OptimizationRequest, TracingProgressSink};

use crate::config::TlkConfig;
use crate::validation;

#[derive(Args, Debug)]
pub struct OptimizeArgs {
    /// Model directory containing a saved_model.pb file
    #[arg(long, value_parser = validation::existing_dir)]
    pub model_dir: PathBuf,

    /// Output directory; the model is written to <output-dir>/optimized/<model>/<n>
    #[arg(long, value_parser = validation::output_dir)]
    pub output_dir: PathBuf,
}

pub fn execute(args: OptimizeArgs, config: &TlkConfig) -> Result<()> {
    let registry = super::registry(config)?;
    let progress = TracingProgressSink;

    let outcome = GraphOptimizationWorkflow::new(&registry)
        .with_progress(&progress)
        .run(&OptimizationRequest { model_dir: args.model_dir, output_dir: args.output_dir })?;

    println!("Model name: {}", outcome.model_name.cyan());
    println!("{} {}", "Optimized model saved to:".green(), outcome.output_dir.display());
    Ok(())
}
