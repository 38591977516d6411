//! `tlk benchmark`: performance or accuracy benchmark of an exported model.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tlk_training::{run_benchmark, BenchmarkMode, BenchmarkRequest, DirectoryDatasetFactory, TracingProgressSink, TuningParams};

use crate::config::TlkConfig;
use crate::validation;

#[derive(Args, Debug)]
pub struct BenchmarkArgs {
    /// Model directory containing a saved_model.pb file
    #[arg(long, value_parser = validation::existing_dir)]
    pub model_dir: PathBuf,

    /// Dataset directory used by the benchmark dataloader
    #[arg(long, alias = "dataset_dir", value_parser = validation::existing_dir)]
    pub dataset_dir: PathBuf,

    /// INC config file; a temporary one is generated when omitted
    #[arg(long)]
    pub inc_config: Option<PathBuf>,

    /// Benchmark mode (performance or accuracy)
    #[arg(long, default_value = "performance", value_parser = validation::benchmark_mode)]
    pub mode: BenchmarkMode,

    /// Batch size used by the generated config's dataloaders
    #[arg(long, default_value = "32", allow_negative_numbers = true, value_parser = validation::positive_int)]
    pub batch_size: u32,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: BenchmarkArgs, config: &TlkConfig) -> Result<()> {
    let registry = super::registry(config)?;
    let datasets = DirectoryDatasetFactory::default();
    let progress = TracingProgressSink;

    let request = BenchmarkRequest {
        model_dir: args.model_dir,
        dataset_dir: args.dataset_dir,
        inc_config: args.inc_config,
        mode: args.mode,
        batch_size: args.batch_size,
        tuning: TuningParams::default(),
    };
    let report = run_benchmark(&registry, &datasets, &progress, &request)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", format!("Benchmark ({})", report.mode).bold().cyan());
    for (metric, value) in &report.metrics {
        println!("  {:<24} {value}", metric);
    }
    Ok(())
}
