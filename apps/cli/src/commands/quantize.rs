//! `tlk quantize`: post-training quantization of an exported model.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tlk_training::{
    ConfigSource, DirectoryDatasetFactory, QuantizationRequest, QuantizationWorkflow, TracingProgressSink,
    TuningParams,
};

use crate::config::TlkConfig;
use crate::validation;

#[derive(Args, Debug)]
pub struct QuantizeArgs {
    /// Model directory containing a saved_model.pb or model.pt file
    #[arg(long, value_parser = validation::existing_dir)]
    pub model_dir: PathBuf,

    /// Dataset directory used for calibration and evaluation
    #[arg(long, alias = "dataset_dir", value_parser = validation::existing_dir)]
    pub dataset_dir: PathBuf,

    /// Output directory; the model is written to <output-dir>/quantized/<model>/<n>
    #[arg(long, value_parser = validation::output_dir)]
    pub output_dir: PathBuf,

    /// INC config file; one is generated next to the quantized model when omitted
    #[arg(long)]
    pub inc_config: Option<PathBuf>,

    /// Batch size used by the generated config's dataloaders
    #[arg(long, default_value = "32", allow_negative_numbers = true, value_parser = validation::positive_int)]
    pub batch_size: u32,

    /// Maximum number of tuning trials
    #[arg(long, default_value = "50", allow_negative_numbers = true, value_parser = validation::positive_int)]
    pub max_trials: u32,

    /// Tuning timeout in seconds; 0 stops at the first model meeting the accuracy criterion
    #[arg(long, default_value = "0", allow_negative_numbers = true, value_parser = validation::non_negative_int)]
    pub timeout: u64,

    /// Relative accuracy loss allowed, between 0 and 1
    #[arg(long, default_value = "0.01", allow_negative_numbers = true, value_parser = validation::unit_interval)]
    pub accuracy_criterion: f64,
}

pub fn execute(args: QuantizeArgs, config: &TlkConfig) -> Result<()> {
    println!("Model directory: {}", args.model_dir.display());
    println!("Dataset directory: {}", args.dataset_dir.display());
    if let Some(ref inc_config) = args.inc_config {
        println!("INC config file: {}", inc_config.display());
    }
    println!("Output directory: {}", args.output_dir.display());

    let registry = super::registry(config)?;
    let datasets = DirectoryDatasetFactory::default();
    let progress = TracingProgressSink;

    let request = QuantizationRequest {
        model_dir: args.model_dir,
        dataset_dir: args.dataset_dir,
        output_dir: args.output_dir,
        inc_config: args.inc_config,
        batch_size: args.batch_size,
        tuning: TuningParams {
            max_trials: args.max_trials,
            timeout: args.timeout,
            accuracy_criterion: args.accuracy_criterion,
            ..TuningParams::default()
        },
    };

    let outcome = QuantizationWorkflow::new(&registry, &datasets).with_progress(&progress).run(&request)?;

    println!();
    println!("Model name: {}", outcome.model_name.cyan());
    println!("Framework: {}", outcome.framework);
    if let ConfigSource::Generated(ref path) = outcome.config {
        println!("Wrote INC config file to: {}", path.display());
    }
    println!("{} {}", "Quantized model saved to:".green(), outcome.output_dir.display());
    Ok(())
}
