//! tlk CLI - Command-line interface for the transfer-learning toolkit
//!
//! Quantizes, optimizes and benchmarks exported models, lists the supported
//! pretrained models and validates hostfiles for distributed training.
//!
//! Exit codes: 0 on success, 1 when a command fails, 2 when an argument is
//! rejected.

mod commands;
mod config;
mod validation;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use commands::{benchmark, hostfile, list, optimize, quantize};

/// tlk - transfer learning, quantization and export for pretrained models
#[derive(Parser, Debug)]
#[command(name = "tlk", author, version, about = "Transfer-learning toolkit")]
struct Args {
    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Quantize an exported model with Intel Neural Compressor
    ///
    /// The model directory must hold a saved_model.pb or model.pt file. The
    /// quantized model is written to <output-dir>/quantized/<model>/<n>.
    Quantize(quantize::QuantizeArgs),

    /// Optimize the FP32 graph of an exported model
    Optimize(optimize::OptimizeArgs),

    /// Benchmark an exported model for performance or accuracy
    Benchmark(benchmark::BenchmarkArgs),

    /// List catalog entries
    #[command(subcommand)]
    List(list::ListCommand),

    /// Validate a hostfile and print the host list for a distributed launch
    Hostfile(hostfile::HostfileArgs),
}

fn main() -> ExitCode {
    let args = Args::parse();
    let tlk_config = config::TlkConfig::discover_and_load();

    let requested = args.log_level.as_deref().or(tlk_config.log_level.as_deref()).unwrap_or("info");
    let (level, unknown_level) = match requested.to_lowercase().as_str() {
        "trace" => (Level::TRACE, None),
        "debug" => (Level::DEBUG, None),
        "info" => (Level::INFO, None),
        "warn" => (Level::WARN, None),
        "error" => (Level::ERROR, None),
        _ => (Level::INFO, Some(requested)),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: unable to install the log subscriber: {e}");
    }
    if let Some(unknown) = unknown_level {
        warn!("Unknown log level '{unknown}', using info");
    }

    let result = match args.command {
        Command::Quantize(cmd) => quantize::execute(cmd, &tlk_config),
        Command::Optimize(cmd) => optimize::execute(cmd, &tlk_config),
        Command::Benchmark(cmd) => benchmark::execute(cmd, &tlk_config),
        Command::List(cmd) => list::execute(cmd),
        Command::Hostfile(cmd) => hostfile::execute(cmd),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
