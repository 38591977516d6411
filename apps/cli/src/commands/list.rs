//! `tlk list`: catalog queries.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use tlk_training::{FrameworkType, ModelRegistry, UseCaseType};

use crate::validation;

#[derive(Subcommand, Debug)]
pub enum ListCommand {
    /// List the supported pretrained models
    Models {
        /// Only list models for this framework (tensorflow, pytorch)
        #[arg(long, value_parser = validation::framework)]
        framework: Option<FrameworkType>,

        /// Only list models for this use case (image_classification, text_classification)
        #[arg(long, value_parser = validation::use_case)]
        use_case: Option<UseCaseType>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn execute(command: ListCommand) -> Result<()> {
    match command {
        ListCommand::Models { framework, use_case, json } => list_models(framework, use_case, json),
    }
}

fn list_models(framework: Option<FrameworkType>, use_case: Option<UseCaseType>, json: bool) -> Result<()> {
    let registry = ModelRegistry::builtin()?;
    let models = registry.list(framework, use_case);

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    if models.is_empty() {
        println!("{}", "No models match the given filters.".dimmed());
        return Ok(());
    }

    println!("{:<36} {:<12} {:<22} {}", "Name", "Framework", "Use case", "Image size");
    println!("{}", "-".repeat(82));
    for model in models {
        let size = model.image_size.map_or_else(|| "-".to_string(), |s| s.to_string());
        println!(
            "{:<36} {:<12} {:<22} {}",
            model.name.cyan(),
            model.framework.to_string(),
            model.use_case.to_string(),
            size.dimmed()
        );
    }
    Ok(())
}
