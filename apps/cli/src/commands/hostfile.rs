//! `tlk hostfile`: validate a hostfile for distributed launch.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tlk_training::{host_list, parse_hostfile, SystemResolver};

#[derive(Args, Debug)]
pub struct HostfileArgs {
    /// Hostfile with one host per line (ip, ip slots=N, ip:N, or the same with a hostname)
    pub path: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: HostfileArgs) -> Result<()> {
    let entries = parse_hostfile(&args.path, &SystemResolver)
        .with_context(|| format!("Unable to parse hostfile {}", args.path.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!("{}", host_list(&entries));
    }
    Ok(())
}
