//! `kaitcheck probes`: Print the configured probe table.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;

use crate::output;

/// Arguments for the `probes` command.
#[derive(Args, Debug)]
pub struct ProbesArgs {
    /// JSON configuration file.
    #[arg(short, long, env = "KAITCHECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the table as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `probes` command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded.
pub fn execute(args: &ProbesArgs) -> anyhow::Result<ExitCode> {
    let config = super::load_config(args.config.as_deref())?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&config.probes)?);
    } else {
        print!("{}", output::render_probe_table(&config.probes));
    }
    Ok(ExitCode::SUCCESS)
}
