//! `kaitcheck cleanup`: Remove containers left behind by interrupted runs.

use std::process::ExitCode;

use clap::Args;
use kaitcheck_common::constants::{DEFAULT_CONTAINER_CLI, MANAGED_LABEL};
use kaitcheck_runtime::backend::docker::DockerCliRuntime;

/// Arguments for the `cleanup` command.
#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Container CLI to use.
    #[arg(long, env = "KAITCHECK_CONTAINER_CLI", default_value = DEFAULT_CONTAINER_CLI)]
    pub container_cli: String,
}

/// Executes the `cleanup` command.
///
/// Removes every container carrying the managed label, whichever
/// process created it.
///
/// # Errors
///
/// Returns an error if the CLI cannot be found or the removal fails.
pub fn execute(args: &CleanupArgs) -> anyhow::Result<ExitCode> {
    let runtime =
        DockerCliRuntime::locate(&args.container_cli).map_err(|e| anyhow::anyhow!("{e}"))?;
    let removed = runtime
        .remove_managed_containers()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::info!(removed, label = MANAGED_LABEL, "cleanup finished");
    eprintln!("Removed {removed} container(s).");
    Ok(ExitCode::SUCCESS)
}
