//! `kaitcheck verify`: Launch the image and run the probe table.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use kaitcheck_common::config::HarnessConfig;
use kaitcheck_runtime::backend::ContainerRuntime;
use kaitcheck_runtime::backend::docker::DockerCliRuntime;
use kaitcheck_runtime::harness::Harness;

use crate::output;

/// Exit code used after Ctrl+C, as shells report it for SIGINT.
const INTERRUPTED: i32 = 130;

/// Arguments for the `verify` command.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// JSON configuration file.
    #[arg(short, long, env = "KAITCHECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Image reference to verify.
    #[arg(long, env = "KAITCHECK_IMAGE")]
    pub image: Option<String>,

    /// Seconds to wait for the readiness endpoint.
    #[arg(long, value_name = "SECS")]
    pub startup_timeout: Option<u64>,

    /// Seconds each probe may run; 0 disables the limit.
    #[arg(long, value_name = "SECS")]
    pub probe_timeout: Option<u64>,

    /// Container CLI to use (`docker`, `podman`, or a path).
    #[arg(long, env = "KAITCHECK_CONTAINER_CLI")]
    pub container_cli: Option<String>,

    /// Print the report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

impl VerifyArgs {
    /// Applies command-line overrides on top of a loaded configuration.
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(image) = &self.image {
            config.image.clone_from(image);
        }
        if let Some(secs) = self.startup_timeout {
            config.readiness.startup_timeout_secs = secs;
        }
        if let Some(secs) = self.probe_timeout {
            config.probe_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(cli) = &self.container_cli {
            config.container_cli.clone_from(cli);
        }
    }
}

/// Executes the `verify` command.
///
/// Exits with status 1 when any probe fails. A container that cannot be
/// launched is reported as an error.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the container CLI is
/// missing or unreachable, or the container never becomes ready.
pub fn execute(args: VerifyArgs) -> anyhow::Result<ExitCode> {
    let mut config = super::load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;

    let runtime =
        DockerCliRuntime::locate(&config.container_cli).map_err(|e| anyhow::anyhow!("{e}"))?;
    if !runtime.is_available() {
        return Err(anyhow::anyhow!(
            "`{}` cannot reach a container engine.\n\
             Start the engine or pass --container-cli",
            config.container_cli
        ));
    }
    install_interrupt_handler(&runtime)?;
    tracing::info!(
        image = %config.image,
        cli = runtime.name(),
        session = runtime.session_id(),
        "verifying image"
    );

    let harness = Harness::new(Arc::new(runtime));
    let report = harness.verify(&config).map_err(|e| anyhow::anyhow!("{e}"))?;

    if args.json {
        println!("{}", report.to_json().map_err(|e| anyhow::anyhow!("{e}"))?);
    } else {
        print!("{}", output::render_report(&report));
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Removes this session's containers and exits when Ctrl+C is pressed.
fn install_interrupt_handler(runtime: &DockerCliRuntime) -> anyhow::Result<()> {
    let runtime = runtime.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("  Interrupted, removing containers...");
        match runtime.remove_session_containers() {
            Ok(count) => tracing::info!(count, "session containers removed"),
            Err(e) => tracing::warn!(error = %e, "could not remove session containers"),
        }
        std::process::exit(INTERRUPTED);
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))
}
