//! CLI command definitions and dispatch.

pub mod cleanup;
pub mod probes;
pub mod verify;

use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use kaitcheck_common::config::HarnessConfig;

/// Verify that a container image starts and bundles its tools.
#[derive(Parser, Debug)]
#[command(name = "kaitcheck", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "KAITCHECK_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Format of log lines written to stderr.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch the image, wait for readiness, and run every probe.
    Verify(verify::VerifyArgs),
    /// Print the configured probe table.
    Probes(probes::ProbesArgs),
    /// Remove containers left behind by interrupted runs.
    Cleanup(cleanup::CleanupArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Verify(args) => verify::execute(args),
        Command::Probes(args) => probes::execute(&args),
        Command::Cleanup(args) => cleanup::execute(&args),
    }
}

/// Loads the configuration file if one was given, defaults otherwise.
fn load_config(path: Option<&Path>) -> anyhow::Result<HarnessConfig> {
    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading configuration");
            HarnessConfig::from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Ok(HarnessConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_verify_overrides() {
        let cli = Cli::try_parse_from([
            "kaitcheck",
            "--log-format",
            "json",
            "verify",
            "--image",
            "kait:dev",
            "--probe-timeout",
            "0",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Command::Verify(args) => {
                assert_eq!(args.image.as_deref(), Some("kait:dev"));
                assert_eq!(args.probe_timeout, Some(0));
                assert!(args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.json"))).is_err());
        assert_eq!(load_config(None).unwrap(), HarnessConfig::default());
    }
}
