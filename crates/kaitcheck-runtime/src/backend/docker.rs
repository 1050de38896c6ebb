//! Runtime backed by a Docker-compatible command line client.
//!
//! Works with `docker` and `podman`. Every container is labelled with
//! [`MANAGED_LABEL`] and the per-process session label so leftovers can be
//! reaped after an interrupted run.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use kaitcheck_common::constants::{CONTAINER_NAME_PREFIX, MANAGED_LABEL, SESSION_LABEL};
use kaitcheck_common::error::{ExecFailureKind, KaitError, Result};
use kaitcheck_common::types::{ContainerId, PortSpec};

use super::{ContainerRuntime, HostEndpoint};
use crate::exec::{Completion, ExecOutput, run_command};
use crate::request::LaunchRequest;

/// Deadline for bookkeeping calls (`port`, `inspect`, `rm`, ...).
const CLI_TIMEOUT: Duration = Duration::from_secs(30);

const LOCALHOST: &str = "127.0.0.1";

/// Runtime that drives a Docker-compatible CLI as a subprocess.
#[derive(Debug, Clone)]
pub struct DockerCliRuntime {
    binary: PathBuf,
    program: String,
    session: String,
    host: String,
}

impl DockerCliRuntime {
    /// Resolves `cli` on `PATH` (or as a path) and creates a runtime for it.
    ///
    /// # Errors
    ///
    /// Returns [`KaitError::NotFound`] if the binary cannot be found.
    pub fn locate(cli: &str) -> Result<Self> {
        let binary = which::which(cli).map_err(|_| KaitError::NotFound {
            kind: "container CLI",
            id: format!("{cli} (install Docker or pass --container-cli)"),
        })?;
        Ok(Self::with_binary(binary))
    }

    /// Creates a runtime for an explicit binary path without checking it.
    #[must_use]
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        let binary = binary.into();
        let program = binary.file_name().map_or_else(
            || binary.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        );
        Self {
            binary,
            program,
            session: uuid::Uuid::new_v4().simple().to_string(),
            host: daemon_host(std::env::var("DOCKER_HOST").ok().as_deref()),
        }
    }

    /// Identifier attached to every container started by this instance.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session
    }

    /// Host on which published ports are reached.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Removes every container created by this instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the containers cannot be listed or removed.
    pub fn remove_session_containers(&self) -> Result<usize> {
        self.remove_labelled(&format!("{SESSION_LABEL}={}", self.session))
    }

    /// Removes every container created by any kaitcheck process.
    ///
    /// # Errors
    ///
    /// Returns an error if the containers cannot be listed or removed.
    pub fn remove_managed_containers(&self) -> Result<usize> {
        self.remove_labelled(&format!("{MANAGED_LABEL}=true"))
    }

    fn remove_labelled(&self, label: &str) -> Result<usize> {
        let filter = format!("label={label}");
        let listing = self.run_cli(
            ["ps", "--all", "--quiet", "--filter", filter.as_str()],
            Some(CLI_TIMEOUT),
        )?;
        let ids: Vec<&str> = listing
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        tracing::info!(count = ids.len(), label, "removing labelled containers");
        let _ = self.run_cli(
            ["rm", "--force", "--volumes"].into_iter().chain(ids.iter().copied()),
            Some(CLI_TIMEOUT),
        )?;
        Ok(ids.len())
    }

    /// Runs a CLI subcommand and returns its stdout, mapping a non-zero exit
    /// to [`KaitError::Runtime`].
    fn run_cli<I, S>(&self, args: I, timeout: Option<Duration>) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let subcommand = args
            .first()
            .map(|a| a.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::debug!(cli = %self.program, ?args, "invoking container CLI");

        let mut cmd = Command::new(&self.binary);
        let _ = cmd.args(&args);
        match run_command(cmd, &self.program, timeout)? {
            Completion::Finished(out) if out.success() => Ok(out.stdout),
            Completion::Finished(out) => Err(KaitError::Runtime {
                command: subcommand,
                message: diagnostic(&out),
            }),
            Completion::TimedOut { .. } => Err(KaitError::Runtime {
                command: subcommand,
                message: format!("no answer within {:?}", timeout.unwrap_or_default()),
            }),
        }
    }
}

impl ContainerRuntime for DockerCliRuntime {
    fn name(&self) -> &str {
        &self.program
    }

    fn start(&self, request: &LaunchRequest) -> Result<ContainerId> {
        let name = format!("{CONTAINER_NAME_PREFIX}-{}", ContainerId::generate().short());
        let mut args: Vec<String> = vec![
            "run".into(),
            "--detach".into(),
            "--name".into(),
            name.clone(),
            "--label".into(),
            format!("{MANAGED_LABEL}=true"),
            "--label".into(),
            format!("{SESSION_LABEL}={}", self.session),
        ];
        for port in request.exposed_ports() {
            args.push("--publish".into());
            args.push(port.to_string());
        }
        for (key, value) in request.env() {
            args.push("--env".into());
            args.push(format!("{key}={value}"));
        }
        args.push(request.image().to_owned());

        tracing::info!(image = request.image(), %name, "starting container");
        // No deadline: `run` may have to pull the image first.
        let stdout = match self.run_cli(&args, None) {
            Ok(stdout) => stdout,
            Err(e) => {
                // `run` can fail after the container was created.
                let _ = self.run_cli(
                    ["rm", "--force", "--volumes", name.as_str()],
                    Some(CLI_TIMEOUT),
                );
                return Err(e);
            }
        };

        let id = stdout
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .ok_or_else(|| KaitError::Runtime {
                command: "run".into(),
                message: "no container ID printed".into(),
            })?;
        let id = ContainerId::new(id);
        tracing::info!(id = %id.short(), image = request.image(), "container started");
        Ok(id)
    }

    fn host_address(
        &self,
        id: &ContainerId,
        port: PortSpec,
        timeout: Option<Duration>,
    ) -> Result<HostEndpoint> {
        let spec = port.to_string();
        let out = self.run_cli(
            ["port", id.as_str(), spec.as_str()],
            Some(bounded(timeout)),
        )?;
        let host_port = parse_published_port(&out).ok_or_else(|| KaitError::Runtime {
            command: "port".into(),
            message: format!("{spec} is not published"),
        })?;
        Ok(HostEndpoint::new(self.host.clone(), host_port))
    }

    fn is_running(&self, id: &ContainerId, timeout: Option<Duration>) -> Result<bool> {
        match self.run_cli(
            ["inspect", "--format", "{{.State.Running}}", id.as_str()],
            Some(bounded(timeout)),
        ) {
            Ok(out) => Ok(out.trim() == "true"),
            Err(KaitError::Runtime { message, .. }) if is_missing_container(&message) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn exec(
        &self,
        id: &ContainerId,
        argv: &[String],
        timeout: Option<Duration>,
    ) -> Result<ExecOutput> {
        let exec_error = |reason| KaitError::Exec {
            id: id.to_string(),
            command: argv.to_vec(),
            reason,
        };
        let Some(program) = argv.first() else {
            return Err(exec_error(ExecFailureKind::Dispatch(
                "exec command is empty".into(),
            )));
        };

        tracing::info!(id = %id.short(), cmd = ?argv, "exec into container");
        let mut cmd = Command::new(&self.binary);
        let _ = cmd.arg("exec").arg(id.as_str()).args(argv);

        let completion = run_command(cmd, &self.program, timeout)
            .map_err(|e| exec_error(ExecFailureKind::Dispatch(e.to_string())))?;
        match completion {
            Completion::TimedOut { .. } => Err(exec_error(ExecFailureKind::TimedOut(
                timeout.unwrap_or_default(),
            ))),
            Completion::Finished(output) => {
                if let Some(reason) = classify_exec_failure(output.exit_code, &output.stderr, program)
                {
                    return Err(exec_error(reason));
                }
                // Docker reports a stopped container with exit code 1, which a
                // probed command may also return. Only `inspect` can tell them apart.
                if !output.success()
                    && mentions_stopped_container(&output.stderr)
                    && matches!(self.is_running(id, Some(CLI_TIMEOUT)), Ok(false))
                {
                    return Err(exec_error(ExecFailureKind::ContainerNotRunning));
                }
                Ok(output)
            }
        }
    }

    fn logs(&self, id: &ContainerId, tail: usize) -> Result<String> {
        let tail = tail.to_string();
        let mut cmd = Command::new(&self.binary);
        let _ = cmd.args(["logs", "--tail", tail.as_str(), id.as_str()]);
        match run_command(cmd, &self.program, Some(CLI_TIMEOUT))? {
            Completion::Finished(out) if out.success() => Ok(out.combined()),
            Completion::Finished(out) => Err(KaitError::Runtime {
                command: "logs".into(),
                message: diagnostic(&out),
            }),
            Completion::TimedOut { partial } => Ok(partial.combined()),
        }
    }

    fn stop(&self, id: &ContainerId) -> Result<()> {
        tracing::info!(id = %id.short(), "removing container");
        match self.run_cli(["rm", "--force", "--volumes", id.as_str()], Some(CLI_TIMEOUT)) {
            Ok(_) => Ok(()),
            Err(KaitError::Runtime { message, .. }) if is_missing_container(&message) => {
                tracing::debug!(id = %id.short(), "container already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn is_available(&self) -> bool {
        self.run_cli(["version"], Some(CLI_TIMEOUT)).is_ok()
    }
}

/// Caller-supplied limit for a bookkeeping call, never above [`CLI_TIMEOUT`].
fn bounded(timeout: Option<Duration>) -> Duration {
    timeout.map_or(CLI_TIMEOUT, |t| t.min(CLI_TIMEOUT))
}

/// Extracts the daemon host from a `DOCKER_HOST` value.
///
/// Only TCP-style daemons change where published ports are reachable; unix
/// sockets and named pipes publish on the local machine.
fn daemon_host(docker_host: Option<&str>) -> String {
    let authority = docker_host
        .and_then(|raw| {
            ["tcp://", "http://", "https://"]
                .iter()
                .find_map(|scheme| raw.strip_prefix(*scheme))
        })
        .map(|rest| rest.split('/').next().unwrap_or(rest));

    let host = authority.map(|a| {
        a.strip_prefix('[').map_or_else(
            || a.rsplit_once(':').map_or(a, |(h, _)| h),
            |v6| v6.split(']').next().unwrap_or(v6),
        )
    });

    match host {
        Some(h) if !h.is_empty() => h.to_owned(),
        _ => LOCALHOST.to_owned(),
    }
}

/// Parses the host port out of `port <id> <spec>` output.
///
/// The CLI prints one binding per line (`0.0.0.0:49153`, `[::]:49153`);
/// IPv4 bindings are preferred.
fn parse_published_port(output: &str) -> Option<u16> {
    let mut fallback = None;
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((addr, port)) = line.rsplit_once(':') else {
            continue;
        };
        let Ok(port) = port.parse::<u16>() else {
            continue;
        };
        if !addr.starts_with('[') {
            return Some(port);
        }
        let _ = fallback.get_or_insert(port);
    }
    fallback
}

/// Decides whether a finished `exec` failed at dispatch level rather than
/// inside the probed command.
///
/// Only the exit codes the CLIs reserve for their own failures (125 to 127)
/// are classified here. Any other code belongs to the probed command, even
/// when its stderr reads like a daemon error.
fn classify_exec_failure(exit_code: i32, stderr: &str, program: &str) -> Option<ExecFailureKind> {
    if !matches!(exit_code, 125..=127) {
        return None;
    }
    let lower = stderr.to_ascii_lowercase();

    if exit_code == 125 {
        if mentions_stopped_container(&lower) || lower.contains("state improper") {
            return Some(ExecFailureKind::ContainerNotRunning);
        }
        if lower.contains("error response from daemon") || lower.starts_with("error:") {
            return Some(ExecFailureKind::Dispatch(first_line(stderr)));
        }
    }
    if matches!(exit_code, 126 | 127)
        && (lower.contains("oci runtime") || lower.contains("executable file not found"))
    {
        return Some(if lower.contains("not found") || lower.contains("no such file") {
            ExecFailureKind::ExecutableNotFound(program.to_owned())
        } else {
            ExecFailureKind::Dispatch(first_line(stderr))
        });
    }
    None
}

/// Whether stderr reads like the runtime's report of a stopped or removed
/// container.
fn mentions_stopped_container(message: &str) -> bool {
    is_missing_container(message) || message.to_ascii_lowercase().contains("is not running")
}

fn is_missing_container(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("no such container") || lower.contains("no such object")
}

fn diagnostic(out: &ExecOutput) -> String {
    let line = first_line(&out.stderr);
    if line.is_empty() {
        format!("exit code {}", out.exit_code)
    } else {
        line
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_owned()
}
