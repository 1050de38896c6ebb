//! Scripted in-process runtime.
//!
//! Images are registered up front with the ports they publish and the
//! commands they answer. The runtime records every stop and exec so callers
//! can assert on lifecycle guarantees without a container engine.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kaitcheck_common::error::{ExecFailureKind, KaitError, Result};
use kaitcheck_common::types::{ContainerId, PortSpec};

use super::{ContainerRuntime, HostEndpoint};
use crate::exec::ExecOutput;
use crate::request::LaunchRequest;

/// Canned behaviour of one executable inside a fake image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCommand {
    /// Exit code returned.
    pub exit_code: i32,
    /// Standard output returned.
    pub stdout: String,
    /// Standard error returned.
    pub stderr: String,
    /// Whether the command never finishes on its own.
    pub hangs: bool,
}

impl ScriptedCommand {
    /// A command that prints `stdout` and exits zero.
    #[must_use]
    pub fn succeeds(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            hangs: false,
        }
    }

    /// A command that prints `stderr` and exits with `code`.
    #[must_use]
    pub fn exits(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: code,
            stdout: String::new(),
            stderr: stderr.into(),
            hangs: false,
        }
    }

    /// A command that runs until killed.
    #[must_use]
    pub const fn hangs() -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            hangs: true,
        }
    }
}

/// Description of an image known to the [`InMemoryRuntime`].
#[derive(Debug, Clone, Default)]
pub struct FakeImage {
    endpoints: HashMap<PortSpec, HostEndpoint>,
    commands: HashMap<String, ScriptedCommand>,
    exits_on_start: bool,
    logs: String,
}

impl FakeImage {
    /// Creates an image with no ports and no executables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a container port at a host endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, port: PortSpec, endpoint: HostEndpoint) -> Self {
        let _ = self.endpoints.insert(port, endpoint);
        self
    }

    /// Installs an executable.
    #[must_use]
    pub fn with_command(mut self, program: impl Into<String>, command: ScriptedCommand) -> Self {
        let _ = self.commands.insert(program.into(), command);
        self
    }

    /// Makes containers from this image stop right after starting.
    #[must_use]
    pub const fn exits_on_start(mut self) -> Self {
        self.exits_on_start = true;
        self
    }

    /// Sets the output returned by `logs`.
    #[must_use]
    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = logs.into();
        self
    }
}

#[derive(Debug)]
struct FakeContainer {
    image: String,
    exposed: Vec<PortSpec>,
    running: bool,
    removed: bool,
}

#[derive(Debug, Default)]
struct State {
    started: Vec<ContainerId>,
    containers: HashMap<ContainerId, FakeContainer>,
    stop_calls: HashMap<ContainerId, usize>,
    exec_history: Vec<Vec<String>>,
}

/// Runtime that keeps containers as records in memory.
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    images: HashMap<String, FakeImage>,
    state: Mutex<State>,
}

impl InMemoryRuntime {
    /// Creates a runtime with no images.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an image under `reference`.
    #[must_use]
    pub fn with_image(mut self, reference: impl Into<String>, image: FakeImage) -> Self {
        let _ = self.images.insert(reference.into(), image);
        self
    }

    /// Containers started so far, in start order.
    #[must_use]
    pub fn started(&self) -> Vec<ContainerId> {
        self.state().started.clone()
    }

    /// Number of `stop` calls received for `id`.
    #[must_use]
    pub fn stop_count(&self, id: &ContainerId) -> usize {
        self.state().stop_calls.get(id).copied().unwrap_or(0)
    }

    /// Number of `stop` calls received for any container.
    #[must_use]
    pub fn total_stops(&self) -> usize {
        self.state().stop_calls.values().sum()
    }

    /// Containers started and not yet removed.
    #[must_use]
    pub fn live_containers(&self) -> usize {
        self.state()
            .containers
            .values()
            .filter(|c| !c.removed)
            .count()
    }

    /// Every command line passed to `exec`, in order.
    #[must_use]
    pub fn exec_history(&self) -> Vec<Vec<String>> {
        self.state().exec_history.clone()
    }

    /// Simulates the container's main process exiting.
    pub fn kill(&self, id: &ContainerId) {
        if let Some(container) = self.state().containers.get_mut(id) {
            container.running = false;
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ContainerRuntime for InMemoryRuntime {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn start(&self, request: &LaunchRequest) -> Result<ContainerId> {
        let image = self.images.get(request.image()).ok_or_else(|| KaitError::Runtime {
            command: "run".into(),
            message: format!("Unable to find image '{}' locally", request.image()),
        })?;

        let id = ContainerId::generate();
        let mut state = self.state();
        state.started.push(id.clone());
        let _ = state.containers.insert(
            id.clone(),
            FakeContainer {
                image: request.image().to_owned(),
                exposed: request.exposed_ports().to_vec(),
                running: !image.exits_on_start,
                removed: false,
            },
        );
        tracing::debug!(id = %id.short(), image = request.image(), "fake container started");
        Ok(id)
    }

    fn host_address(
        &self,
        id: &ContainerId,
        port: PortSpec,
        _timeout: Option<Duration>,
    ) -> Result<HostEndpoint> {
        let state = self.state();
        let container = state
            .containers
            .get(id)
            .filter(|c| !c.removed)
            .ok_or_else(|| KaitError::Runtime {
                command: "port".into(),
                message: format!("No such container: {id}"),
            })?;
        let not_published = || KaitError::Runtime {
            command: "port".into(),
            message: format!("{port} is not published"),
        };
        if !container.exposed.contains(&port) {
            return Err(not_published());
        }
        self.images
            .get(&container.image)
            .and_then(|image| image.endpoints.get(&port))
            .cloned()
            .ok_or_else(not_published)
    }

    fn is_running(&self, id: &ContainerId, _timeout: Option<Duration>) -> Result<bool> {
        Ok(self
            .state()
            .containers
            .get(id)
            .is_some_and(|c| c.running && !c.removed))
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

        let image = {
            let mut state = self.state();
            state.exec_history.push(argv.to_vec());
            match state.containers.get(id) {
                Some(c) if c.running && !c.removed => c.image.clone(),
                _ => return Err(exec_error(ExecFailureKind::ContainerNotRunning)),
            }
        };

        let Some(program) = argv.first() else {
            return Err(exec_error(ExecFailureKind::Dispatch(
                "exec command is empty".into(),
            )));
        };
        let script = self
            .images
            .get(&image)
            .and_then(|i| i.commands.get(program))
            .ok_or_else(|| exec_error(ExecFailureKind::ExecutableNotFound(program.clone())))?;

        if script.hangs {
            let Some(limit) = timeout else {
                return Err(exec_error(ExecFailureKind::Dispatch(
                    "command never finishes and no timeout was set".into(),
                )));
            };
            std::thread::sleep(limit);
            return Err(exec_error(ExecFailureKind::TimedOut(limit)));
        }

        Ok(ExecOutput {
            stdout: script.stdout.clone(),
            stderr: script.stderr.clone(),
            exit_code: script.exit_code,
        })
    }

    fn logs(&self, id: &ContainerId, tail: usize) -> Result<String> {
        let image = self
            .state()
            .containers
            .get(id)
            .map(|c| c.image.clone())
            .ok_or_else(|| KaitError::NotFound {
                kind: "container",
                id: id.to_string(),
            })?;
        let logs = self.images.get(&image).map_or("", |i| i.logs.as_str());
        let lines: Vec<&str> = logs.lines().collect();
        let skip = lines.len().saturating_sub(tail);
        Ok(lines.get(skip..).unwrap_or_default().join("\n"))
    }

    fn stop(&self, id: &ContainerId) -> Result<()> {
        let mut state = self.state();
        *state.stop_calls.entry(id.clone()).or_insert(0) += 1;
        if let Some(container) = state.containers.get_mut(id) {
            container.running = false;
            container.removed = true;
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}
