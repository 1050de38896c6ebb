//! Container runtime abstraction.
//!
//! The harness never talks to a container engine directly; it drives a
//! [`ContainerRuntime`]. [`docker::DockerCliRuntime`] shells out to a
//! Docker-compatible CLI, and [`memory::InMemoryRuntime`] is a scripted fake
//! used to exercise lifecycle guarantees without an engine.

pub mod docker;
pub mod memory;

use std::fmt;
use std::time::Duration;

use kaitcheck_common::error::Result;
use kaitcheck_common::types::{ContainerId, PortSpec};

use crate::exec::ExecOutput;
use crate::request::LaunchRequest;

/// Host-side address at which a container port is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostEndpoint {
    /// Host name or IP address.
    pub host: String,
    /// Host port mapped to the container port.
    pub port: u16,
}

impl HostEndpoint {
    /// Creates a new endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Capability to start, inspect, exec into, and remove containers.
///
/// Implementors handle the engine-specific details. All calls block the
/// calling thread until the engine has answered.
pub trait ContainerRuntime: Send + Sync {
    /// Short name of the runtime, used in logs.
    fn name(&self) -> &str;

    /// Creates and starts a container for the request, returning its ID.
    ///
    /// Does not wait for readiness.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be started.
    fn start(&self, request: &LaunchRequest) -> Result<ContainerId>;

    /// Resolves the host address a container port is published on.
    ///
    /// The call returns within `timeout` when one is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is not (yet) published or the runtime
    /// does not answer in time.
    fn host_address(
        &self,
        id: &ContainerId,
        port: PortSpec,
        timeout: Option<Duration>,
    ) -> Result<HostEndpoint>;

    /// Returns whether the container is still running.
    ///
    /// The call returns within `timeout` when one is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried in time.
    fn is_running(&self, id: &ContainerId, timeout: Option<Duration>) -> Result<bool>;

    /// Executes a command inside a running container.
    ///
    /// A non-zero exit code is reported through [`ExecOutput::exit_code`],
    /// not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`KaitError::Exec`](kaitcheck_common::error::KaitError::Exec)
    /// if the command cannot be dispatched or exceeds `timeout`.
    fn exec(
        &self,
        id: &ContainerId,
        argv: &[String],
        timeout: Option<Duration>,
    ) -> Result<ExecOutput>;

    /// Returns the last `tail` lines of the container's output.
    ///
    /// # Errors
    ///
    /// Returns an error if logs cannot be retrieved.
    fn logs(&self, id: &ContainerId, tail: usize) -> Result<String>;

    /// Stops and removes a container. Removing an absent container succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime refuses the removal.
    fn stop(&self, id: &ContainerId) -> Result<()>;

    /// Returns whether the runtime is operational on this host.
    fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display_ipv4() {
        assert_eq!(HostEndpoint::new("127.0.0.1", 49153).to_string(), "127.0.0.1:49153");
    }

    #[test]
    fn endpoint_display_ipv6_is_bracketed() {
        assert_eq!(HostEndpoint::new("::1", 8080).to_string(), "[::1]:8080");
    }
}
