//! Unified error types for the kaitcheck workspace.
//!
//! Launch and exec failures are distinct variants: a launch failure is fatal
//! to a verification run, while an exec failure only fails the probe that
//! raised it. A non-zero exit code from a probed command is never an error at
//! this layer.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum KaitError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path (or program) where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The container runtime rejected a request.
    #[error("container runtime `{command}` failed: {message}")]
    Runtime {
        /// Runtime subcommand that failed (e.g. `run`, `port`).
        command: String,
        /// Diagnostic reported by the runtime.
        message: String,
    },

    /// The container could not be started or never became ready.
    #[error("could not start container from {image}: {cause}")]
    Launch {
        /// Image reference the launch was attempted with.
        image: String,
        /// Underlying cause.
        #[source]
        cause: Box<KaitError>,
    },

    /// The readiness endpoint did not answer as expected before the deadline.
    #[error("{url} not ready within {}s: {last_error}", timeout.as_secs())]
    ReadinessTimeout {
        /// Endpoint that was polled.
        url: String,
        /// Startup timeout that elapsed.
        timeout: Duration,
        /// Outcome of the final poll attempt.
        last_error: String,
    },

    /// The container stopped before its readiness condition was met.
    #[error("container {id} exited before becoming ready")]
    ContainerExited {
        /// Identifier of the exited container.
        id: String,
    },

    /// A command could not be dispatched into a running container.
    #[error("exec {command:?} in container {id} failed: {reason}")]
    Exec {
        /// Target container identifier.
        id: String,
        /// Command line that was dispatched.
        command: Vec<String>,
        /// Why dispatch failed.
        reason: ExecFailureKind,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl KaitError {
    /// Returns `true` for errors that abort a run before any probe executes.
    #[must_use]
    pub const fn is_launch_failure(&self) -> bool {
        matches!(self, Self::Launch { .. })
    }

    /// Returns `true` for probe dispatch failures.
    #[must_use]
    pub const fn is_exec_failure(&self) -> bool {
        matches!(self, Self::Exec { .. })
    }
}

/// Reason a command could not be dispatched into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecFailureKind {
    /// The target container is not running (or no longer exists).
    ContainerNotRunning,
    /// The executable could not be resolved inside the container.
    ExecutableNotFound(String),
    /// The command did not finish within the probe timeout.
    TimedOut(Duration),
    /// Any other dispatch-level failure reported by the runtime.
    Dispatch(String),
}

impl fmt::Display for ExecFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContainerNotRunning => write!(f, "container is not running"),
            Self::ExecutableNotFound(name) => write!(f, "executable `{name}` not found"),
            Self::TimedOut(limit) => write!(f, "timed out after {limit:?}"),
            Self::Dispatch(message) => write!(f, "{message}"),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, KaitError>;
