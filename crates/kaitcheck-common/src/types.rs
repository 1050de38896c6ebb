//! Domain primitive types used across the kaitcheck workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KaitError;

/// Unique identifier for a container instance, as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random container ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the leading twelve characters, the way container CLIs print IDs.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport protocol of an exposed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP (the default when none is given).
    Tcp,
    /// UDP.
    Udp,
    /// SCTP.
    Sctp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Sctp => write!(f, "sctp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = KaitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "sctp" => Ok(Self::Sctp),
            other => Err(KaitError::Config {
                message: format!("unknown protocol `{other}`"),
            }),
        }
    }
}

/// A container port paired with its protocol, written `9000/tcp`.
///
/// Serialized as the string form so configuration files can list ports the
/// same way container CLIs print them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortSpec {
    /// Port number inside the container.
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

impl PortSpec {
    /// Creates a TCP port specification.
    #[must_use]
    pub const fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

impl FromStr for PortSpec {
    type Err = KaitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (port, protocol) = match s.split_once('/') {
            Some((port, proto)) => (port, proto.parse()?),
            None => (s, Protocol::Tcp),
        };
        let port = port.parse::<u16>().map_err(|_| KaitError::Config {
            message: format!("invalid port `{s}`"),
        })?;
        if port == 0 {
            return Err(KaitError::Config {
                message: format!("invalid port `{s}`: port 0 cannot be exposed"),
            });
        }
        Ok(Self { port, protocol })
    }
}

impl TryFrom<String> for PortSpec {
    type Error = KaitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortSpec> for String {
    fn from(value: PortSpec) -> Self {
        value.to_string()
    }
}

/// One entry in the probe table: a command run inside the container and the
/// exit code it must return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// Display name used in reports and failure messages.
    pub name: String,
    /// Command line executed inside the container.
    pub argv: Vec<String>,
    /// Exit code the command must return.
    #[serde(default)]
    pub expected_exit_code: i32,
}

impl ProbeSpec {
    /// Creates a probe expecting exit code zero.
    #[must_use]
    pub fn new(name: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            argv,
            expected_exit_code: 0,
        }
    }

    /// Creates a `<tool> version --client` probe for a bundled CLI.
    #[must_use]
    pub fn client_version(tool: &str) -> Self {
        Self::new(
            tool,
            vec![tool.to_owned(), "version".to_owned(), "--client".to_owned()],
        )
    }

    /// Message reported when this probe fails.
    #[must_use]
    pub fn failure_message(&self) -> String {
        format!("{} should be available", self.name)
    }
}

/// Returns the probe table for the tools bundled in the `kait` image.
#[must_use]
pub fn default_probes() -> Vec<ProbeSpec> {
    crate::constants::DEFAULT_TOOLS
        .iter()
        .map(|tool| ProbeSpec::client_version(tool))
        .collect()
}

/// Lifecycle phase of a verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Nothing has been requested from the runtime yet.
    NotStarted,
    /// The container was created and readiness is being awaited.
    Starting,
    /// The readiness condition was satisfied.
    Ready,
    /// Probes are executing.
    Probing,
    /// The container has been torn down.
    Terminated,
    /// The container never became ready.
    Failed,
}

impl LifecyclePhase {
    /// Returns whether moving to `next` is a legal transition.
    ///
    /// Teardown is reachable from every phase after `NotStarted`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::Starting)
                | (Self::Starting, Self::Ready | Self::Failed)
                | (Self::Ready | Self::Probing, Self::Probing)
                | (
                    Self::Starting | Self::Ready | Self::Probing | Self::Failed,
                    Self::Terminated
                )
        )
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not-started"),
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::Probing => write!(f, "probing"),
            Self::Terminated => write!(f, "terminated"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
