//! Configuration model for a verification run.
//!
//! Every field has a default matching the `kait` image contract, so an empty
//! JSON object (or no file at all) verifies `kait:local`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{KaitError, Result};
use crate::types::{PortSpec, ProbeSpec};

/// Root configuration for a verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Image reference to launch.
    pub image: String,
    /// Ports exposed on the container, in order.
    pub exposed_ports: Vec<PortSpec>,
    /// HTTP readiness condition.
    pub readiness: ReadinessConfig,
    /// Environment variables set in the container.
    pub env: BTreeMap<String, String>,
    /// Per-probe timeout in seconds; `None` waits indefinitely.
    pub probe_timeout_secs: Option<u64>,
    /// Container CLI binary (`docker`, `podman`, or an absolute path).
    pub container_cli: String,
    /// Probes run against the ready container, in order.
    pub probes: Vec<ProbeSpec>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            image: constants::DEFAULT_IMAGE.to_owned(),
            exposed_ports: vec![PortSpec::tcp(constants::DEFAULT_PORT)],
            readiness: ReadinessConfig::default(),
            env: BTreeMap::new(),
            probe_timeout_secs: Some(constants::DEFAULT_PROBE_TIMEOUT_SECS),
            container_cli: constants::DEFAULT_CONTAINER_CLI.to_owned(),
            probes: crate::types::default_probes(),
        }
    }
}

/// HTTP readiness condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Path requested on the container.
    pub path: String,
    /// Container port the request is sent to; must be exposed.
    pub port: PortSpec,
    /// Maximum wait for the endpoint, in seconds.
    pub startup_timeout_secs: u64,
    /// Delay between polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Timeout of each HTTP request, in milliseconds.
    pub request_timeout_ms: u64,
    /// Status code that marks the container as ready.
    pub expected_status: u16,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            path: constants::DEFAULT_READINESS_PATH.to_owned(),
            port: PortSpec::tcp(constants::DEFAULT_PORT),
            startup_timeout_secs: constants::DEFAULT_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL_MS,
            request_timeout_ms: constants::DEFAULT_REQUEST_TIMEOUT_MS,
            expected_status: constants::DEFAULT_EXPECTED_STATUS,
        }
    }
}

impl ReadinessConfig {
    /// Startup timeout as a [`Duration`].
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl HarnessConfig {
    /// Loads a configuration from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`HarnessConfig::validate`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| KaitError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Per-probe timeout as a [`Duration`].
    #[must_use]
    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout_secs.map(Duration::from_secs)
    }

    /// Checks the invariants a launch depends on.
    ///
    /// # Errors
    ///
    /// Returns [`KaitError::Config`] describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(config_error("image reference is empty"));
        }
        if !self.exposed_ports.contains(&self.readiness.port) {
            return Err(config_error(format!(
                "readiness port {} is not among the exposed ports",
                self.readiness.port
            )));
        }
        if !self.readiness.path.starts_with('/') {
            return Err(config_error(format!(
                "readiness path `{}` must start with `/`",
                self.readiness.path
            )));
        }
        if self.readiness.startup_timeout_secs == 0 {
            return Err(config_error("startup timeout must be positive"));
        }
        if self.probe_timeout_secs == Some(0) {
            return Err(config_error("probe timeout must be positive"));
        }
        if let Some(key) = self.env.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(config_error(format!("invalid environment variable name `{key}`")));
        }
        if self.container_cli.trim().is_empty() {
            return Err(config_error("container CLI is empty"));
        }
        if let Some(probe) = self.probes.iter().find(|p| p.argv.is_empty()) {
            return Err(config_error(format!("probe `{}` has no command", probe.name)));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> KaitError {
    KaitError::Config {
        message: message.into(),
    }
}
