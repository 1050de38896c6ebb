//! Launch requests: what to start and how to tell it is ready.

use std::time::Duration;

use kaitcheck_common::config::HarnessConfig;
use kaitcheck_common::constants;
use kaitcheck_common::error::{KaitError, Result};
use kaitcheck_common::types::PortSpec;

use crate::backend::HostEndpoint;

/// HTTP readiness condition: `GET <path>` on a published port must answer
/// with the expected status before the startup timeout elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReadiness {
    /// Path requested on the container.
    pub path: String,
    /// Container port the request targets.
    pub port: PortSpec,
    /// Maximum time to wait.
    pub startup_timeout: Duration,
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Timeout of each individual request.
    pub request_timeout: Duration,
    /// Status code that marks the endpoint as ready.
    pub expected_status: u16,
}

impl HttpReadiness {
    /// Creates a readiness condition with default timings.
    #[must_use]
    pub fn new(path: impl Into<String>, port: PortSpec) -> Self {
        Self {
            path: path.into(),
            port,
            startup_timeout: Duration::from_secs(constants::DEFAULT_STARTUP_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(constants::DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_millis(constants::DEFAULT_REQUEST_TIMEOUT_MS),
            expected_status: constants::DEFAULT_EXPECTED_STATUS,
        }
    }

    /// Sets the maximum time to wait for readiness.
    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Sets the delay between polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the status code that marks the endpoint as ready.
    #[must_use]
    pub const fn with_expected_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    /// Builds the URL polled on the given host endpoint.
    #[must_use]
    pub fn url(&self, endpoint: &HostEndpoint) -> String {
        format!("http://{endpoint}{}", self.path)
    }
}

/// Everything needed to start a container and wait for it.
///
/// Constructed through [`LaunchRequest::builder`] or
/// [`LaunchRequest::from_config`], both of which enforce that the readiness
/// port is one of the exposed ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    image: String,
    exposed_ports: Vec<PortSpec>,
    env: Vec<(String, String)>,
    readiness: HttpReadiness,
    probe_timeout: Option<Duration>,
}

impl LaunchRequest {
    /// Starts building a request for `image`.
    #[must_use]
    pub fn builder(image: impl Into<String>) -> LaunchRequestBuilder {
        LaunchRequestBuilder {
            image: image.into(),
            exposed_ports: Vec::new(),
            env: Vec::new(),
            readiness: None,
            probe_timeout: Some(Duration::from_secs(constants::DEFAULT_PROBE_TIMEOUT_SECS)),
        }
    }

    /// Builds the request described by a harness configuration.
    ///
    /// # Errors
    ///
    /// Returns [`KaitError::Config`] if the configuration is invalid.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        config.validate()?;
        let r = &config.readiness;
        let readiness = HttpReadiness::new(r.path.clone(), r.port)
            .with_startup_timeout(r.startup_timeout())
            .with_poll_interval(r.poll_interval())
            .with_request_timeout(r.request_timeout())
            .with_expected_status(r.expected_status);

        let builder = config
            .exposed_ports
            .iter()
            .fold(Self::builder(config.image.clone()), |b, p| b.expose(*p));
        config
            .env
            .iter()
            .fold(builder, |b, (k, v)| b.env(k, v))
            .wait_for(readiness)
            .probe_timeout(config.probe_timeout())
            .build()
    }

    /// Image reference.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Exposed ports, in order.
    #[must_use]
    pub fn exposed_ports(&self) -> &[PortSpec] {
        &self.exposed_ports
    }

    /// Environment variables passed to the container.
    #[must_use]
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Readiness condition.
    #[must_use]
    pub const fn readiness(&self) -> &HttpReadiness {
        &self.readiness
    }

    /// Limit applied to each exec in the launched container.
    #[must_use]
    pub const fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout
    }
}

/// Builder for [`LaunchRequest`].
#[derive(Debug)]
pub struct LaunchRequestBuilder {
    image: String,
    exposed_ports: Vec<PortSpec>,
    env: Vec<(String, String)>,
    readiness: Option<HttpReadiness>,
    probe_timeout: Option<Duration>,
}

impl LaunchRequestBuilder {
    /// Exposes a container port. Duplicates are ignored.
    #[must_use]
    pub fn expose(mut self, port: PortSpec) -> Self {
        if !self.exposed_ports.contains(&port) {
            self.exposed_ports.push(port);
        }
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the readiness condition.
    #[must_use]
    pub fn wait_for(mut self, readiness: HttpReadiness) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Sets the per-exec timeout. `None` waits indefinitely.
    #[must_use]
    pub const fn probe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Validates and returns the request.
    ///
    /// # Errors
    ///
    /// Returns [`KaitError::Config`] if the image is empty, no readiness
    /// condition was given, or its port is not exposed.
    pub fn build(self) -> Result<LaunchRequest> {
        if self.image.trim().is_empty() {
            return Err(KaitError::Config {
                message: "image reference is required".into(),
            });
        }
        let readiness = self.readiness.ok_or_else(|| KaitError::Config {
            message: "a readiness condition is required".into(),
        })?;
        if !self.exposed_ports.contains(&readiness.port) {
            return Err(KaitError::Config {
                message: format!(
                    "readiness port {} is not among the exposed ports",
                    readiness.port
                ),
            });
        }
        if readiness.startup_timeout.is_zero() {
            return Err(KaitError::Config {
                message: "startup timeout must be positive".into(),
            });
        }
        Ok(LaunchRequest {
            image: self.image,
            exposed_ports: self.exposed_ports,
            env: self.env,
            readiness,
            probe_timeout: self.probe_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_kait_request() {
        let request = LaunchRequest::builder("kait:local")
            .expose(PortSpec::tcp(9000))
            .wait_for(
                HttpReadiness::new("/hooks/", PortSpec::tcp(9000))
                    .with_startup_timeout(Duration::from_secs(30)),
            )
            .build()
            .expect("valid request");
        assert_eq!(request.image(), "kait:local");
        assert_eq!(request.exposed_ports(), [PortSpec::tcp(9000)]);
        assert_eq!(request.readiness().startup_timeout, Duration::from_secs(30));
    }

    #[test]
    fn readiness_port_must_be_exposed() {
        let err = LaunchRequest::builder("kait:local")
            .expose(PortSpec::tcp(8080))
            .wait_for(HttpReadiness::new("/hooks/", PortSpec::tcp(9000)))
            .build()
            .unwrap_err();
        assert!(matches!(err, KaitError::Config { .. }));
    }

    #[test]
    fn readiness_is_required() {
        let result = LaunchRequest::builder("kait:local")
            .expose(PortSpec::tcp(9000))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_ports_collapse() {
        let request = LaunchRequest::builder("img")
            .expose(PortSpec::tcp(9000))
            .expose(PortSpec::tcp(9000))
            .wait_for(HttpReadiness::new("/", PortSpec::tcp(9000)))
            .build()
            .unwrap();
        assert_eq!(request.exposed_ports().len(), 1);
    }

    #[test]
    fn from_default_config() {
        let request = LaunchRequest::from_config(&HarnessConfig::default()).unwrap();
        assert_eq!(request.image(), "kait:local");
        assert_eq!(request.readiness().path, "/hooks/");
        assert_eq!(request.readiness().expected_status, 200);
        assert_eq!(request.readiness().poll_interval, Duration::from_millis(100));
        assert_eq!(request.probe_timeout(), Some(Duration::from_secs(60)));
        assert!(request.env().is_empty());
    }

    #[test]
    fn config_exec_limit_and_env_reach_request() {
        let mut config = HarnessConfig::default();
        config.probe_timeout_secs = Some(5);
        let _ = config.env.insert("KAIT_LOG".into(), "debug".into());
        let _ = config.env.insert("HOME".into(), "/tmp".into());
        let request = LaunchRequest::from_config(&config).unwrap();
        assert_eq!(request.probe_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(
            request.env(),
            [
                ("HOME".to_owned(), "/tmp".to_owned()),
                ("KAIT_LOG".to_owned(), "debug".to_owned())
            ]
        );

        config.probe_timeout_secs = None;
        let request = LaunchRequest::from_config(&config).unwrap();
        assert_eq!(request.probe_timeout(), None);
    }

    #[test]
    fn url_joins_endpoint_and_path() {
        let readiness = HttpReadiness::new("/hooks/", PortSpec::tcp(9000));
        let endpoint = HostEndpoint::new("127.0.0.1", 49153);
        assert_eq!(readiness.url(&endpoint), "http://127.0.0.1:49153/hooks/");
    }
}
