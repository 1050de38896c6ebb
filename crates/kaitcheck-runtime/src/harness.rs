//! Verification harness that coordinates launch, probing and teardown.

use std::sync::Arc;

use chrono::Utc;
use kaitcheck_common::config::HarnessConfig;
use kaitcheck_common::constants::FAILURE_LOG_TAIL;
use kaitcheck_common::error::{KaitError, Result};
use kaitcheck_common::types::{LifecyclePhase, ProbeSpec};

use crate::backend::ContainerRuntime;
use crate::container::RunningContainer;
use crate::probe;
use crate::report::VerificationReport;
use crate::request::LaunchRequest;
use crate::wait;

/// Launches containers on a [`ContainerRuntime`] and verifies them.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use kaitcheck_common::config::HarnessConfig;
/// use kaitcheck_runtime::backend::docker::DockerCliRuntime;
/// use kaitcheck_runtime::harness::Harness;
///
/// let runtime = DockerCliRuntime::locate("docker")?;
/// let report = Harness::new(Arc::new(runtime)).verify(&HarnessConfig::default())?;
/// assert!(report.is_success(), "{}", report.summary());
/// # Ok::<(), kaitcheck_common::error::KaitError>(())
/// ```
pub struct Harness {
    runtime: Arc<dyn ContainerRuntime>,
}

impl Harness {
    /// Creates a harness on `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Starts a container and blocks until its readiness endpoint answers.
    ///
    /// Each later exec in the container is bounded by the request's probe
    /// timeout.
    ///
    /// A container that was created but never became ready is removed
    /// before the error is returned, after its log tail has been traced.
    ///
    /// # Errors
    ///
    /// Returns [`KaitError::Launch`] wrapping the runtime, exit or timeout
    /// error that prevented the container from becoming ready.
    pub fn launch(&self, request: &LaunchRequest) -> Result<RunningContainer> {
        let image = request.image();
        tracing::info!(
            phase = %LifecyclePhase::NotStarted,
            next = %LifecyclePhase::Starting,
            image,
            runtime = self.runtime.name(),
            "launching container"
        );
        let launch_error = |cause: KaitError| KaitError::Launch {
            image: image.to_owned(),
            cause: Box::new(cause),
        };

        let id = self.runtime.start(request).map_err(launch_error)?;
        let mut container = RunningContainer::new(
            Arc::clone(&self.runtime),
            id,
            image,
            request.probe_timeout(),
        );

        match wait::wait_until_ready(self.runtime.as_ref(), container.id(), request.readiness()) {
            Ok(_) => {
                container.transition(LifecyclePhase::Ready);
                Ok(container)
            }
            Err(cause) => {
                tracing::error!(id = %container.id().short(), image, error = %cause, "container never became ready");
                match container.logs(FAILURE_LOG_TAIL) {
                    Ok(logs) if !logs.trim().is_empty() => {
                        tracing::error!(id = %container.id().short(), "container logs:\n{logs}");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "could not collect container logs"),
                }
                container.transition(LifecyclePhase::Failed);
                container.terminate();
                Err(launch_error(cause))
            }
        }
    }

    /// Runs `probes` in order against a ready container.
    pub fn probe(
        &self,
        container: &mut RunningContainer,
        probes: &[ProbeSpec],
    ) -> Vec<probe::ProbeResult> {
        tracing::debug!(
            id = %container.id().short(),
            runtime = self.runtime.name(),
            count = probes.len(),
            "running probes"
        );
        probe::run_probes(container, probes)
    }

    /// Launches the configured image, runs its probe table and tears it down.
    ///
    /// Probe failures are recorded in the report rather than returned as
    /// errors. The container is terminated exactly once on every path.
    ///
    /// # Errors
    ///
    /// Returns [`KaitError::Config`] if the configuration is invalid, or
    /// [`KaitError::Launch`] if the container never became ready.
    pub fn verify(&self, config: &HarnessConfig) -> Result<VerificationReport> {
        let request = LaunchRequest::from_config(config)?;
        let started_at = Utc::now();

        let mut container = self.launch(&request)?;
        let readiness_ms =
            u64::try_from((Utc::now() - started_at).num_milliseconds()).unwrap_or_default();
        let container_id = container.id().to_string();

        let probes = self.probe(&mut container, &config.probes);
        container.terminate();

        let report = VerificationReport {
            image: config.image.clone(),
            container_id,
            runtime: self.runtime.name().to_owned(),
            started_at,
            finished_at: Utc::now(),
            readiness_ms,
            probes,
        };
        tracing::info!(image = %report.image, success = report.is_success(), "{}", report.summary());
        Ok(report)
    }
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("runtime", &self.runtime.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kaitcheck_common::types::PortSpec;

    use super::*;
    use crate::backend::memory::{FakeImage, InMemoryRuntime};
    use crate::request::HttpReadiness;

    fn request(image: &str) -> LaunchRequest {
        LaunchRequest::builder(image)
            .expose(PortSpec::tcp(9000))
            .wait_for(
                HttpReadiness::new("/hooks/", PortSpec::tcp(9000))
                    .with_startup_timeout(Duration::from_millis(200))
                    .with_poll_interval(Duration::from_millis(20)),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn unknown_image_is_launch_failure_without_container() {
        let runtime = Arc::new(InMemoryRuntime::new());
        let harness = Harness::new(runtime.clone());
        let err = harness.launch(&request("missing:latest")).unwrap_err();
        assert!(err.is_launch_failure());
        assert!(err.to_string().contains("missing:latest"));
        assert!(runtime.started().is_empty());
        assert_eq!(runtime.total_stops(), 0);
    }

    #[test]
    fn container_exiting_early_is_removed() {
        let runtime = Arc::new(
            InMemoryRuntime::new()
                .with_image("kait:local", FakeImage::new().exits_on_start().with_logs("boom")),
        );
        let harness = Harness::new(runtime.clone());
        let err = harness.launch(&request("kait:local")).unwrap_err();
        match err {
            KaitError::Launch { cause, .. } => {
                assert!(matches!(*cause, KaitError::ContainerExited { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        let started = runtime.started();
        assert_eq!(started.len(), 1);
        assert_eq!(runtime.stop_count(&started[0]), 1);
    }

    #[test]
    fn verify_rejects_invalid_config_before_launch() {
        let runtime = Arc::new(InMemoryRuntime::new());
        let config = HarnessConfig {
            image: String::new(),
            ..HarnessConfig::default()
        };
        let err = Harness::new(runtime.clone()).verify(&config).unwrap_err();
        assert!(matches!(err, KaitError::Config { .. }));
        assert!(runtime.started().is_empty());
    }
}
