//! Handle to a running container.

use std::sync::Arc;
use std::time::Duration;

use kaitcheck_common::error::Result;
use kaitcheck_common::types::{ContainerId, LifecyclePhase};

use crate::backend::ContainerRuntime;
use crate::exec::ExecOutput;

/// Ownership token for a live container.
///
/// The handle is the only way to exec into or remove the container. It is
/// released exactly once: either by [`RunningContainer::terminate`], which
/// consumes it, or by `Drop` when it goes out of scope on an early return or
/// while unwinding from a panic.
pub struct RunningContainer {
    runtime: Arc<dyn ContainerRuntime>,
    id: ContainerId,
    image: String,
    probe_timeout: Option<Duration>,
    phase: LifecyclePhase,
    released: bool,
}

impl RunningContainer {
    pub(crate) fn new(
        runtime: Arc<dyn ContainerRuntime>,
        id: ContainerId,
        image: impl Into<String>,
        probe_timeout: Option<Duration>,
    ) -> Self {
        Self {
            runtime,
            id,
            image: image.into(),
            probe_timeout,
            phase: LifecyclePhase::Starting,
            released: false,
        }
    }

    /// Container identifier assigned by the runtime.
    #[must_use]
    pub const fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Image the container was started from.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Timeout applied to each [`exec`](Self::exec) call.
    #[must_use]
    pub const fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout
    }

    /// Executes `argv` inside the container and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`KaitError::Exec`](kaitcheck_common::error::KaitError::Exec)
    /// if the command cannot be dispatched or exceeds the probe timeout. A
    /// non-zero exit code is returned as a normal [`ExecOutput`].
    pub fn exec(&mut self, argv: &[String]) -> Result<ExecOutput> {
        if matches!(self.phase, LifecyclePhase::Ready) {
            self.transition(LifecyclePhase::Probing);
        }
        self.runtime.exec(&self.id, argv, self.probe_timeout)
    }

    /// Returns the last `tail` lines of container output.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot produce logs.
    pub fn logs(&self, tail: usize) -> Result<String> {
        self.runtime.logs(&self.id, tail)
    }

    /// Stops and removes the container.
    ///
    /// Removal failures are logged, not returned: cleanup is best effort and
    /// never changes the outcome of a verification run.
    pub fn terminate(mut self) {
        self.release();
    }

    pub(crate) fn transition(&mut self, next: LifecyclePhase) {
        if self.phase.can_transition_to(next) {
            tracing::debug!(id = %self.id.short(), from = %self.phase, to = %next, "phase change");
            self.phase = next;
        } else {
            tracing::warn!(id = %self.id.short(), from = %self.phase, to = %next, "ignored illegal phase change");
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.runtime.stop(&self.id) {
            Ok(()) => tracing::info!(id = %self.id.short(), "container terminated"),
            Err(e) => tracing::warn!(id = %self.id.short(), error = %e, "failed to remove container"),
        }
        self.transition(LifecyclePhase::Terminated);
    }
}

impl std::fmt::Debug for RunningContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningContainer")
            .field("runtime", &self.runtime.name())
            .field("id", &self.id)
            .field("image", &self.image)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl Drop for RunningContainer {
    fn drop(&mut self) {
        if !self.released {
            tracing::debug!(id = %self.id.short(), "handle dropped without terminate, cleaning up");
            self.release();
        }
    }
}
