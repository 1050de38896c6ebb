//! Verification report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::probe::ProbeResult;

/// Outcome of a full verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Image that was verified.
    pub image: String,
    /// Container the probes ran in.
    pub container_id: String,
    /// Runtime that hosted the container.
    pub runtime: String,
    /// When the launch was requested.
    pub started_at: DateTime<Utc>,
    /// When the container was terminated.
    pub finished_at: DateTime<Utc>,
    /// Time from the launch request until readiness, in milliseconds.
    pub readiness_ms: u64,
    /// Probe results in execution order.
    pub probes: Vec<ProbeResult>,
}

impl VerificationReport {
    /// Returns whether every probe passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.probes.iter().all(ProbeResult::passed)
    }

    /// Iterates over failed probes.
    pub fn failures(&self) -> impl Iterator<Item = &ProbeResult> {
        self.probes.iter().filter(|p| !p.passed())
    }

    /// Number of passed probes.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.probes.iter().filter(|p| p.passed()).count()
    }

    /// One-line summary such as `2/3 probes passed`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}/{} probes passed", self.passed_count(), self.probes.len())
    }

    /// Serializes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> kaitcheck_common::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
