//! Probe execution against a running container.
//!
//! Probes run strictly in table order. A failing probe (wrong exit code or a
//! dispatch failure) is recorded and the next probe still runs.

use std::time::Instant;

use kaitcheck_common::types::ProbeSpec;
use serde::{Deserialize, Serialize};

use crate::container::RunningContainer;

/// What happened when a probe ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The command exited with the expected code.
    Passed,
    /// The command ran but exited with another code.
    UnexpectedExitCode {
        /// Code the probe table demanded.
        expected: i32,
        /// Code the command returned.
        actual: i32,
    },
    /// The command could not be dispatched into the container.
    DispatchFailed {
        /// Dispatch error description.
        error: String,
    },
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Probe display name.
    pub name: String,
    /// Command line that was executed.
    pub argv: Vec<String>,
    /// Outcome of the run.
    pub outcome: ProbeOutcome,
    /// Stdout followed by stderr; empty on dispatch failure.
    pub output: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl ProbeResult {
    /// Returns whether the probe passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Passed)
    }

    /// Describes the failure, naming the tool, or `None` if the probe passed.
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        let detail = match &self.outcome {
            ProbeOutcome::Passed => return None,
            ProbeOutcome::UnexpectedExitCode { expected, actual } => {
                format!("exit code {actual}, expected {expected}")
            }
            ProbeOutcome::DispatchFailed { error } => error.clone(),
        };
        Some(format!("{} should be available ({detail})", self.name))
    }
}

/// Runs a single probe.
pub fn run_probe(container: &mut RunningContainer, spec: &ProbeSpec) -> ProbeResult {
    let start = Instant::now();
    let (outcome, output) = match container.exec(&spec.argv) {
        Ok(out) if out.exit_code == spec.expected_exit_code => (ProbeOutcome::Passed, out.combined()),
        Ok(out) => (
            ProbeOutcome::UnexpectedExitCode {
                expected: spec.expected_exit_code,
                actual: out.exit_code,
            },
            out.combined(),
        ),
        Err(e) => (
            ProbeOutcome::DispatchFailed {
                error: e.to_string(),
            },
            String::new(),
        ),
    };
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let result = ProbeResult {
        name: spec.name.clone(),
        argv: spec.argv.clone(),
        outcome,
        output,
        duration_ms,
    };
    match result.failure_message() {
        None => tracing::info!(probe = %spec.name, duration_ms, "probe passed"),
        Some(message) => tracing::warn!(probe = %spec.name, duration_ms, "{message}"),
    }
    result
}

/// Runs every probe in order, collecting each outcome independently.
pub fn run_probes(container: &mut RunningContainer, specs: &[ProbeSpec]) -> Vec<ProbeResult> {
    specs.iter().map(|spec| run_probe(container, spec)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: ProbeOutcome) -> ProbeResult {
        ProbeResult {
            name: "kubectl".into(),
            argv: vec!["kubectl".into(), "version".into(), "--client".into()],
            outcome,
            output: String::new(),
            duration_ms: 3,
        }
    }

    #[test]
    fn passed_probe_has_no_failure_message() {
        let r = result(ProbeOutcome::Passed);
        assert!(r.passed());
        assert_eq!(r.failure_message(), None);
    }

    #[test]
    fn exit_code_mismatch_names_tool() {
        let r = result(ProbeOutcome::UnexpectedExitCode {
            expected: 0,
            actual: 1,
        });
        assert_eq!(
            r.failure_message().unwrap(),
            "kubectl should be available (exit code 1, expected 0)"
        );
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ProbeOutcome::UnexpectedExitCode {
            expected: 0,
            actual: 127,
        })
        .unwrap();
        assert_eq!(json["status"], "unexpected_exit_code");
        assert_eq!(json["actual"], 127);
    }
}
