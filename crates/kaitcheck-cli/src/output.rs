//! Formatted output helpers for CLI commands.
//!
//! Renders probe tables and verification reports as plain aligned text and
//! formats millisecond durations for humans.

use kaitcheck_common::types::ProbeSpec;
use kaitcheck_runtime::probe::ProbeOutcome;
use kaitcheck_runtime::report::VerificationReport;

/// Formats a millisecond count (e.g. "850 ms", "1.2 s").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_millis(ms: u64) -> String {
    if ms >= 1_000 {
        format!("{:.1} s", ms as f64 / 1_000.0)
    } else {
        format!("{ms} ms")
    }
}

/// Renders the probe table, one probe per line.
#[must_use]
pub fn render_probe_table(probes: &[ProbeSpec]) -> String {
    let mut out = format!("{:<12} {:<6} {}\n", "NAME", "EXIT", "COMMAND");
    for p in probes {
        out.push_str(&format!(
            "{:<12} {:<6} {}\n",
            p.name,
            p.expected_exit_code,
            p.argv.join(" ")
        ));
    }
    out
}

/// Renders a verification report as a per-probe table followed by a
/// summary line and the failure messages.
#[must_use]
pub fn render_report(report: &VerificationReport) -> String {
    let mut out = format!(
        "image {} ready after {} ({})\n\n",
        report.image,
        format_millis(report.readiness_ms),
        report.runtime
    );
    out.push_str(&format!(
        "{:<12} {:<6} {:<10} {}\n",
        "PROBE", "RESULT", "TIME", "DETAIL"
    ));
    for p in &report.probes {
        let (result, detail) = match &p.outcome {
            ProbeOutcome::Passed => ("ok", first_line(&p.output)),
            ProbeOutcome::UnexpectedExitCode { expected, actual } => {
                ("FAIL", format!("exit code {actual}, expected {expected}"))
            }
            ProbeOutcome::DispatchFailed { error } => ("FAIL", error.clone()),
        };
        out.push_str(&format!(
            "{:<12} {:<6} {:<10} {}\n",
            p.name,
            result,
            format_millis(p.duration_ms),
            detail
        ));
    }
    out.push('\n');
    out.push_str(&report.summary());
    out.push('\n');
    for message in report.failures().filter_map(|p| p.failure_message()) {
        out.push_str("  - ");
        out.push_str(&message);
        out.push('\n');
    }
    out
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_owned()
}
