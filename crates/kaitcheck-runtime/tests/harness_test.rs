//! Lifecycle tests for the verification harness.
//!
//! Containers come from the in-memory runtime; readiness is served by a
//! local HTTP stub so the real polling client is exercised.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::serve_status;
use kaitcheck_common::config::HarnessConfig;
use kaitcheck_common::error::{ExecFailureKind, KaitError};
use kaitcheck_common::types::{LifecyclePhase, PortSpec, ProbeSpec, default_probes};
use kaitcheck_runtime::backend::HostEndpoint;
use kaitcheck_runtime::backend::memory::{FakeImage, InMemoryRuntime, ScriptedCommand};
use kaitcheck_runtime::harness::Harness;
use kaitcheck_runtime::probe::ProbeOutcome;
use kaitcheck_runtime::request::{HttpReadiness, LaunchRequest};

// ── Helpers ──────────────────────────────────────────────────────────

fn kait_image(endpoint: HostEndpoint) -> FakeImage {
    FakeImage::new()
        .with_endpoint(PortSpec::tcp(9000), endpoint)
        .with_command("kubectl", ScriptedCommand::succeeds("Client Version: v1.31.0"))
        .with_command("talosctl", ScriptedCommand::succeeds("Client:\n\tTag: v1.8.0"))
        .with_command("flux", ScriptedCommand::succeeds("flux: v2.4.0"))
}

fn fast_config() -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.readiness.startup_timeout_secs = 2;
    config.readiness.poll_interval_ms = 20;
    config.readiness.request_timeout_ms = 200;
    config
}

fn request(startup: Duration) -> LaunchRequest {
    LaunchRequest::builder("kait:local")
        .expose(PortSpec::tcp(9000))
        .wait_for(
            HttpReadiness::new("/hooks/", PortSpec::tcp(9000))
                .with_startup_timeout(startup)
                .with_poll_interval(Duration::from_millis(20))
                .with_request_timeout(Duration::from_millis(200)),
        )
        .build()
        .unwrap()
}

// ── Verification ─────────────────────────────────────────────────────

#[test]
fn verify_passes_when_all_tools_are_bundled() {
    let runtime = Arc::new(
        InMemoryRuntime::new().with_image("kait:local", kait_image(serve_status("200 OK"))),
    );
    let report = Harness::new(runtime.clone()).verify(&fast_config()).unwrap();

    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(report.probes.len(), 3);
    assert_eq!(report.summary(), "3/3 probes passed");
    assert_eq!(report.probes[0].output, "Client Version: v1.31.0");
    assert_eq!(
        runtime.exec_history(),
        default_probes().into_iter().map(|p| p.argv).collect::<Vec<_>>()
    );
    assert_eq!(runtime.total_stops(), 1);
    assert_eq!(runtime.live_containers(), 0);
}

#[test]
fn missing_kubectl_fails_its_probe_and_the_rest_still_run() {
    let image = FakeImage::new()
        .with_endpoint(PortSpec::tcp(9000), serve_status("200 OK"))
        .with_command("talosctl", ScriptedCommand::succeeds("Tag: v1.8.0"))
        .with_command("flux", ScriptedCommand::succeeds("flux: v2.4.0"));
    let runtime = Arc::new(InMemoryRuntime::new().with_image("kait:local", image));

    let report = Harness::new(runtime.clone()).verify(&fast_config()).unwrap();

    assert!(!report.is_success());
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].name, "kubectl");
    let message = failures[0].failure_message().unwrap();
    assert!(message.starts_with("kubectl should be available"), "{message}");
    assert!(matches!(failures[0].outcome, ProbeOutcome::DispatchFailed { .. }));

    assert!(report.probes[1].passed());
    assert!(report.probes[2].passed());
    assert_eq!(runtime.exec_history().len(), 3);
    assert_eq!(runtime.total_stops(), 1);
}

#[test]
fn nonzero_exit_code_is_a_probe_failure() {
    let image = kait_image(serve_status("200 OK"))
        .with_command("flux", ScriptedCommand::exits(1, "unknown flag: --client"));
    let runtime = Arc::new(InMemoryRuntime::new().with_image("kait:local", image));

    let report = Harness::new(runtime).verify(&fast_config()).unwrap();

    let flux = &report.probes[2];
    assert_eq!(
        flux.outcome,
        ProbeOutcome::UnexpectedExitCode {
            expected: 0,
            actual: 1
        }
    );
    assert_eq!(flux.output, "unknown flag: --client");
}

#[test]
fn custom_probe_table_runs_in_order() {
    let image = kait_image(serve_status("200 OK"))
        .with_command("helm", ScriptedCommand::exits(3, ""));
    let runtime = Arc::new(InMemoryRuntime::new().with_image("kait:local", image));
    let mut config = fast_config();
    config.probes = vec![
        ProbeSpec::client_version("flux"),
        ProbeSpec {
            name: "helm".into(),
            argv: vec!["helm".into(), "version".into()],
            expected_exit_code: 3,
        },
    ];

    let report = Harness::new(runtime.clone()).verify(&config).unwrap();

    assert!(report.is_success());
    assert_eq!(runtime.exec_history()[1], ["helm", "version"]);
}

#[test]
fn hanging_tool_times_out_after_configured_limit() {
    let image =
        kait_image(serve_status("200 OK")).with_command("kubectl", ScriptedCommand::hangs());
    let runtime = Arc::new(InMemoryRuntime::new().with_image("kait:local", image));
    let mut config = fast_config();
    config.probe_timeout_secs = Some(1);

    let start = Instant::now();
    let report = Harness::new(runtime.clone()).verify(&config).unwrap();
    let elapsed = start.elapsed();

    match &report.probes[0].outcome {
        ProbeOutcome::DispatchFailed { error } => {
            let expected = ExecFailureKind::TimedOut(Duration::from_secs(1)).to_string();
            assert!(error.contains(&expected), "{error}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(report.probes[1].passed());
    assert!(report.probes[2].passed());
    assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
}

// ── Launch failures ──────────────────────────────────────────────────

#[test]
fn missing_readiness_endpoint_fails_within_timeout_and_margin() {
    let runtime = Arc::new(
        InMemoryRuntime::new()
            .with_image("kait:local", kait_image(serve_status("404 Not Found"))),
    );
    let harness = Harness::new(runtime.clone());

    let start = Instant::now();
    let err = harness.launch(&request(Duration::from_millis(500))).unwrap_err();
    let elapsed = start.elapsed();

    match &err {
        KaitError::Launch { image, cause } => {
            assert_eq!(image, "kait:local");
            assert!(matches!(**cause, KaitError::ReadinessTimeout { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_millis(500 + 1_500), "took {elapsed:?}");

    let started = runtime.started();
    assert_eq!(started.len(), 1);
    assert_eq!(runtime.stop_count(&started[0]), 1);
    assert!(runtime.exec_history().is_empty());
}

#[test]
fn verify_reports_launch_failure_as_error() {
    let runtime = Arc::new(InMemoryRuntime::new());
    let err = Harness::new(runtime).verify(&fast_config()).unwrap_err();
    assert!(err.is_launch_failure());
}

// ── Termination guarantees ───────────────────────────────────────────

#[test]
fn launched_container_is_ready() {
    let runtime = Arc::new(
        InMemoryRuntime::new().with_image("kait:local", kait_image(serve_status("200 OK"))),
    );
    let container = Harness::new(runtime.clone())
        .launch(&request(Duration::from_secs(2)))
        .unwrap();
    assert_eq!(container.phase(), LifecyclePhase::Ready);
    assert_eq!(container.image(), "kait:local");
    assert_eq!(container.probe_timeout(), Some(Duration::from_secs(60)));
    container.terminate();
    assert_eq!(runtime.total_stops(), 1);
}

#[test]
fn terminate_runs_once_when_caller_panics() {
    let runtime = Arc::new(
        InMemoryRuntime::new().with_image("kait:local", kait_image(serve_status("200 OK"))),
    );
    let harness = Harness::new(runtime.clone());

    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut container = harness.launch(&request(Duration::from_secs(2))).unwrap();
        let _ = harness.probe(&mut container, &default_probes());
        panic!("assertion in caller failed");
    }));

    assert!(result.is_err());
    let started = runtime.started();
    assert_eq!(started.len(), 1);
    assert_eq!(runtime.stop_count(&started[0]), 1);
    assert_eq!(runtime.live_containers(), 0);
}

#[test]
fn terminate_runs_once_when_probes_fail() {
    let image = FakeImage::new().with_endpoint(PortSpec::tcp(9000), serve_status("200 OK"));
    let runtime = Arc::new(InMemoryRuntime::new().with_image("kait:local", image));

    let report = Harness::new(runtime.clone()).verify(&fast_config()).unwrap();

    assert_eq!(report.failures().count(), 3);
    let started = runtime.started();
    assert_eq!(runtime.stop_count(&started[0]), 1);
}

#[test]
fn container_killed_mid_run_reports_not_running() {
    let runtime = Arc::new(
        InMemoryRuntime::new().with_image("kait:local", kait_image(serve_status("200 OK"))),
    );
    let harness = Harness::new(runtime.clone());
    let mut container = harness.launch(&request(Duration::from_secs(2))).unwrap();

    runtime.kill(container.id());
    let err = container.exec(&["kubectl".to_owned()]).unwrap_err();

    assert!(matches!(
        err,
        KaitError::Exec {
            reason: ExecFailureKind::ContainerNotRunning,
            ..
        }
    ));
    drop(container);
    assert_eq!(runtime.total_stops(), 1);
}
