//! System-wide constants and defaults.
//!
//! The defaults describe the `kait` image contract: the image under test,
//! the webhook port it exposes, and the path that answers once the in-image
//! service is up.

/// Image verified when no other reference is configured.
pub const DEFAULT_IMAGE: &str = "kait:local";

/// Port the image exposes for its webhook listener.
pub const DEFAULT_PORT: u16 = 9000;

/// HTTP path polled until the container is ready.
pub const DEFAULT_READINESS_PATH: &str = "/hooks/";

/// Maximum time to wait for the readiness endpoint.
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;

/// Delay between readiness polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Timeout applied to each individual readiness request.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 2_000;

/// Status code that marks the readiness endpoint as up.
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

/// Upper bound on a single probe before it is treated as hung.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 60;

/// Container CLI used when none is configured.
pub const DEFAULT_CONTAINER_CLI: &str = "docker";

/// Label attached to every container the harness creates.
pub const MANAGED_LABEL: &str = "io.kaitcheck.managed";

/// Label carrying the session identifier of the creating process.
pub const SESSION_LABEL: &str = "io.kaitcheck.session";

/// Prefix of generated container names.
pub const CONTAINER_NAME_PREFIX: &str = "kaitcheck";

/// Number of log lines captured when a launch fails.
pub const FAILURE_LOG_TAIL: usize = 50;

/// Default tools the `kait` image must bundle, probed in this order.
pub const DEFAULT_TOOLS: [&str; 3] = ["kubectl", "talosctl", "flux"];
