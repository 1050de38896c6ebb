//! HTTP readiness polling.

use std::time::{Duration, Instant};

use kaitcheck_common::error::{KaitError, Result};
use kaitcheck_common::types::ContainerId;

use crate::backend::ContainerRuntime;
use crate::request::HttpReadiness;

/// Shortest limit handed to the HTTP client or a runtime query.
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(10);

/// Polls the readiness endpoint until it answers with the expected status.
///
/// Each attempt re-resolves the published port, since runtimes may publish
/// it only after the container process is up. Runtime queries, requests and
/// the wait between attempts are all bounded by the time left, so the call
/// returns no later than the startup timeout plus one request timeout.
///
/// # Errors
///
/// Returns [`KaitError::ContainerExited`] if the container stops while
/// waiting, or [`KaitError::ReadinessTimeout`] once the deadline passes.
pub fn wait_until_ready(
    runtime: &dyn ContainerRuntime,
    id: &ContainerId,
    readiness: &HttpReadiness,
) -> Result<Duration> {
    let client = reqwest::blocking::Client::builder()
        .timeout(readiness.request_timeout.max(MIN_REQUEST_TIMEOUT))
        .no_proxy()
        .build()
        .map_err(|e| KaitError::Config {
            message: format!("failed to build HTTP client: {e}"),
        })?;

    let start = Instant::now();
    let deadline = start + readiness.startup_timeout;
    let mut url = format!("http://<unpublished {}>{}", readiness.port, readiness.path);
    let mut last_error = String::from("no attempt completed");
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match runtime.is_running(id, Some(time_left(deadline))) {
            Ok(true) => {}
            Ok(false) => {
                return Err(KaitError::ContainerExited { id: id.to_string() });
            }
            Err(e) => last_error = e.to_string(),
        }

        match runtime.host_address(id, readiness.port, Some(time_left(deadline))) {
            Ok(endpoint) => {
                url = readiness.url(&endpoint);
                let per_request = readiness
                    .request_timeout
                    .min(time_left(deadline))
                    .max(MIN_REQUEST_TIMEOUT);
                match client.get(&url).timeout(per_request).send() {
                    Ok(response) if response.status().as_u16() == readiness.expected_status => {
                        let elapsed = start.elapsed();
                        tracing::info!(
                            id = %id.short(),
                            %url,
                            attempts,
                            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                            "container is ready"
                        );
                        return Ok(elapsed);
                    }
                    Ok(response) => last_error = format!("HTTP {}", response.status()),
                    Err(e) => last_error = e.to_string(),
                }
            }
            Err(e) => last_error = e.to_string(),
        }
        tracing::debug!(id = %id.short(), attempts, %url, error = %last_error, "not ready yet");

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(KaitError::ReadinessTimeout {
                url,
                timeout: readiness.startup_timeout,
                last_error,
            });
        }
        std::thread::sleep(readiness.poll_interval.min(remaining));
    }
}

/// Time until `deadline`, floored so a bounded call can still be made.
fn time_left(deadline: Instant) -> Duration {
    deadline
        .saturating_duration_since(Instant::now())
        .max(MIN_REQUEST_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use kaitcheck_common::types::PortSpec;

    use super::*;
    use crate::backend::HostEndpoint;
    use crate::backend::memory::{FakeImage, InMemoryRuntime};
    use crate::request::LaunchRequest;

    /// Serves every connection with a fixed status line until the test ends.
    fn serve_status(status: &'static str) -> HostEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let _ = std::thread::spawn(move || {
            for mut stream in listener.incoming().flatten() {
                let mut buf = [0_u8; 1024];
                let _ = stream.read(&mut buf);
                let _ = write!(
                    stream,
                    "HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
            }
        });
        HostEndpoint::new("127.0.0.1", port)
    }

    fn closed_endpoint() -> HostEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        HostEndpoint::new("127.0.0.1", port)
    }

    fn readiness(timeout_ms: u64) -> HttpReadiness {
        HttpReadiness::new("/hooks/", PortSpec::tcp(9000))
            .with_startup_timeout(Duration::from_millis(timeout_ms))
            .with_poll_interval(Duration::from_millis(20))
            .with_request_timeout(Duration::from_millis(200))
    }

    fn started(endpoint: HostEndpoint, image: FakeImage) -> (InMemoryRuntime, ContainerId) {
        let runtime = InMemoryRuntime::new().with_image(
            "kait:local",
            image.with_endpoint(PortSpec::tcp(9000), endpoint),
        );
        let request = LaunchRequest::builder("kait:local")
            .expose(PortSpec::tcp(9000))
            .wait_for(readiness(1_000))
            .build()
            .unwrap();
        let id = runtime.start(&request).unwrap();
        (runtime, id)
    }

    #[test]
    fn ready_when_endpoint_answers_200() {
        let (runtime, id) = started(serve_status("200 OK"), FakeImage::new());
        let elapsed = wait_until_ready(&runtime, &id, &readiness(5_000)).unwrap();
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn not_found_status_times_out() {
        let (runtime, id) = started(serve_status("404 Not Found"), FakeImage::new());
        let err = wait_until_ready(&runtime, &id, &readiness(300)).unwrap_err();
        match err {
            KaitError::ReadinessTimeout { url, last_error, .. } => {
                assert!(url.ends_with("/hooks/"));
                assert!(last_error.contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn refused_connection_times_out_within_margin() {
        let (runtime, id) = started(closed_endpoint(), FakeImage::new());
        let start = Instant::now();
        let err = wait_until_ready(&runtime, &id, &readiness(500)).unwrap_err();
        assert!(matches!(err, KaitError::ReadinessTimeout { .. }));
        assert!(start.elapsed() < Duration::from_millis(500 + 1_500));
    }

    #[test]
    fn custom_expected_status() {
        let (runtime, id) = started(serve_status("204 No Content"), FakeImage::new());
        let condition = readiness(2_000).with_expected_status(204);
        assert!(wait_until_ready(&runtime, &id, &condition).is_ok());
    }

    #[test]
    fn exited_container_fails_fast() {
        let (runtime, id) = started(closed_endpoint(), FakeImage::new().exits_on_start());
        let start = Instant::now();
        let err = wait_until_ready(&runtime, &id, &readiness(10_000)).unwrap_err();
        assert!(matches!(err, KaitError::ContainerExited { .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
