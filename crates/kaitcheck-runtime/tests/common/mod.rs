//! Helpers shared by the integration tests.

use std::io::{Read, Write};
use std::net::TcpListener;

use kaitcheck_runtime::backend::HostEndpoint;

/// Serves `HTTP/1.1 <status>` with an empty body on a loopback port.
pub fn serve_status(status: &'static str) -> HostEndpoint {
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
