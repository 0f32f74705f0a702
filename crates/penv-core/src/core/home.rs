//! Best-effort shutdown of local helper servers that may hold the environment open.

use std::ops::Range;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

const HELPER_HOST: &str = "127.0.0.1";
const HELPER_PORTS: Range<u16> = 8008..8050;
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub(crate) fn shutdown_url(port: u16) -> String {
    format!("http://{HELPER_HOST}:{port}?__shutdown__=1")
}

/// Pings every helper port from a background thread and waits at most
/// `SHUTDOWN_GRACE`; a thread still running after that is abandoned.
///
/// Returns whether the sweep finished in time.
pub(crate) fn shutdown_helper_servers() -> bool {
    sweep_ports(HELPER_PORTS, SHUTDOWN_GRACE)
}

fn sweep_ports(ports: Range<u16>, grace: Duration) -> bool {
    let (done_tx, done_rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("penv-helper-shutdown".to_string())
        .spawn(move || {
            ping_ports(ports);
            let _ = done_tx.send(());
        });
    if let Err(err) = spawned {
        debug!(error = %err, "could not start helper shutdown thread");
        return false;
    }
    match done_rx.recv_timeout(grace) {
        Ok(()) => true,
        Err(_) => {
            debug!(?grace, "helper shutdown did not finish in time; abandoning it");
            false
        }
    }
}

fn ping_ports(ports: Range<u16>) {
    let client = match Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .no_proxy()
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            debug!(error = %err, "could not build helper shutdown client");
            return;
        }
    };
    for port in ports {
        if client.get(shutdown_url(port)).send().is_ok() {
            debug!(host = HELPER_HOST, port, "helper server is stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[test]
    fn url_targets_loopback_with_shutdown_query() {
        assert_eq!(shutdown_url(8010), "http://127.0.0.1:8010?__shutdown__=1");
    }

    #[test]
    fn listening_helper_receives_the_shutdown_request() {
        let listener = TcpListener::bind((HELPER_HOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buffer = [0u8; 1024];
            let read = stream.read(&mut buffer).unwrap();
            let request = String::from_utf8_lossy(&buffer[..read]).to_string();
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            request
        });

        assert!(sweep_ports(port..port + 1, Duration::from_secs(10)));
        let request = server.join().unwrap();
        assert!(request.starts_with("GET /?__shutdown__=1"), "{request}");
    }

    #[test]
    fn sweep_is_bounded_by_grace_period() {
        let start = std::time::Instant::now();
        sweep_ports(1..2, Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
