//! Shared helpers for integration tests: an in-process collector server.
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use magscout::config::AgentConfig;

/// Minimal stand-in for the collector: greets each client with a token line,
/// then records everything the client sends. Serves one client at a time,
/// like the real collector's single slot.
pub struct Collector {
    port: u16,
    segments: Arc<Mutex<Vec<Vec<u8>>>>,
    connections: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Collector {
    /// Collector on an ephemeral port
    pub fn spawn(token: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind collector");
        Self::serve(listener, token, None)
    }

    /// Collector that drops its first connection after `limit` received bytes
    pub fn spawn_flaky(token: &str, limit: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind collector");
        Self::serve(listener, token, Some(limit))
    }

    /// Collector on a specific port (for delayed-listener scenarios)
    pub fn spawn_on(port: u16, token: &str) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).expect("bind collector");
        Self::serve(listener, token, None)
    }

    fn serve(listener: TcpListener, token: &str, drop_first_after: Option<usize>) -> Self {
        listener.set_nonblocking(true).expect("nonblocking listener");
        let port = listener.local_addr().expect("local addr").port();

        let segments: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let token = token.to_string();
        let thread_segments = Arc::clone(&segments);
        let thread_connections = Arc::clone(&connections);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !thread_stop.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, _addr)) => {
                        let n = thread_connections.fetch_add(1, Ordering::Relaxed) + 1;
                        let limit = if n == 1 { drop_first_after } else { None };
                        thread_segments.lock().unwrap().push(Vec::new());
                        handle_client(stream, &token, &thread_stop, limit, &thread_segments);
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            port,
            segments,
            connections,
            stop,
            handle: Some(handle),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Bytes received per completed connection, in order
    pub fn segments(&self) -> Vec<Vec<u8>> {
        self.segments.lock().unwrap().clone()
    }

    /// All received bytes concatenated across connections
    pub fn received(&self) -> Vec<u8> {
        self.segments.lock().unwrap().concat()
    }

    pub fn received_string(&self) -> String {
        String::from_utf8_lossy(&self.received()).into_owned()
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Greet the client, then append everything it sends to the segment pushed
/// for this connection, visible to `received()` while the link is still open.
fn handle_client(
    mut stream: TcpStream,
    token: &str,
    stop: &AtomicBool,
    drop_after: Option<usize>,
    segments: &Mutex<Vec<Vec<u8>>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_millis(50)));
    if stream.write_all(format!("{}\n", token).as_bytes()).is_err() {
        return;
    }
    let _ = stream.flush();

    let mut total = 0usize;
    let mut buf = [0u8; 4096];
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                total += n;
                if let Some(segment) = segments.lock().unwrap().last_mut() {
                    segment.extend_from_slice(&buf[..n]);
                }
                if let Some(limit) = drop_after {
                    if total >= limit {
                        break; // abrupt close, client must reconnect
                    }
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(_) => break,
        }
    }
}

/// Bind an ephemeral port and release it, so a later listener can claim it
pub fn reserve_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("reserve port");
    listener.local_addr().expect("local addr").port()
}

/// Poll `cond` until it holds or `timeout` elapses
pub fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Agent config pointed at a local collector, with test-friendly timings
pub fn test_config(port: u16) -> AgentConfig {
    let mut config = AgentConfig::local_defaults();
    config.server.port = port;
    config.transport.initial_delay_ms = 0;
    config.transport.send_interval_ms = 20;
    config.transport.connect_timeout_ms = 300;
    config.transport.handshake_timeout_ms = 300;
    config.transport.reconnect_backoff_ms = 50;
    config.transport.drain_grace_ms = 30;
    config
}
