//! Resilient uplink to the collector
//!
//! # Protocol
//!
//! One TCP connection at a time, attempt-scoped:
//!
//! ```text
//! collector → agent   one greeting line, literal token "MMPS"
//! agent → collector   raw buffer suffixes (ASCII rows), every send interval
//! agent → collector   0xFF as TCP urgent data (liveness probe, out-of-band)
//! agent → collector   "END\n" once, after the final flush, at shutdown
//! ```
//!
//! # State machine
//!
//! ```text
//!                 ┌────────────────────────────────────┐
//!                 ▼                                    │ failure / bad token
//! Disconnected → Connecting → Handshaking → Streaming ─┤ (backoff, cursor kept)
//!                 ▲    │            │           │      │
//!                 └────┴────────────┴───────────┼──────┘
//!                                     stop()    ▼
//!                                            Draining → Closed
//! ```
//!
//! The worker owns a cursor into the session's [`TransmitBuffer`]. The cursor
//! advances only after a write has been accepted in full, so a failure at any
//! point resumes from the last confirmed byte: across every reconnect, the
//! bytes put on the wire are exactly the buffer's contents, no gaps and no
//! duplicates.

use crate::buffer::TransmitBuffer;
use crate::error::{Error, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

mod link;
mod mock;

pub use link::{Dialer, Link, TcpDialer};
pub use mock::{MockAttempt, MockDialer};

/// Token the collector must greet with before any data is forwarded
pub const HANDSHAKE_TOKEN: &str = "MMPS";

/// Sentinel line closing a gracefully finished session
pub const TERMINATION_MARKER: &[u8] = b"END\n";

/// Granularity at which sleeps observe the stop flag
const STOP_POLL: Duration = Duration::from_millis(25);

/// Uplink connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Handshaking,
    Streaming,
    Draining,
    Closed,
}

/// Worker-side timing parameters
#[derive(Debug, Clone)]
pub struct UplinkConfig {
    /// Delay before the first connection attempt of a session
    pub initial_delay: Duration,
    /// Delay between incremental sends while streaming
    pub send_interval: Duration,
    /// Bound on waiting for the greeting line
    pub handshake_timeout: Duration,
    /// Fixed wait between failed attempts
    pub reconnect_backoff: Duration,
    /// Grace wait before the final flush, letting the sampler append its
    /// last row
    pub drain_grace: Duration,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            send_interval: Duration::from_millis(500),
            handshake_timeout: Duration::from_millis(2000),
            reconnect_backoff: Duration::from_millis(2500),
            drain_grace: Duration::from_millis(500),
        }
    }
}

/// Diagnostic counters, updated by the worker thread
#[derive(Debug, Default)]
pub struct UplinkStats {
    attempts: AtomicU64,
    connect_failures: AtomicU64,
    handshake_timeouts: AtomicU64,
    handshake_mismatches: AtomicU64,
    probe_failures: AtomicU64,
    write_failures: AtomicU64,
    bytes_sent: AtomicU64,
}

/// Point-in-time copy of the uplink counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub attempts: u64,
    pub connect_failures: u64,
    pub handshake_timeouts: u64,
    pub handshake_mismatches: u64,
    pub probe_failures: u64,
    pub write_failures: u64,
    pub bytes_sent: u64,
}

impl UplinkStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            handshake_timeouts: self.handshake_timeouts.load(Ordering::Relaxed),
            handshake_mismatches: self.handshake_mismatches.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// Streaming uplink bound to one session's transmit buffer
pub struct Uplink {
    dialer: Arc<dyn Dialer>,
    buffer: Arc<TransmitBuffer>,
    config: UplinkConfig,
    state: Arc<Mutex<LinkState>>,
    stop: Arc<AtomicBool>,
    stats: Arc<UplinkStats>,
    thread: Option<JoinHandle<()>>,
}

impl Uplink {
    pub fn new(dialer: Arc<dyn Dialer>, buffer: Arc<TransmitBuffer>, config: UplinkConfig) -> Self {
        Self {
            dialer,
            buffer,
            config,
            state: Arc::new(Mutex::new(LinkState::Disconnected)),
            stop: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(UplinkStats::default()),
            thread: None,
        }
    }

    /// Spawn the worker thread and begin connecting.
    ///
    /// Rejected with [`Error::AlreadyStreaming`] unless the uplink is
    /// Disconnected or Closed. Starting from Closed begins a fresh delivery
    /// at cursor 0; per-session uplinks are constructed anew by the session.
    pub fn start(&mut self) -> Result<()> {
        {
            let state = self.state.lock();
            match *state {
                LinkState::Disconnected | LinkState::Closed => {}
                _ => return Err(Error::AlreadyStreaming),
            }
        }
        if let Some(thread) = self.thread.take() {
            // A Closed worker has already exited; reap it before restarting.
            let _ = thread.join();
        }

        self.stop.store(false, Ordering::Relaxed);
        *self.state.lock() = LinkState::Connecting;

        let worker = Worker {
            dialer: Arc::clone(&self.dialer),
            buffer: Arc::clone(&self.buffer),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            stop: Arc::clone(&self.stop),
            stats: Arc::clone(&self.stats),
            cursor: 0,
        };
        let thread = thread::Builder::new()
            .name("uplink".to_string())
            .spawn(move || worker.run())?;
        self.thread = Some(thread);
        Ok(())
    }

    /// Request draining and block until the worker reaches Closed.
    ///
    /// Bounded by the grace delay plus one final flush and the marker write;
    /// completes even when no connection is open. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for Uplink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Probe the collector endpoint once: connect, send the liveness byte, close.
///
/// Used by the `--check` flag to verify reachability before a survey starts.
pub fn pretest(endpoint: &str, connect_timeout: Duration) -> Result<()> {
    let dialer = TcpDialer::new(endpoint.to_string(), connect_timeout);
    let mut link = dialer.dial()?;
    link.probe()?;
    Ok(())
}

struct Worker {
    dialer: Arc<dyn Dialer>,
    buffer: Arc<TransmitBuffer>,
    config: UplinkConfig,
    state: Arc<Mutex<LinkState>>,
    stop: Arc<AtomicBool>,
    stats: Arc<UplinkStats>,
    cursor: usize,
}

impl Worker {
    fn run(mut self) {
        self.sleep_interruptible(self.config.initial_delay);

        // Link still open when stop arrives; drained below.
        let mut live: Option<Box<dyn Link>> = None;

        while !self.stopped() {
            self.set_state(LinkState::Connecting);
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);

            let mut link = match self.dialer.dial() {
                Ok(link) => link,
                Err(e) => {
                    self.stats.connect_failures.fetch_add(1, Ordering::Relaxed);
                    debug!("uplink: connect failed: {}", e);
                    self.sleep_interruptible(self.config.reconnect_backoff);
                    continue;
                }
            };

            self.set_state(LinkState::Handshaking);
            if let Err(e) = self.handshake(&mut *link) {
                match &e {
                    Error::HandshakeTimeout => {
                        self.stats.handshake_timeouts.fetch_add(1, Ordering::Relaxed);
                    }
                    Error::HandshakeMismatch { .. } => {
                        self.stats
                            .handshake_mismatches
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {
                        self.stats.connect_failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
                warn!("uplink: handshake failed: {}", e);
                drop(link);
                self.sleep_interruptible(self.config.reconnect_backoff);
                continue;
            }

            info!(
                "uplink: collector accepted handshake, streaming from offset {}",
                self.cursor
            );
            self.set_state(LinkState::Streaming);

            if self.stream(&mut *link) {
                live = Some(link);
                break;
            }

            // Streaming failed: release the attempt, keep the cursor, retry.
            drop(link);
            self.sleep_interruptible(self.config.reconnect_backoff);
        }

        self.set_state(LinkState::Draining);
        self.drain(live);
        self.set_state(LinkState::Closed);
    }

    fn handshake(&self, link: &mut dyn Link) -> Result<()> {
        let line = link.read_handshake_line(self.config.handshake_timeout)?;
        if line == HANDSHAKE_TOKEN {
            Ok(())
        } else {
            Err(Error::HandshakeMismatch {
                expected: HANDSHAKE_TOKEN,
                received: line,
            })
        }
    }

    /// Streaming loop over one connection. Returns true when it exits because
    /// stop was requested, false when the connection failed.
    fn stream(&mut self, link: &mut dyn Link) -> bool {
        while !self.stopped() {
            if let Err(e) = link.probe() {
                self.stats.probe_failures.fetch_add(1, Ordering::Relaxed);
                warn!("uplink: liveness probe failed: {}", e);
                return false;
            }

            let (chunk, new_len) = self.buffer.read_from(self.cursor);
            if !chunk.is_empty() {
                if let Err(e) = link.write_all(&chunk).and_then(|_| link.flush()) {
                    self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "uplink: write failed at offset {}: {}; reconnecting",
                        self.cursor, e
                    );
                    return false;
                }
                self.stats
                    .bytes_sent
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                self.cursor = new_len;
            }

            self.sleep_interruptible(self.config.send_interval);
        }
        true
    }

    /// Final flush and termination marker over the surviving link, if any
    fn drain(&mut self, live: Option<Box<dyn Link>>) {
        // Let a concurrently stopping sampler append its last row first.
        thread::sleep(self.config.drain_grace);

        let Some(mut link) = live else {
            debug!("uplink: no live connection at shutdown, nothing to drain");
            return;
        };

        let (chunk, new_len) = self.buffer.read_from(self.cursor);
        match Self::final_flush(&mut *link, &chunk) {
            Ok(()) => {
                self.stats
                    .bytes_sent
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                self.cursor = new_len;
                info!(
                    "uplink: session drained ({} final bytes, marker sent)",
                    chunk.len()
                );
            }
            Err(e) => warn!("uplink: final flush failed: {}", e),
        }
    }

    fn final_flush(link: &mut dyn Link, chunk: &[u8]) -> Result<()> {
        if !chunk.is_empty() {
            link.write_all(chunk)?;
            link.flush()?;
        }
        link.write_all(TERMINATION_MARKER)?;
        link.flush()
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn set_state(&self, next: LinkState) {
        *self.state.lock() = next;
        debug!("uplink: state -> {:?}", next);
    }

    /// Sleep up to `duration`, waking early when stop is requested
    fn sleep_interruptible(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(STOP_POLL));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> UplinkConfig {
        UplinkConfig {
            initial_delay: Duration::ZERO,
            send_interval: Duration::from_millis(5),
            handshake_timeout: Duration::from_millis(50),
            reconnect_backoff: Duration::from_millis(5),
            drain_grace: Duration::from_millis(5),
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn uplink_with(
        script: Vec<MockAttempt>,
        exhausted: MockAttempt,
        buffer: &Arc<TransmitBuffer>,
    ) -> (Uplink, MockDialer) {
        let dialer = MockDialer::new(script, exhausted);
        let uplink = Uplink::new(
            Arc::new(dialer.clone()),
            Arc::clone(buffer),
            fast_config(),
        );
        (uplink, dialer)
    }

    #[test]
    fn test_redundant_start_rejected() {
        let buffer = Arc::new(TransmitBuffer::new());
        let (mut uplink, _dialer) =
            uplink_with(vec![], MockAttempt::Serve { budget: None }, &buffer);

        uplink.start().unwrap();
        assert!(matches!(uplink.start(), Err(Error::AlreadyStreaming)));
        uplink.stop();
        assert_eq!(uplink.state(), LinkState::Closed);
    }

    #[test]
    fn test_handshake_mismatch_never_streams() {
        let buffer = Arc::new(TransmitBuffer::new());
        buffer.append_line("should never leave the agent");
        let (mut uplink, dialer) = uplink_with(
            vec![],
            MockAttempt::WrongToken("WRONG".to_string()),
            &buffer,
        );

        uplink.start().unwrap();
        assert!(wait_for(
            || uplink.stats().handshake_mismatches >= 3,
            Duration::from_secs(2)
        ));

        assert!(dialer.delivered().is_empty());
        assert_ne!(uplink.state(), LinkState::Streaming);

        uplink.stop();
        assert_eq!(uplink.state(), LinkState::Closed);
        // No handshaken link at shutdown, so not even the marker goes out
        assert!(dialer.delivered().is_empty());
    }

    #[test]
    fn test_silent_collector_counts_handshake_timeouts() {
        let buffer = Arc::new(TransmitBuffer::new());
        let (mut uplink, dialer) = uplink_with(
            vec![MockAttempt::Silent, MockAttempt::Silent],
            MockAttempt::Serve { budget: None },
            &buffer,
        );

        uplink.start().unwrap();
        assert!(wait_for(
            || uplink.stats().handshake_timeouts == 2 && uplink.state() == LinkState::Streaming,
            Duration::from_secs(2)
        ));
        assert!(dialer.attempts() >= 3);
        uplink.stop();
    }

    #[test]
    fn test_exactly_once_across_write_failure() {
        let buffer = Arc::new(TransmitBuffer::new());
        buffer.append_line("one");
        let (mut uplink, dialer) = uplink_with(
            vec![MockAttempt::Serve { budget: Some(8) }],
            MockAttempt::Serve { budget: None },
            &buffer,
        );

        uplink.start().unwrap();
        assert!(wait_for(
            || dialer.delivered().len() == 4,
            Duration::from_secs(2)
        ));

        buffer.append_line("two");
        assert!(wait_for(
            || dialer.delivered().len() == 8,
            Duration::from_secs(2)
        ));

        // This line busts the first link's budget; it must arrive intact via
        // the second link, without re-sending anything already confirmed.
        buffer.append_line("three");
        assert!(wait_for(
            || dialer.delivered().len() == 14,
            Duration::from_secs(2)
        ));
        assert_eq!(uplink.stats().write_failures, 1);

        uplink.stop();

        let (expected, _) = buffer.read_from(0);
        let mut expected = expected;
        expected.extend_from_slice(TERMINATION_MARKER);
        assert_eq!(dialer.delivered(), expected);
    }

    #[test]
    fn test_probe_failure_reconnects_without_loss() {
        let buffer = Arc::new(TransmitBuffer::new());
        buffer.append_line("hello");
        let (mut uplink, dialer) = uplink_with(
            vec![MockAttempt::ProbeFail],
            MockAttempt::Serve { budget: None },
            &buffer,
        );

        uplink.start().unwrap();
        assert!(wait_for(
            || dialer.delivered() == b"hello\n",
            Duration::from_secs(2)
        ));

        let stats = uplink.stats();
        assert_eq!(stats.probe_failures, 1);
        assert!(dialer.attempts() >= 2);

        uplink.stop();
        assert_eq!(dialer.delivered(), b"hello\nEND\n");
    }

    #[test]
    fn test_connect_refused_then_recovers_backlog() {
        let buffer = Arc::new(TransmitBuffer::new());
        buffer.append_line("queued while unreachable");
        buffer.append_line("also queued");
        let (mut uplink, dialer) = uplink_with(
            vec![MockAttempt::Refuse, MockAttempt::Refuse],
            MockAttempt::Serve { budget: None },
            &buffer,
        );

        uplink.start().unwrap();
        let (backlog, backlog_len) = buffer.read_from(0);
        assert!(wait_for(
            || dialer.delivered().len() >= backlog_len,
            Duration::from_secs(2)
        ));
        assert_eq!(uplink.stats().connect_failures, 2);
        assert_eq!(&dialer.delivered()[..backlog_len], &backlog[..]);

        // Delivery continues for rows appended after recovery
        buffer.append_line("fresh");
        let (_, total) = buffer.read_from(0);
        assert!(wait_for(
            || dialer.delivered().len() >= total,
            Duration::from_secs(2)
        ));

        uplink.stop();
    }

    #[test]
    fn test_stop_without_connection_is_bounded() {
        let buffer = Arc::new(TransmitBuffer::new());
        let (mut uplink, dialer) = uplink_with(vec![], MockAttempt::Refuse, &buffer);

        uplink.start().unwrap();
        assert!(wait_for(
            || uplink.stats().connect_failures >= 1,
            Duration::from_secs(2)
        ));

        let begin = Instant::now();
        uplink.stop();
        assert!(begin.elapsed() < Duration::from_secs(1));
        assert_eq!(uplink.state(), LinkState::Closed);
        assert!(dialer.delivered().is_empty());
    }

    #[test]
    fn test_drain_writes_marker_exactly_once() {
        let buffer = Arc::new(TransmitBuffer::new());
        buffer.append_line("a");
        let (mut uplink, dialer) =
            uplink_with(vec![], MockAttempt::Serve { budget: None }, &buffer);

        uplink.start().unwrap();
        assert!(wait_for(
            || dialer.delivered() == b"a\n",
            Duration::from_secs(2)
        ));

        uplink.stop();
        assert_eq!(dialer.delivered(), b"a\nEND\n");

        // stop() is idempotent and must not emit another marker
        uplink.stop();
        assert_eq!(dialer.delivered(), b"a\nEND\n");
    }
}
