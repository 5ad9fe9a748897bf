//! Scripted mock links for exercising the uplink state machine
//!
//! Each `dial()` consumes the next [`MockAttempt`] from the script (falling
//! back to a configured default once the script runs dry) and every byte a
//! link accepts is recorded, so tests can assert exactly-once delivery
//! across an arbitrary sequence of failures.

use super::link::{Dialer, Link};
use super::HANDSHAKE_TOKEN;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Behavior of one connection attempt
#[derive(Debug, Clone)]
pub enum MockAttempt {
    /// Connect is refused outright
    Refuse,
    /// Connects but never greets (handshake timeout)
    Silent,
    /// Greets with the wrong token
    WrongToken(String),
    /// Greets correctly, then fails the first liveness probe
    ProbeFail,
    /// Greets correctly and accepts writes; with a budget, the write that
    /// would exceed `budget` bytes fails without accepting anything
    Serve { budget: Option<usize> },
}

struct MockShared {
    script: VecDeque<MockAttempt>,
    exhausted: MockAttempt,
    delivered: Vec<u8>,
    attempts: usize,
}

/// Dialer producing scripted links; clones share one script and record
#[derive(Clone)]
pub struct MockDialer {
    shared: Arc<Mutex<MockShared>>,
}

impl MockDialer {
    /// `script` drives the first attempts; `exhausted` is replayed once the
    /// script is empty.
    pub fn new(script: Vec<MockAttempt>, exhausted: MockAttempt) -> Self {
        Self {
            shared: Arc::new(Mutex::new(MockShared {
                script: script.into(),
                exhausted,
                delivered: Vec::new(),
                attempts: 0,
            })),
        }
    }

    /// Every byte accepted by any link, in delivery order
    pub fn delivered(&self) -> Vec<u8> {
        self.shared.lock().delivered.clone()
    }

    /// Number of dial attempts observed
    pub fn attempts(&self) -> usize {
        self.shared.lock().attempts
    }
}

impl Dialer for MockDialer {
    fn dial(&self) -> Result<Box<dyn Link>> {
        let attempt = {
            let mut shared = self.shared.lock();
            shared.attempts += 1;
            match shared.script.pop_front() {
                Some(attempt) => attempt,
                None => shared.exhausted.clone(),
            }
        };

        match attempt {
            MockAttempt::Refuse => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock refused",
            ))),
            other => Ok(Box::new(MockLink {
                shared: Arc::clone(&self.shared),
                attempt: other,
                accepted: 0,
            })),
        }
    }
}

struct MockLink {
    shared: Arc<Mutex<MockShared>>,
    attempt: MockAttempt,
    accepted: usize,
}

impl Link for MockLink {
    fn read_handshake_line(&mut self, _timeout: Duration) -> Result<String> {
        match &self.attempt {
            MockAttempt::Silent => Err(Error::HandshakeTimeout),
            MockAttempt::WrongToken(token) => Ok(token.clone()),
            _ => Ok(HANDSHAKE_TOKEN.to_string()),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if let MockAttempt::Serve {
            budget: Some(budget),
        } = self.attempt
        {
            if self.accepted + data.len() > budget {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "mock write budget exhausted",
                )));
            }
        }
        self.accepted += data.len();
        self.shared.lock().delivered.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn probe(&mut self) -> Result<()> {
        match self.attempt {
            MockAttempt::ProbeFail => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock probe failed",
            ))),
            _ => Ok(()),
        }
    }
}
