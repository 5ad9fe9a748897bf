//! Session lifecycle: one sampler/uplink pair per survey
//!
//! A [`Session`] owns the sample source and, while active, exactly one
//! sampler and one uplink bound to a fresh transmit buffer. `enter()` and
//! `leave()` are the whole lifecycle contract; entering an already active
//! session implicitly leaves it first, so at most one pair is ever alive and
//! the collector's single client slot is never held by a dead stream.
//!
//! # Example
//!
//! ```no_run
//! use magscout::config::AgentConfig;
//! use magscout::session::Session;
//! use magscout::source::SimulatedSource;
//! use std::sync::Arc;
//!
//! let config = AgentConfig::local_defaults();
//! let mut session = Session::new(config, Arc::new(SimulatedSource::new(0)));
//! session.enter()?;
//! // ... survey runs, rows stream to the collector ...
//! session.leave();
//! # Ok::<(), magscout::Error>(())
//! ```

use crate::buffer::TransmitBuffer;
use crate::config::AgentConfig;
use crate::error::Result;
use crate::sampler::Sampler;
use crate::source::SampleSource;
use crate::transport::{LinkState, StatsSnapshot, TcpDialer, Uplink};
use log::info;
use std::sync::Arc;

struct ActivePair {
    buffer: Arc<TransmitBuffer>,
    sampler: Sampler,
    uplink: Uplink,
}

/// Owner of the acquisition/transmission pair
pub struct Session {
    config: AgentConfig,
    source: Arc<dyn SampleSource>,
    active: Option<ActivePair>,
}

impl Session {
    pub fn new(config: AgentConfig, source: Arc<dyn SampleSource>) -> Self {
        Self {
            config,
            source,
            active: None,
        }
    }

    /// Start a survey session.
    ///
    /// Validates the configuration, tears down any previous pair, seeds a
    /// fresh buffer with the subject identifier, and starts the sampler and
    /// then the uplink. If the sampler cannot start (missing channels,
    /// rejected subscription) the session stays idle and the uplink is never
    /// created.
    pub fn enter(&mut self) -> Result<()> {
        self.config.validate()?;
        self.leave();

        let buffer = Arc::new(TransmitBuffer::with_header(&self.config.session.subject_id));

        let mut sampler = Sampler::new(Arc::clone(&self.source), Arc::clone(&buffer));
        sampler.start(self.config.sampling.interval())?;

        let dialer = TcpDialer::new(
            self.config.server.endpoint(),
            self.config.transport.connect_timeout(),
        );
        let mut uplink = Uplink::new(
            Arc::new(dialer),
            Arc::clone(&buffer),
            self.config.transport.uplink(),
        );
        if let Err(e) = uplink.start() {
            sampler.stop();
            return Err(e);
        }

        info!(
            "session: active (subject {}, collector {})",
            self.config.session.subject_id,
            self.config.server.endpoint()
        );
        self.active = Some(ActivePair {
            buffer,
            sampler,
            uplink,
        });
        Ok(())
    }

    /// End the survey session: drain the uplink, then stop the sampler.
    /// No-op when already idle.
    pub fn leave(&mut self) {
        let Some(mut pair) = self.active.take() else {
            return;
        };
        // Uplink first: its drain grace covers the sampler's final rows,
        // which keep arriving until the sampler is stopped below.
        pair.uplink.stop();
        pair.sampler.stop();
        info!(
            "session: idle ({} bytes recorded)",
            pair.buffer.len()
        );
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Current uplink state, when active
    pub fn uplink_state(&self) -> Option<LinkState> {
        self.active.as_ref().map(|pair| pair.uplink.state())
    }

    /// Uplink diagnostic counters, when active
    pub fn uplink_stats(&self) -> Option<StatsSnapshot> {
        self.active.as_ref().map(|pair| pair.uplink.stats())
    }

    /// Bytes recorded so far in the active session's buffer
    pub fn recorded_bytes(&self) -> usize {
        self.active.as_ref().map_or(0, |pair| pair.buffer.len())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.leave();
    }
}
