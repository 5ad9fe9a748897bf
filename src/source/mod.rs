//! Sample sources: the seam between platform sensor callbacks and the sampler
//!
//! A [`SampleSource`] exposes the most recent reading per channel. Readings
//! are updated asynchronously by whatever feeds the source (platform sensor
//! callbacks in a real deployment, a background thread in the simulator) and
//! polled by the sampler at its own fixed rate. Each channel's cell is
//! internally consistent on its own; a snapshot across channels may mix
//! updates from adjacent hardware callbacks, which is acceptable for this
//! data.

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::types::{Channel, ChannelVector};
use std::sync::Arc;
use std::time::Duration;

mod hub;
mod sim;

pub use hub::SourceHub;
pub use sim::SimulatedSource;

/// Latest-value access to the device's motion/orientation channels
pub trait SampleSource: Send + Sync {
    /// Whether this device has the channel at all; checkable before any data
    fn available(&self, channel: Channel) -> bool;

    /// Most recent reading for the channel; zeroed until the first update
    fn latest(&self, channel: Channel) -> ChannelVector;

    /// Ask the hardware to start delivering the channel at roughly `period`.
    /// Returns false if the channel cannot be subscribed.
    fn subscribe(&self, channel: Channel, period: Duration) -> bool;

    /// Stop hardware delivery for the channel
    fn unsubscribe(&self, channel: Channel);
}

/// Construct the configured sample source
pub fn create_source(config: &AgentConfig) -> Result<Arc<dyn SampleSource>> {
    match config.source.kind.as_str() {
        "simulated" | "sim" => Ok(Arc::new(SimulatedSource::new(config.source.seed))),
        other => Err(Error::Config(format!("unknown source kind: {:?}", other))),
    }
}
