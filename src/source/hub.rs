//! Per-channel latest-value cells fed by hardware callbacks

use super::SampleSource;
use crate::types::{Channel, ChannelVector};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Latest-value store for all four channels.
///
/// The feeding side (platform callback context) calls [`SourceHub::publish`]
/// for whichever channel just updated; the sampler reads through the
/// [`SampleSource`] impl. One mutex per channel keeps every individual
/// reading internally consistent while callbacks for different channels
/// never contend with each other.
pub struct SourceHub {
    cells: [Mutex<ChannelVector>; 4],
    capable: [bool; 4],
    subscribed: [AtomicBool; 4],
}

impl SourceHub {
    /// Hub for a device that has the given channels
    pub fn new(channels: &[Channel]) -> Self {
        let mut capable = [false; 4];
        for ch in channels {
            capable[ch.index()] = true;
        }
        Self {
            cells: [
                Mutex::new(ChannelVector::zero(Channel::Accelerometer)),
                Mutex::new(ChannelVector::zero(Channel::Gyroscope)),
                Mutex::new(ChannelVector::zero(Channel::Magnetometer)),
                Mutex::new(ChannelVector::zero(Channel::Orientation)),
            ],
            capable,
            subscribed: Default::default(),
        }
    }

    /// Hub for a fully equipped device
    pub fn all_channels() -> Self {
        Self::new(&Channel::ALL)
    }

    /// Store a new reading; called from the hardware callback context
    pub fn publish(&self, channel: Channel, reading: ChannelVector) {
        *self.cells[channel.index()].lock() = reading;
    }

    /// Whether anyone currently wants this channel delivered
    pub fn is_subscribed(&self, channel: Channel) -> bool {
        self.subscribed[channel.index()].load(Ordering::Relaxed)
    }
}

impl SampleSource for SourceHub {
    fn available(&self, channel: Channel) -> bool {
        self.capable[channel.index()]
    }

    fn latest(&self, channel: Channel) -> ChannelVector {
        *self.cells[channel.index()].lock()
    }

    fn subscribe(&self, channel: Channel, _period: Duration) -> bool {
        if !self.capable[channel.index()] {
            return false;
        }
        self.subscribed[channel.index()].store(true, Ordering::Relaxed);
        true
    }

    fn unsubscribe(&self, channel: Channel) {
        self.subscribed[channel.index()].store(false, Ordering::Relaxed);
    }
}
