//! Simulated sample source for hardware-free operation and testing
//!
//! Models a phone lying roughly flat: gravity on the accelerometer Z axis,
//! small angular rates, an indoor-strength magnetic field, and an orientation
//! quaternion wandering near identity. Values follow a seeded Gaussian random
//! walk so consecutive rows look like a real, slightly moving device.

use super::hub::SourceHub;
use super::SampleSource;
use crate::types::{Channel, ChannelVector};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Update period of the simulated hardware (independent of the sampler tick)
const SIM_PERIOD: Duration = Duration::from_millis(5);

/// Simulated device publishing into a [`SourceHub`] from a background thread
pub struct SimulatedSource {
    hub: Arc<SourceHub>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SimulatedSource {
    /// Fully equipped simulated device.
    ///
    /// A seed of 0 picks a random seed; any other value is reproducible.
    pub fn new(seed: u64) -> Self {
        Self::with_channels(&Channel::ALL, seed)
    }

    /// Simulated device with only the given channels; the rest report
    /// unavailable, which is how tests exercise the missing-sensor path.
    pub fn with_channels(channels: &[Channel], seed: u64) -> Self {
        let hub = Arc::new(SourceHub::new(channels));
        let running = Arc::new(AtomicBool::new(true));

        let sim_hub = Arc::clone(&hub);
        let sim_running = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("source-sim".to_string())
            .spawn(move || run_simulation(sim_hub, sim_running, seed))
            .expect("failed to spawn source-sim thread");

        Self {
            hub,
            running,
            thread: Some(thread),
        }
    }
}

impl SampleSource for SimulatedSource {
    fn available(&self, channel: Channel) -> bool {
        self.hub.available(channel)
    }

    fn latest(&self, channel: Channel) -> ChannelVector {
        self.hub.latest(channel)
    }

    fn subscribe(&self, channel: Channel, period: Duration) -> bool {
        self.hub.subscribe(channel, period)
    }

    fn unsubscribe(&self, channel: Channel) {
        self.hub.unsubscribe(channel)
    }
}

impl Drop for SimulatedSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_simulation(hub: Arc<SourceHub>, running: Arc<AtomicBool>, seed: u64) {
    let mut rng = if seed == 0 {
        SmallRng::from_entropy()
    } else {
        SmallRng::seed_from_u64(seed)
    };

    // Baseline state: device flat and still
    let mut accel = [0.0, 0.0, 9.81];
    let mut gyro = [0.0f64, 0.0, 0.0];
    let mut mag = [23.0, 5.0, -40.0];
    let mut quat = [0.0, 0.0, 0.0, 1.0];

    while running.load(Ordering::Relaxed) {
        walk(&mut rng, &mut accel, 0.05);
        walk(&mut rng, &mut gyro, 0.01);
        walk(&mut rng, &mut mag, 0.1);
        walk(&mut rng, &mut quat, 0.002);
        normalize(&mut quat);

        if hub.is_subscribed(Channel::Accelerometer) {
            hub.publish(
                Channel::Accelerometer,
                ChannelVector::vec3(accel[0], accel[1], accel[2]),
            );
        }
        if hub.is_subscribed(Channel::Gyroscope) {
            hub.publish(
                Channel::Gyroscope,
                ChannelVector::vec3(gyro[0], gyro[1], gyro[2]),
            );
        }
        if hub.is_subscribed(Channel::Magnetometer) {
            hub.publish(
                Channel::Magnetometer,
                ChannelVector::vec3(mag[0], mag[1], mag[2]),
            );
        }
        if hub.is_subscribed(Channel::Orientation) {
            hub.publish(
                Channel::Orientation,
                ChannelVector::quat(quat[0], quat[1], quat[2], quat[3]),
            );
        }

        thread::sleep(SIM_PERIOD);
    }
}

fn walk<const N: usize>(rng: &mut SmallRng, state: &mut [f64; N], stddev: f64) {
    for v in state.iter_mut() {
        let n: f64 = rng.sample(StandardNormal);
        *v += n * stddev;
    }
}

fn normalize(quat: &mut [f64; 4]) {
    let norm = quat.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > f64::EPSILON {
        for v in quat.iter_mut() {
            *v /= norm;
        }
    } else {
        *quat = [0.0, 0.0, 0.0, 1.0];
    }
}
