//! Fixed-rate sampling loop
//!
//! Polls the sample source every tick (default 5 ms, ~200 Hz), formats one
//! row per tick, and appends it to the session's transmit buffer. Ticks are
//! best-effort: a slow append delays the next tick instead of triggering
//! catch-up, and there is no backpressure toward the source.

use crate::buffer::TransmitBuffer;
use crate::error::{Error, Result};
use crate::source::SampleSource;
use crate::types::{Channel, SampleRow};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Periodic reader of the four sensor channels
pub struct Sampler {
    source: Arc<dyn SampleSource>,
    buffer: Arc<TransmitBuffer>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Sampler {
    pub fn new(source: Arc<dyn SampleSource>, buffer: Arc<TransmitBuffer>) -> Self {
        Self {
            source,
            buffer,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Verify channel availability, subscribe all four channels, and start
    /// the sampling thread.
    ///
    /// Fails with [`Error::SensorUnavailable`] before touching the hardware
    /// if any channel is missing; no thread is started in that case.
    pub fn start(&mut self, interval: Duration) -> Result<()> {
        if self.running.load(Ordering::Relaxed) {
            return Err(Error::AlreadySampling);
        }

        let missing: Vec<Channel> = Channel::ALL
            .iter()
            .copied()
            .filter(|ch| !self.source.available(*ch))
            .collect();
        if !missing.is_empty() {
            return Err(Error::SensorUnavailable { missing });
        }

        let failed: Vec<Channel> = Channel::ALL
            .iter()
            .copied()
            .filter(|ch| !self.source.subscribe(*ch, interval))
            .collect();
        if !failed.is_empty() {
            for ch in Channel::ALL {
                self.source.unsubscribe(ch);
            }
            return Err(Error::SubscribeFailed { failed });
        }

        self.running.store(true, Ordering::Relaxed);

        let source = Arc::clone(&self.source);
        let buffer = Arc::clone(&self.buffer);
        let running = Arc::clone(&self.running);
        let thread = thread::Builder::new()
            .name("sampler".to_string())
            .spawn(move || sample_loop(source, buffer, running, interval))?;
        self.thread = Some(thread);

        info!("sampler: started at interval {:?}", interval);
        Ok(())
    }

    /// Stop the loop at its next iteration boundary, join the thread, and
    /// unsubscribe the channels. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        for ch in Channel::ALL {
            self.source.unsubscribe(ch);
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sample_loop(
    source: Arc<dyn SampleSource>,
    buffer: Arc<TransmitBuffer>,
    running: Arc<AtomicBool>,
    interval: Duration,
) {
    debug!("sampler: loop running");
    let mut rows = 0u64;

    while running.load(Ordering::Relaxed) {
        let cycle_start = Instant::now();

        let row = SampleRow::from_readings(
            source.latest(Channel::Accelerometer),
            source.latest(Channel::Gyroscope),
            source.latest(Channel::Magnetometer),
            source.latest(Channel::Orientation),
        );
        buffer.append_line(&row.to_line());
        rows += 1;

        // Best-effort timing: sleep whatever remains of the tick
        let elapsed = cycle_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        } else if elapsed > interval + Duration::from_millis(2) {
            warn!(
                "sampler: tick overrun: {:?} (target {:?})",
                elapsed, interval
            );
        }
    }

    debug!("sampler: loop exiting ({} rows appended)", rows);
}
