//! magscout - field data-acquisition agent for indoor positioning surveys
//!
//! Samples the device's motion/orientation channels (accelerometer,
//! gyroscope, magnetometer, orientation quaternion) at a fixed rate into an
//! append-only session log, and streams that log incrementally to a
//! collector over TCP. The uplink survives network interruptions: it
//! reconnects with backoff, re-handshakes, and resumes from the last
//! confirmed byte, so the collector receives every recorded byte exactly
//! once.

pub mod buffer;
pub mod config;
pub mod error;
pub mod sampler;
pub mod session;
pub mod source;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::AgentConfig;
pub use error::{Error, Result};
pub use session::Session;
