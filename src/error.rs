//! Error types for magscout

use crate::types::Channel;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// magscout error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// One or more required sensor channels are not present on this device
    #[error("Sensor channels unavailable: {missing:?}")]
    SensorUnavailable {
        /// Channels the source reported as unavailable
        missing: Vec<Channel>,
    },

    /// Hardware subscription was rejected for one or more channels
    #[error("Sensor subscription failed: {failed:?}")]
    SubscribeFailed {
        /// Channels whose subscription was refused
        failed: Vec<Channel>,
    },

    /// Redundant start of an uplink that is already running
    #[error("Uplink already streaming")]
    AlreadyStreaming,

    /// Redundant start of a sampler that is already running
    #[error("Sampler already running")]
    AlreadySampling,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Collector did not greet within the handshake timeout
    #[error("Handshake timeout")]
    HandshakeTimeout,

    /// Collector greeted with the wrong token
    #[error("Handshake mismatch: expected {expected:?}, received {received:?}")]
    HandshakeMismatch {
        /// Token this agent requires
        expected: &'static str,
        /// Line the collector actually sent
        received: String,
    },

    /// Peer closed the connection
    #[error("Connection closed by collector")]
    Disconnected,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
