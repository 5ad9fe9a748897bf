//! Configuration for the magscout agent
//!
//! Loads configuration from a TOML file. Only the collector endpoint and the
//! subject identifier are required; every timing parameter defaults to the
//! values the collector deployment has been run with in the field.

use crate::error::{Error, Result};
use crate::transport::UplinkConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Collector endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Collector host name or IP address
    pub host: String,
    /// Collector TCP port
    pub port: u16,
}

impl ServerConfig {
    /// `host:port` endpoint string
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Session attribution
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Subject identifier sent as the first line of every session stream
    pub subject_id: String,
}

/// Sampling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SamplingConfig {
    /// Sampling frequency in Hz (default 200)
    pub frequency_hz: u32,
}

impl SamplingConfig {
    /// Tick period derived from the sampling frequency
    pub fn interval(&self) -> Duration {
        // Validation rejects frequency_hz == 0 before this is used.
        Duration::from_millis((1000 / self.frequency_hz.max(1)).max(1) as u64)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { frequency_hz: 200 }
    }
}

/// Uplink timing configuration, all in milliseconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Delay between incremental sends while streaming
    pub send_interval_ms: u64,
    /// Delay before the very first connection attempt of a session
    pub initial_delay_ms: u64,
    /// Bound on a single connect attempt
    pub connect_timeout_ms: u64,
    /// Bound on waiting for the collector's greeting line
    pub handshake_timeout_ms: u64,
    /// Fixed wait between failed attempts
    pub reconnect_backoff_ms: u64,
    /// Grace wait before the final flush on shutdown
    pub drain_grace_ms: u64,
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Worker-side timing bundle for `Uplink`
    pub fn uplink(&self) -> UplinkConfig {
        UplinkConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            send_interval: Duration::from_millis(self.send_interval_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            reconnect_backoff: Duration::from_millis(self.reconnect_backoff_ms),
            drain_grace: Duration::from_millis(self.drain_grace_ms),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: 500,
            initial_delay_ms: 1000,
            connect_timeout_ms: 2000,
            handshake_timeout_ms: 2000,
            reconnect_backoff_ms: 2500,
            drain_grace_ms: 500,
        }
    }
}

/// Sample source selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Source kind: `simulated` is the only kind this build constructs;
    /// embedders feed a `SourceHub` from their platform callbacks instead.
    pub kind: String,
    /// Simulator noise seed; 0 picks a random seed
    pub seed: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: "simulated".to_string(),
            seed: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AgentConfig =
            toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Default configuration pointing at a localhost collector
    ///
    /// Suitable for testing against a local collector instance. Field
    /// deployments should use a proper TOML configuration file.
    pub fn local_defaults() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 2212,
            },
            session: SessionConfig {
                subject_id: "123456789".to_string(),
            },
            sampling: SamplingConfig::default(),
            transport: TransportConfig::default(),
            source: SourceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Check the values a session cannot start without
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::Config("server.host is empty".to_string()));
        }
        if self.server.port == 0 {
            return Err(Error::Config("server.port is 0".to_string()));
        }
        if self.session.subject_id.trim().is_empty() {
            return Err(Error::Config("session.subject_id is empty".to_string()));
        }
        if self.session.subject_id.contains(['\n', '\r']) {
            // The identifier is written verbatim as the stream's first line.
            return Err(Error::Config(
                "session.subject_id must be a single line".to_string(),
            ));
        }
        if self.sampling.frequency_hz == 0 {
            return Err(Error::Config("sampling.frequency_hz is 0".to_string()));
        }
        if self.transport.send_interval_ms == 0 {
            return Err(Error::Config("transport.send_interval_ms is 0".to_string()));
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::local_defaults()
    }
}
