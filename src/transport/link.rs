//! Connection seam for the uplink
//!
//! The state machine in [`super`] talks to the network through the [`Dialer`]
//! and [`Link`] traits so its retry and delivery logic can be exercised with
//! scripted failures. [`TcpDialer`]/[`TcpLink`] are the production
//! implementations over `std::net::TcpStream`.

use crate::error::{Error, Result};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Byte sent as TCP urgent data to probe connection liveness
pub(crate) const PROBE_BYTE: u8 = 0xFF;

/// One established connection attempt
pub trait Link: Send {
    /// Read the collector's greeting line, bounded by `timeout`.
    ///
    /// Returns the line without its terminator. Maps a read timeout to
    /// [`Error::HandshakeTimeout`] and a clean EOF to [`Error::Disconnected`].
    fn read_handshake_line(&mut self, timeout: Duration) -> Result<String>;

    /// Write the whole chunk or fail
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Flush pending writes
    fn flush(&mut self) -> Result<()>;

    /// Out-of-band liveness probe; fails fast on a half-open connection
    fn probe(&mut self) -> Result<()>;
}

/// Per-attempt connection factory
pub trait Dialer: Send + Sync {
    /// Open a fresh connection, bounded by the dialer's connect timeout
    fn dial(&self) -> Result<Box<dyn Link>>;
}

/// Dialer for the real collector endpoint
pub struct TcpDialer {
    endpoint: String,
    connect_timeout: Duration,
}

impl TcpDialer {
    pub fn new(endpoint: String, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
        }
    }
}

impl Dialer for TcpDialer {
    fn dial(&self) -> Result<Box<dyn Link>> {
        let addr = self
            .endpoint
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Config(format!("cannot resolve {:?}", self.endpoint)))?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        Ok(Box::new(TcpLink::new(stream)?))
    }
}

/// TCP connection with a buffered read side for the greeting line
pub struct TcpLink {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl TcpLink {
    fn new(stream: TcpStream) -> Result<Self> {
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }
}

impl Link for TcpLink {
    fn read_handshake_line(&mut self, timeout: Duration) -> Result<String> {
        self.stream.set_read_timeout(Some(timeout))?;

        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => Err(Error::Disconnected),
            Ok(_) => {
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Ok(line)
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Err(Error::HandshakeTimeout)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }

    fn probe(&mut self) -> Result<()> {
        // TCP urgent data: out-of-band, so the collector's line reader never
        // sees it, but a dead peer turns it into an immediate error.
        socket2::SockRef::from(&self.stream).send_out_of_band(&[PROBE_BYTE])?;
        Ok(())
    }
}
