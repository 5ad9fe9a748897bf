//! Append-only transmit log shared between the sampler and the uplink
//!
//! One instance lives per session. The sampler is the only writer and only
//! ever appends; the uplink is the only reader and only ever copies a suffix
//! it has not delivered yet. Bytes below any length a reader has observed
//! are immutable for the rest of the session, which is what lets the uplink
//! resume from its cursor after a reconnect without coordination.

use parking_lot::Mutex;

/// Mutex-guarded growable session log
pub struct TransmitBuffer {
    data: Mutex<Vec<u8>>,
}

/// Preallocation: ~160 bytes/row at 200 Hz for one minute
const INITIAL_CAPACITY: usize = 160 * 200 * 60;

impl TransmitBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Vec::with_capacity(INITIAL_CAPACITY)),
        }
    }

    /// Create a buffer seeded with a header line (the subject identifier)
    pub fn with_header(line: &str) -> Self {
        let buffer = Self::new();
        buffer.append_line(line);
        buffer
    }

    /// Append one line, terminating it with `\n`
    pub fn append_line(&self, line: &str) {
        let mut data = self.data.lock();
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
    }

    /// Number of bytes committed so far; monotonic within a session
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    /// Copy the bytes committed since `cursor`, returning them together with
    /// the new committed length.
    ///
    /// A cursor beyond the current length (impossible for a well-behaved
    /// reader) is clamped and yields an empty chunk.
    pub fn read_from(&self, cursor: usize) -> (Vec<u8>, usize) {
        let data = self.data.lock();
        let len = data.len();
        let start = cursor.min(len);
        (data[start..].to_vec(), len)
    }
}

impl Default for TransmitBuffer {
    fn default() -> Self {
        Self::new()
    }
}
