//! Sensor channel and sample row types

use std::fmt;

/// One physical measurement source sampled by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Linear acceleration (m/s²), x/y/z
    Accelerometer,
    /// Angular velocity (rad/s), x/y/z
    Gyroscope,
    /// Magnetic field (µT), x/y/z
    Magnetometer,
    /// Orientation quaternion, x/y/z/w
    Orientation,
}

impl Channel {
    /// All channels a session requires, in wire-row order
    pub const ALL: [Channel; 4] = [
        Channel::Accelerometer,
        Channel::Gyroscope,
        Channel::Magnetometer,
        Channel::Orientation,
    ];

    /// Number of components in this channel's vector
    pub fn dim(self) -> usize {
        match self {
            Channel::Orientation => 4,
            _ => 3,
        }
    }

    /// Stable index, usable for per-channel storage
    pub fn index(self) -> usize {
        match self {
            Channel::Accelerometer => 0,
            Channel::Gyroscope => 1,
            Channel::Magnetometer => 2,
            Channel::Orientation => 3,
        }
    }

    /// Human-readable channel name
    pub fn label(self) -> &'static str {
        match self {
            Channel::Accelerometer => "accelerometer",
            Channel::Gyroscope => "gyroscope",
            Channel::Magnetometer => "magnetometer",
            Channel::Orientation => "orientation",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Latest reading of a single channel.
///
/// Fixed-capacity storage so readings are plain `Copy` values; the logical
/// length is 3 for the vector channels and 4 for the quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelVector {
    len: usize,
    data: [f64; 4],
}

impl ChannelVector {
    /// Zero reading with the right dimension for `channel`
    pub fn zero(channel: Channel) -> Self {
        Self {
            len: channel.dim(),
            data: [0.0; 4],
        }
    }

    /// Three-component reading (accelerometer, gyroscope, magnetometer)
    pub fn vec3(x: f64, y: f64, z: f64) -> Self {
        Self {
            len: 3,
            data: [x, y, z, 0.0],
        }
    }

    /// Quaternion reading (orientation), x/y/z/w
    pub fn quat(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self {
            len: 4,
            data: [x, y, z, w],
        }
    }

    /// Components of this reading
    pub fn as_slice(&self) -> &[f64] {
        &self.data[..self.len]
    }
}

/// One sampled record: a timestamp plus the snapshot of all four channels.
///
/// Serialized as a single comma-separated ASCII line:
/// `epochMillis,ax,ay,az,gx,gy,gz,mx,my,mz,qx,qy,qz,qw`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRow {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Accelerometer x/y/z
    pub accel: [f64; 3],
    /// Gyroscope x/y/z
    pub gyro: [f64; 3],
    /// Magnetometer x/y/z
    pub mag: [f64; 3],
    /// Orientation quaternion x/y/z/w
    pub orientation: [f64; 4],
}

impl SampleRow {
    /// Assemble a row from per-channel readings, stamped with the current time
    pub fn from_readings(
        accel: ChannelVector,
        gyro: ChannelVector,
        mag: ChannelVector,
        orientation: ChannelVector,
    ) -> Self {
        Self {
            timestamp_ms: epoch_millis(),
            accel: take3(accel),
            gyro: take3(gyro),
            mag: take3(mag),
            orientation: take4(orientation),
        }
    }

    /// Render the row as its wire line, without the trailing newline
    pub fn to_line(&self) -> String {
        use std::fmt::Write;

        let mut line = String::with_capacity(160);
        let _ = write!(line, "{}", self.timestamp_ms);
        for v in self
            .accel
            .iter()
            .chain(self.gyro.iter())
            .chain(self.mag.iter())
            .chain(self.orientation.iter())
        {
            let _ = write!(line, ",{}", v);
        }
        line
    }
}

/// Milliseconds since the Unix epoch
pub fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn take3(v: ChannelVector) -> [f64; 3] {
    let s = v.as_slice();
    [
        s.first().copied().unwrap_or(0.0),
        s.get(1).copied().unwrap_or(0.0),
        s.get(2).copied().unwrap_or(0.0),
    ]
}

fn take4(v: ChannelVector) -> [f64; 4] {
    let s = v.as_slice();
    [
        s.first().copied().unwrap_or(0.0),
        s.get(1).copied().unwrap_or(0.0),
        s.get(2).copied().unwrap_or(0.0),
        s.get(3).copied().unwrap_or(0.0),
    ]
}
