//! Sample record and its fixed-size wire encoding.
//!
//! A [`Sample`] is produced once per production step and never mutated
//! afterwards. Consumers receive it either as a value or as a 16-byte
//! little-endian record:
//!
//! ```text
//! offset  size  field
//! 0       8     timestamp_ns  (u64, monotonic)
//! 8       4     value_mc      (i32, millidegrees Celsius)
//! 12      4     flags         (u32, bit 0 = valid, bit 1 = alert)
//! ```

use std::time::Instant;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{SimtempError, SimtempResult};

/// Size in bytes of one encoded record.
pub const RECORD_SIZE: usize = 16;

/// Status bits carried by each sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleFlags(u32);

impl SampleFlags {
    /// Sample was produced by the engine.
    pub const VALID: SampleFlags = SampleFlags(1 << 0);
    /// Sample value exceeded the threshold in effect when it was produced.
    pub const ALERT: SampleFlags = SampleFlags(1 << 1);

    /// Flags for a freshly produced value. The alert bit is set only when
    /// `value_mc` is strictly greater than `threshold_mc`.
    pub fn for_value(value_mc: i32, threshold_mc: i32) -> Self {
        if value_mc > threshold_mc {
            SampleFlags(Self::VALID.0 | Self::ALERT.0)
        } else {
            Self::VALID
        }
    }

    /// Raw bit representation.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Rebuild flags from raw bits (unknown bits are preserved).
    pub fn from_bits(bits: u32) -> Self {
        SampleFlags(bits)
    }

    /// Whether every bit of `other` is set.
    pub fn contains(self, other: SampleFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// One immutable measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Monotonic timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// Measured value in millidegrees Celsius.
    pub value_mc: i32,
    /// Status bits.
    pub flags: SampleFlags,
}

impl Sample {
    /// Create a sample.
    pub fn new(timestamp_ns: u64, value_mc: i32, flags: SampleFlags) -> Self {
        Self {
            timestamp_ns,
            value_mc,
            flags,
        }
    }

    /// Whether the threshold-exceeded bit is set.
    pub fn is_alert(&self) -> bool {
        self.flags.contains(SampleFlags::ALERT)
    }

    /// Value converted to degrees Celsius.
    pub fn celsius(&self) -> f64 {
        f64::from(self.value_mc) / 1000.0
    }

    /// Encode into the fixed 16-byte record.
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        let mut buf = &mut out[..];
        buf.put_u64_le(self.timestamp_ns);
        buf.put_i32_le(self.value_mc);
        buf.put_u32_le(self.flags.bits());
        out
    }

    /// Decode one record from the start of `bytes`.
    ///
    /// Fails with `InvalidArgument` if fewer than [`RECORD_SIZE`] bytes are
    /// supplied.
    pub fn decode(mut bytes: &[u8]) -> SimtempResult<Self> {
        if bytes.len() < RECORD_SIZE {
            return Err(SimtempError::invalid(format!(
                "record needs {} bytes, got {}",
                RECORD_SIZE,
                bytes.len()
            )));
        }
        let timestamp_ns = bytes.get_u64_le();
        let value_mc = bytes.get_i32_le();
        let flags = SampleFlags::from_bits(bytes.get_u32_le());
        Ok(Self::new(timestamp_ns, value_mc, flags))
    }
}

/// Monotonic nanosecond clock anchored at engine start.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a clock at the current instant.
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Nanoseconds elapsed since the clock was started.
    pub fn now_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_is_strict() {
        assert!(!SampleFlags::for_value(45000, 45000).contains(SampleFlags::ALERT));
        assert!(SampleFlags::for_value(45001, 45000).contains(SampleFlags::ALERT));
        assert!(!SampleFlags::for_value(-10, 0).contains(SampleFlags::ALERT));
        assert!(SampleFlags::for_value(i32::MIN, i32::MIN).contains(SampleFlags::VALID));
    }

    #[test]
    fn test_record_layout() {
        let sample = Sample::new(0x0102_0304_0506_0708, -1500, SampleFlags::for_value(1, 0));
        let bytes = sample.encode();

        assert_eq!(&bytes[0..8], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(&bytes[8..12], &(-1500i32).to_le_bytes());
        assert_eq!(&bytes[12..16], &3u32.to_le_bytes());
        assert_eq!(Sample::decode(&bytes).unwrap(), sample);
    }

    #[test]
    fn test_decode_short_buffer() {
        let err = Sample::decode(&[0u8; RECORD_SIZE - 1]).unwrap_err();
        assert!(matches!(err, SimtempError::InvalidArgument(_)));
    }

    #[test]
    fn test_celsius() {
        let sample = Sample::new(0, 40125, SampleFlags::VALID);
        assert!((sample.celsius() - 40.125).abs() < f64::EPSILON);
        assert!(!sample.is_alert());
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = MonotonicClock::start();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }
}
