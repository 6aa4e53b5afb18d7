//! Consumer side of the telemetry store.
//!
//! A [`ConsumerPort`] is a cheap, cloneable reader handle. Any number of ports
//! may read concurrently; every sample is handed to exactly one successful
//! read. Ports support three styles of access:
//!
//! - typed: [`ConsumerPort::read`] returns a [`Sample`]
//! - binary: [`ConsumerPort::read_record`] and the `std::io::Read` impl write
//!   one 16-byte record per call
//! - multiplexed: [`ConsumerPort::poll_readiness`] and
//!   [`ConsumerPort::wait_readiness`] report readable/priority bits without
//!   consuming anything
//!
//! # Interrupts
//!
//! [`ConsumerPort::interrupt`] is level-triggered and scoped to the port and
//! its clones. Every blocking wait already parked on the port fails with
//! `Interrupted`; if none is parked, the request stays pending and the next
//! blocking read or readiness wait fails instead. Ports obtained separately
//! from the engine are not affected.

use std::fmt;
use std::io::{self, Write};
use std::ops::BitOr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{SimtempError, SimtempResult, EFAULT};
use crate::sample::{Sample, RECORD_SIZE};
use crate::store::{InterruptLatch, TelemetryStore};

/// Readiness bits, numerically compatible with `POLLIN` / `POLLPRI`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness(u8);

impl Readiness {
    /// Nothing to read.
    pub const NONE: Readiness = Readiness(0);
    /// At least one unread sample.
    pub const READABLE: Readiness = Readiness(0x1);
    /// The oldest unread sample carries the alert bit.
    pub const PRIORITY: Readiness = Readiness(0x2);

    fn of_head(head: Option<Sample>) -> Self {
        match head {
            Some(sample) if sample.is_alert() => Self::READABLE | Self::PRIORITY,
            Some(_) => Self::READABLE,
            None => Self::NONE,
        }
    }

    /// Whether a read would succeed without waiting.
    pub fn is_readable(self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    /// Whether the next sample is an alert.
    pub fn is_priority(self) -> bool {
        self.0 & Self::PRIORITY.0 != 0
    }

    /// Raw bits.
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Readiness {
    type Output = Readiness;

    fn bitor(self, rhs: Self) -> Self::Output {
        Readiness(self.0 | rhs.0)
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_priority()) {
            (true, true) => f.write_str("readable|priority"),
            (true, false) => f.write_str("readable"),
            (false, true) => f.write_str("priority"),
            (false, false) => f.write_str("none"),
        }
    }
}

/// Reader handle onto a [`TelemetryStore`].
///
/// Clones share the handle's interrupt state; the blocking mode is per clone.
#[derive(Clone)]
pub struct ConsumerPort {
    store: Arc<TelemetryStore>,
    interrupts: Arc<InterruptLatch>,
    nonblocking: bool,
}

impl ConsumerPort {
    /// Blocking reader on `store`.
    pub fn new(store: Arc<TelemetryStore>) -> Self {
        Self {
            store,
            interrupts: Arc::new(InterruptLatch::new()),
            nonblocking: false,
        }
    }

    /// Switch the default read mode used by [`read_next`](Self::read_next),
    /// [`read_record`](Self::read_record), [`read_to`](Self::read_to) and
    /// `io::Read`.
    pub fn set_nonblocking(&mut self, nonblocking: bool) {
        self.nonblocking = nonblocking;
    }

    /// Builder form of [`set_nonblocking`](Self::set_nonblocking).
    pub fn nonblocking(mut self) -> Self {
        self.nonblocking = true;
        self
    }

    /// Whether reads fail with `WouldBlock` instead of waiting.
    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    /// Take the oldest unread sample.
    ///
    /// - sample available: returned immediately
    /// - empty and `blocking == false`: `WouldBlock`
    /// - empty and `blocking == true`: waits for the producer; fails with
    ///   `Interrupted` if [`interrupt`](Self::interrupt) is called or the
    ///   engine shuts down first
    ///
    /// A blocking read fails with `Interrupted` right away while an interrupt
    /// is pending, even if samples are available. Non-blocking reads ignore
    /// pending interrupts.
    pub fn read(&self, blocking: bool) -> SimtempResult<Sample> {
        if blocking {
            self.store.pop_blocking(&self.interrupts)
        } else {
            self.store.pop_if_available().ok_or(SimtempError::WouldBlock)
        }
    }

    /// [`read`](Self::read) using the port's own blocking mode.
    pub fn read_next(&self) -> SimtempResult<Sample> {
        self.read(!self.nonblocking)
    }

    /// Read one encoded record into `buf`.
    ///
    /// Fails with `InvalidArgument` if `buf` is shorter than
    /// [`RECORD_SIZE`]; the store is not touched in that case. On success
    /// exactly [`RECORD_SIZE`] bytes are written.
    pub fn read_record(&self, buf: &mut [u8]) -> SimtempResult<usize> {
        if buf.len() < RECORD_SIZE {
            return Err(SimtempError::invalid(format!(
                "read buffer of {} bytes is smaller than one {}-byte record",
                buf.len(),
                RECORD_SIZE
            )));
        }
        let sample = self.read_next()?;
        buf[..RECORD_SIZE].copy_from_slice(&sample.encode());
        Ok(RECORD_SIZE)
    }

    /// Read one record and write it to `dest`.
    ///
    /// If `dest` fails, the sample is put back at the head of the queue, the
    /// failure is recorded in `last_error`, and `Fault` is returned.
    pub fn read_to<W: Write + ?Sized>(&self, dest: &mut W) -> SimtempResult<usize> {
        let sample = self.read_next()?;
        match dest.write_all(&sample.encode()) {
            Ok(()) => Ok(RECORD_SIZE),
            Err(e) => {
                let restored = self.store.restore_front(sample);
                self.store.record_error(EFAULT);
                tracing::warn!(error = %e, restored, "failed to copy record to destination");
                Err(SimtempError::Fault(e))
            }
        }
    }

    /// Current readiness, without waiting or consuming.
    pub fn poll_readiness(&self) -> Readiness {
        Readiness::of_head(self.store.peek())
    }

    /// Wait up to `timeout` for the store to become readable.
    ///
    /// Returns [`Readiness::NONE`] on timeout, and `Interrupted` if the wait is
    /// interrupted or the engine shuts down with nothing left to read.
    pub fn wait_readiness(&self, timeout: Duration) -> SimtempResult<Readiness> {
        Ok(Readiness::of_head(
            self.store.wait_non_empty(timeout, &self.interrupts)?,
        ))
    }

    /// Fail the blocking waits of this port and its clones with `Interrupted`.
    ///
    /// Safe to call from a signal handler thread.
    pub fn interrupt(&self) {
        self.interrupts.raise();
        self.store.wake_waiters();
    }

    /// Whether an interrupt is waiting to be observed by a blocking call.
    pub fn interrupt_pending(&self) -> bool {
        self.interrupts.is_pending()
    }

    /// Number of unread samples.
    pub fn pending(&self) -> usize {
        self.store.len()
    }
}

impl fmt::Debug for ConsumerPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerPort")
            .field("nonblocking", &self.nonblocking)
            .field("pending", &self.pending())
            .field("interrupt_pending", &self.interrupt_pending())
            .finish()
    }
}

impl io::Read for ConsumerPort {
    /// One record per call.
    ///
    /// Returns `Ok(0)` once the engine has shut down and every remaining
    /// sample has been read, and also when the read is interrupted. std
    /// helpers retry `ErrorKind::Interrupted`, so reporting it here would
    /// turn an interrupt into another wait.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read_record(buf) {
            Ok(n) => Ok(n),
            Err(SimtempError::Interrupted) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleFlags;
    use std::io::Read;
    use std::thread;
    use tracing_test::traced_test;

    fn port_with(values: &[i32]) -> (ConsumerPort, Arc<TelemetryStore>) {
        let store = Arc::new(TelemetryStore::new(8).unwrap());
        for (i, v) in values.iter().enumerate() {
            store.push(Sample::new(i as u64, *v, SampleFlags::for_value(*v, 45_000)));
        }
        (ConsumerPort::new(store.clone()), store)
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "unwritable"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_nonblocking_read_on_empty() {
        let (port, _) = port_with(&[]);
        assert!(matches!(port.read(false), Err(SimtempError::WouldBlock)));
        let port = port.nonblocking();
        assert!(matches!(port.read_next(), Err(SimtempError::WouldBlock)));
    }

    #[test]
    fn test_read_returns_oldest() {
        let (port, _) = port_with(&[40_000, 41_000]);
        assert_eq!(port.read(false).unwrap().value_mc, 40_000);
        assert_eq!(port.read(true).unwrap().value_mc, 41_000);
    }

    #[test]
    fn test_short_buffer_rejected_without_consuming() {
        let (port, store) = port_with(&[40_000]);
        let mut small = [0u8; RECORD_SIZE - 1];
        assert!(matches!(
            port.read_record(&mut small),
            Err(SimtempError::InvalidArgument(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_read_record_one_per_call() {
        let (port, _) = port_with(&[40_000, 41_000]);
        let mut buf = [0u8; RECORD_SIZE * 2];
        assert_eq!(port.read_record(&mut buf).unwrap(), RECORD_SIZE);
        assert_eq!(Sample::decode(&buf).unwrap().value_mc, 40_000);
        assert_eq!(port.pending(), 1);
    }

    #[test]
    #[traced_test]
    fn test_fault_keeps_sample() {
        let (port, store) = port_with(&[40_000, 41_000]);
        let err = port.read_to(&mut BrokenWriter).unwrap_err();
        assert!(matches!(err, SimtempError::Fault(_)));
        assert_eq!(store.stats().last_error, EFAULT);
        assert!(logs_contain("failed to copy record to destination"));

        let mut out = Vec::new();
        port.read_to(&mut out).unwrap();
        assert_eq!(Sample::decode(&out).unwrap().value_mc, 40_000);
    }

    #[test]
    fn test_readiness_bits() {
        let (port, store) = port_with(&[]);
        assert_eq!(port.poll_readiness(), Readiness::NONE);

        store.push(Sample::new(0, 50_000, SampleFlags::for_value(50_000, 45_000)));
        store.push(Sample::new(1, 40_000, SampleFlags::for_value(40_000, 45_000)));
        let ready = port.poll_readiness();
        assert!(ready.is_readable());
        assert!(ready.is_priority());
        assert_eq!(ready.bits(), 0x3);

        port.read(false).unwrap();
        let ready = port.poll_readiness();
        assert!(ready.is_readable());
        assert!(!ready.is_priority());
        assert_eq!(ready.to_string(), "readable");
    }

    #[test]
    fn test_wait_readiness_wakes_on_push() {
        let (port, store) = port_with(&[]);
        let waiter = {
            let port = port.clone();
            thread::spawn(move || port.wait_readiness(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        store.push(Sample::new(0, 40_000, SampleFlags::VALID));
        assert_eq!(waiter.join().unwrap().unwrap(), Readiness::READABLE);
        assert_eq!(port.pending(), 1);
    }

    #[test]
    fn test_wait_readiness_timeout() {
        let (port, _) = port_with(&[]);
        assert_eq!(
            port.wait_readiness(Duration::from_millis(10)).unwrap(),
            Readiness::NONE
        );
    }

    #[test]
    fn test_interrupt_blocked_read() {
        let (port, _) = port_with(&[]);
        let reader = {
            let port = port.clone();
            thread::spawn(move || port.read(true))
        };
        thread::sleep(Duration::from_millis(20));
        port.interrupt();
        assert!(matches!(
            reader.join().unwrap(),
            Err(SimtempError::Interrupted)
        ));
    }

    #[test]
    fn test_interrupt_before_read_is_not_lost() {
        let (port, _) = port_with(&[]);
        port.interrupt();
        assert!(port.interrupt_pending());

        let reader = {
            let port = port.clone();
            thread::spawn(move || port.read(true))
        };
        assert!(matches!(
            reader.join().unwrap(),
            Err(SimtempError::Interrupted)
        ));
        assert!(!port.interrupt_pending());
    }

    #[test]
    fn test_pending_interrupt_beats_available_sample() {
        let (port, store) = port_with(&[40_000]);
        port.interrupt();
        // Non-blocking reads leave the request pending
        assert_eq!(port.read(false).unwrap().value_mc, 40_000);
        store.push(Sample::new(9, 41_000, SampleFlags::VALID));
        assert!(matches!(port.read(true), Err(SimtempError::Interrupted)));
        assert_eq!(port.read(true).unwrap().value_mc, 41_000);
    }

    #[test]
    fn test_interrupt_does_not_reach_other_ports() {
        let (port, store) = port_with(&[]);
        let other = ConsumerPort::new(store.clone());
        port.interrupt();

        store.push(Sample::new(0, 40_000, SampleFlags::VALID));
        assert_eq!(other.read(true).unwrap().value_mc, 40_000);
        assert!(port.interrupt_pending());
        assert!(matches!(
            port.wait_readiness(Duration::from_secs(5)),
            Err(SimtempError::Interrupted)
        ));
    }

    #[test]
    fn test_read_exact_returns_after_interrupt() {
        let (port, _) = port_with(&[]);
        let reader = {
            let mut port = port.clone();
            thread::spawn(move || {
                let mut record = [0u8; RECORD_SIZE];
                port.read_exact(&mut record)
            })
        };
        thread::sleep(Duration::from_millis(50));
        port.interrupt();
        let err = reader.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_read_to_end_stops_at_interrupt() {
        let (port, _) = port_with(&[40_000, 41_000]);
        port.interrupt();
        let mut port = port;
        let mut bytes = Vec::with_capacity(4 * RECORD_SIZE);
        // The pending request ends the stream before any record is read
        assert_eq!(port.read_to_end(&mut bytes).unwrap(), 0);

        let mut bytes = Vec::with_capacity(4 * RECORD_SIZE);
        let reader = {
            let mut port = port.clone();
            thread::spawn(move || port.read_to_end(&mut bytes).map(|_| bytes))
        };
        thread::sleep(Duration::from_millis(50));
        port.interrupt();
        let bytes = reader.join().unwrap().unwrap();
        assert_eq!(bytes.len(), 2 * RECORD_SIZE);
        assert_eq!(Sample::decode(&bytes).unwrap().value_mc, 40_000);
    }

    #[test]
    fn test_io_read_impl() {
        let (mut port, store) = port_with(&[40_000]);
        port.set_nonblocking(true);

        let mut buf = [0u8; RECORD_SIZE];
        assert_eq!(Read::read(&mut port, &mut buf).unwrap(), RECORD_SIZE);
        let err = Read::read(&mut port, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        let mut tiny = [0u8; 4];
        let err = Read::read(&mut port, &mut tiny).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        port.set_nonblocking(false);
        store.close();
        assert_eq!(Read::read(&mut port, &mut buf).unwrap(), 0);
    }
}
