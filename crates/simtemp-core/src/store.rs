//! Bounded telemetry store with overwrite-oldest semantics.
//!
//! The store is a circular buffer of [`Sample`]s guarded by a single
//! `parking_lot::Mutex`, paired with a `Condvar` that signals "buffer
//! non-empty" to blocked readers.
//!
//! # Cursor Rules
//!
//! - `write == read` means empty.
//! - `(write + 1) % slots == read` means full. The ring allocates
//!   `capacity + 1` slots so that a full store holds exactly `capacity` samples.
//! - Pushing into a full store advances `read` as well, silently discarding the
//!   oldest unread sample.
//!
//! # Thread Safety
//!
//! - Every operation holds the lock only long enough to move cursors, bump
//!   counters or copy one record.
//! - Blocking waits release the lock while parked (`Condvar::wait`).
//! - Statistics live inside the same locked state as the cursors, so `updates`
//!   is never observed without its sample having been stored.
//! - Interrupt requests are checked under the lock before every park, and
//!   [`TelemetryStore::wake_waiters`] takes the lock to notify, so a request
//!   raised between the check and the park is never lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{SimtempError, SimtempResult};
use crate::sample::Sample;
use crate::stats::Statistics;

/// Default number of samples retained.
pub const DEFAULT_CAPACITY: usize = 64;

struct StoreState {
    slots: Box<[Sample]>,
    write: usize,
    read: usize,
    stats: Statistics,
    closed: bool,
}

impl StoreState {
    fn is_empty(&self) -> bool {
        self.write == self.read
    }

    fn is_full(&self) -> bool {
        (self.write + 1) % self.slots.len() == self.read
    }

    fn len(&self) -> usize {
        (self.write + self.slots.len() - self.read) % self.slots.len()
    }

    fn head(&self) -> Option<Sample> {
        if self.is_empty() {
            None
        } else {
            Some(self.slots[self.read])
        }
    }

    fn pop(&mut self) -> Option<Sample> {
        let sample = self.head()?;
        self.read = (self.read + 1) % self.slots.len();
        Some(sample)
    }
}

/// Pending interrupt requests for one reader handle and its clones.
///
/// Level-triggered: a request raised while nobody waits is kept until the
/// next blocking wait observes it. Every wait already parked when the request
/// is raised fails as well.
#[derive(Debug, Default)]
pub struct InterruptLatch {
    requested: AtomicU64,
    observed: AtomicU64,
}

impl InterruptLatch {
    /// Latch with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request. Pair with [`TelemetryStore::wake_waiters`].
    pub fn raise(&self) {
        self.requested.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether a request is waiting to be observed.
    pub fn is_pending(&self) -> bool {
        self.observed.load(Ordering::SeqCst) < self.requested.load(Ordering::SeqCst)
    }

    fn generation(&self) -> u64 {
        self.requested.load(Ordering::SeqCst)
    }

    /// Consume the pending request, if any. `since` is the generation the
    /// caller saw when its wait began.
    fn take(&self, since: u64) -> bool {
        let requested = self.requested.load(Ordering::SeqCst);
        let previous = self.observed.fetch_max(requested, Ordering::SeqCst);
        previous < requested || requested != since
    }
}

/// Fixed-capacity FIFO of samples shared by one producer and many consumers.
pub struct TelemetryStore {
    state: Mutex<StoreState>,
    non_empty: Condvar,
    capacity: usize,
}

impl TelemetryStore {
    /// Allocate a store retaining up to `capacity` samples.
    ///
    /// Fails with `InvalidArgument` if `capacity` is zero.
    pub fn new(capacity: usize) -> SimtempResult<Self> {
        if capacity == 0 {
            return Err(SimtempError::invalid("store capacity must be at least 1"));
        }
        let blank = Sample::new(0, 0, Default::default());
        Ok(Self {
            state: Mutex::new(StoreState {
                slots: vec![blank; capacity + 1].into_boxed_slice(),
                write: 0,
                read: 0,
                stats: Statistics::default(),
                closed: false,
            }),
            non_empty: Condvar::new(),
            capacity,
        })
    }

    /// Maximum number of unread samples retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of unread samples.
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    /// Whether no unread sample is available.
    pub fn is_empty(&self) -> bool {
        self.state.lock().is_empty()
    }

    /// Append a sample, evicting the oldest unread one if the store is full.
    ///
    /// Updates `updates`/`alerts` in the same critical section and wakes every
    /// waiter. Returns `true` if a sample was evicted.
    pub fn push(&self, sample: Sample) -> bool {
        let evicted = {
            let mut state = self.state.lock();
            let evicted = state.is_full();
            let write = state.write;
            state.slots[write] = sample;
            state.write = (write + 1) % state.slots.len();
            if evicted {
                state.read = (state.read + 1) % state.slots.len();
            }
            state.stats.updates += 1;
            if sample.is_alert() {
                state.stats.alerts += 1;
            }
            evicted
        };
        self.non_empty.notify_all();
        evicted
    }

    /// Remove and return the oldest unread sample, if any. Never blocks.
    pub fn pop_if_available(&self) -> Option<Sample> {
        self.state.lock().pop()
    }

    /// Oldest unread sample without consuming it.
    pub fn peek(&self) -> Option<Sample> {
        self.state.lock().head()
    }

    /// Copy of all unread samples, oldest first, without consuming them.
    pub fn unread(&self) -> Vec<Sample> {
        let state = self.state.lock();
        let slots = state.slots.len();
        (0..state.len())
            .map(|i| state.slots[(state.read + i) % slots])
            .collect()
    }

    /// Remove the oldest unread sample, waiting until one is produced.
    ///
    /// Fails with `Interrupted` if `latch` holds a pending request when the
    /// call starts, if a request is raised while waiting, or if the store is
    /// closed and empty. A pending request is consumed even when a sample is
    /// available.
    pub fn pop_blocking(&self, latch: &InterruptLatch) -> SimtempResult<Sample> {
        let mut state = self.state.lock();
        let since = latch.generation();
        loop {
            if latch.take(since) {
                return Err(SimtempError::Interrupted);
            }
            // Another reader may have taken the sample we were woken for.
            if let Some(sample) = state.pop() {
                return Ok(sample);
            }
            Self::check_open(&state)?;
            self.non_empty.wait(&mut state);
        }
    }

    /// Wait until a sample is available and return it without consuming it.
    ///
    /// Returns `Ok(None)` when `timeout` elapses first. Interrupt handling is
    /// the same as for [`pop_blocking`](Self::pop_blocking).
    pub fn wait_non_empty(
        &self,
        timeout: Duration,
        latch: &InterruptLatch,
    ) -> SimtempResult<Option<Sample>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let since = latch.generation();
        loop {
            if latch.take(since) {
                return Err(SimtempError::Interrupted);
            }
            if let Some(sample) = state.head() {
                return Ok(Some(sample));
            }
            Self::check_open(&state)?;
            if self.non_empty.wait_until(&mut state, deadline).timed_out() {
                return Ok(state.head());
            }
        }
    }

    /// Put a sample back at the head of the queue after a failed hand-off.
    ///
    /// Returns `false` if the store filled up in the meantime; the sample is
    /// then treated as the oldest entry and dropped, as an overwrite would.
    pub fn restore_front(&self, sample: Sample) -> bool {
        let restored = {
            let mut state = self.state.lock();
            if state.is_full() {
                false
            } else {
                let slots = state.slots.len();
                state.read = (state.read + slots - 1) % slots;
                let read = state.read;
                state.slots[read] = sample;
                true
            }
        };
        if restored {
            self.non_empty.notify_all();
        }
        restored
    }

    /// Record an engine failure code in `last_error`.
    pub fn record_error(&self, code: u32) {
        self.state.lock().stats.last_error = code;
    }

    /// Consistent snapshot of the statistics.
    pub fn stats(&self) -> Statistics {
        self.state.lock().stats
    }

    /// Wake every parked waiter so it re-checks its [`InterruptLatch`].
    pub fn wake_waiters(&self) {
        let _state = self.state.lock();
        self.non_empty.notify_all();
    }

    /// Mark the store as closed: blocked and future waits on an empty store
    /// fail with `Interrupted`. Unread samples can still be drained.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.non_empty.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn check_open(state: &MutexGuard<'_, StoreState>) -> SimtempResult<()> {
        if state.closed {
            Err(SimtempError::Interrupted)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for TelemetryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TelemetryStore")
            .field("capacity", &self.capacity)
            .field("write", &state.write)
            .field("read", &state.read)
            .field("stats", &state.stats)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleFlags;
    use std::sync::Arc;
    use std::thread;

    fn sample(i: i32) -> Sample {
        Sample::new(i as u64, i, SampleFlags::VALID)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            TelemetryStore::new(0),
            Err(SimtempError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_push_pop_fifo() {
        let store = TelemetryStore::new(4).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.pop_if_available(), None);

        for i in 0..3 {
            assert!(!store.push(sample(i)));
        }
        assert_eq!(store.len(), 3);
        for i in 0..3 {
            assert_eq!(store.pop_if_available(), Some(sample(i)));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_full_store_holds_capacity_samples() {
        let store = TelemetryStore::new(4).unwrap();
        for i in 0..4 {
            assert!(!store.push(sample(i)), "push {} should not evict", i);
        }
        assert_eq!(store.len(), 4);
        assert!(store.push(sample(4)));
        assert_eq!(store.unread(), (1..5).map(sample).collect::<Vec<_>>());
    }

    #[test]
    fn test_capacity_one() {
        let store = TelemetryStore::new(1).unwrap();
        store.push(sample(1));
        store.push(sample(2));
        assert_eq!(store.len(), 1);
        assert_eq!(store.pop_if_available(), Some(sample(2)));
        assert_eq!(store.pop_if_available(), None);
    }

    #[test]
    fn test_stats_follow_pushes() {
        let store = TelemetryStore::new(2).unwrap();
        store.push(sample(1));
        store.push(Sample::new(2, 50_000, SampleFlags::for_value(50_000, 45_000)));
        store.push(sample(3));
        let stats = store.stats();
        assert_eq!(stats.updates, 3);
        assert_eq!(stats.alerts, 1);
        assert_eq!(stats.last_error, 0);

        store.record_error(14);
        assert_eq!(store.stats().last_error, 14);
    }

    #[test]
    fn test_restore_front_preserves_order() {
        let store = TelemetryStore::new(4).unwrap();
        store.push(sample(1));
        store.push(sample(2));
        let first = store.pop_if_available().unwrap();
        assert!(store.restore_front(first));
        assert_eq!(store.unread(), vec![sample(1), sample(2)]);
    }

    #[test]
    fn test_restore_front_on_full_store_drops() {
        let store = TelemetryStore::new(2).unwrap();
        store.push(sample(1));
        store.push(sample(2));
        let first = store.pop_if_available().unwrap();
        store.push(sample(3));
        assert!(!store.restore_front(first));
        assert_eq!(store.unread(), vec![sample(2), sample(3)]);
    }

    #[test]
    fn test_blocking_pop_wakes_on_push() {
        let store = Arc::new(TelemetryStore::new(4).unwrap());
        let reader = {
            let store = store.clone();
            thread::spawn(move || store.pop_blocking(&InterruptLatch::new()))
        };
        thread::sleep(Duration::from_millis(20));
        store.push(sample(7));
        assert_eq!(reader.join().unwrap().unwrap(), sample(7));
    }

    #[test]
    fn test_interrupt_wakes_blocked_reader() {
        let store = Arc::new(TelemetryStore::new(4).unwrap());
        let latch = Arc::new(InterruptLatch::new());
        let reader = {
            let store = store.clone();
            let latch = latch.clone();
            thread::spawn(move || store.pop_blocking(&latch))
        };
        thread::sleep(Duration::from_millis(20));
        latch.raise();
        store.wake_waiters();
        assert!(matches!(
            reader.join().unwrap(),
            Err(SimtempError::Interrupted)
        ));
        assert!(!latch.is_pending());

        // The request was consumed, so the next wait proceeds normally
        store.push(sample(1));
        assert_eq!(store.pop_blocking(&latch).unwrap(), sample(1));
    }

    #[test]
    fn test_interrupt_before_wait_is_kept() {
        let store = TelemetryStore::new(4).unwrap();
        let latch = InterruptLatch::new();
        latch.raise();
        store.wake_waiters();
        assert!(latch.is_pending());

        assert!(matches!(
            store.pop_blocking(&latch),
            Err(SimtempError::Interrupted)
        ));
        assert!(!latch.is_pending());

        latch.raise();
        assert!(matches!(
            store.wait_non_empty(Duration::from_secs(5), &latch),
            Err(SimtempError::Interrupted)
        ));
        assert!(!latch.is_pending());
    }

    #[test]
    fn test_interrupt_is_per_latch() {
        let store = Arc::new(TelemetryStore::new(4).unwrap());
        let other = Arc::new(InterruptLatch::new());
        let reader = {
            let store = store.clone();
            let other = other.clone();
            thread::spawn(move || store.pop_blocking(&other))
        };
        thread::sleep(Duration::from_millis(20));

        let latch = InterruptLatch::new();
        latch.raise();
        store.wake_waiters();
        thread::sleep(Duration::from_millis(20));
        assert!(!reader.is_finished());

        store.push(sample(3));
        assert_eq!(reader.join().unwrap().unwrap(), sample(3));
        assert!(latch.is_pending());
    }

    #[test]
    fn test_closed_store_drains_then_interrupts() {
        let store = TelemetryStore::new(4).unwrap();
        let latch = InterruptLatch::new();
        store.push(sample(1));
        store.close();
        assert!(store.is_closed());
        assert_eq!(store.pop_blocking(&latch).unwrap(), sample(1));
        assert!(matches!(
            store.pop_blocking(&latch),
            Err(SimtempError::Interrupted)
        ));
    }

    #[test]
    fn test_wait_non_empty_timeout() {
        let store = TelemetryStore::new(4).unwrap();
        let latch = InterruptLatch::new();
        let started = Instant::now();
        assert_eq!(
            store.wait_non_empty(Duration::from_millis(30), &latch).unwrap(),
            None
        );
        assert!(started.elapsed() >= Duration::from_millis(30));

        store.push(sample(5));
        assert_eq!(
            store.wait_non_empty(Duration::from_millis(30), &latch).unwrap(),
            Some(sample(5))
        );
        // Readiness does not consume
        assert_eq!(store.len(), 1);
    }
}
