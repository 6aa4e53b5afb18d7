//! Engine handle owning all sampling state.
//!
//! [`Engine::start`] allocates the store, seeds the live settings, builds a
//! small dedicated tokio runtime and arms the scheduler on it. Readers and
//! control clients obtain cheap handles ([`ConsumerPort`], [`ControlSurface`])
//! that share the same store and settings.
//!
//! [`Engine::stop`] is synchronous: it disarms the trigger, waits for any
//! in-flight production step, closes the store so blocked readers return
//! `Interrupted`, and only then tears the runtime down. Dropping a running
//! engine performs the same shutdown.
//!
//! # Example
//! ```no_run
//! use simtemp_core::{Engine, SimtempConfig};
//!
//! let engine = Engine::start(&SimtempConfig::default())?;
//! let reader = engine.consumer();
//! let sample = reader.read(true)?;
//! println!("{:.3} °C", sample.celsius());
//! let stats = engine.stop()?;
//! println!("{}", stats);
//! # Ok::<(), simtemp_core::SimtempError>(())
//! ```

use std::sync::Arc;
use std::thread;

use tokio::runtime::{Builder, Runtime};

use crate::config::{validate_period_ms, Settings, SharedSettings, SimtempConfig};
use crate::consumer::ConsumerPort;
use crate::control::ControlSurface;
use crate::error::{SimtempError, SimtempResult, EIO};
use crate::production::ProductionStep;
use crate::scheduler::{Scheduler, SchedulerState, TickCounters};
use crate::stats::Statistics;
use crate::store::TelemetryStore;
use crate::synth::SynthProfile;

const SAMPLER_WORKER_THREADS: usize = 2;

/// A running simulated sensor.
pub struct Engine {
    runtime: Option<Runtime>,
    scheduler: Option<Scheduler>,
    store: Arc<TelemetryStore>,
    settings: Arc<SharedSettings>,
    counters: Arc<TickCounters>,
}

impl Engine {
    /// Validate `config` and start sampling with it.
    pub fn start(config: &SimtempConfig) -> SimtempResult<Self> {
        config.validate()?;
        Self::start_with(
            config.engine.capacity,
            config.initial_settings(),
            config.synth,
        )
    }

    /// Start sampling with an explicit capacity, initial settings and signal
    /// profile.
    pub fn start_with(
        capacity: usize,
        initial: Settings,
        profile: SynthProfile,
    ) -> SimtempResult<Self> {
        let period_ms = u64::try_from(initial.period.as_millis()).unwrap_or(u64::MAX);
        validate_period_ms(period_ms)?;
        profile.validate()?;

        let store = Arc::new(TelemetryStore::new(capacity)?);
        let settings = Arc::new(SharedSettings::new(initial));
        let step = Arc::new(ProductionStep::new(
            store.clone(),
            settings.clone(),
            profile,
        ));

        let runtime = Builder::new_multi_thread()
            .worker_threads(SAMPLER_WORKER_THREADS)
            .thread_name("simtemp-sampler")
            .enable_time()
            .build()?;
        let scheduler = Scheduler::start(runtime.handle(), step, settings.clone());
        let counters = scheduler.counters();

        tracing::info!(
            capacity,
            period_ms,
            threshold_mc = initial.threshold_mc,
            mode = %initial.mode,
            "simtemp engine started"
        );

        Ok(Self {
            runtime: Some(runtime),
            scheduler: Some(scheduler),
            store,
            settings,
            counters,
        })
    }

    /// New reader handle in blocking mode.
    pub fn consumer(&self) -> ConsumerPort {
        ConsumerPort::new(self.store.clone())
    }

    /// New control surface handle.
    pub fn control(&self) -> ControlSurface {
        ControlSurface::new(self.settings.clone(), self.store.clone())
    }

    /// Scheduler state.
    pub fn state(&self) -> SchedulerState {
        self.scheduler
            .as_ref()
            .map_or(SchedulerState::Stopped, Scheduler::state)
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> Statistics {
        self.store.stats()
    }

    /// Number of samples retained by the store.
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Trigger firings so far.
    pub fn fired_ticks(&self) -> u64 {
        self.counters.fired()
    }

    /// Trigger firings dropped because the worker was still busy.
    pub fn skipped_ticks(&self) -> u64 {
        self.counters.skipped()
    }

    /// Stop sampling and wait until the engine is fully quiesced.
    ///
    /// Returns the final statistics. Unread samples stay readable through
    /// existing [`ConsumerPort`]s. If a sampler task panicked the engine is
    /// still stopped, but `Runtime` is returned instead.
    pub fn stop(mut self) -> SimtempResult<Statistics> {
        let clean = self.shutdown();
        let stats = self.store.stats();
        tracing::info!(
            updates = stats.updates,
            alerts = stats.alerts,
            last_error = stats.last_error,
            skipped_ticks = self.counters.skipped(),
            clean,
            "simtemp engine stopped"
        );
        if clean {
            Ok(stats)
        } else {
            Err(SimtempError::Runtime(
                "sampler task ended abnormally".to_string(),
            ))
        }
    }

    fn shutdown(&mut self) -> bool {
        let Some(runtime) = self.runtime.take() else {
            return true;
        };
        let clean = match self.scheduler.take() {
            // block_on panics inside an async context, so drive the stop from
            // a plain thread.
            Some(scheduler) => thread::scope(|s| {
                s.spawn(|| runtime.block_on(scheduler.stop()))
                    .join()
                    .unwrap_or(false)
            }),
            None => true,
        };
        if !clean {
            self.store.record_error(EIO);
        }
        self.store.close();
        runtime.shutdown_background();
        clean
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.runtime.is_some() {
            tracing::debug!("engine dropped while running, shutting down");
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("settings", &self.settings.snapshot())
            .field("store", &self.store)
            .finish()
    }
}
