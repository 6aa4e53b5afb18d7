//! The deferred production step.
//!
//! One invocation reads the live settings once, synthesizes a value, flags it
//! against the threshold, appends it to the store and wakes waiting consumers.
//! It runs on the scheduler's worker task, never on the trigger.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::SharedSettings;
use crate::sample::{MonotonicClock, Sample, SampleFlags};
use crate::store::TelemetryStore;
use crate::synth::{SynthProfile, ValueSynthesizer};

/// Work the scheduler's worker performs for each accepted tick.
pub(crate) trait Produce: Send + Sync + 'static {
    fn produce(&self);
}

/// State touched by a single production cycle.
#[derive(Debug)]
pub struct ProductionStep {
    store: Arc<TelemetryStore>,
    settings: Arc<SharedSettings>,
    synth: Mutex<ValueSynthesizer>,
    clock: MonotonicClock,
}

impl ProductionStep {
    /// Build a production step writing into `store`.
    pub fn new(
        store: Arc<TelemetryStore>,
        settings: Arc<SharedSettings>,
        profile: SynthProfile,
    ) -> Self {
        Self {
            store,
            settings,
            synth: Mutex::new(ValueSynthesizer::new(profile)),
            clock: MonotonicClock::start(),
        }
    }

    /// Produce and store one sample.
    pub fn run(&self) -> Sample {
        let settings = self.settings.snapshot();
        // Synthesis happens outside the store lock
        let value_mc = self.synth.lock().next_value(settings.mode);
        let flags = SampleFlags::for_value(value_mc, settings.threshold_mc);
        let sample = Sample::new(self.clock.now_ns(), value_mc, flags);

        let evicted = self.store.push(sample);
        tracing::trace!(
            value_mc,
            mode = %settings.mode,
            alert = sample.is_alert(),
            evicted,
            "sample produced"
        );
        sample
    }

    /// Current ramp continuation value.
    pub fn ramp_state(&self) -> i32 {
        self.synth.lock().ramp_state()
    }
}

impl Produce for ProductionStep {
    fn produce(&self) {
        self.run();
    }
}
