//! `simtemp-core`
//!
//! Sampling-and-delivery engine for a simulated periodic temperature sensor.
//!
//! A periodic trigger hands off to a production step that synthesizes a
//! value, flags threshold crossings and appends the sample to a bounded,
//! overwrite-oldest store. Any number of readers consume samples in FIFO
//! order, blocking, non-blocking or through readiness waits, while a
//! key-value control surface tunes the period, threshold and mode live.
//!
//! ## Components
//!
//! - [`synth::ValueSynthesizer`]: mode-dependent value generation (`steady`,
//!   `noisy`, `ramp`)
//! - [`store::TelemetryStore`]: fixed-capacity ring with cumulative statistics
//! - [`scheduler`]: drift-correcting trigger plus deferred worker
//! - [`production::ProductionStep`]: one synthesize/flag/store cycle
//! - [`consumer::ConsumerPort`]: blocking, non-blocking and `io::Read` access
//! - [`control::ControlSurface`]: validated attribute get/set
//! - [`Engine`]: owns all of the above; `start` / `stop`
//!
//! ## Example
//!
//! ```rust,no_run
//! use simtemp_core::{Attribute, Engine, SimtempConfig};
//!
//! let engine = Engine::start(&SimtempConfig::default())?;
//! engine.control().set(Attribute::Period, "250")?;
//!
//! let reader = engine.consumer();
//! for _ in 0..4 {
//!     let sample = reader.read(true)?;
//!     println!("{:.2} °C alert={}", sample.celsius(), sample.is_alert());
//! }
//! println!("{}", engine.stop()?);
//! # Ok::<(), simtemp_core::SimtempError>(())
//! ```

pub mod config;
pub mod consumer;
pub mod control;
pub mod engine;
pub mod error;
pub mod production;
pub mod sample;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod synth;

pub use config::{Settings, SimtempConfig};
pub use consumer::{ConsumerPort, Readiness};
pub use control::{Attribute, ControlSurface};
pub use engine::Engine;
pub use error::{SimtempError, SimtempResult};
pub use sample::{Sample, SampleFlags, RECORD_SIZE};
pub use scheduler::SchedulerState;
pub use stats::Statistics;
pub use synth::Mode;
