//! Configuration loading and live engine settings.
//!
//! Start-up configuration is loaded with Figment from, in increasing priority:
//! 1. compiled-in defaults
//! 2. an optional TOML file
//! 3. environment variables prefixed with `SIMTEMP_`, using `__` to separate
//!    sections (e.g. `SIMTEMP_ENGINE__PERIOD_MS=250`)
//!
//! # Example
//! ```no_run
//! use simtemp_core::config::SimtempConfig;
//!
//! let config = SimtempConfig::load_from("config/simtemp.toml")?;
//! config.validate()?;
//! println!("period: {} ms", config.engine.period_ms);
//! # Ok::<(), simtemp_core::SimtempError>(())
//! ```
//!
//! At run time the tunable subset (period, threshold, mode) lives in
//! [`SharedSettings`], which the production step reads once per cycle and the
//! control surface replaces as a whole.

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{SimtempError, SimtempResult};
use crate::store::DEFAULT_CAPACITY;
use crate::synth::{Mode, SynthProfile};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "SIMTEMP_";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimtempConfig {
    /// Engine sizing and initial tunables.
    pub engine: EngineConfig,
    /// Signal shape.
    pub synth: SynthProfile,
    /// Logging settings for binaries.
    pub logging: LoggingConfig,
}

/// Engine sizing and initial values of the tunable settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of samples retained by the store.
    pub capacity: usize,
    /// Sampling period in milliseconds.
    pub period_ms: u64,
    /// Alert threshold in millidegrees.
    pub threshold_mc: i32,
    /// Initial synthesis mode.
    pub mode: Mode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            period_ms: 1000,
            threshold_mc: 45_000,
            mode: Mode::Steady,
        }
    }
}

/// Logging configuration consumed by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Output format (pretty, compact, json).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

impl SimtempConfig {
    /// Figment with defaults and environment overrides, without a file.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(SimtempConfig::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load defaults plus environment overrides.
    pub fn load() -> SimtempResult<Self> {
        Ok(Self::figment().extract()?)
    }

    /// Load defaults, then `path`, then environment overrides.
    ///
    /// A missing file is not an error; its values simply do not apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> SimtempResult<Self> {
        let config = Figment::from(Serialized::defaults(SimtempConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> SimtempResult<()> {
        if self.engine.capacity == 0 {
            return Err(SimtempError::invalid("engine.capacity must be at least 1"));
        }
        validate_period_ms(self.engine.period_ms)?;
        self.synth.validate()?;

        let level = self.logging.level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            return Err(SimtempError::invalid(format!(
                "Invalid logging.level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            )));
        }
        if !VALID_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(SimtempError::invalid(format!(
                "Invalid logging.format '{}'. Must be one of: {}",
                self.logging.format,
                VALID_FORMATS.join(", ")
            )));
        }
        Ok(())
    }

    /// Initial live settings derived from the engine section.
    pub fn initial_settings(&self) -> Settings {
        Settings {
            period: Duration::from_millis(self.engine.period_ms),
            threshold_mc: self.engine.threshold_mc,
            mode: self.engine.mode,
        }
    }
}

/// Reject a zero period, or one that does not fit the millisecond attribute.
pub fn validate_period_ms(period_ms: u64) -> SimtempResult<()> {
    if period_ms == 0 {
        return Err(SimtempError::invalid("period must be a positive number of milliseconds"));
    }
    if period_ms > u64::from(u32::MAX) {
        return Err(SimtempError::invalid(format!(
            "period {} ms exceeds the maximum of {} ms",
            period_ms,
            u32::MAX
        )));
    }
    Ok(())
}

/// Snapshot of the tunable settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Sampling period.
    pub period: Duration,
    /// Alert threshold in millidegrees.
    pub threshold_mc: i32,
    /// Synthesis mode.
    pub mode: Mode,
}

impl Default for Settings {
    fn default() -> Self {
        SimtempConfig::default().initial_settings()
    }
}

/// Live settings shared between the control surface and the production step.
///
/// Readers always get a whole [`Settings`] copy, so a half-applied write is
/// never visible.
#[derive(Debug, Default)]
pub struct SharedSettings {
    inner: RwLock<Settings>,
}

impl SharedSettings {
    /// Wrap initial settings.
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    /// Consistent copy of all settings.
    pub fn snapshot(&self) -> Settings {
        *self.inner.read()
    }

    /// Apply `update` to a copy and publish it in one step.
    pub fn update(&self, update: impl FnOnce(&mut Settings)) -> Settings {
        let mut guard = self.inner.write();
        let mut next = *guard;
        update(&mut next);
        *guard = next;
        next
    }
}
