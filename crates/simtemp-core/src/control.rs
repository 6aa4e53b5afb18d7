//! Key-value control surface.
//!
//! Attributes are addressed by name and carried as strings, the way a sysfs
//! style interface exposes them:
//!
//! | name        | alias          | access | format                                    |
//! |-------------|----------------|--------|-------------------------------------------|
//! | `period`    | `sampling_ms`  | rw     | positive integer milliseconds             |
//! | `threshold` | `threshold_mC` | rw     | signed integer millidegrees               |
//! | `mode`      |                | rw     | `steady`, `noisy` or `ramp`               |
//! | `stats`     |                | ro     | `updates=<n> alerts=<n> last_error=<n>`   |
//!
//! Every write validates first and commits second; a rejected value leaves the
//! live settings exactly as they were.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{validate_period_ms, Settings, SharedSettings};
use crate::error::{SimtempError, SimtempResult};
use crate::stats::Statistics;
use crate::store::TelemetryStore;
use crate::synth::Mode;

/// A named control attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Sampling period in milliseconds.
    Period,
    /// Alert threshold in millidegrees.
    Threshold,
    /// Synthesis mode.
    Mode,
    /// Cumulative statistics (read-only).
    Stats,
}

impl Attribute {
    /// All attributes in display order.
    pub const ALL: [Attribute; 4] = [
        Attribute::Period,
        Attribute::Threshold,
        Attribute::Mode,
        Attribute::Stats,
    ];

    /// Canonical attribute name.
    pub fn name(self) -> &'static str {
        match self {
            Attribute::Period => "period",
            Attribute::Threshold => "threshold",
            Attribute::Mode => "mode",
            Attribute::Stats => "stats",
        }
    }

    /// Whether writes are accepted.
    pub fn is_writable(self) -> bool {
        !matches!(self, Attribute::Stats)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = SimtempError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "period" | "sampling_ms" => Ok(Attribute::Period),
            "threshold" | "threshold_mC" => Ok(Attribute::Threshold),
            "mode" => Ok(Attribute::Mode),
            "stats" => Ok(Attribute::Stats),
            other => Err(SimtempError::invalid(format!("unknown attribute '{}'", other))),
        }
    }
}

/// Validated get/set access to the live settings and statistics.
#[derive(Debug, Clone)]
pub struct ControlSurface {
    settings: Arc<SharedSettings>,
    store: Arc<TelemetryStore>,
}

impl ControlSurface {
    /// Control surface over the given engine state.
    pub fn new(settings: Arc<SharedSettings>, store: Arc<TelemetryStore>) -> Self {
        Self { settings, store }
    }

    /// Render an attribute.
    pub fn get(&self, attr: Attribute) -> String {
        let settings = self.settings.snapshot();
        match attr {
            Attribute::Period => settings.period.as_millis().to_string(),
            Attribute::Threshold => settings.threshold_mc.to_string(),
            Attribute::Mode => settings.mode.to_string(),
            Attribute::Stats => self.get_stats().to_string(),
        }
    }

    /// Render an attribute looked up by name.
    pub fn get_str(&self, name: &str) -> SimtempResult<String> {
        Ok(self.get(name.parse()?))
    }

    /// Parse and apply `value` to a writable attribute.
    pub fn set(&self, attr: Attribute, value: &str) -> SimtempResult<()> {
        let value = value.trim();
        match attr {
            Attribute::Period => {
                let period_ms: i64 = value.parse().map_err(|_| {
                    SimtempError::invalid(format!("period '{}' is not an integer", value))
                })?;
                self.set_period_ms(period_ms)
            }
            Attribute::Threshold => {
                let threshold_mc: i32 = value.parse().map_err(|_| {
                    SimtempError::invalid(format!("threshold '{}' is not a 32-bit integer", value))
                })?;
                self.set_threshold_mc(threshold_mc);
                Ok(())
            }
            Attribute::Mode => {
                self.set_mode(value.parse()?);
                Ok(())
            }
            Attribute::Stats => Err(SimtempError::invalid("stats is read-only")),
        }
    }

    /// Parse and apply `value` to the attribute called `name`.
    pub fn set_str(&self, name: &str, value: &str) -> SimtempResult<()> {
        self.set(name.parse()?, value)
    }

    /// Replace the sampling period. Applies from the next scheduled firing.
    pub fn set_period_ms(&self, period_ms: i64) -> SimtempResult<()> {
        let period_ms = u64::try_from(period_ms).map_err(|_| {
            SimtempError::invalid("period must be a positive number of milliseconds")
        })?;
        validate_period_ms(period_ms)?;
        self.settings.update(|s| s.period = Duration::from_millis(period_ms));
        tracing::debug!(period_ms, "period updated");
        Ok(())
    }

    /// Replace the alert threshold. Any value is accepted.
    pub fn set_threshold_mc(&self, threshold_mc: i32) {
        self.settings.update(|s| s.threshold_mc = threshold_mc);
        tracing::debug!(threshold_mc, "threshold updated");
    }

    /// Replace the synthesis mode.
    pub fn set_mode(&self, mode: Mode) {
        self.settings.update(|s| s.mode = mode);
        tracing::debug!(%mode, "mode updated");
    }

    /// Tear-free statistics snapshot.
    pub fn get_stats(&self) -> Statistics {
        self.store.stats()
    }

    /// Current live settings.
    pub fn settings(&self) -> Settings {
        self.settings.snapshot()
    }
}
