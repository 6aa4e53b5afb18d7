//! Value synthesis for the simulated sensor.
//!
//! Three modes are supported:
//!
//! - **steady**: uniform around a mean with a small bound
//! - **noisy**: uniform around the same mean with a larger bound
//! - **ramp**: monotonically increasing by a fixed step, wrapping from the
//!   ceiling back to the floor
//!
//! The ramp position survives mode switches: leaving `ramp` and coming back
//! continues from the last ramp value.

use std::fmt;
use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::SimtempError;

/// Synthesis mode.
///
/// Only the three names below parse. `normal`, which some older clients
/// write, is rejected with `InvalidArgument`; map it to `steady` on the
/// client side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Small uniform noise around the mean.
    #[default]
    Steady,
    /// Large uniform noise around the mean.
    Noisy,
    /// Sawtooth between floor and ceiling.
    Ramp,
}

impl Mode {
    /// All modes, in display order.
    pub const ALL: [Mode; 3] = [Mode::Steady, Mode::Noisy, Mode::Ramp];

    /// Attribute name of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Steady => "steady",
            Mode::Noisy => "noisy",
            Mode::Ramp => "ramp",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = SimtempError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == trimmed)
            .ok_or_else(|| {
                SimtempError::invalid(format!(
                    "unknown mode '{}'. Must be one of: steady, noisy, ramp",
                    trimmed
                ))
            })
    }
}

/// Shape of the synthesized signal, in millidegrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthProfile {
    /// Mean value in `steady` mode.
    pub steady_mean_mc: i32,
    /// Half-width of the uniform band in `steady` mode.
    pub steady_delta_mc: i32,
    /// Mean value in `noisy` mode.
    pub noisy_mean_mc: i32,
    /// Half-width of the uniform band in `noisy` mode.
    pub noisy_delta_mc: i32,
    /// Value the ramp starts from and wraps back to.
    pub ramp_floor_mc: i32,
    /// Increment per ramp step.
    pub ramp_step_mc: i32,
    /// Highest value the ramp may emit before wrapping.
    pub ramp_ceiling_mc: i32,
    /// Seed for reproducible noise. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SynthProfile {
    fn default() -> Self {
        Self {
            steady_mean_mc: 40_000,
            steady_delta_mc: 1_000,
            noisy_mean_mc: 40_000,
            noisy_delta_mc: 4_000,
            ramp_floor_mc: 40_000,
            ramp_step_mc: 100,
            ramp_ceiling_mc: 44_000,
            seed: None,
        }
    }
}

impl SynthProfile {
    /// Check the profile for values the synthesizer cannot honour.
    pub fn validate(&self) -> Result<(), SimtempError> {
        if self.steady_delta_mc < 0 || self.noisy_delta_mc < 0 {
            return Err(SimtempError::invalid(
                "synth deltas must not be negative",
            ));
        }
        if self.ramp_step_mc <= 0 {
            return Err(SimtempError::invalid(format!(
                "synth.ramp_step_mc must be positive, got {}",
                self.ramp_step_mc
            )));
        }
        if self.ramp_floor_mc >= self.ramp_ceiling_mc {
            return Err(SimtempError::invalid(format!(
                "synth.ramp_floor_mc ({}) must be below synth.ramp_ceiling_mc ({})",
                self.ramp_floor_mc, self.ramp_ceiling_mc
            )));
        }
        Ok(())
    }
}

/// Mode-dependent value generator owning the ramp continuation state.
pub struct ValueSynthesizer {
    profile: SynthProfile,
    ramp_mc: i32,
    rng: ChaCha8Rng,
}

impl ValueSynthesizer {
    /// Create a synthesizer with its ramp at the floor.
    pub fn new(profile: SynthProfile) -> Self {
        let rng = match profile.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            ramp_mc: profile.ramp_floor_mc,
            profile,
            rng,
        }
    }

    /// Produce the next value for `mode`.
    pub fn next_value(&mut self, mode: Mode) -> i32 {
        match mode {
            Mode::Steady => {
                self.uniform(self.profile.steady_mean_mc, self.profile.steady_delta_mc)
            }
            Mode::Noisy => self.uniform(self.profile.noisy_mean_mc, self.profile.noisy_delta_mc),
            Mode::Ramp => self.advance_ramp(),
        }
    }

    /// Current ramp continuation value.
    pub fn ramp_state(&self) -> i32 {
        self.ramp_mc
    }

    /// Active profile.
    pub fn profile(&self) -> &SynthProfile {
        &self.profile
    }

    fn uniform(&mut self, mean: i32, delta: i32) -> i32 {
        let low = mean.saturating_sub(delta);
        let high = mean.saturating_add(delta);
        self.rng.gen_range(low..=high)
    }

    fn advance_ramp(&mut self) -> i32 {
        let next = self.ramp_mc.saturating_add(self.profile.ramp_step_mc);
        self.ramp_mc = if next > self.profile.ramp_ceiling_mc {
            self.profile.ramp_floor_mc
        } else {
            next
        };
        self.ramp_mc
    }
}

impl fmt::Debug for ValueSynthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSynthesizer")
            .field("profile", &self.profile)
            .field("ramp_mc", &self.ramp_mc)
            .field("rng", &"<ChaCha8Rng>")
            .finish()
    }
}
