//! Property-based tests for control-surface validation and ramp continuity.

use std::sync::Arc;

use proptest::prelude::*;
use simtemp_core::config::SharedSettings;
use simtemp_core::store::TelemetryStore;
use simtemp_core::synth::{SynthProfile, ValueSynthesizer};
use simtemp_core::{Attribute, ControlSurface, Mode, Settings, SimtempError};

fn surface() -> ControlSurface {
    ControlSurface::new(
        Arc::new(SharedSettings::new(Settings::default())),
        Arc::new(TelemetryStore::new(4).unwrap()),
    )
}

proptest! {
    /// Any positive period that fits the attribute reads back unchanged.
    #[test]
    fn period_round_trips(period in 1u32..=u32::MAX) {
        let control = surface();
        control.set(Attribute::Period, &period.to_string()).unwrap();
        prop_assert_eq!(control.get(Attribute::Period), period.to_string());
    }

    /// Non-positive periods are rejected and leave every setting untouched.
    #[test]
    fn non_positive_period_rejected(period in i64::MIN..=0) {
        let control = surface();
        let before = control.settings();
        let result = control.set(Attribute::Period, &period.to_string());
        prop_assert!(matches!(result, Err(SimtempError::InvalidArgument(_))));
        prop_assert_eq!(control.settings(), before);
    }

    /// Any signed 32-bit threshold is accepted verbatim.
    #[test]
    fn any_threshold_accepted(threshold in any::<i32>()) {
        let control = surface();
        control.set(Attribute::Threshold, &threshold.to_string()).unwrap();
        prop_assert_eq!(control.settings().threshold_mc, threshold);
    }

    /// Strings that are not a mode name never change the mode.
    #[test]
    fn garbage_mode_rejected(value in "[a-z]{1,12}") {
        prop_assume!(!Mode::ALL.iter().any(|m| m.as_str() == value));
        let control = surface();
        control.set(Attribute::Mode, "ramp").unwrap();
        prop_assert!(control.set(Attribute::Mode, &value).is_err());
        prop_assert_eq!(control.settings().mode, Mode::Ramp);
    }

    /// Switching away from ramp for any number of cycles resumes the ramp
    /// where it left off.
    #[test]
    fn ramp_resumes_after_mode_switch(before in 0usize..80, away in 0usize..10, noisy in any::<bool>()) {
        let profile = SynthProfile { seed: Some(9), ..Default::default() };
        let mut continuous = ValueSynthesizer::new(profile.clone());
        let mut switched = ValueSynthesizer::new(profile);

        for _ in 0..before {
            continuous.next_value(Mode::Ramp);
            switched.next_value(Mode::Ramp);
        }
        let other = if noisy { Mode::Noisy } else { Mode::Steady };
        for _ in 0..away {
            switched.next_value(other);
        }

        prop_assert_eq!(switched.next_value(Mode::Ramp), continuous.next_value(Mode::Ramp));
    }
}
