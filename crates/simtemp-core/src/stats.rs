//! Cumulative engine statistics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Counters maintained alongside the telemetry store.
///
/// All three fields are updated under the store lock, so a snapshot is never
/// torn between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Statistics {
    /// Samples produced since start.
    pub updates: u64,
    /// Produced samples that exceeded the threshold.
    pub alerts: u64,
    /// Last failure code observed by the engine (0 = none).
    pub last_error: u32,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "updates={} alerts={} last_error={}",
            self.updates, self.alerts, self.last_error
        )
    }
}
