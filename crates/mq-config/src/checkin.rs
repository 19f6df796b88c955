//! Check-in ticker cadence and delivery limits.

use serde::{Deserialize, Serialize};

/// Configuration for the periodic check-in ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckInConfig {
    /// An entry is due for a prompt once this many minutes have elapsed
    /// since its last recorded check-in (or creation).
    pub interval_minutes: u64,

    /// Seconds between ticker firings. Defaults to the check-in interval.
    pub tick_interval_secs: u64,

    /// Per-delivery timeout in seconds. A delivery that exceeds this is
    /// treated as failed and retried on the next tick.
    pub delivery_timeout_secs: u64,

    /// Number of recent ticker events retained for audit.
    pub event_ring_capacity: usize,
}

impl Default for CheckInConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            tick_interval_secs: 30 * 60,
            delivery_timeout_secs: 10,
            event_ring_capacity: 100,
        }
    }
}
