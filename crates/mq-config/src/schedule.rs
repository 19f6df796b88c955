//! Priority formula weights and caps.

use serde::{Deserialize, Serialize};

/// Configuration for the blended priority formula.
///
/// `priority = severity_weight * severity + wait_weight * normalized_wait * 10`
/// where `normalized_wait = min(wait_minutes / wait_cap_minutes, 1.0)`.
/// Both terms live on a 0-10 scale, so with weights summing to 1 the
/// blended score stays inside [0,10].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Weight of the severity term (0..1).
    pub severity_weight: f64,

    /// Weight of the wait-time term (0..1). Must sum to 1 with
    /// `severity_weight`.
    pub wait_weight: f64,

    /// Wait time at which the wait term saturates, in minutes.
    pub wait_cap_minutes: f64,

    /// Damping factor applied to an entry's demotion multiplier on each
    /// voluntary self-lower request (0..1].
    pub self_lower_damping: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            severity_weight: 0.7,
            wait_weight: 0.3,
            wait_cap_minutes: 120.0,
            self_lower_damping: 0.8,
        }
    }
}
