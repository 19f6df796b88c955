//! Semantic validation of configuration values.
//!
//! Structural problems (bad JSON, wrong types) are caught at parse time;
//! this module checks the values themselves: weight normalization, damping
//! range, and non-degenerate intervals.

use crate::QueueConfig;
use serde::{Deserialize, Serialize};

/// Tolerance for the weight-sum check.
const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// A single validation problem with its field path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path of the offending field (e.g. `schedule.wait_weight`).
    pub field: String,

    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of validating a [`QueueConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            field: field.to_string(),
            message: message.into(),
        });
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.issues.is_empty() {
            return write!(f, "ok");
        }
        let lines: Vec<String> = self.issues.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", lines.join("; "))
    }
}

/// Validate a full configuration.
pub fn validate(config: &QueueConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    let s = &config.schedule;
    if !s.severity_weight.is_finite() || s.severity_weight <= 0.0 || s.severity_weight >= 1.0 {
        result.push(
            "schedule.severity_weight",
            format!("must be in (0,1), got {}", s.severity_weight),
        );
    }
    if !s.wait_weight.is_finite() || s.wait_weight <= 0.0 || s.wait_weight >= 1.0 {
        result.push(
            "schedule.wait_weight",
            format!("must be in (0,1), got {}", s.wait_weight),
        );
    }
    if (s.severity_weight + s.wait_weight - 1.0).abs() > WEIGHT_SUM_EPSILON {
        result.push(
            "schedule.wait_weight",
            format!(
                "severity_weight + wait_weight must equal 1, got {}",
                s.severity_weight + s.wait_weight
            ),
        );
    }
    if !s.wait_cap_minutes.is_finite() || s.wait_cap_minutes <= 0.0 {
        result.push(
            "schedule.wait_cap_minutes",
            format!("must be positive, got {}", s.wait_cap_minutes),
        );
    }
    if !s.self_lower_damping.is_finite()
        || s.self_lower_damping <= 0.0
        || s.self_lower_damping > 1.0
    {
        result.push(
            "schedule.self_lower_damping",
            format!("must be in (0,1], got {}", s.self_lower_damping),
        );
    }

    let c = &config.checkin;
    if c.interval_minutes == 0 {
        result.push("checkin.interval_minutes", "must be positive");
    }
    if c.tick_interval_secs == 0 {
        result.push("checkin.tick_interval_secs", "must be positive");
    }
    if c.delivery_timeout_secs == 0 {
        result.push("checkin.delivery_timeout_secs", "must be positive");
    }
    if c.event_ring_capacity == 0 {
        result.push("checkin.event_ring_capacity", "must be positive");
    }

    result
}
