//! Severity score domain and category taxonomy.
//!
//! Severity is a clinician-style score on the closed interval [1,10],
//! produced by the external classifier and mutated only by escalation.
//! Categories partition the score range into the four human-facing urgency
//! bands used throughout the waitlist UI and care guidance.

use serde::{Deserialize, Serialize};

/// Lower bound of the severity score domain.
pub const SEVERITY_MIN: f64 = 1.0;

/// Upper bound of the severity score domain.
pub const SEVERITY_MAX: f64 = 10.0;

/// Clamp a severity score into [1,10].
///
/// Non-finite input collapses to the minimum rather than poisoning
/// downstream ordering.
pub fn clamp_severity(score: f64) -> f64 {
    if !score.is_finite() {
        return SEVERITY_MIN;
    }
    score.clamp(SEVERITY_MIN, SEVERITY_MAX)
}

/// Returns true if the score is inside the accepted input domain.
///
/// Used at admission time, where an out-of-range score is a caller error
/// rather than something to silently clamp.
pub fn severity_in_range(score: f64) -> bool {
    score.is_finite() && (SEVERITY_MIN..=SEVERITY_MAX).contains(&score)
}

/// Urgency bands derived from the severity score.
///
/// Partition: Critical = [9,10], High = [7,9), Medium = [4,7), Low = [1,4).
/// Scores are clamped before classification, so every float maps somewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityCategory {
    /// Immediate attention.
    Critical,
    /// Urgent, within the hour.
    High,
    /// Should be seen within a day.
    Medium,
    /// Self-care guidance is usually sufficient.
    Low,
}

impl SeverityCategory {
    /// All categories from most to least urgent.
    pub fn all() -> &'static [SeverityCategory] {
        &[
            SeverityCategory::Critical,
            SeverityCategory::High,
            SeverityCategory::Medium,
            SeverityCategory::Low,
        ]
    }

    /// Classify a severity score. Total over all f64 inputs.
    pub fn from_score(score: f64) -> Self {
        let s = clamp_severity(score);
        if s >= 9.0 {
            SeverityCategory::Critical
        } else if s >= 7.0 {
            SeverityCategory::High
        } else if s >= 4.0 {
            SeverityCategory::Medium
        } else if s >= SEVERITY_MIN {
            SeverityCategory::Low
        } else {
            // Unreachable after clamping; fall back rather than panic.
            SeverityCategory::Medium
        }
    }

    /// Get human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            SeverityCategory::Critical => "critical",
            SeverityCategory::High => "high",
            SeverityCategory::Medium => "medium",
            SeverityCategory::Low => "low",
        }
    }
}

impl Default for SeverityCategory {
    fn default() -> Self {
        SeverityCategory::Medium
    }
}

impl std::fmt::Display for SeverityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
