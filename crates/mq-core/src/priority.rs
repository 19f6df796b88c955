//! Blended priority scoring.
//!
//! Pure, stateless computation: severity and accrued wait time map to a
//! single scalar, and a queue position maps to a rough wait estimate.
//! Callable concurrently without coordination; everything here takes its
//! inputs explicitly and touches no clocks.

use mq_common::clamp_severity;
use mq_config::ScheduleConfig;

/// Rough service rate used for the human-facing wait estimate.
const MINUTES_PER_POSITION: u32 = 15;

/// Normalize accrued wait time to [0,1], saturating at the cap.
pub fn normalized_wait(wait_minutes: f64, wait_cap_minutes: f64) -> f64 {
    if wait_minutes <= 0.0 || wait_cap_minutes <= 0.0 {
        return 0.0;
    }
    (wait_minutes / wait_cap_minutes).min(1.0)
}

/// Compute the blended priority score from severity and wait time.
///
/// Severity is clamped to [1,10] first. The wait term is scaled to the
/// same 0-10 range as severity before weighting, so with weights summing
/// to 1 the result stays inside [0,10].
pub fn priority_score(severity: f64, wait_minutes: f64, config: &ScheduleConfig) -> f64 {
    let severity = clamp_severity(severity);
    let wait = normalized_wait(wait_minutes, config.wait_cap_minutes);
    config.severity_weight * severity + config.wait_weight * (wait * 10.0)
}

/// Fold a persistent demotion multiplier into a formula score.
///
/// The multiplier lives in (0,1]; 1.0 means no demotion.
pub fn demoted_score(score: f64, demotion: f64) -> f64 {
    if !(0.0..=1.0).contains(&demotion) || demotion == 0.0 {
        return score;
    }
    score * demotion
}

/// Estimate wait time in minutes from a 1-based queue position.
pub fn estimated_wait_minutes(position: u32) -> u32 {
    position.saturating_sub(1) * MINUTES_PER_POSITION
}
