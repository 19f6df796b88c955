#![no_main]

use libfuzzer_sys::fuzz_target;
use mq_common::SeverityCategory;
use mq_config::ScheduleConfig;
use mq_core::priority;

fuzz_target!(|input: (f64, f64, f64)| {
    let (severity, wait_minutes, demotion) = input;
    let config = ScheduleConfig::default();

    // Must never panic, whatever the floats look like.
    let score = priority::priority_score(severity, wait_minutes, &config);
    let _ = priority::demoted_score(score, demotion);
    let _ = SeverityCategory::from_score(severity);

    // With sane inputs the score is bounded by the formula's range.
    if severity.is_finite() && wait_minutes.is_finite() && wait_minutes >= 0.0 {
        assert!(score >= 0.0);
        assert!(score <= 10.0 + 1e-9);
    }
});
