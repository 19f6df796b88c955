//! End-to-end ordering scenarios driven by a synthetic clock.
//!
//! All scenarios use the `*_at` entry points so no test ever sleeps.

use chrono::{DateTime, Duration, TimeZone, Utc};
use mq_common::{EntryStatus, OwnerId};
use mq_config::ScheduleConfig;
use mq_core::scheduler::QueueScheduler;
use mq_core::store::QueueStore;
use std::sync::Arc;

fn owner(s: &str) -> OwnerId {
    OwnerId(s.to_string())
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap()
}

fn scheduler() -> QueueScheduler {
    QueueScheduler::new(Arc::new(QueueStore::in_memory()), ScheduleConfig::default())
}

/// Positions over the Waiting set must be exactly {1..N}, each used once,
/// with priority non-increasing as position increases.
fn assert_consistent_ranking(sched: &QueueScheduler) {
    let mut waiting = sched.store().list_waiting();
    waiting.sort_by_key(|e| e.position);

    let positions: Vec<u32> = waiting.iter().map(|e| e.position).collect();
    let expected: Vec<u32> = (1..=waiting.len() as u32).collect();
    assert_eq!(positions, expected, "positions must be a contiguous 1..N");

    for pair in waiting.windows(2) {
        assert!(
            pair[0].priority_score >= pair[1].priority_score,
            "priority must be non-increasing: {} at {} vs {} at {}",
            pair[0].priority_score,
            pair[0].position,
            pair[1].priority_score,
            pair[1].position
        );
    }
}

#[test]
fn admission_orders_by_weighted_severity() {
    let sched = scheduler();
    let now = t0();

    let a = sched.admit_at(&owner("a"), 8.0, now).unwrap();
    let b = sched.admit_at(&owner("b"), 5.0, now).unwrap();

    // Zero elapsed wait: priority is severity_weight * severity.
    assert!((a.priority_score - 5.6).abs() < 1e-9);
    assert!((b.priority_score - 3.5).abs() < 1e-9);
    assert_eq!(sched.position_of_at(&owner("a"), now), Some(1));
    assert_eq!(sched.position_of_at(&owner("b"), now), Some(2));
    assert_consistent_ranking(&sched);
}

#[test]
fn escalation_below_leader_keeps_order() {
    let sched = scheduler();
    let now = t0();

    sched.admit_at(&owner("a"), 8.0, now).unwrap();
    let b = sched.admit_at(&owner("b"), 5.0, now).unwrap();

    // B worsens once: severity 6, priority 4.2, still behind A's 5.6.
    let escalated = sched.escalate_at(&b.id, now).unwrap();
    assert_eq!(escalated.severity_score, 6.0);
    assert!((escalated.priority_score - 4.2).abs() < 1e-9);
    assert_eq!(sched.position_of_at(&owner("a"), now), Some(1));
    assert_eq!(sched.position_of_at(&owner("b"), now), Some(2));
}

#[test]
fn saturated_wait_adds_equal_term_and_preserves_order() {
    let sched = scheduler();
    let start = t0();

    sched.admit_at(&owner("a"), 8.0, start).unwrap();
    sched.admit_at(&owner("b"), 5.0, start).unwrap();

    // Two hours later both wait terms saturate at +3.0 and the relative
    // order is unchanged.
    let later = start + Duration::minutes(121);
    sched.recompute_at(later);

    let a = sched.store().find_by_owner(&owner("a")).unwrap();
    let b = sched.store().find_by_owner(&owner("b")).unwrap();
    assert!((a.priority_score - 8.6).abs() < 1e-9);
    assert!((b.priority_score - 6.5).abs() < 1e-9);
    assert_eq!(a.position, 1);
    assert_eq!(b.position, 2);
}

#[test]
fn accrued_wait_lets_lower_severity_overtake() {
    let sched = scheduler();
    let start = t0();

    // B (severity 5) has been waiting since t0; A (severity 6) walks in
    // 110 minutes later.
    sched.admit_at(&owner("b"), 5.0, start).unwrap();
    sched
        .admit_at(&owner("a"), 6.0, start + Duration::minutes(110))
        .unwrap();

    let now = start + Duration::minutes(120);
    sched.recompute_at(now);

    // B: 3.5 + 3.0 = 6.5; A: 4.2 + 0.25 = 4.45.
    assert_eq!(sched.store().find_by_owner(&owner("b")).unwrap().position, 1);
    assert_eq!(sched.store().find_by_owner(&owner("a")).unwrap().position, 2);
}

#[test]
fn tiebreak_earlier_arrival_wins_regardless_of_admit_order() {
    let sched = scheduler();
    let start = t0();

    // Admit the later arrival first; creation instants decide the tie.
    sched
        .admit_at(&owner("late"), 5.0, start + Duration::minutes(10))
        .unwrap();
    sched.admit_at(&owner("early"), 5.0, start).unwrap();

    // Far beyond the cap both wait terms saturate: scores are equal.
    let now = start + Duration::minutes(500);
    sched.recompute_at(now);

    let early = sched.store().find_by_owner(&owner("early")).unwrap();
    let late = sched.store().find_by_owner(&owner("late")).unwrap();
    assert!((early.priority_score - late.priority_score).abs() < 1e-9);
    assert_eq!(early.position, 1);
    assert_eq!(late.position, 2);
}

#[test]
fn recompute_is_idempotent_at_fixed_instant() {
    let sched = scheduler();
    let start = t0();

    for (name, severity) in [("a", 8.0), ("b", 5.0), ("c", 5.0), ("d", 2.5)] {
        sched.admit_at(&owner(name), severity, start).unwrap();
    }

    let now = start + Duration::minutes(17);
    sched.recompute_at(now);
    let first: Vec<(OwnerId, u32, f64)> = sched
        .queue_state_at(now)
        .into_iter()
        .map(|i| (i.owner_id, i.position, i.severity_score))
        .collect();

    sched.recompute_at(now);
    let second: Vec<(OwnerId, u32, f64)> = sched
        .queue_state_at(now)
        .into_iter()
        .map(|i| (i.owner_id, i.position, i.severity_score))
        .collect();

    assert_eq!(first, second);
    assert_consistent_ranking(&sched);
}

#[test]
fn withdrawal_closes_gap_and_readmission_uses_current_waits() {
    let sched = scheduler();
    let start = t0();

    sched.admit_at(&owner("a"), 8.0, start).unwrap();
    sched.admit_at(&owner("b"), 5.0, start).unwrap();

    sched
        .withdraw_as_at(&owner("a"), EntryStatus::Completed, start)
        .unwrap();
    assert_eq!(sched.position_of_at(&owner("b"), start), Some(1));

    // C arrives an hour in; B's accrued wait counts but does not beat a
    // fresh severity-8 arrival: B = 3.5 + 1.5 = 5.0 < C = 5.6.
    let later = start + Duration::minutes(60);
    let c = sched.admit_at(&owner("c"), 8.0, later).unwrap();
    assert_eq!(c.position, 1);
    assert_eq!(sched.position_of_at(&owner("b"), later), Some(2));
    assert_consistent_ranking(&sched);
}

#[test]
fn self_lower_is_durable_until_escalation_clears_it() {
    let sched = scheduler();
    let now = t0();

    let a = sched.admit_at(&owner("a"), 8.0, now).unwrap();
    assert!(sched.self_lower_at(&owner("a"), now).unwrap());

    let lowered = sched.store().get(&a.id).unwrap();
    assert!((lowered.priority_score - 5.6 * 0.8).abs() < 1e-9);

    // The damping survives any number of later passes...
    sched.recompute_at(now);
    sched.recompute_at(now);
    let still = sched.store().get(&a.id).unwrap();
    assert!((still.priority_score - 5.6 * 0.8).abs() < 1e-9);

    // ...and stacks on repeated requests.
    assert!(sched.self_lower_at(&owner("a"), now).unwrap());
    let twice = sched.store().get(&a.id).unwrap();
    assert!((twice.priority_score - 5.6 * 0.64).abs() < 1e-9);

    // The next natural severity change clears the demotion.
    let escalated = sched.escalate_at(&a.id, now).unwrap();
    assert_eq!(escalated.severity_score, 9.0);
    assert!((escalated.priority_score - 6.3).abs() < 1e-9);
}

#[test]
fn larger_queue_keeps_contiguous_positions_through_churn() {
    let sched = scheduler();
    let start = t0();

    let severities = [3.0, 9.5, 7.2, 1.0, 5.5, 5.5, 8.8, 2.1, 6.6, 4.4];
    for (i, severity) in severities.iter().enumerate() {
        sched
            .admit_at(
                &owner(&format!("p{i}")),
                *severity,
                start + Duration::minutes(i as i64),
            )
            .unwrap();
    }
    assert_consistent_ranking(&sched);

    sched
        .withdraw_as_at(&owner("p1"), EntryStatus::Completed, start)
        .unwrap();
    sched
        .withdraw_as_at(&owner("p6"), EntryStatus::Cancelled, start)
        .unwrap();
    sched.recompute_at(start + Duration::minutes(30));
    assert_consistent_ranking(&sched);
    assert_eq!(sched.store().waiting_len(), 8);

    sched.self_lower_at(&owner("p2"), start + Duration::minutes(31)).unwrap();
    assert_consistent_ranking(&sched);
}
