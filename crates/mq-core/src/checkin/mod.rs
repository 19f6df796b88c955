//! Periodic check-in processing.
//!
//! Implements the library-side primitives for the check-in ticker:
//!
//! - **Due selection**: pure predicate over the Waiting set; an entry is
//!   due once a full interval has elapsed since its last recorded
//!   check-in (or its creation, before the first one).
//! - **Tick processing**: the core testable unit — selects due entries,
//!   pushes prompts through the notification sink with a per-delivery
//!   timeout, and stamps `last_checked_at` only on success, so failed
//!   deliveries retry every tick until the entry leaves Waiting.
//! - **Event ring**: bounded audit trail of recent ticker activity.
//!
//! The background thread runner lives in [`ticker`]; this module has no
//! thread or clock of its own, which is what makes it testable.

pub mod ticker;

pub use ticker::{CheckInTicker, TickerHandle};

use crate::notify::{deliver_with_timeout, NotificationPayload, NotificationSink};
use crate::store::{QueueEntry, QueueStore};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mq_config::CheckInConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Select the Waiting entries due for a check-in prompt.
pub fn plan_due(
    entries: &[QueueEntry],
    now: DateTime<Utc>,
    interval_minutes: u64,
) -> Vec<QueueEntry> {
    let interval = ChronoDuration::minutes(interval_minutes as i64);
    entries
        .iter()
        .filter(|e| {
            let last = e.last_checked_at.unwrap_or(e.created_at);
            now.signed_duration_since(last) >= interval
        })
        .cloned()
        .collect()
}

/// A ticker event for telemetry / audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: TickEventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickEventKind {
    Started,
    Stopped,
    PromptDelivered,
    PromptFailed,
    TickCompleted,
}

/// Running state of the ticker loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerState {
    pub started_at: DateTime<Utc>,
    pub tick_count: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub delivered_count: u64,
    pub failed_count: u64,
    /// Recent events for audit, oldest first.
    pub recent_events: VecDeque<TickEvent>,
    event_ring_capacity: usize,
}

impl TickerState {
    pub fn new(event_ring_capacity: usize) -> Self {
        Self {
            started_at: Utc::now(),
            tick_count: 0,
            last_tick_at: None,
            delivered_count: 0,
            failed_count: 0,
            recent_events: VecDeque::with_capacity(event_ring_capacity.min(128)),
            event_ring_capacity,
        }
    }

    pub fn record_event(&mut self, now: DateTime<Utc>, kind: TickEventKind, detail: &str) {
        if self.event_ring_capacity == 0 {
            return;
        }
        if self.recent_events.len() >= self.event_ring_capacity {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(TickEvent {
            timestamp: now,
            kind,
            detail: detail.to_string(),
        });
    }
}

/// Outcome of a single ticker firing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickOutcome {
    pub tick_number: u64,
    pub due: usize,
    pub delivered: usize,
    pub failed: usize,
    pub events: Vec<TickEvent>,
}

/// Process one ticker firing.
///
/// Each due entry is an independent unit of work: a failed or timed-out
/// delivery is logged, counted, and left eligible for the next tick; it
/// never aborts processing of the remaining entries.
pub fn process_tick(
    store: &QueueStore,
    sink: &Arc<dyn NotificationSink>,
    config: &CheckInConfig,
    state: &mut TickerState,
    now: DateTime<Utc>,
) -> TickOutcome {
    state.tick_count += 1;
    state.last_tick_at = Some(now);
    let tick_number = state.tick_count;

    let waiting = store.list_waiting();
    let due = plan_due(&waiting, now, config.interval_minutes);
    let timeout = Duration::from_secs(config.delivery_timeout_secs);

    let mut outcome = TickOutcome {
        tick_number,
        due: due.len(),
        delivered: 0,
        failed: 0,
        events: Vec::new(),
    };

    for entry in &due {
        let payload = NotificationPayload::check_in_prompt(entry);

        let delivery = deliver_with_timeout(sink, &entry.owner_id, &payload, timeout);
        match delivery {
            Ok(()) => match store.mark_checked(&entry.id, now) {
                Ok(()) => {
                    outcome.delivered += 1;
                    state.delivered_count += 1;
                    let detail = format!("prompted {}", entry.id);
                    state.record_event(now, TickEventKind::PromptDelivered, &detail);
                    outcome.events.push(TickEvent {
                        timestamp: now,
                        kind: TickEventKind::PromptDelivered,
                        detail,
                    });
                }
                // Entry left Waiting between snapshot and stamp.
                Err(err) => {
                    debug!(entry_id = %entry.id, error = %err, "prompt delivered to departed entry");
                    outcome.failed += 1;
                    state.failed_count += 1;
                }
            },
            Err(sink_err) => {
                let err = sink_err.into_error(&entry.owner_id);
                warn!(
                    entry_id = %entry.id,
                    error = %err,
                    "check-in delivery failed, will retry next tick"
                );
                outcome.failed += 1;
                state.failed_count += 1;
                let detail = format!("{}: {err}", entry.id);
                state.record_event(now, TickEventKind::PromptFailed, &detail);
                outcome.events.push(TickEvent {
                    timestamp: now,
                    kind: TickEventKind::PromptFailed,
                    detail,
                });
            }
        }
    }

    state.record_event(
        now,
        TickEventKind::TickCompleted,
        &format!("tick {tick_number}"),
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelSink, SinkError};
    use mq_common::OwnerId;
    use std::sync::mpsc;

    fn owner(s: &str) -> OwnerId {
        OwnerId(s.to_string())
    }

    fn config() -> CheckInConfig {
        CheckInConfig {
            delivery_timeout_secs: 1,
            ..CheckInConfig::default()
        }
    }

    #[test]
    fn test_plan_due_uses_created_at_before_first_check_in() {
        let store = QueueStore::in_memory();
        let t0 = Utc::now();
        store.create(&owner("fresh"), 5.0, t0).unwrap();
        store
            .create(&owner("stale"), 5.0, t0 - ChronoDuration::minutes(45))
            .unwrap();

        let due = plan_due(&store.list_waiting(), t0, 30);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].owner_id, owner("stale"));
    }

    #[test]
    fn test_plan_due_respects_last_checked_at() {
        let store = QueueStore::in_memory();
        let t0 = Utc::now() - ChronoDuration::minutes(90);
        let entry = store.create(&owner("a"), 5.0, t0).unwrap();

        let now = Utc::now();
        assert_eq!(plan_due(&store.list_waiting(), now, 30).len(), 1);

        store.mark_checked(&entry.id, now).unwrap();
        assert!(plan_due(&store.list_waiting(), now, 30).is_empty());

        let later = now + ChronoDuration::minutes(30);
        assert_eq!(plan_due(&store.list_waiting(), later, 30).len(), 1);
    }

    #[test]
    fn test_tick_success_stamps_and_stops_reprompting() {
        let store = QueueStore::in_memory();
        let t0 = Utc::now() - ChronoDuration::minutes(45);
        store.create(&owner("a"), 5.0, t0).unwrap();

        let channel_sink = Arc::new(ChannelSink::new());
        let (tx, rx) = mpsc::channel();
        channel_sink.register(owner("a"), tx);
        let sink: Arc<dyn NotificationSink> = channel_sink;

        let mut state = TickerState::new(16);
        let now = Utc::now();
        let outcome = process_tick(&store, &sink, &config(), &mut state, now);
        assert_eq!(outcome.due, 1);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.failed, 0);
        assert!(rx.try_recv().is_ok());

        // Stamped: not due again within the interval.
        let outcome = process_tick(&store, &sink, &config(), &mut state, now);
        assert_eq!(outcome.due, 0);
        assert_eq!(state.tick_count, 2);
    }

    #[test]
    fn test_tick_failure_keeps_entry_eligible() {
        let store = QueueStore::in_memory();
        let t0 = Utc::now() - ChronoDuration::minutes(45);
        store.create(&owner("offline"), 5.0, t0).unwrap();

        let sink: Arc<dyn NotificationSink> = Arc::new(ChannelSink::new());
        let mut state = TickerState::new(16);

        for expected_tick in 1..=3 {
            let now = Utc::now();
            let outcome = process_tick(&store, &sink, &config(), &mut state, now);
            assert_eq!(outcome.tick_number, expected_tick);
            assert_eq!(outcome.due, 1);
            assert_eq!(outcome.failed, 1);
            assert_eq!(outcome.delivered, 0);
        }
        assert_eq!(state.failed_count, 3);
    }

    #[test]
    fn test_tick_isolates_per_entry_failures() {
        // One reachable owner, one not; the failure must not stop the
        // other delivery.
        let store = QueueStore::in_memory();
        let t0 = Utc::now() - ChronoDuration::minutes(45);
        store.create(&owner("offline"), 5.0, t0).unwrap();
        store.create(&owner("online"), 5.0, t0).unwrap();

        let channel_sink = Arc::new(ChannelSink::new());
        let (tx, rx) = mpsc::channel();
        channel_sink.register(owner("online"), tx);
        let sink: Arc<dyn NotificationSink> = channel_sink;

        let mut state = TickerState::new(16);
        let outcome = process_tick(&store, &sink, &config(), &mut state, Utc::now());
        assert_eq!(outcome.due, 2);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.failed, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_tick_survives_panicking_sink() {
        struct PanickingSink;
        impl NotificationSink for PanickingSink {
            fn deliver(
                &self,
                _owner: &OwnerId,
                _payload: &NotificationPayload,
            ) -> Result<(), SinkError> {
                panic!("transport bug");
            }
        }

        let store = QueueStore::in_memory();
        let t0 = Utc::now() - ChronoDuration::minutes(45);
        store.create(&owner("a"), 5.0, t0).unwrap();
        store.create(&owner("b"), 5.0, t0).unwrap();

        let sink: Arc<dyn NotificationSink> = Arc::new(PanickingSink);
        let mut state = TickerState::new(16);
        let outcome = process_tick(&store, &sink, &config(), &mut state, Utc::now());

        // Both entries were visited; both failed; nothing propagated.
        assert_eq!(outcome.due, 2);
        assert_eq!(outcome.failed, 2);
    }

    #[test]
    fn test_event_ring_is_bounded() {
        let mut state = TickerState::new(10);
        let now = Utc::now();
        for i in 0..25 {
            state.record_event(now, TickEventKind::TickCompleted, &format!("tick {i}"));
        }
        assert_eq!(state.recent_events.len(), 10);
        assert!(state.recent_events[0].detail.contains("15"));
    }
}
