//! Background thread runner for the check-in ticker.
//!
//! A single long-lived thread fires `process_tick` on a fixed period and
//! coordinates with the queue store through the same locks as request
//! handlers. Shutdown is channel-signalled: the sleeping ticker wakes
//! immediately, an in-flight tick finishes first, and the thread is
//! joined before `shutdown` returns.

use super::{process_tick, TickEventKind, TickerState};
use crate::notify::NotificationSink;
use crate::store::QueueStore;
use chrono::Utc;
use mq_common::Result;
use mq_config::CheckInConfig;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// Factory for the background check-in ticker.
pub struct CheckInTicker;

impl CheckInTicker {
    /// Spawn the ticker with the period from `config.tick_interval_secs`.
    pub fn spawn(
        store: Arc<QueueStore>,
        sink: Arc<dyn NotificationSink>,
        config: CheckInConfig,
    ) -> Result<TickerHandle> {
        let period = Duration::from_secs(config.tick_interval_secs);
        Self::spawn_with_period(store, sink, config, period)
    }

    /// Spawn the ticker with an explicit firing period.
    pub fn spawn_with_period(
        store: Arc<QueueStore>,
        sink: Arc<dyn NotificationSink>,
        config: CheckInConfig,
        period: Duration,
    ) -> Result<TickerHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join = std::thread::Builder::new()
            .name("mq-checkin-ticker".to_string())
            .spawn(move || {
                let mut state = TickerState::new(config.event_ring_capacity);
                state.record_event(Utc::now(), TickEventKind::Started, "ticker started");
                info!(period_secs = period.as_secs_f64(), "check-in ticker started");

                loop {
                    // The sleep doubles as the cancellation point: a stop
                    // signal (or a dropped handle) wakes it immediately.
                    match stop_rx.recv_timeout(period) {
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            let outcome =
                                process_tick(&store, &sink, &config, &mut state, Utc::now());
                            debug!(
                                tick = outcome.tick_number,
                                due = outcome.due,
                                delivered = outcome.delivered,
                                failed = outcome.failed,
                                "check-in tick complete"
                            );
                        }
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }

                state.record_event(Utc::now(), TickEventKind::Stopped, "ticker stopped");
                info!(ticks = state.tick_count, "check-in ticker stopped");
                state
            })?;

        Ok(TickerHandle {
            stop_tx,
            join: Some(join),
        })
    }
}

/// Handle for a running ticker thread.
///
/// Dropping the handle also stops the ticker; call [`TickerHandle::shutdown`]
/// to stop it and get the final state back.
pub struct TickerHandle {
    stop_tx: mpsc::Sender<()>,
    join: Option<JoinHandle<TickerState>>,
}

impl TickerHandle {
    /// Request a graceful stop and wait for the thread to finish.
    pub fn shutdown(mut self) -> TickerState {
        let _ = self.stop_tx.send(());
        match self.join.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                error!("check-in ticker thread panicked");
                TickerState::new(0)
            }),
            None => TickerState::new(0),
        }
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChannelSink;
    use chrono::Duration as ChronoDuration;
    use mq_common::OwnerId;

    fn config() -> CheckInConfig {
        CheckInConfig {
            delivery_timeout_secs: 1,
            ..CheckInConfig::default()
        }
    }

    #[test]
    fn test_spawn_and_immediate_shutdown() {
        let store = Arc::new(QueueStore::in_memory());
        let sink: Arc<dyn NotificationSink> = Arc::new(ChannelSink::new());

        let handle =
            CheckInTicker::spawn_with_period(store, sink, config(), Duration::from_secs(3600))
                .unwrap();
        let state = handle.shutdown();
        assert_eq!(state.tick_count, 0);
    }

    #[test]
    fn test_ticker_fires_and_retries_failed_deliveries() {
        let store = Arc::new(QueueStore::in_memory());
        let overdue = Utc::now() - ChronoDuration::minutes(45);
        store
            .create(&OwnerId("offline".into()), 5.0, overdue)
            .unwrap();

        // No registered channel: every delivery fails, and the entry
        // stays eligible on each firing.
        let sink: Arc<dyn NotificationSink> = Arc::new(ChannelSink::new());
        let handle = CheckInTicker::spawn_with_period(
            Arc::clone(&store),
            sink,
            config(),
            Duration::from_millis(10),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(120));
        let state = handle.shutdown();

        assert!(state.tick_count >= 2, "ticker fired {} times", state.tick_count);
        assert!(state.failed_count >= 2);
        assert_eq!(state.delivered_count, 0);

        let entry = store.list_waiting().pop().unwrap();
        assert!(entry.last_checked_at.is_none());
    }

    #[test]
    fn test_drop_stops_thread() {
        let store = Arc::new(QueueStore::in_memory());
        let sink: Arc<dyn NotificationSink> = Arc::new(ChannelSink::new());
        let handle =
            CheckInTicker::spawn_with_period(store, sink, config(), Duration::from_secs(3600))
                .unwrap();
        // Dropping must not hang on the hour-long sleep.
        drop(handle);
    }
}
