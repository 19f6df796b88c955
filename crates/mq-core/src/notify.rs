//! Notification sink contract and in-process implementation.
//!
//! The core never holds live channel state; the transport layer owns the
//! channel registry and hands the ticker an abstract delivery capability.
//! From the ticker's perspective delivery is deliver-or-fail: a failure is
//! logged and retried on the next firing, never propagated.

use crate::scheduler::QueueStateItem;
use crate::store::QueueEntry;
use mq_common::{EntryId, OwnerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Errors from a delivery attempt.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("no live channel for owner {owner}")]
    Unreachable { owner: String },

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("delivery failed: {0}")]
    Failed(String),
}

impl SinkError {
    /// Project into the common error taxonomy for surfaces that report
    /// through [`mq_common::Error`].
    pub fn into_error(self, owner: &OwnerId) -> mq_common::Error {
        mq_common::Error::Delivery {
            owner: owner.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Message pushed to a live client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationPayload {
    /// Periodic "how are you feeling?" prompt for one waiting entry.
    CheckIn { entry_id: EntryId, message: String },

    /// Full-queue broadcast after an ordering change.
    QueueUpdate { queue: Vec<QueueStateItem> },
}

impl NotificationPayload {
    /// Build the standard check-in prompt for an entry.
    pub fn check_in_prompt(entry: &QueueEntry) -> Self {
        NotificationPayload::CheckIn {
            entry_id: entry.id.clone(),
            message:
                "How are you feeling? Please let us know if your condition has changed."
                    .to_string(),
        }
    }
}

/// Abstract delivery capability implemented by the transport layer.
///
/// Implementations must be cheap to call and must not panic; the ticker
/// isolates per-entry failures but a well-behaved sink reports them as
/// `SinkError` instead.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, owner: &OwnerId, payload: &NotificationPayload) -> Result<(), SinkError>;
}

/// Deliver with a hard timeout.
///
/// The attempt runs on a short-lived worker thread; if it does not report
/// back within `timeout` the caller moves on and the attempt is treated as
/// failed. An abandoned worker finishes (or fails) in the background — a
/// slow client must not block the next tick.
pub fn deliver_with_timeout(
    sink: &Arc<dyn NotificationSink>,
    owner: &OwnerId,
    payload: &NotificationPayload,
    timeout: Duration,
) -> Result<(), SinkError> {
    let (tx, rx) = mpsc::channel();
    let sink = Arc::clone(sink);
    let owner_clone = owner.clone();
    let payload_clone = payload.clone();

    std::thread::spawn(move || {
        let outcome = sink.deliver(&owner_clone, &payload_clone);
        let _ = tx.send(outcome);
    });

    match rx.recv_timeout(timeout) {
        Ok(outcome) => outcome,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(SinkError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            // The worker died without reporting (sink panicked).
            Err(SinkError::Failed("delivery worker terminated".to_string()))
        }
    }
}

/// In-process sink backed by per-owner mpsc channels.
///
/// Used by tests and embedded deployments; a transport layer would
/// register one channel per connected client and drop it on disconnect.
#[derive(Default)]
pub struct ChannelSink {
    channels: Mutex<HashMap<OwnerId, mpsc::Sender<NotificationPayload>>>,
}

impl ChannelSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live channel for an owner, replacing any previous one.
    pub fn register(&self, owner: OwnerId, sender: mpsc::Sender<NotificationPayload>) {
        self.lock().insert(owner, sender);
    }

    /// Drop an owner's channel; subsequent deliveries fail as unreachable.
    pub fn unregister(&self, owner: &OwnerId) {
        self.lock().remove(owner);
    }

    pub fn registered_len(&self) -> usize {
        self.lock().len()
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<OwnerId, mpsc::Sender<NotificationPayload>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NotificationSink for ChannelSink {
    fn deliver(&self, owner: &OwnerId, payload: &NotificationPayload) -> Result<(), SinkError> {
        let mut channels = self.lock();
        match channels.get(owner) {
            Some(sender) => {
                if sender.send(payload.clone()).is_err() {
                    // Receiver hung up; treat like a disconnect.
                    channels.remove(owner);
                    return Err(SinkError::Unreachable {
                        owner: owner.to_string(),
                    });
                }
                Ok(())
            }
            None => Err(SinkError::Unreachable {
                owner: owner.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(s: &str) -> OwnerId {
        OwnerId(s.to_string())
    }

    fn prompt() -> NotificationPayload {
        NotificationPayload::CheckIn {
            entry_id: EntryId::new(),
            message: "test".into(),
        }
    }

    #[test]
    fn test_channel_sink_roundtrip() {
        let sink = ChannelSink::new();
        let (tx, rx) = mpsc::channel();
        sink.register(owner("a"), tx);

        sink.deliver(&owner("a"), &prompt()).unwrap();
        let received = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(received, NotificationPayload::CheckIn { .. }));
    }

    #[test]
    fn test_channel_sink_unreachable() {
        let sink = ChannelSink::new();
        let err = sink.deliver(&owner("ghost"), &prompt()).unwrap_err();
        assert!(matches!(err, SinkError::Unreachable { .. }));
    }

    #[test]
    fn test_channel_sink_detects_hangup() {
        let sink = ChannelSink::new();
        let (tx, rx) = mpsc::channel();
        sink.register(owner("a"), tx);
        drop(rx);

        let err = sink.deliver(&owner("a"), &prompt()).unwrap_err();
        assert!(matches!(err, SinkError::Unreachable { .. }));
        assert_eq!(sink.registered_len(), 0);
    }

    #[test]
    fn test_deliver_with_timeout_success() {
        let sink: Arc<dyn NotificationSink> = Arc::new(ChannelSink::new());
        // Unreachable owner still resolves within the timeout.
        let err = deliver_with_timeout(
            &sink,
            &owner("ghost"),
            &prompt(),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, SinkError::Unreachable { .. }));
    }

    #[test]
    fn test_deliver_with_timeout_times_out() {
        struct StallingSink;
        impl NotificationSink for StallingSink {
            fn deliver(
                &self,
                _owner: &OwnerId,
                _payload: &NotificationPayload,
            ) -> Result<(), SinkError> {
                std::thread::sleep(Duration::from_secs(5));
                Ok(())
            }
        }

        let sink: Arc<dyn NotificationSink> = Arc::new(StallingSink);
        let err = deliver_with_timeout(
            &sink,
            &owner("slow"),
            &prompt(),
            Duration::from_millis(50),
        )
        .unwrap_err();
        assert!(matches!(err, SinkError::Timeout(_)));
    }

    #[test]
    fn test_sink_error_projects_into_taxonomy() {
        let err = SinkError::Unreachable {
            owner: "a".to_string(),
        }
        .into_error(&owner("a"));
        assert_eq!(err.code(), 30);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_payload_serializes_with_type_tag() {
        let json = serde_json::to_string(&prompt()).unwrap();
        assert!(json.contains(r#""type":"check_in""#));
    }
}
