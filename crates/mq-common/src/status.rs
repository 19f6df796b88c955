//! Waitlist entry status machine.
//!
//! `Waiting` is the only status the scheduler reorders. The three terminal
//! statuses are sinks: once an entry leaves `Waiting` it is retained for
//! history but never re-ranked or revived.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a waitlist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// In the queue, actively ranked.
    Waiting,
    /// Being seen by staff.
    InProgress,
    /// Seen and done.
    Completed,
    /// Left or was removed before being seen.
    Cancelled,
}

impl EntryStatus {
    /// Returns true for statuses that can never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EntryStatus::InProgress | EntryStatus::Completed | EntryStatus::Cancelled
        )
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, EntryStatus::Waiting)
    }

    /// Check whether a transition to `next` is legal.
    ///
    /// Only `Waiting -> {InProgress, Completed, Cancelled}` is allowed;
    /// self-transitions are not.
    pub fn can_transition_to(&self, next: EntryStatus) -> bool {
        matches!(
            (self, next),
            (
                EntryStatus::Waiting,
                EntryStatus::InProgress | EntryStatus::Completed | EntryStatus::Cancelled
            )
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            EntryStatus::Waiting => "waiting",
            EntryStatus::InProgress => "in_progress",
            EntryStatus::Completed => "completed",
            EntryStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
