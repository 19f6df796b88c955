//! Queue scheduler: the orchestration core.
//!
//! All ordering guarantees live here. The store serializes individual
//! field writes; this module adds the global discipline on top:
//!
//! - An ordering mutex is held across every scheduling pass and across
//!   every compound operation that ends in one, so two concurrent
//!   recomputes can never interleave their position writes.
//! - Positions are written only by [`QueueScheduler::recompute_at`], as a
//!   single store batch, so readers see either the old assignment or the
//!   new one.
//!
//! Position-reporting operations recompute first: wait time has advanced
//! since the last pass, and freshness wins over cheap reads.

use crate::priority;
use crate::store::{CheckInAnswer, CheckInResponse, EntryUpdate, QueueEntry, QueueStore};
use chrono::{DateTime, Utc};
use mq_common::{
    BatchResult, EntryId, EntryStatus, Error, OwnerId, Result, SeverityCategory,
};
use mq_config::ScheduleConfig;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// One row of the consumer-facing queue snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStateItem {
    pub entry_id: EntryId,
    pub owner_id: OwnerId,
    pub position: u32,
    pub severity_score: f64,
    pub category: SeverityCategory,
    pub wait_minutes: f64,
    pub created_at: DateTime<Utc>,
    pub estimated_wait_minutes: u32,
}

impl QueueStateItem {
    fn from_entry(entry: &QueueEntry) -> Self {
        QueueStateItem {
            entry_id: entry.id.clone(),
            owner_id: entry.owner_id.clone(),
            position: entry.position,
            severity_score: entry.severity_score,
            category: entry.category,
            wait_minutes: (entry.wait_minutes * 10.0).round() / 10.0,
            created_at: entry.created_at,
            estimated_wait_minutes: priority::estimated_wait_minutes(entry.position),
        }
    }
}

/// Orchestrates scoring and ranking over the shared [`QueueStore`].
pub struct QueueScheduler {
    store: Arc<QueueStore>,
    config: ScheduleConfig,
    /// Global ordering lock; see module docs.
    order_lock: Mutex<()>,
}

impl QueueScheduler {
    pub fn new(store: Arc<QueueStore>, config: ScheduleConfig) -> Self {
        QueueScheduler {
            store,
            config,
            order_lock: Mutex::new(()),
        }
    }

    /// The shared store this scheduler orchestrates.
    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    /// Admit an owner into the queue and return their entry with its final
    /// position.
    pub fn admit(&self, owner: &OwnerId, severity: f64) -> Result<QueueEntry> {
        self.admit_at(owner, severity, Utc::now())
    }

    pub fn admit_at(
        &self,
        owner: &OwnerId,
        severity: f64,
        now: DateTime<Utc>,
    ) -> Result<QueueEntry> {
        let _guard = self.lock_order();

        if self.store.find_by_owner(owner).is_some() {
            return Err(Error::DuplicateEntry {
                owner: owner.to_string(),
            });
        }

        let entry = self.store.create(owner, severity, now)?;
        self.recompute_locked(now);
        let admitted = self.store.get(&entry.id)?;
        info!(
            entry_id = %admitted.id,
            owner = %owner,
            severity,
            position = admitted.position,
            "admitted to queue"
        );
        Ok(admitted)
    }

    /// Full scheduling pass: refresh wait times and scores, re-rank the
    /// whole Waiting set, persist positions.
    pub fn recompute(&self) -> BatchResult<EntryId> {
        self.recompute_at(Utc::now())
    }

    pub fn recompute_at(&self, now: DateTime<Utc>) -> BatchResult<EntryId> {
        let _guard = self.lock_order();
        self.recompute_locked(now)
    }

    /// Voluntary demotion. Returns `Ok(false)` when the owner has no
    /// Waiting entry — an expected no-op, not a failure.
    pub fn self_lower(&self, owner: &OwnerId) -> Result<bool> {
        self.self_lower_at(owner, Utc::now())
    }

    pub fn self_lower_at(&self, owner: &OwnerId, now: DateTime<Utc>) -> Result<bool> {
        let _guard = self.lock_order();

        let Some(entry) = self.store.find_by_owner(owner) else {
            return Ok(false);
        };

        match self
            .store
            .apply_demotion(&entry.id, self.config.self_lower_damping)
        {
            Ok(updated) => {
                debug!(
                    entry_id = %entry.id,
                    demotion = updated.demotion,
                    "self-lower applied"
                );
            }
            // Raced with a withdrawal between lookup and demotion.
            Err(Error::EntryNotFound { .. }) | Err(Error::EntryNotWaiting { .. }) => {
                return Ok(false);
            }
            Err(err) => return Err(err),
        }

        self.recompute_locked(now);
        Ok(true)
    }

    /// Escalation from a worsening check-in: bump severity one step
    /// (clamped to 10), stamp the check-in time, re-rank.
    pub fn escalate(&self, entry_id: &EntryId) -> Result<QueueEntry> {
        self.escalate_at(entry_id, Utc::now())
    }

    pub fn escalate_at(&self, entry_id: &EntryId, now: DateTime<Utc>) -> Result<QueueEntry> {
        let _guard = self.lock_order();

        let entry = self.store.get(entry_id)?;
        if !entry.status.is_waiting() {
            return Err(Error::EntryNotWaiting {
                entry_id: entry_id.to_string(),
            });
        }

        let escalated = self
            .store
            .update_severity(entry_id, entry.severity_score + 1.0, now)?;
        info!(
            entry_id = %entry_id,
            severity = escalated.severity_score,
            "severity escalated"
        );

        self.recompute_locked(now);
        self.store.get(entry_id)
    }

    /// Handle an inbound check-in response. Only `Worse` escalates; other
    /// answers just stamp `last_checked_at` and the history.
    pub fn record_check_in_response(&self, response: &CheckInResponse) -> Result<QueueEntry> {
        self.record_check_in_response_at(response, Utc::now())
    }

    pub fn record_check_in_response_at(
        &self,
        response: &CheckInResponse,
        now: DateTime<Utc>,
    ) -> Result<QueueEntry> {
        let entry = self.store.record_check_in(response, now)?;

        if response.response == CheckInAnswer::Worse && entry.status.is_waiting() {
            return self.escalate_at(&response.entry_id, now);
        }
        Ok(entry)
    }

    /// Remove an owner's Waiting entry as Completed, closing the rank gap.
    pub fn withdraw(&self, owner: &OwnerId) -> Result<QueueEntry> {
        self.withdraw_as_at(owner, EntryStatus::Completed, Utc::now())
    }

    /// Remove an owner's Waiting entry into the given terminal status
    /// (Completed or Cancelled).
    pub fn withdraw_as_at(
        &self,
        owner: &OwnerId,
        terminal: EntryStatus,
        now: DateTime<Utc>,
    ) -> Result<QueueEntry> {
        if !matches!(terminal, EntryStatus::Completed | EntryStatus::Cancelled) {
            return Err(Error::InvalidTransition {
                from: EntryStatus::Waiting,
                to: terminal,
            });
        }

        let _guard = self.lock_order();

        let entry = self
            .store
            .find_by_owner(owner)
            .ok_or_else(|| Error::OwnerNotWaiting {
                owner: owner.to_string(),
            })?;

        let withdrawn = self.store.set_status(&entry.id, terminal)?;
        self.recompute_locked(now);
        info!(entry_id = %withdrawn.id, owner = %owner, status = %terminal, "withdrawn from queue");
        Ok(withdrawn)
    }

    /// Current position for an owner, after a fresh scheduling pass.
    pub fn position_of(&self, owner: &OwnerId) -> Option<u32> {
        self.position_of_at(owner, Utc::now())
    }

    pub fn position_of_at(&self, owner: &OwnerId, now: DateTime<Utc>) -> Option<u32> {
        {
            let _guard = self.lock_order();
            self.recompute_locked(now);
        }
        self.store.find_by_owner(owner).map(|e| e.position)
    }

    /// Consumer-facing queue snapshot, ascending by position, after a
    /// fresh scheduling pass.
    pub fn queue_state(&self) -> Vec<QueueStateItem> {
        self.queue_state_at(Utc::now())
    }

    pub fn queue_state_at(&self, now: DateTime<Utc>) -> Vec<QueueStateItem> {
        {
            let _guard = self.lock_order();
            self.recompute_locked(now);
        }

        let mut waiting = self.store.list_waiting();
        waiting.sort_by_key(|e| e.position);
        waiting.iter().map(QueueStateItem::from_entry).collect()
    }

    /// The scheduling pass proper. Caller must hold the ordering lock.
    fn recompute_locked(&self, now: DateTime<Utc>) -> BatchResult<EntryId> {
        let waiting = self.store.list_waiting();

        let mut ranked: Vec<(EntryId, f64, f64, DateTime<Utc>)> = waiting
            .iter()
            .map(|e| {
                let wait = e.wait_minutes_at(now);
                let score = priority::demoted_score(
                    priority::priority_score(e.severity_score, wait, &self.config),
                    e.demotion,
                );
                (e.id.clone(), wait, score, e.created_at)
            })
            .collect();

        // Score descending; earlier arrival wins ties; entry id as a final
        // deterministic tie-break for same-instant arrivals.
        ranked.sort_by(|a, b| match b.2.total_cmp(&a.2) {
            Ordering::Equal => a
                .3
                .cmp(&b.3)
                .then_with(|| a.0.as_str().cmp(b.0.as_str())),
            other => other,
        });

        let updates: Vec<EntryUpdate> = ranked
            .into_iter()
            .enumerate()
            .map(|(index, (entry_id, wait_minutes, priority_score, _))| EntryUpdate {
                entry_id,
                wait_minutes,
                priority_score,
                position: (index + 1) as u32,
            })
            .collect();

        let result = self.store.apply_updates(&updates);
        debug!(
            waiting = updates.len(),
            applied = result.summary.succeeded,
            skipped = result.summary.failed,
            "scheduling pass complete"
        );
        result
    }

    fn lock_order(&self) -> MutexGuard<'_, ()> {
        self.order_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
