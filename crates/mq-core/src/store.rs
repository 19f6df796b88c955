//! Authoritative store for waitlist entries.
//!
//! The store owns the set of entries and their check-in history. It is the
//! sole writer of severity, status, and timestamps; the scheduler writes
//! the derived fields (wait, score, position) only through
//! [`QueueStore::apply_updates`].
//!
//! Thread safety: one `RwLock` guards the whole state. Every mutating
//! operation performs its full read-modify-write under the write lock, and
//! `apply_updates` applies its entire batch under a single acquisition, so
//! concurrent readers never observe a partially-assigned position set.
//!
//! Persistence is an optional JSON snapshot: `open` loads it, and every
//! mutation saves it best-effort (tmp file + rename). A failed save is
//! logged and never propagated to the mutation's caller — the in-memory
//! state remains authoritative.

use chrono::{DateTime, Utc};
use mq_common::{
    clamp_severity, severity_in_range, BatchResult, EntryId, EntryStatus, Error, OwnerId, Result,
    SeverityCategory, SCHEMA_VERSION,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// One active (or historical) waitlist membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique, immutable, assigned at creation.
    pub id: EntryId,

    /// Opaque reference to the external patient identity.
    pub owner_id: OwnerId,

    /// Severity score in [1,10]; mutated only by escalation.
    pub severity_score: f64,

    /// Blended priority score; derived, recomputed on every pass.
    pub priority_score: f64,

    /// Urgency band derived from the severity score.
    pub category: SeverityCategory,

    /// Minutes waited; derived view of `now - created_at`.
    pub wait_minutes: f64,

    /// 1-based rank among Waiting entries; 0 until the first recompute.
    pub position: u32,

    /// Lifecycle status; Waiting is the only ranked status.
    pub status: EntryStatus,

    /// Persistent demotion multiplier in (0,1]; 1.0 means none. Folded
    /// into every recompute; reset by escalation.
    pub demotion: f64,

    /// Start of wait-time accrual. Never changes after creation.
    pub created_at: DateTime<Utc>,

    /// Last recorded check-in, if any.
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Minutes elapsed between creation and `now`, never negative.
    pub fn wait_minutes_at(&self, now: DateTime<Utc>) -> f64 {
        let millis = now.signed_duration_since(self.created_at).num_milliseconds();
        (millis.max(0) as f64) / 60_000.0
    }
}

/// Patient answer to a check-in prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInAnswer {
    Better,
    Same,
    Worse,
}

impl CheckInAnswer {
    pub fn name(&self) -> &'static str {
        match self {
            CheckInAnswer::Better => "better",
            CheckInAnswer::Same => "same",
            CheckInAnswer::Worse => "worse",
        }
    }
}

impl std::fmt::Display for CheckInAnswer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CheckInAnswer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "better" => Ok(CheckInAnswer::Better),
            "same" => Ok(CheckInAnswer::Same),
            "worse" => Ok(CheckInAnswer::Worse),
            other => Err(format!("unknown check-in answer: {other}")),
        }
    }
}

/// Inbound check-in response from a prompted patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInResponse {
    pub owner_id: OwnerId,
    pub entry_id: EntryId,
    pub response: CheckInAnswer,
}

/// Historical record of one check-in response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInRecord {
    pub entry_id: EntryId,
    pub owner_id: OwnerId,
    pub response: CheckInAnswer,
    pub recorded_at: DateTime<Utc>,
}

/// One derived-field update produced by a scheduling pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub entry_id: EntryId,
    pub wait_minutes: f64,
    pub priority_score: f64,
    pub position: u32,
}

/// In-memory state behind the store lock.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    entries: HashMap<EntryId, QueueEntry>,
    check_ins: Vec<CheckInRecord>,
}

/// On-disk snapshot envelope.
#[derive(Debug, Serialize, Deserialize)]
struct StoreSnapshot {
    schema_version: String,
    saved_at: String,
    entries: Vec<QueueEntry>,
    check_ins: Vec<CheckInRecord>,
}

/// Authoritative, thread-safe collection of waitlist entries.
#[derive(Debug)]
pub struct QueueStore {
    state: RwLock<StoreState>,
    state_path: Option<PathBuf>,
}

impl QueueStore {
    /// Create an empty store with no persistence.
    pub fn in_memory() -> Self {
        QueueStore {
            state: RwLock::new(StoreState::default()),
            state_path: None,
        }
    }

    /// Open a store backed by a JSON state file.
    ///
    /// A missing file yields an empty store; the file is created on the
    /// first mutation. A present-but-unreadable file is an error — silent
    /// data loss is worse than refusing to start.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let snapshot: StoreSnapshot = serde_json::from_str(&raw)?;
            if snapshot.schema_version != SCHEMA_VERSION {
                warn!(
                    found = %snapshot.schema_version,
                    expected = %SCHEMA_VERSION,
                    "state file schema version mismatch, attempting to use it anyway"
                );
            }
            let entries = snapshot
                .entries
                .into_iter()
                .map(|e| (e.id.clone(), e))
                .collect();
            StoreState {
                entries,
                check_ins: snapshot.check_ins,
            }
        } else {
            StoreState::default()
        };

        Ok(QueueStore {
            state: RwLock::new(state),
            state_path: Some(path),
        })
    }

    /// Create a new Waiting entry for `owner`.
    ///
    /// Fails when the severity score is outside [1,10]. Position starts at
    /// the `0` placeholder and is corrected by the next scheduling pass.
    /// One-Waiting-entry-per-owner is enforced by the scheduler, not here.
    pub fn create(&self, owner: &OwnerId, severity: f64, now: DateTime<Utc>) -> Result<QueueEntry> {
        if !severity_in_range(severity) {
            return Err(Error::SeverityOutOfRange { value: severity });
        }

        let entry = QueueEntry {
            id: EntryId::at(now),
            owner_id: owner.clone(),
            severity_score: severity,
            priority_score: 0.0,
            category: SeverityCategory::from_score(severity),
            wait_minutes: 0.0,
            position: 0,
            status: EntryStatus::Waiting,
            demotion: 1.0,
            created_at: now,
            last_checked_at: None,
        };

        let mut state = self.write();
        state.entries.insert(entry.id.clone(), entry.clone());
        self.save_locked(&state);
        debug!(entry_id = %entry.id, owner = %owner, severity, "entry created");
        Ok(entry)
    }

    /// Fetch an entry by id.
    pub fn get(&self, id: &EntryId) -> Result<QueueEntry> {
        self.read()
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| Error::EntryNotFound {
                entry_id: id.to_string(),
            })
    }

    /// Snapshot of all Waiting entries. Ordering is not guaranteed by this
    /// call alone.
    pub fn list_waiting(&self) -> Vec<QueueEntry> {
        self.read()
            .entries
            .values()
            .filter(|e| e.status.is_waiting())
            .cloned()
            .collect()
    }

    /// The owner's single current Waiting entry, if any.
    pub fn find_by_owner(&self, owner: &OwnerId) -> Option<QueueEntry> {
        self.read()
            .entries
            .values()
            .find(|e| e.status.is_waiting() && e.owner_id == *owner)
            .cloned()
    }

    /// Apply a batch of derived-field updates from a scheduling pass.
    ///
    /// The whole batch is applied under one write-lock acquisition, so
    /// readers see either the previous position assignment or the new one,
    /// never a mix. A stale id (entry withdrawn since the pass read its
    /// snapshot) is skipped and reported; it does not abort the batch.
    pub fn apply_updates(&self, updates: &[EntryUpdate]) -> BatchResult<EntryId> {
        let mut result = BatchResult::default();
        let mut state = self.write();

        for update in updates {
            match state.entries.get_mut(&update.entry_id) {
                Some(entry) if entry.status.is_waiting() => {
                    entry.wait_minutes = update.wait_minutes;
                    entry.priority_score = update.priority_score;
                    entry.position = update.position;
                    result.add_success(update.entry_id.clone());
                }
                Some(_) => {
                    result.add_failure(
                        update.entry_id.to_string(),
                        &Error::EntryNotWaiting {
                            entry_id: update.entry_id.to_string(),
                        },
                    );
                }
                None => {
                    result.add_failure(
                        update.entry_id.to_string(),
                        &Error::EntryNotFound {
                            entry_id: update.entry_id.to_string(),
                        },
                    );
                }
            }
        }

        self.save_locked(&state);
        result
    }

    /// Transition an entry's status.
    ///
    /// Only `Waiting -> {InProgress, Completed, Cancelled}` is legal;
    /// terminal statuses are sinks.
    pub fn set_status(&self, id: &EntryId, new_status: EntryStatus) -> Result<QueueEntry> {
        let mut state = self.write();
        let entry = state
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::EntryNotFound {
                entry_id: id.to_string(),
            })?;

        if !entry.status.can_transition_to(new_status) {
            return Err(Error::InvalidTransition {
                from: entry.status,
                to: new_status,
            });
        }

        entry.status = new_status;
        // A non-waiting entry no longer holds a rank.
        entry.position = 0;
        let updated = entry.clone();
        self.save_locked(&state);
        debug!(entry_id = %id, status = %new_status, "status transition");
        Ok(updated)
    }

    /// Set a Waiting entry's severity (clamped), refresh its category,
    /// clear its demotion multiplier, and stamp `last_checked_at`.
    ///
    /// Escalation is the natural severity change that makes an earlier
    /// voluntary demotion obsolete, hence the reset.
    pub fn update_severity(
        &self,
        id: &EntryId,
        new_severity: f64,
        now: DateTime<Utc>,
    ) -> Result<QueueEntry> {
        let mut state = self.write();
        let entry = Self::waiting_entry_mut(&mut state, id)?;

        entry.severity_score = clamp_severity(new_severity);
        entry.category = SeverityCategory::from_score(entry.severity_score);
        entry.demotion = 1.0;
        entry.last_checked_at = Some(now);
        let updated = entry.clone();
        self.save_locked(&state);
        Ok(updated)
    }

    /// Fold one more voluntary demotion into a Waiting entry's multiplier.
    pub fn apply_demotion(&self, id: &EntryId, factor: f64) -> Result<QueueEntry> {
        let mut state = self.write();
        let entry = Self::waiting_entry_mut(&mut state, id)?;

        if factor > 0.0 && factor <= 1.0 {
            entry.demotion *= factor;
        }
        let updated = entry.clone();
        self.save_locked(&state);
        Ok(updated)
    }

    /// Record a successful check-in prompt delivery.
    pub fn mark_checked(&self, id: &EntryId, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.write();
        let entry = Self::waiting_entry_mut(&mut state, id)?;
        entry.last_checked_at = Some(now);
        self.save_locked(&state);
        Ok(())
    }

    /// Append a check-in response to the history and stamp the entry.
    ///
    /// The owner on the response must match the entry; a mismatch is
    /// reported as the entry not being found rather than leaking whose
    /// entry the id belongs to.
    pub fn record_check_in(
        &self,
        response: &CheckInResponse,
        now: DateTime<Utc>,
    ) -> Result<QueueEntry> {
        let mut state = self.write();
        let entry = state
            .entries
            .get_mut(&response.entry_id)
            .filter(|e| e.owner_id == response.owner_id)
            .ok_or_else(|| Error::EntryNotFound {
                entry_id: response.entry_id.to_string(),
            })?;

        if entry.status.is_waiting() {
            entry.last_checked_at = Some(now);
        }
        let snapshot = entry.clone();

        state.check_ins.push(CheckInRecord {
            entry_id: response.entry_id.clone(),
            owner_id: response.owner_id.clone(),
            response: response.response,
            recorded_at: now,
        });
        self.save_locked(&state);
        Ok(snapshot)
    }

    /// Check-in history for one entry, oldest first.
    pub fn check_in_history(&self, id: &EntryId) -> Vec<CheckInRecord> {
        self.read()
            .check_ins
            .iter()
            .filter(|r| r.entry_id == *id)
            .cloned()
            .collect()
    }

    /// Total entries, any status.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Count of Waiting entries.
    pub fn waiting_len(&self) -> usize {
        self.read()
            .entries
            .values()
            .filter(|e| e.status.is_waiting())
            .count()
    }

    fn waiting_entry_mut<'a>(
        state: &'a mut StoreState,
        id: &EntryId,
    ) -> Result<&'a mut QueueEntry> {
        match state.entries.get_mut(id) {
            Some(entry) if entry.status.is_waiting() => Ok(entry),
            Some(_) => Err(Error::EntryNotWaiting {
                entry_id: id.to_string(),
            }),
            None => Err(Error::EntryNotFound {
                entry_id: id.to_string(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Best-effort snapshot save, called with the write lock held so the
    /// file always reflects a consistent state.
    fn save_locked(&self, state: &StoreState) {
        let Some(ref path) = self.state_path else {
            return;
        };
        if let Err(err) = Self::write_snapshot(path, state) {
            warn!(path = %path.display(), error = %err, "failed to save queue state");
        }
    }

    fn write_snapshot(path: &Path, state: &StoreState) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let snapshot = StoreSnapshot {
            schema_version: SCHEMA_VERSION.to_string(),
            saved_at: Utc::now().to_rfc3339(),
            entries: state.entries.values().cloned().collect(),
            check_ins: state.check_ins.clone(),
        };

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&snapshot)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(s: &str) -> OwnerId {
        OwnerId(s.to_string())
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_create_validates_severity() {
        let store = QueueStore::in_memory();
        let err = store.create(&owner("a"), 0.5, now()).unwrap_err();
        assert!(matches!(err, Error::SeverityOutOfRange { .. }));

        let err = store.create(&owner("a"), 10.5, now()).unwrap_err();
        assert!(matches!(err, Error::SeverityOutOfRange { .. }));

        let entry = store.create(&owner("a"), 7.0, now()).unwrap();
        assert_eq!(entry.status, EntryStatus::Waiting);
        assert_eq!(entry.position, 0);
        assert_eq!(entry.demotion, 1.0);
        assert_eq!(entry.category, SeverityCategory::High);
    }

    #[test]
    fn test_find_by_owner_only_waiting() {
        let store = QueueStore::in_memory();
        let entry = store.create(&owner("a"), 5.0, now()).unwrap();
        assert!(store.find_by_owner(&owner("a")).is_some());
        assert!(store.find_by_owner(&owner("b")).is_none());

        store.set_status(&entry.id, EntryStatus::Completed).unwrap();
        assert!(store.find_by_owner(&owner("a")).is_none());
    }

    #[test]
    fn test_status_machine() {
        let store = QueueStore::in_memory();
        let entry = store.create(&owner("a"), 5.0, now()).unwrap();

        let updated = store.set_status(&entry.id, EntryStatus::Completed).unwrap();
        assert_eq!(updated.status, EntryStatus::Completed);
        assert_eq!(updated.position, 0);

        let err = store
            .set_status(&entry.id, EntryStatus::Waiting)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn test_apply_updates_skips_stale_ids() {
        let store = QueueStore::in_memory();
        let a = store.create(&owner("a"), 5.0, now()).unwrap();
        let b = store.create(&owner("b"), 6.0, now()).unwrap();
        store.set_status(&b.id, EntryStatus::Cancelled).unwrap();

        let gone = EntryId::new();
        let updates = vec![
            EntryUpdate {
                entry_id: a.id.clone(),
                wait_minutes: 1.0,
                priority_score: 3.5,
                position: 1,
            },
            EntryUpdate {
                entry_id: b.id.clone(),
                wait_minutes: 1.0,
                priority_score: 4.2,
                position: 2,
            },
            EntryUpdate {
                entry_id: gone.clone(),
                wait_minutes: 1.0,
                priority_score: 1.0,
                position: 3,
            },
        ];

        let result = store.apply_updates(&updates);
        assert_eq!(result.summary.succeeded, 1);
        assert_eq!(result.summary.failed, 2);
        assert!(result.summary.any_succeeded);

        let refreshed = store.get(&a.id).unwrap();
        assert_eq!(refreshed.position, 1);
        assert_eq!(refreshed.priority_score, 3.5);
    }

    #[test]
    fn test_update_severity_clamps_and_resets_demotion() {
        let store = QueueStore::in_memory();
        let entry = store.create(&owner("a"), 9.5, now()).unwrap();
        store.apply_demotion(&entry.id, 0.8).unwrap();

        let t = now();
        let updated = store.update_severity(&entry.id, 10.5, t).unwrap();
        assert_eq!(updated.severity_score, 10.0);
        assert_eq!(updated.category, SeverityCategory::Critical);
        assert_eq!(updated.demotion, 1.0);
        assert_eq!(updated.last_checked_at, Some(t));
    }

    #[test]
    fn test_apply_demotion_stacks() {
        let store = QueueStore::in_memory();
        let entry = store.create(&owner("a"), 5.0, now()).unwrap();

        let once = store.apply_demotion(&entry.id, 0.8).unwrap();
        assert!((once.demotion - 0.8).abs() < 1e-9);

        let twice = store.apply_demotion(&entry.id, 0.8).unwrap();
        assert!((twice.demotion - 0.64).abs() < 1e-9);

        // Bad factors are ignored, never amplify.
        let unchanged = store.apply_demotion(&entry.id, 1.5).unwrap();
        assert!((unchanged.demotion - 0.64).abs() < 1e-9);
    }

    #[test]
    fn test_mutations_require_waiting() {
        let store = QueueStore::in_memory();
        let entry = store.create(&owner("a"), 5.0, now()).unwrap();
        store.set_status(&entry.id, EntryStatus::Completed).unwrap();

        assert!(matches!(
            store.update_severity(&entry.id, 6.0, now()),
            Err(Error::EntryNotWaiting { .. })
        ));
        assert!(matches!(
            store.apply_demotion(&entry.id, 0.8),
            Err(Error::EntryNotWaiting { .. })
        ));
        assert!(matches!(
            store.mark_checked(&entry.id, now()),
            Err(Error::EntryNotWaiting { .. })
        ));
    }

    #[test]
    fn test_record_check_in_owner_mismatch() {
        let store = QueueStore::in_memory();
        let entry = store.create(&owner("a"), 5.0, now()).unwrap();

        let response = CheckInResponse {
            owner_id: owner("intruder"),
            entry_id: entry.id.clone(),
            response: CheckInAnswer::Worse,
        };
        assert!(matches!(
            store.record_check_in(&response, now()),
            Err(Error::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_record_check_in_appends_history() {
        let store = QueueStore::in_memory();
        let entry = store.create(&owner("a"), 5.0, now()).unwrap();

        for answer in [CheckInAnswer::Same, CheckInAnswer::Worse] {
            let response = CheckInResponse {
                owner_id: owner("a"),
                entry_id: entry.id.clone(),
                response: answer,
            };
            store.record_check_in(&response, now()).unwrap();
        }

        let history = store.check_in_history(&entry.id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].response, CheckInAnswer::Same);
        assert_eq!(history[1].response, CheckInAnswer::Worse);

        let refreshed = store.get(&entry.id).unwrap();
        assert!(refreshed.last_checked_at.is_some());
    }

    #[test]
    fn test_check_in_answer_from_str() {
        assert_eq!("worse".parse::<CheckInAnswer>(), Ok(CheckInAnswer::Worse));
        assert_eq!(" Better ".parse::<CheckInAnswer>(), Ok(CheckInAnswer::Better));
        assert!("awful".parse::<CheckInAnswer>().is_err());
    }

    #[test]
    fn test_wait_minutes_at_never_negative() {
        let store = QueueStore::in_memory();
        let t = now();
        let entry = store.create(&owner("a"), 5.0, t).unwrap();
        assert_eq!(entry.wait_minutes_at(t - chrono::Duration::minutes(5)), 0.0);
        let elapsed = entry.wait_minutes_at(t + chrono::Duration::minutes(90));
        assert!((elapsed - 90.0).abs() < 1e-6);
    }
}
