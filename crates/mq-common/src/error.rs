//! Error types for MediQueue.
//!
//! Structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for callers
//!
//! Validation and lookup errors surface to the immediate caller; the
//! request layer translates them to user-facing failures. Delivery
//! failures are confined to the check-in ticker, which logs them per entry
//! and retries on the next firing.
//!
//! Errors serialize to structured JSON for agent-facing surfaces:
//! ```json
//! {
//!   "code": 20,
//!   "category": "queue",
//!   "message": "owner patient-42 already has a waiting entry",
//!   "recoverable": true,
//!   "context": { "owner": "patient-42" }
//! }
//! ```

use crate::status::EntryStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for MediQueue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input at the admission boundary.
    Validation,
    /// Queue membership and status machine errors.
    Queue,
    /// Check-in prompt delivery errors.
    Notify,
    /// State file I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Queue => write!(f, "queue"),
            ErrorCategory::Notify => write!(f, "notify"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for MediQueue.
#[derive(Error, Debug)]
pub enum Error {
    // Validation errors (10-19)
    #[error("severity score {value} outside allowed range [1,10]")]
    SeverityOutOfRange { value: f64 },

    #[error("owner token is empty or invalid")]
    InvalidOwner,

    // Queue errors (20-29)
    #[error("owner {owner} already has a waiting entry")]
    DuplicateEntry { owner: String },

    #[error("entry {entry_id} not found")]
    EntryNotFound { entry_id: String },

    #[error("no waiting entry for {entry_id}")]
    EntryNotWaiting { entry_id: String },

    #[error("illegal status transition: {from} -> {to}")]
    InvalidTransition { from: EntryStatus, to: EntryStatus },

    #[error("no waiting entry for owner {owner}")]
    OwnerNotWaiting { owner: String },

    // Notification errors (30-39)
    #[error("check-in delivery to owner {owner} failed: {reason}")]
    Delivery { owner: String, reason: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Validation errors
    /// - 20-29: Queue errors
    /// - 30-39: Notification errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::SeverityOutOfRange { .. } => 10,
            Error::InvalidOwner => 11,
            Error::DuplicateEntry { .. } => 20,
            Error::EntryNotFound { .. } => 21,
            Error::EntryNotWaiting { .. } => 22,
            Error::InvalidTransition { .. } => 23,
            Error::OwnerNotWaiting { .. } => 24,
            Error::Delivery { .. } => 30,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::SeverityOutOfRange { .. } | Error::InvalidOwner => ErrorCategory::Validation,

            Error::DuplicateEntry { .. }
            | Error::EntryNotFound { .. }
            | Error::EntryNotWaiting { .. }
            | Error::InvalidTransition { .. }
            | Error::OwnerNotWaiting { .. } => ErrorCategory::Queue,

            Error::Delivery { .. } => ErrorCategory::Notify,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable by the caller.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Fixable by re-submitting corrected input.
            Error::SeverityOutOfRange { .. } => true,
            Error::InvalidOwner => true,

            // The owner already holds a ticket; callers treat this as "you
            // are already in the queue".
            Error::DuplicateEntry { .. } => true,

            // The entry is gone; nothing to retry against.
            Error::EntryNotFound { .. } => false,

            // Expected no-op when the patient already left the queue.
            Error::EntryNotWaiting { .. } => true,
            Error::OwnerNotWaiting { .. } => true,

            // The status machine is intentional.
            Error::InvalidTransition { .. } => false,

            // Retried on the next ticker firing.
            Error::Delivery { .. } => true,

            // Often transient.
            Error::Io(_) => true,
            Error::Json(_) => true,
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::SeverityOutOfRange { .. } => "Severity Out of Range",
            Error::InvalidOwner => "Invalid Owner Token",
            Error::DuplicateEntry { .. } => "Already in Queue",
            Error::EntryNotFound { .. } => "Entry Not Found",
            Error::EntryNotWaiting { .. } => "No Waiting Entry",
            Error::InvalidTransition { .. } => "Illegal Status Transition",
            Error::OwnerNotWaiting { .. } => "No Waiting Entry",
            Error::Delivery { .. } => "Check-In Delivery Failed",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., owner, entry_id).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::SeverityOutOfRange { value } => {
                context.insert("value".to_string(), serde_json::json!(value));
            }
            Error::DuplicateEntry { owner } => {
                context.insert("owner".to_string(), serde_json::json!(owner));
            }
            Error::EntryNotFound { entry_id } | Error::EntryNotWaiting { entry_id } => {
                context.insert("entry_id".to_string(), serde_json::json!(entry_id));
            }
            Error::InvalidTransition { from, to } => {
                context.insert("from".to_string(), serde_json::json!(from));
                context.insert("to".to_string(), serde_json::json!(to));
            }
            Error::OwnerNotWaiting { owner } | Error::Delivery { owner, .. } => {
                context.insert("owner".to_string(), serde_json::json!(owner));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Result of a batch operation that may have partial success.
///
/// Used by the scheduler's recompute pass: one concurrently-withdrawn entry
/// must not invalidate the recomputed positions for everyone else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult<T> {
    /// Successfully completed items.
    pub succeeded: Vec<T>,

    /// Failed items with their errors.
    pub failed: Vec<BatchError>,

    /// Summary statistics.
    pub summary: BatchSummary,
}

/// A single error in a batch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Identifier of the failed item.
    pub item_id: String,

    /// The structured error.
    pub error: StructuredError,
}

/// Summary of batch operation results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub all_succeeded: bool,
    pub any_succeeded: bool,
}

impl<T> BatchResult<T> {
    pub fn new(succeeded: Vec<T>, failed: Vec<BatchError>) -> Self {
        let total = succeeded.len() + failed.len();
        let succeeded_count = succeeded.len();
        let failed_count = failed.len();

        BatchResult {
            succeeded,
            failed,
            summary: BatchSummary {
                total,
                succeeded: succeeded_count,
                failed: failed_count,
                all_succeeded: failed_count == 0,
                any_succeeded: succeeded_count > 0,
            },
        }
    }

    pub fn add_success(&mut self, item: T) {
        self.succeeded.push(item);
        self.summary.succeeded += 1;
        self.summary.total += 1;
        self.summary.any_succeeded = true;
    }

    pub fn add_failure(&mut self, item_id: impl Into<String>, error: &Error) {
        self.failed.push(BatchError {
            item_id: item_id.into(),
            error: StructuredError::from(error),
        });
        self.summary.failed += 1;
        self.summary.total += 1;
        self.summary.all_succeeded = false;
    }
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}
