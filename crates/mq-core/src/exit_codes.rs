//! Exit codes for the mq-core CLI.
//!
//! Exit codes communicate operation outcome without requiring output
//! parsing. Ranges:
//! - 0: success
//! - 10-19: user/environment errors (recoverable by user action)
//! - 20-29: internal errors (bugs, should be reported)

use mq_common::Error;

/// Exit codes for mq-core operations.
///
/// These codes are a stable contract for automation. Changes require a
/// major version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Clean = 0,

    /// Invalid arguments.
    ArgsError = 10,

    /// Input failed validation (bad severity range, bad owner token).
    ValidationError = 11,

    /// Owner already has a waiting entry.
    DuplicateError = 12,

    /// Entry or owner not found / not waiting.
    NotFoundError = 13,

    /// Illegal status transition.
    TransitionError = 14,

    /// Configuration file invalid.
    ConfigError = 15,

    /// Internal error (bug - please report).
    InternalError = 20,

    /// I/O error.
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Map a core error to its exit code.
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::SeverityOutOfRange { .. } | Error::InvalidOwner => ExitCode::ValidationError,
            Error::DuplicateEntry { .. } => ExitCode::DuplicateError,
            Error::EntryNotFound { .. }
            | Error::EntryNotWaiting { .. }
            | Error::OwnerNotWaiting { .. } => ExitCode::NotFoundError,
            Error::InvalidTransition { .. } => ExitCode::TransitionError,
            Error::Delivery { .. } => ExitCode::InternalError,
            Error::Io(_) | Error::Json(_) => ExitCode::IoError,
        }
    }
}
