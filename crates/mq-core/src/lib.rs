//! MediQueue Core Library
//!
//! This library provides the core functionality for the triage waitlist:
//! - Blended priority scoring (severity + accrued wait time)
//! - The authoritative queue store with status machine and persistence
//! - The scheduling pass that keeps positions globally consistent
//! - The periodic check-in ticker with escalation on worsening
//! - Triage guidance helpers (emergency screen, care recommendations)
//!
//! The binary entry point is in `main.rs`.

pub mod checkin;
pub mod exit_codes;
pub mod logging;
pub mod notify;
pub mod priority;
pub mod scheduler;
pub mod store;
pub mod triage;

pub use checkin::{CheckInTicker, TickOutcome, TickerHandle, TickerState};
pub use notify::{ChannelSink, NotificationPayload, NotificationSink, SinkError};
pub use scheduler::{QueueScheduler, QueueStateItem};
pub use store::{CheckInAnswer, CheckInRecord, CheckInResponse, EntryUpdate, QueueEntry, QueueStore};
pub use triage::Assessment;
