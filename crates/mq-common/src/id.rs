//! Entry and owner identity types.
//!
//! A waitlist entry is identified by an [`EntryId`] minted at creation time;
//! the patient behind it is referenced through an opaque [`OwnerId`] token
//! issued by the surrounding account/session layer. The core never
//! interprets owner tokens beyond equality and lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque owner token referencing an external patient identity.
///
/// Lookup-only: the core holds no account state for an owner. Tokens are
/// non-empty strings with no surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    /// Validate and wrap an owner token. Returns `None` for empty or
    /// whitespace-only input.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(OwnerId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Waitlist entry ID.
///
/// Format: `wq-YYYYMMDD-HHMMSS-XXXX`
/// Example: `wq-20260115-143022-a7xq`
///
/// The timestamp component is the creation instant (UTC); the suffix is a
/// 4-character base32 tail drawn from a v4 UUID, so two entries created in
/// the same second remain distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    /// Mint a new entry ID stamped with the current instant.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Mint a new entry ID stamped with the given creation instant.
    pub fn at(created_at: DateTime<Utc>) -> Self {
        let suffix = generate_base32_suffix();
        EntryId(format!(
            "wq-{}-{}-{}",
            created_at.format("%Y%m%d"),
            created_at.format("%H%M%S"),
            suffix
        ))
    }

    /// Parse an existing entry ID string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 23 {
            return None;
        }
        let bytes = s.as_bytes();
        if bytes.first() != Some(&b'w')
            || bytes.get(1) != Some(&b'q')
            || bytes.get(2) != Some(&b'-')
            || bytes.get(11) != Some(&b'-')
            || bytes.get(18) != Some(&b'-')
        {
            return None;
        }
        let date = &s[3..11];
        let time = &s[12..18];
        let suffix = &s[19..23];
        if !date.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !time.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !suffix.chars().all(|c| matches!(c, 'a'..='z' | '2'..='7')) {
            return None;
        }
        Some(EntryId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn generate_base32_suffix() -> String {
    const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";
    let uuid = uuid::Uuid::new_v4();
    let mut value = u32::from_be_bytes([0, uuid.as_bytes()[13], uuid.as_bytes()[14], uuid.as_bytes()[15]]);
    let mut out = [0u8; 4];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(value & 0x1F) as usize];
        value >>= 5;
    }
    String::from_utf8_lossy(&out).into_owned()
}
