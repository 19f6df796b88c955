//! Triage guidance helpers and the classifier inbound contract.
//!
//! The conversational severity classifier is an external collaborator; its
//! output reaches this crate only as an [`Assessment`]. What lives here is
//! the deterministic guidance derived from that output: the emergency
//! screen applied to the symptom summary and the per-category care
//! recommendation shown alongside a queue position.

use mq_common::{severity_in_range, Error, Result, SeverityCategory};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Severity at or above which a case is an emergency regardless of wording.
const EMERGENCY_SEVERITY_FLOOR: f64 = 9.0;

/// Phrases that mark a symptom summary as an emergency on sight.
const EMERGENCY_KEYWORDS: &[&str] = &[
    "chest pain",
    "difficulty breathing",
    "can't breathe",
    "choking",
    "severe pain",
    "unconscious",
    "severe bleeding",
    "heart attack",
    "stroke",
    "seizure",
    "severe allergic reaction",
    "overdose",
];

static EMERGENCY_RE: OnceLock<Regex> = OnceLock::new();

fn emergency_regex() -> &'static Regex {
    EMERGENCY_RE.get_or_init(|| {
        let alternation = EMERGENCY_KEYWORDS
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        // Keywords are fixed at compile time, so this cannot fail.
        Regex::new(&format!("(?i){alternation}")).expect("emergency keyword regex")
    })
}

/// Result of the external severity classifier for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    /// Severity score in [1,10].
    pub severity_score: f64,

    /// Category label as reported by the classifier (informational; the
    /// engine derives its own category from the score).
    pub category: String,

    /// Free-text symptom summary.
    pub summary: String,
}

impl Assessment {
    /// Validate the inbound score range.
    pub fn validate(&self) -> Result<()> {
        if !severity_in_range(self.severity_score) {
            return Err(Error::SeverityOutOfRange {
                value: self.severity_score,
            });
        }
        Ok(())
    }

    /// Whether this assessment should bypass the queue entirely.
    pub fn is_emergency(&self) -> bool {
        is_emergency(&self.summary, self.severity_score)
    }
}

/// Check if a case is an emergency: keyword hit in the summary text, or a
/// severity at the top of the scale.
pub fn is_emergency(summary: &str, severity_score: f64) -> bool {
    if severity_score >= EMERGENCY_SEVERITY_FLOOR {
        return true;
    }
    emergency_regex().is_match(summary)
}

/// Care recommendation for a severity category.
pub fn care_recommendation(category: SeverityCategory) -> &'static str {
    match category {
        SeverityCategory::Critical => {
            "Please go to the emergency room immediately or call 911."
        }
        SeverityCategory::High => "Please visit urgent care within the next hour.",
        SeverityCategory::Medium => "Schedule an appointment within 24 hours.",
        SeverityCategory::Low => {
            "You can manage this at home with self-care. Monitor your symptoms."
        }
    }
}
