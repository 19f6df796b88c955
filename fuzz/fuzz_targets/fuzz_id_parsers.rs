#![no_main]

use libfuzzer_sys::fuzz_target;
use mq_common::{EntryId, OwnerId};
use mq_core::store::CheckInAnswer;

fuzz_target!(|data: &str| {
    // Identifier parsing is total: accept or reject, never panic.
    if let Some(id) = EntryId::parse(data) {
        // Accepted ids round-trip through their string form.
        assert_eq!(EntryId::parse(id.as_str()), Some(id));
    }

    if let Some(owner) = OwnerId::parse(data) {
        assert!(!owner.as_str().is_empty());
    }

    let _ = data.parse::<CheckInAnswer>();
});
