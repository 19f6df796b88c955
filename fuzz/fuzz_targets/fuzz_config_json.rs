#![no_main]

use libfuzzer_sys::fuzz_target;
use mq_config::{validate, QueueConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing and validating arbitrary JSON must never panic.
    if let Ok(config) = serde_json::from_str::<QueueConfig>(text) {
        let _ = validate(&config);
    }
});
