#![no_main]

use libfuzzer_sys::fuzz_target;
use ktreg_runner::classify::{classify_transcript, TranscriptRules};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 || data.len() > 64 * 1024 {
        return;
    }
    let id = u32::from(data[0] % 32);
    let text = String::from_utf8_lossy(&data[1..]);

    let rules = TranscriptRules::default();
    let verdict = classify_transcript(&text, id, &rules);
    if text.contains(rules.markers.fail.as_str()) {
        assert_eq!(verdict.classification, ktreg_runner::Classification::Error);
    }

    let _ = ktreg_oracle::extract_trace(&text);
});
