//! Fuzz testing for job payload validation.
//!
//! Ensures the validators never panic on arbitrary input, whatever the
//! length, encoding or numeric range.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the validation fuzz target
//! cargo +nightly fuzz run fuzz_validation
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `validate_job_name`: Job name validation
//! - `validate_work_ms`: Work duration bound check
//! - `SubmitJobRequest` deserialization of raw request bodies

#![no_main]

use std::time::Duration;

use inflight_guard::models::SubmitJobRequest;
use inflight_guard::validation::{validate_job_name, validate_work_ms};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Raw bytes as a request body, exactly as the handler sees them
    if let Ok(request) = serde_json::from_slice::<SubmitJobRequest>(data) {
        let _ = validate_job_name(&request.name);
        let _ = validate_work_ms(request.work_ms, Duration::from_secs(30));
    }

    if let Ok(s) = std::str::from_utf8(data) {
        let accepted = validate_job_name(s).is_ok();
        // Anything accepted must be printable ASCII without separators
        assert!(!accepted || s.bytes().all(|b| b.is_ascii_alphanumeric() || b"._-".contains(&b)));
    }

    if let Some(bytes) = data.get(..8) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        let work_ms = u64::from_le_bytes(raw);
        let _ = validate_work_ms(work_ms, Duration::from_millis(u64::MAX));
    }
});
