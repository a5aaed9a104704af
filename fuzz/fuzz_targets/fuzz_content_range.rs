//! Fuzz target: `parse_content_range`
//!
//! The size probe header comes straight from the network.  Parsing must
//! never panic, and any accepted total fits in eight digits.
//!
//! cargo fuzz run fuzz_content_range

#![no_main]

use iotc_ota::config::MAX_DECLARABLE_IMAGE_SIZE;
use iotc_ota::ota::probe::parse_content_range;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = core::str::from_utf8(data) {
        if let Ok(total) = parse_content_range(text) {
            assert!(total <= MAX_DECLARABLE_IMAGE_SIZE, "total {total} too large");
        }
    }
});
