//! Fuzz target: `C2dMessage::parse`
//!
//! Arbitrary bytes from the command topic must decode or fail cleanly;
//! every decoded OTA directive must carry a URL that fits its buffer.
//!
//! cargo fuzz run fuzz_c2d_message

#![no_main]

use iotc_ota::app::commands::C2dMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(C2dMessage::Ota(directive)) = C2dMessage::parse(data) {
        assert!(!directive.url.is_empty(), "OTA directive without URL");
    }
});
