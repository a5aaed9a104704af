//! Fuzz target: `ImageLocation::parse`
//!
//! Accepted URLs always split into a non-empty host and a resource that
//! starts with `/`.
//!
//! cargo fuzz run fuzz_image_url

#![no_main]

use iotc_ota::ota::url::ImageLocation;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(url) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(loc) = ImageLocation::parse(url) {
        assert!(!loc.host.is_empty());
        assert!(loc.resource.starts_with('/'));
    }
});
