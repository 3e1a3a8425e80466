//! Fuzz target: `FirmwareInfo::parse` and the sniffer
//!
//! Arbitrary image heads, fed whole and byte by byte, must parse the same
//! way and always yield a version string within the record bound.
//!
//! cargo fuzz run fuzz_app_descriptor

#![no_main]

use libfuzzer_sys::fuzz_target;
use otadash::ota::image_info::{FirmwareInfo, FirmwareInfoSniffer, derive_version};
use otadash::ota::version_store::VERSION_CAP;

fuzz_target!(|data: &[u8]| {
    let whole = FirmwareInfo::parse(data);

    let mut sniffer = FirmwareInfoSniffer::new();
    for b in data {
        sniffer.feed(core::slice::from_ref(b));
    }
    assert_eq!(sniffer.info(), whole, "split feed changed the parse");

    let version = derive_version(whole.as_ref(), "fw.bin");
    assert!(!version.is_empty());
    assert!(version.len() <= VERSION_CAP);
});
