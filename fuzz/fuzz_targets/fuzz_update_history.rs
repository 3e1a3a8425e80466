//! Fuzz target: `VersionStore` history blob
//!
//! Seeds the history key with arbitrary bytes, as a corrupted flash page
//! would, then appends one entry. Verifies:
//! - No panics while decoding garbage lines
//! - History never exceeds its capacity
//! - The appended entry is always the newest one read back
//!
//! cargo fuzz run fuzz_update_history

#![no_main]

use libfuzzer_sys::fuzz_target;
use otadash::adapters::nvs::NvsAdapter;
use otadash::app::events::AppEvent;
use otadash::app::ports::{EventSink, StoragePort};
use otadash::ota::PartitionSlot;
use otadash::ota::version_store::{HistoryEntry, NAMESPACE, VersionStore};

const CAPACITY: usize = 4;

struct Discard;

impl EventSink for Discard {
    fn emit(&mut self, _event: &AppEvent) {}
}

fuzz_target!(|data: &[u8]| {
    let Ok(mut nvs) = NvsAdapter::new() else {
        return;
    };
    if nvs.write(NAMESPACE, "updateHistory", data).is_err() {
        return;
    }
    let mut store = VersionStore::open(nvs, PartitionSlot::Factory, "fuzz", CAPACITY, &mut Discard);

    let _ = store.get_history();

    let entry = HistoryEntry::new("9.9.9", 1234, PartitionSlot::OtaB);
    store.append_history(&entry);
    let history = store.get_history();
    assert!(history.len() <= CAPACITY, "history exceeds capacity");
    assert_eq!(history.last(), Some(&entry), "appended entry lost");
});
