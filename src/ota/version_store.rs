//! Durable per-slot firmware version records and update history.
//!
//! Layout in the `ota` NVS namespace:
//!
//! | Key               | Value                                          |
//! |-------------------|------------------------------------------------|
//! | `version_factory` | version string of the factory slot             |
//! | `version_ota_0`   | version string of OTA slot A                   |
//! | `version_ota_1`   | version string of OTA slot B                   |
//! | `lastUpdate`      | millis-since-boot of the last committed update |
//! | `lastVersion`     | version string of the last committed update    |
//! | `lastPart`        | slot name of the last committed update         |
//! | `updateHistory`   | newline-delimited `version\|millis\|slot` lines |
//!
//! Every method is one scoped storage operation; the [`StoragePort`]
//! opens and closes the namespace around each call.
//!
//! When the backing store cannot be read, queries degrade to sentinels
//! ([`UNKNOWN`], [`NEVER`]) and the running slot falls back to the
//! in-memory build version. Losing version metadata never blocks the rest
//! of the firmware.

use core::fmt;

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, StorageError, StoragePort};
use crate::error::Result;
use crate::ota::slot::PartitionSlot;

/// NVS namespace owned by the version store.
pub const NAMESPACE: &str = "ota";

const KEY_LAST_UPDATE: &str = "lastUpdate";
const KEY_LAST_VERSION: &str = "lastVersion";
const KEY_LAST_PART: &str = "lastPart";
const KEY_HISTORY: &str = "updateHistory";

/// Sentinel for a slot that has never been written.
pub const UNKNOWN: &str = "Unknown";
/// Sentinel for "no update has ever been committed".
pub const NEVER: &str = "Never";

/// Maximum stored version length in bytes.
pub const VERSION_CAP: usize = 63;
/// Bounded version string.
pub type VersionString = heapless::String<VERSION_CAP>;

/// Largest blob the NVS adapter will return for a single key.
const MAX_BLOB_SIZE: usize = 4000;

/// Copy `s` into a [`VersionString`], truncating on a char boundary.
pub fn bounded_version(s: &str) -> VersionString {
    let mut out = VersionString::new();
    for ch in s.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

fn unknown() -> VersionString {
    bounded_version(UNKNOWN)
}

// ── History entry ─────────────────────────────────────────────

/// One committed update, in append order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub version: VersionString,
    pub timestamp_ms: u64,
    pub slot: PartitionSlot,
}

impl HistoryEntry {
    pub fn new(version: &str, timestamp_ms: u64, slot: PartitionSlot) -> Self {
        Self {
            version: bounded_version(version),
            timestamp_ms,
            slot,
        }
    }

    /// Append the serialized line (no trailing newline) to `out`.
    /// Delimiters inside the version are replaced with spaces.
    fn encode_into(&self, out: &mut String) {
        out.extend(self.version.chars().map(|c| match c {
            '|' | '\n' | '\r' => ' ',
            other => other,
        }));
        out.push('|');
        out.push_str(&self.timestamp_ms.to_string());
        out.push('|');
        out.push_str(self.slot.name());
    }

    fn decode(line: &str) -> Option<Self> {
        let mut parts = line.rsplitn(3, '|');
        let slot = PartitionSlot::from_name(parts.next()?)?;
        let timestamp_ms = parts.next()?.parse().ok()?;
        let version = parts.next()?;
        Some(Self::new(version, timestamp_ms, slot))
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} at {} ms",
            self.version, self.slot, self.timestamp_ms
        )
    }
}

// ── Store ─────────────────────────────────────────────────────

pub struct VersionStore<S: StoragePort> {
    storage: S,
    running: PartitionSlot,
    build_version: VersionString,
    history_capacity: usize,
}

impl<S: StoragePort> VersionStore<S> {
    /// Open the store and self-register the running slot if it has no record.
    pub fn open(
        storage: S,
        running: PartitionSlot,
        build_version: &str,
        history_capacity: usize,
        sink: &mut impl EventSink,
    ) -> Self {
        let mut store = Self {
            storage,
            running,
            build_version: bounded_version(build_version),
            history_capacity: history_capacity.max(1),
        };

        match store.lookup(running) {
            Ok(Some(_)) => {}
            Ok(None) => {
                let build = store.build_version.clone();
                match store.record_version(running, &build) {
                    Ok(()) => {
                        info!("VersionStore: self-registered {} = {}", running, build);
                        sink.emit(&AppEvent::SelfRegistered(running));
                    }
                    Err(e) => warn!("VersionStore: self-registration failed: {}", e),
                }
            }
            Err(e) => warn!("VersionStore: store unavailable ({}), using build defaults", e),
        }

        sink.emit(&AppEvent::Booted {
            running,
            version: store.get_version(running),
        });
        store
    }

    pub fn running_slot(&self) -> PartitionSlot {
        self.running
    }

    /// Version compiled into the running image.
    pub fn build_version(&self) -> &str {
        &self.build_version
    }

    // ── Version records ───────────────────────────────────────

    /// Upsert the version record for `slot`.
    pub fn record_version(&mut self, slot: PartitionSlot, version: &str) -> Result<()> {
        let version = bounded_version(version);
        self.storage
            .write(NAMESPACE, slot.version_key(), version.as_bytes())?;
        Ok(())
    }

    /// Raw lookup distinguishing "absent" from "store unavailable".
    pub fn lookup(&self, slot: PartitionSlot) -> core::result::Result<Option<VersionString>, StorageError> {
        Ok(self
            .read_string(slot.version_key(), VERSION_CAP)?
            .map(|s| bounded_version(&s)))
    }

    /// Version for `slot`, or [`UNKNOWN`].
    pub fn get_version(&self, slot: PartitionSlot) -> VersionString {
        match self.lookup(slot) {
            Ok(Some(v)) if !v.is_empty() => v,
            Ok(_) if slot == self.running => self.build_version.clone(),
            Ok(_) => unknown(),
            Err(e) => {
                warn!("VersionStore: read {} failed: {}", slot, e);
                if slot == self.running {
                    self.build_version.clone()
                } else {
                    unknown()
                }
            }
        }
    }

    // ── Committed updates ─────────────────────────────────────

    /// Record a committed image: slot version, last-update markers, history.
    ///
    /// Only the slot record is authoritative; marker and history write
    /// failures are logged and dropped.
    pub fn record_update(&mut self, slot: PartitionSlot, version: &str, now_ms: u64) -> Result<()> {
        self.record_version(slot, version)?;

        let version = bounded_version(version);
        let markers = [
            (KEY_LAST_UPDATE, now_ms.to_string()),
            (KEY_LAST_VERSION, version.as_str().to_owned()),
            (KEY_LAST_PART, slot.name().to_owned()),
        ];
        for (key, value) in &markers {
            if let Err(e) = self.storage.write(NAMESPACE, key, value.as_bytes()) {
                warn!("VersionStore: write {} failed: {}", key, e);
            }
        }

        self.append_history(&HistoryEntry::new(&version, now_ms, slot));
        Ok(())
    }

    /// Millis-since-boot of the last committed update, or [`NEVER`].
    pub fn last_update_timestamp(&self) -> String {
        match self.read_string(KEY_LAST_UPDATE, 24) {
            Ok(Some(ts)) if !ts.is_empty() => ts,
            Ok(_) => NEVER.to_owned(),
            Err(e) => {
                warn!("VersionStore: read {} failed: {}", KEY_LAST_UPDATE, e);
                NEVER.to_owned()
            }
        }
    }

    /// Version of the most recently written slot, or [`UNKNOWN`].
    pub fn last_written_version(&self) -> VersionString {
        match self.read_string(KEY_LAST_VERSION, VERSION_CAP) {
            Ok(Some(v)) if !v.is_empty() => bounded_version(&v),
            _ => unknown(),
        }
    }

    // ── History ───────────────────────────────────────────────

    /// Append `entry`, evicting the oldest lines beyond the capacity or
    /// beyond what fits in one blob.
    ///
    /// History is diagnostic: an unreadable or oversized blob is replaced
    /// by a fresh one, and a failed write drops the entry with a warning.
    pub fn append_history(&mut self, entry: &HistoryEntry) {
        let mut entries = self.read_history().unwrap_or_else(|e| {
            warn!("VersionStore: history unreadable ({}), starting over", e);
            Vec::new()
        });
        entries.push(entry.clone());
        if entries.len() > self.history_capacity {
            let excess = entries.len() - self.history_capacity;
            entries.drain(..excess);
        }

        let blob = encode_history(&entries);
        if let Err(e) = self.storage.write(NAMESPACE, KEY_HISTORY, blob.as_bytes()) {
            warn!("VersionStore: history write failed ({}), entry dropped", e);
        }
    }

    /// Full history, oldest first. Empty when unavailable.
    pub fn get_history(&self) -> Vec<HistoryEntry> {
        self.read_history().unwrap_or_else(|e| {
            warn!("VersionStore: history unreadable: {}", e);
            Vec::new()
        })
    }

    fn read_history(&self) -> core::result::Result<Vec<HistoryEntry>, StorageError> {
        Ok(self
            .read_string(KEY_HISTORY, MAX_BLOB_SIZE)?
            .map(|blob| blob.lines().filter_map(HistoryEntry::decode).collect())
            .unwrap_or_default())
    }

    // ── Storage helpers ───────────────────────────────────────

    fn read_string(&self, key: &str, cap: usize) -> core::result::Result<Option<String>, StorageError> {
        let mut buf = vec![0u8; cap];
        match self.storage.read(NAMESPACE, key, &mut buf) {
            Ok(len) => {
                buf.truncate(len);
                Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
            }
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Borrow the backing storage (tests and diagnostics).
    pub fn storage(&self) -> &S {
        &self.storage
    }
}

/// Encode `entries` newest-last, dropping the oldest until the blob fits
/// in [`MAX_BLOB_SIZE`]. The newest entry always fits on its own.
fn encode_history(entries: &[HistoryEntry]) -> String {
    let mut lines: Vec<String> = entries
        .iter()
        .map(|e| {
            let mut line = String::new();
            e.encode_into(&mut line);
            line
        })
        .collect();

    let mut total = lines.iter().map(String::len).sum::<usize>() + lines.len().saturating_sub(1);
    let mut evicted = 0;
    while total > MAX_BLOB_SIZE && evicted + 1 < lines.len() {
        total -= lines[evicted].len() + 1;
        evicted += 1;
    }
    if evicted > 0 {
        info!("VersionStore: history trimmed by {} entries to fit", evicted);
        lines.drain(..evicted);
    }
    lines.join("\n")
}
