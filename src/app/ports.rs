//! Port traits — the hexagonal boundary between OTA logic and the platform.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ OtaContext (domain)
//! ```
//!
//! Driven adapters (NVS, flash partitions, boot manager, event sinks)
//! implement these traits. The [`OtaContext`](crate::ota::context::OtaContext)
//! consumes them via generics, so the OTA core never touches ESP-IDF directly
//! and every component can be exercised on the host with mocks.

use crate::config::SystemConfig;
use crate::error::{BootError, FlashError};
use crate::ota::slot::PartitionSlot;

// ───────────────────────────────────────────────────────────────
// Flash write sink (driven adapter: domain → OTA partition)
// ───────────────────────────────────────────────────────────────

/// Raw partition erase/write primitive consumed by the image receiver.
///
/// The sink chooses the target partition itself (always the inactive OTA
/// slot), validates the image on [`finalize`](FlashSink::finalize) and makes
/// it the boot partition. The receiver never parses the image.
pub trait FlashSink {
    /// Arm a write of unknown total size. Returns the slot being written.
    fn begin(&mut self) -> Result<PartitionSlot, FlashError>;

    /// Append `chunk` to the armed partition.
    fn write(&mut self, chunk: &[u8]) -> Result<(), FlashError>;

    /// Validate the written image and set it as the next boot partition.
    fn finalize(&mut self) -> Result<PartitionSlot, FlashError>;

    /// Disarm without committing. Must be safe to call when nothing is armed.
    fn abort(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Boot manager (driven adapter: domain ↔ otadata)
// ───────────────────────────────────────────────────────────────

/// Platform boot manager: knows which slot runs and which boots next.
pub trait BootManager {
    /// Slot the current firmware was loaded from.
    fn running_slot(&self) -> PartitionSlot;

    /// Whether the partition table contains `slot`.
    fn has_slot(&self, slot: PartitionSlot) -> bool;

    /// Make `slot` the partition booted after the next restart.
    fn set_boot_slot(&mut self, slot: PartitionSlot) -> Result<(), BootError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate before persisting; out-of-range values are
/// rejected with [`ConfigError::ValidationFailed`], not clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for version records, history and GPIO state.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Each call is a complete scoped operation: open, act, commit, close.
///   Nothing is held open between calls, so a restart mid-operation
///   never leaves a namespace half-committed.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// The namespace could not be opened, or a read/commit failed.
    IoError,
    /// The caller's buffer is smaller than the stored value.
    TooLarge,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::TooLarge => write!(f, "value larger than buffer"),
        }
    }
}
