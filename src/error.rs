//! Unified error types for the OTA subsystem.
//!
//! A single `OtaError` enum that every OTA component converts into, keeping
//! the HTTP handler boundary's error handling uniform. All variants are
//! `Copy` so they can be recorded in the orchestrator state and passed
//! through the event sink without allocation.

use core::fmt;

use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Top-level OTA error
// ---------------------------------------------------------------------------

/// Every fallible OTA operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    /// The client disconnected before the upload was complete.
    TransferAborted,
    /// The flash sink rejected a chunk or the finalize step.
    FlashWriteFailed(FlashError),
    /// Unknown partition name, or the partition table lacks that slot.
    PartitionNotFound,
    /// The boot manager refused to set the boot partition.
    BootCommitFailed(BootError),
    /// The persistent store could not be opened or written.
    StoreUnavailable,
    /// A restart is already scheduled; no new uploads are accepted.
    RebootPending,
    /// A chunk or end-of-transfer arrived without an armed session.
    NotReceiving,
}

impl OtaError {
    /// HTTP status code reported at the handler boundary.
    pub const fn http_status(self) -> u16 {
        match self {
            Self::PartitionNotFound => 404,
            Self::RebootPending | Self::StoreUnavailable => 503,
            Self::NotReceiving => 409,
            Self::TransferAborted | Self::FlashWriteFailed(_) | Self::BootCommitFailed(_) => 500,
        }
    }
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransferAborted => write!(f, "transfer aborted by client"),
            Self::FlashWriteFailed(e) => write!(f, "flash write failed: {e}"),
            Self::PartitionNotFound => write!(f, "partition not found"),
            Self::BootCommitFailed(e) => write!(f, "boot commit failed: {e}"),
            Self::StoreUnavailable => write!(f, "version store unavailable"),
            Self::RebootPending => write!(f, "reboot pending"),
            Self::NotReceiving => write!(f, "no upload in progress"),
        }
    }
}

// ---------------------------------------------------------------------------
// Flash sink errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// No inactive OTA partition could be found.
    NoPartition,
    /// The platform refused to open the update partition.
    BeginFailed,
    /// A chunk write was rejected (timeout, bad magic byte, flash fault).
    WriteFailed,
    /// Finalize was requested but no bytes were written.
    NothingWritten,
    /// The written image failed validation.
    InvalidImage,
    /// The freshly written partition could not be made bootable.
    BootSetFailed,
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPartition => write!(f, "no inactive OTA partition"),
            Self::BeginFailed => write!(f, "begin failed"),
            Self::WriteFailed => write!(f, "chunk write rejected"),
            Self::NothingWritten => write!(f, "empty image"),
            Self::InvalidImage => write!(f, "image validation failed"),
            Self::BootSetFailed => write!(f, "could not set boot partition"),
        }
    }
}

impl From<FlashError> for OtaError {
    fn from(e: FlashError) -> Self {
        Self::FlashWriteFailed(e)
    }
}

// ---------------------------------------------------------------------------
// Boot manager errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// The partition holds no valid app image.
    InvalidImage,
    /// The otadata partition could not be written.
    FlashFailed,
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidImage => write!(f, "partition holds no valid image"),
            Self::FlashFailed => write!(f, "otadata write failed"),
        }
    }
}

impl From<BootError> for OtaError {
    fn from(e: BootError) -> Self {
        Self::BootCommitFailed(e)
    }
}

impl From<StorageError> for OtaError {
    fn from(_: StorageError) -> Self {
        Self::StoreUnavailable
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// OTA-wide `Result` alias.
pub type Result<T> = core::result::Result<T, OtaError>;
