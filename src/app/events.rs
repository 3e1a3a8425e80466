//! Outbound application events.
//!
//! The OTA context and the control loop emit these through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other side
//! decide what to do with them — log to serial, push to a dashboard, etc.

use crate::error::OtaError;
use crate::ota::slot::PartitionSlot;
use crate::ota::version_store::VersionString;

/// Structured events emitted by the firmware core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Version store opened; carries the running slot and its record.
    Booted {
        running: PartitionSlot,
        version: VersionString,
    },

    /// The running slot had no record and was self-registered.
    SelfRegistered(PartitionSlot),

    /// An upload armed the flash sink for `target`.
    UploadStarted { target: PartitionSlot },

    /// Progress marker, emitted every [`PROGRESS_STEP_BYTES`] bytes.
    UploadProgress { bytes: u64 },

    /// The image was finalized and recorded.
    UploadCommitted {
        slot: PartitionSlot,
        version: VersionString,
        bytes: u64,
    },

    /// The upload attempt failed.
    UploadFailed { error: OtaError, bytes: u64 },

    /// The next-boot partition changed.
    BootTargetChanged(PartitionSlot),

    /// A restart has been queued and will run after the response flushes.
    RebootScheduled,

    /// Internal temperature sample.
    Temperature(f32),

    /// An LED output changed.
    LedChanged { led: u8, on: bool },
}

/// Byte interval between [`AppEvent::UploadProgress`] emissions.
pub const PROGRESS_STEP_BYTES: u64 = 64 * 1024;
