//! OTA flash write sink.
//!
//! - **`target_os = "espidf"`**: [`EspFlashSink`] streams into the next
//!   update partition through the `esp-ota` crate. Validation of the image
//!   happens in `esp_ota_end()` (inside `finalize`).
//! - **all other targets**: [`SimFlashSink`] keeps the image in memory and
//!   checks only the image magic byte.

use log::{info, warn};

use crate::app::ports::FlashSink;
use crate::error::FlashError;
use crate::ota::slot::PartitionSlot;

#[cfg(not(target_os = "espidf"))]
use std::{cell::Cell, rc::Rc};

// ── ESP-IDF sink ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct EspFlashSink {
    update: Option<esp_ota::OtaUpdate>,
    target: Option<PartitionSlot>,
}

// SAFETY: `OtaUpdate` holds a pointer into the static partition table and an
// IDF OTA handle. Both may be used from any task; the sink is only ever
// reached through the `Mutex` guarding the OTA context.
#[cfg(target_os = "espidf")]
unsafe impl Send for EspFlashSink {}

#[cfg(target_os = "espidf")]
impl EspFlashSink {
    pub fn new() -> Self {
        Self {
            update: None,
            target: None,
        }
    }
}

#[cfg(target_os = "espidf")]
impl FlashSink for EspFlashSink {
    fn begin(&mut self) -> Result<PartitionSlot, FlashError> {
        // esp-ota aborts automatically when OtaUpdate is dropped
        if self.update.take().is_some() {
            warn!("Flash: previous update dropped");
        }
        let target = super::partition::next_update_slot().ok_or(FlashError::NoPartition)?;
        let update = esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("Flash: esp-ota begin failed: {:?}", e);
            FlashError::BeginFailed
        })?;
        self.update = Some(update);
        self.target = Some(target);
        info!("Flash: writing {}", target);
        Ok(target)
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), FlashError> {
        let update = self.update.as_mut().ok_or(FlashError::WriteFailed)?;
        update.write(chunk).map_err(|e| {
            warn!("Flash: esp-ota write failed: {:?}", e);
            FlashError::WriteFailed
        })
    }

    fn finalize(&mut self) -> Result<PartitionSlot, FlashError> {
        let update = self.update.take().ok_or(FlashError::NothingWritten)?;
        let target = self.target.take().ok_or(FlashError::NoPartition)?;

        let mut completed = update.finalize().map_err(|e| {
            warn!("Flash: esp-ota finalize failed: {:?}", e);
            FlashError::InvalidImage
        })?;
        completed.set_as_boot_partition().map_err(|e| {
            warn!("Flash: esp-ota set_as_boot_partition failed: {:?}", e);
            FlashError::BootSetFailed
        })?;

        info!("Flash: {} validated and set as boot partition", target);
        Ok(target)
    }

    fn abort(&mut self) {
        if self.update.take().is_some() {
            warn!("Flash: update aborted");
        }
        self.target = None;
    }
}

// ── Simulation sink ───────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
const IMAGE_MAGIC: u8 = 0xE9;

/// In-memory flash sink sharing its boot target with a
/// [`SimBootManager`](super::partition::SimBootManager).
#[cfg(not(target_os = "espidf"))]
pub struct SimFlashSink {
    running: PartitionSlot,
    boot: Rc<Cell<PartitionSlot>>,
    target: Option<PartitionSlot>,
    image: Vec<u8>,
    committed: Vec<(PartitionSlot, usize)>,
}

#[cfg(not(target_os = "espidf"))]
impl SimFlashSink {
    pub(super) fn new(running: PartitionSlot, boot: Rc<Cell<PartitionSlot>>) -> Self {
        Self {
            running,
            boot,
            target: None,
            image: Vec::new(),
            committed: Vec::new(),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.target.is_some()
    }

    /// Bytes written in the current (or last aborted) attempt.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Every finalized image as `(slot, length)`.
    pub fn committed(&self) -> &[(PartitionSlot, usize)] {
        &self.committed
    }
}

#[cfg(not(target_os = "espidf"))]
impl FlashSink for SimFlashSink {
    fn begin(&mut self) -> Result<PartitionSlot, FlashError> {
        let target = super::partition::inactive_ota_slot(self.running);
        self.image.clear();
        self.target = Some(target);
        info!("Flash(sim): writing {}", target);
        Ok(target)
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), FlashError> {
        if self.target.is_none() {
            return Err(FlashError::WriteFailed);
        }
        self.image.extend_from_slice(chunk);
        Ok(())
    }

    fn finalize(&mut self) -> Result<PartitionSlot, FlashError> {
        let target = self.target.take().ok_or(FlashError::NothingWritten)?;
        if self.image.is_empty() {
            return Err(FlashError::NothingWritten);
        }
        if self.image[0] != IMAGE_MAGIC {
            warn!("Flash(sim): bad image magic 0x{:02x}", self.image[0]);
            return Err(FlashError::InvalidImage);
        }
        self.boot.set(target);
        self.committed.push((target, self.image.len()));
        info!("Flash(sim): {} bytes committed to {}", self.image.len(), target);
        Ok(target)
    }

    fn abort(&mut self) {
        if self.target.take().is_some() {
            warn!("Flash(sim): update aborted");
        }
    }
}
