//! Partition table boundary.
//!
//! The only module that maps [`PartitionSlot`] to ESP-IDF partition
//! records and otadata calls. Everything above works with slots.
//!
//! | Slot      | Type | Subtype        |
//! |-----------|------|----------------|
//! | `Factory` | app  | `factory`      |
//! | `OtaA`    | app  | `ota_0`        |
//! | `OtaB`    | app  | `ota_1`        |

use log::{info, warn};

use crate::app::ports::BootManager;
use crate::error::BootError;
use crate::ota::slot::PartitionSlot;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(not(target_os = "espidf"))]
use std::{cell::Cell, rc::Rc};

// ───────────────────────────────────────────────────────────────
// ESP-IDF partition lookups
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
const fn subtype_of(slot: PartitionSlot) -> esp_partition_subtype_t {
    match slot {
        PartitionSlot::Factory => esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_APP_FACTORY,
        PartitionSlot::OtaA => esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_APP_OTA_0,
        PartitionSlot::OtaB => esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_APP_OTA_1,
    }
}

#[cfg(target_os = "espidf")]
fn slot_of(partition: *const esp_partition_t) -> Option<PartitionSlot> {
    if partition.is_null() {
        return None;
    }
    // SAFETY: non-null pointers returned by the partition API point into the
    // static partition table, which lives for the whole program.
    let subtype = unsafe { (*partition).subtype };
    PartitionSlot::ALL
        .into_iter()
        .find(|&slot| subtype_of(slot) == subtype)
}

#[cfg(target_os = "espidf")]
fn find_partition(slot: PartitionSlot) -> *const esp_partition_t {
    // SAFETY: read-only lookup in the partition table; a null label matches any.
    unsafe {
        esp_partition_find_first(
            esp_partition_type_t_ESP_PARTITION_TYPE_APP,
            subtype_of(slot),
            core::ptr::null(),
        )
    }
}

/// Slot the next OTA write will target (never the running one).
#[cfg(target_os = "espidf")]
pub(crate) fn next_update_slot() -> Option<PartitionSlot> {
    // SAFETY: passing null asks IDF to choose relative to the running partition.
    slot_of(unsafe { esp_ota_get_next_update_partition(core::ptr::null()) })
}

/// `<version> (<date> <time>)` of the running image's app descriptor.
#[cfg(target_os = "espidf")]
pub fn running_build_version() -> String {
    use core::ffi::CStr;

    // SAFETY: the descriptor is a static embedded in the running image.
    let desc = unsafe { &*esp_app_get_description() };
    let field = |raw: &[core::ffi::c_char]| {
        // SAFETY: descriptor strings are NUL-terminated fixed arrays.
        unsafe { CStr::from_ptr(raw.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    };
    format!(
        "{} ({} {})",
        field(&desc.version),
        field(&desc.date),
        field(&desc.time)
    )
}

/// `<crate version> (host)` in simulation.
#[cfg(not(target_os = "espidf"))]
pub fn running_build_version() -> String {
    format!("{} (host)", env!("CARGO_PKG_VERSION"))
}

/// Confirm the running image so the bootloader does not roll it back.
#[cfg(target_os = "espidf")]
pub fn mark_running_valid() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("Partition: running image marked valid"),
        Err(e) => warn!("Partition: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn mark_running_valid() {
    info!("Partition(sim): mark valid skipped");
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF boot manager
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct EspBootManager {
    running: PartitionSlot,
}

#[cfg(target_os = "espidf")]
impl EspBootManager {
    pub fn new() -> Self {
        // SAFETY: always returns a valid pointer into the partition table.
        let running = slot_of(unsafe { esp_ota_get_running_partition() }).unwrap_or_else(|| {
            warn!("Partition: running partition not in table, assuming factory");
            PartitionSlot::Factory
        });
        info!("Partition: running from {}", running);
        Self { running }
    }
}

#[cfg(target_os = "espidf")]
impl BootManager for EspBootManager {
    fn running_slot(&self) -> PartitionSlot {
        self.running
    }

    fn has_slot(&self, slot: PartitionSlot) -> bool {
        !find_partition(slot).is_null()
    }

    fn set_boot_slot(&mut self, slot: PartitionSlot) -> Result<(), BootError> {
        let partition = find_partition(slot);
        if partition.is_null() {
            return Err(BootError::InvalidImage);
        }
        // SAFETY: `partition` is a non-null entry of the static partition table.
        let ret = unsafe { esp_ota_set_boot_partition(partition) };
        if ret == ESP_OK as esp_err_t {
            info!("Partition: boot partition set to {}", slot);
            Ok(())
        } else if ret == ESP_ERR_OTA_VALIDATE_FAILED as esp_err_t {
            warn!("Partition: {} holds no valid image", slot);
            Err(BootError::InvalidImage)
        } else {
            warn!("Partition: esp_ota_set_boot_partition({}) = {}", slot, ret);
            Err(BootError::FlashFailed)
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation boot manager
// ───────────────────────────────────────────────────────────────

/// In-memory partition table for host builds.
///
/// The boot target is shared with the [`SimFlashSink`](super::flash::SimFlashSink)
/// handed out by [`flash_sink`](Self::flash_sink), so a finalized upload
/// changes the boot slot exactly as on the device.
#[cfg(not(target_os = "espidf"))]
pub struct SimBootManager {
    running: PartitionSlot,
    boot: Rc<Cell<PartitionSlot>>,
    missing: Option<PartitionSlot>,
    reject: bool,
}

#[cfg(not(target_os = "espidf"))]
impl SimBootManager {
    pub fn new(running: PartitionSlot) -> Self {
        Self {
            running,
            boot: Rc::new(Cell::new(running)),
            missing: None,
            reject: false,
        }
    }

    /// Simulate a partition table without `slot`.
    pub fn without_slot(mut self, slot: PartitionSlot) -> Self {
        self.missing = Some(slot);
        self
    }

    /// Make every `set_boot_slot` fail validation.
    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    /// Slot that boots after the next restart.
    pub fn boot_slot(&self) -> PartitionSlot {
        self.boot.get()
    }

    /// Flash sink writing the inactive OTA slot of this table.
    pub fn flash_sink(&self) -> super::flash::SimFlashSink {
        super::flash::SimFlashSink::new(self.running, Rc::clone(&self.boot))
    }
}

#[cfg(not(target_os = "espidf"))]
impl BootManager for SimBootManager {
    fn running_slot(&self) -> PartitionSlot {
        self.running
    }

    fn has_slot(&self, slot: PartitionSlot) -> bool {
        self.missing != Some(slot)
    }

    fn set_boot_slot(&mut self, slot: PartitionSlot) -> Result<(), BootError> {
        if self.reject || !self.has_slot(slot) {
            warn!("Partition(sim): {} rejected", slot);
            return Err(BootError::InvalidImage);
        }
        self.boot.set(slot);
        info!("Partition(sim): boot partition set to {}", slot);
        Ok(())
    }
}

/// OTA slot written by an update while `running` is active.
pub const fn inactive_ota_slot(running: PartitionSlot) -> PartitionSlot {
    match running {
        PartitionSlot::OtaA => PartitionSlot::OtaB,
        PartitionSlot::Factory | PartitionSlot::OtaB => PartitionSlot::OtaA,
    }
}
