//! Boot partition enumeration and selection.

use log::{info, warn};
use serde::Serialize;

use crate::app::ports::{BootManager, StoragePort};
use crate::error::{OtaError, Result};
use crate::ota::slot::PartitionSlot;
use crate::ota::version_store::VersionStore;

/// A slot confirmed to exist in the partition table.
///
/// Only [`PartitionSelector::select_target`] constructs handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionHandle {
    slot: PartitionSlot,
}

impl PartitionHandle {
    pub fn slot(self) -> PartitionSlot {
        self.slot
    }
}

/// One row of `/ota_versions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionEntry {
    pub partition: &'static str,
    pub label: String,
}

pub struct PartitionSelector<B: BootManager> {
    boot: B,
}

impl<B: BootManager> PartitionSelector<B> {
    pub fn new(boot: B) -> Self {
        Self { boot }
    }

    pub fn running_slot(&self) -> PartitionSlot {
        self.boot.running_slot()
    }

    pub fn boot_manager(&self) -> &B {
        &self.boot
    }

    /// Factory, OtaA, OtaB with their versions; the running slot is marked.
    pub fn list_partitions<S: StoragePort>(&self, store: &VersionStore<S>) -> Vec<PartitionEntry> {
        let running = self.boot.running_slot();
        PartitionSlot::ALL
            .iter()
            .map(|&slot| {
                let mut label = format!("{}: {}", slot.display_name(), store.get_version(slot));
                if slot == running {
                    label.push_str(" [running]");
                }
                PartitionEntry {
                    partition: slot.name(),
                    label,
                }
            })
            .collect()
    }

    /// Resolve a logical partition name.
    pub fn select_target(&self, name: &str) -> Result<PartitionHandle> {
        let slot = PartitionSlot::from_name(name).ok_or_else(|| {
            warn!("Selector: unknown partition '{}'", name);
            OtaError::PartitionNotFound
        })?;
        if !self.boot.has_slot(slot) {
            warn!("Selector: partition table has no {}", slot);
            return Err(OtaError::PartitionNotFound);
        }
        Ok(PartitionHandle { slot })
    }

    /// Make `handle` the next boot partition. Does not restart.
    pub fn commit_boot(&mut self, handle: PartitionHandle) -> Result<()> {
        self.boot.set_boot_slot(handle.slot)?;
        info!("Selector: next boot -> {}", handle.slot);
        Ok(())
    }
}
