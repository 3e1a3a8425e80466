//! OTA context: the single owner of all update state.
//!
//! Request handlers receive `&mut OtaContext` (behind one `Mutex` on the
//! device) and the control loop polls [`OtaContext::poll_actions`]. There
//! is no other shared OTA state.

use log::{info, warn};

use crate::app::events::{AppEvent, PROGRESS_STEP_BYTES};
use crate::app::ports::{BootManager, EventSink, FlashSink, StoragePort};
use crate::error::{OtaError, Result};
use crate::ota::image_info::{FirmwareInfoSniffer, derive_version};
use crate::ota::orchestrator::{UpdateOrchestrator, UpdateState};
use crate::ota::receiver::{ImageReceiver, TransferSession};
use crate::ota::selector::{PartitionEntry, PartitionSelector};
use crate::ota::slot::PartitionSlot;
use crate::ota::version_store::{HistoryEntry, VersionStore, VersionString};
use crate::scheduler::{ActionQueue, DeferredAction};

pub struct OtaContext<S: StoragePort, F: FlashSink, B: BootManager> {
    store: VersionStore<S>,
    receiver: ImageReceiver<F>,
    selector: PartitionSelector<B>,
    orchestrator: UpdateOrchestrator,
    actions: ActionQueue,
    sniffer: FirmwareInfoSniffer,
    next_progress: u64,
}

impl<S: StoragePort, F: FlashSink, B: BootManager> OtaContext<S, F, B> {
    pub fn new(store: VersionStore<S>, flash: F, boot: B, reboot_grace_ms: u32) -> Self {
        Self {
            store,
            receiver: ImageReceiver::new(flash),
            selector: PartitionSelector::new(boot),
            orchestrator: UpdateOrchestrator::new(),
            actions: ActionQueue::new(reboot_grace_ms),
            sniffer: FirmwareInfoSniffer::new(),
            next_progress: PROGRESS_STEP_BYTES,
        }
    }

    // ── Upload ────────────────────────────────────────────────

    /// Arm a new upload. Refused while a restart is pending.
    pub fn begin_upload(&mut self, filename: &str, sink: &mut impl EventSink) -> Result<PartitionSlot> {
        if let Err(e) = self.orchestrator.begin_upload() {
            warn!("OTA: upload refused: {}", e);
            return Err(e);
        }
        self.sniffer.reset();
        self.next_progress = PROGRESS_STEP_BYTES;

        match self.receiver.on_transfer_start(filename) {
            Ok(target) => {
                sink.emit(&AppEvent::UploadStarted { target });
                Ok(target)
            }
            Err(e) => Err(self.fail(e, sink)),
        }
    }

    pub fn upload_chunk(&mut self, chunk: &[u8], sink: &mut impl EventSink) -> Result<()> {
        if self.orchestrator.state() != UpdateState::Uploading {
            return Err(OtaError::NotReceiving);
        }
        self.sniffer.feed(chunk);
        if let Err(e) = self.receiver.on_transfer_chunk(chunk) {
            return Err(self.fail(e, sink));
        }

        let bytes = self.receiver.session().bytes;
        if bytes >= self.next_progress {
            sink.emit(&AppEvent::UploadProgress { bytes });
            while self.next_progress <= bytes {
                self.next_progress += PROGRESS_STEP_BYTES;
            }
        }
        Ok(())
    }

    /// All bytes delivered: finalize, record the version, schedule the restart.
    pub fn finish_upload(&mut self, now_ms: u64, sink: &mut impl EventSink) -> Result<PartitionSlot> {
        self.orchestrator.begin_verify()?;

        let slot = match self.receiver.on_transfer_end() {
            Ok(slot) => slot,
            Err(e) => return Err(self.fail(e, sink)),
        };

        let info = self.sniffer.info();
        let version = derive_version(info.as_ref(), &self.receiver.session().filename);
        let bytes = self.receiver.session().bytes;

        self.orchestrator
            .commit(&mut self.store, slot, &version, now_ms);
        sink.emit(&AppEvent::UploadCommitted {
            slot,
            version,
            bytes,
        });
        self.schedule_reboot(now_ms, sink);
        Ok(slot)
    }

    /// Client went away mid-upload.
    pub fn abort_upload(&mut self, sink: &mut impl EventSink) -> OtaError {
        if self.orchestrator.state() != UpdateState::Uploading {
            return OtaError::TransferAborted;
        }
        let e = self.receiver.on_transfer_aborted();
        self.fail(e, sink)
    }

    fn fail(&mut self, error: OtaError, sink: &mut impl EventSink) -> OtaError {
        self.orchestrator.fail(error);
        sink.emit(&AppEvent::UploadFailed {
            error,
            bytes: self.receiver.session().bytes,
        });
        error
    }

    // ── Partition switch ──────────────────────────────────────

    /// Make `name` the next boot partition and schedule a restart.
    /// Selecting the running slot is allowed.
    pub fn switch_partition(
        &mut self,
        name: &str,
        now_ms: u64,
        sink: &mut impl EventSink,
    ) -> Result<PartitionSlot> {
        let handle = self.selector.select_target(name)?;
        self.selector.commit_boot(handle)?;
        sink.emit(&AppEvent::BootTargetChanged(handle.slot()));
        self.schedule_reboot(now_ms, sink);
        Ok(handle.slot())
    }

    fn schedule_reboot(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        if self.actions.schedule(DeferredAction::Reboot, now_ms) {
            sink.emit(&AppEvent::RebootScheduled);
        }
        self.orchestrator.reboot_scheduled();
    }

    /// Control-loop hook: returns an action once it is due.
    pub fn poll_actions(&mut self, now_ms: u64) -> Option<DeferredAction> {
        let action = self.actions.tick(now_ms);
        if let Some(action) = action {
            info!("OTA: executing {:?}", action);
        }
        action
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> UpdateState {
        self.orchestrator.state()
    }

    pub fn session(&self) -> &TransferSession {
        self.receiver.session()
    }

    pub fn running_slot(&self) -> PartitionSlot {
        self.store.running_slot()
    }

    pub fn current_version(&self) -> VersionString {
        self.store.get_version(self.store.running_slot())
    }

    pub fn last_written_version(&self) -> VersionString {
        self.store.last_written_version()
    }

    pub fn last_update_timestamp(&self) -> String {
        self.store.last_update_timestamp()
    }

    pub fn list_partitions(&self) -> Vec<PartitionEntry> {
        self.selector.list_partitions(&self.store)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.store.get_history()
    }

    pub fn store(&self) -> &VersionStore<S> {
        &self.store
    }

    pub fn flash(&self) -> &F {
        self.receiver.sink()
    }

    pub fn boot_manager(&self) -> &B {
        self.selector.boot_manager()
    }
}
