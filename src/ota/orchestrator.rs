//! Update lifecycle state machine.
//!
//! ```text
//!   Idle ──▶ Uploading ──▶ Verifying ──▶ Committed ──▶ RebootPending
//!              │              │
//!              └──────────────┴──▶ Failed ──(next upload)──▶ Uploading
//! ```
//!
//! `RebootPending` is also entered directly after a boot switch. Once there,
//! the only way out is the restart itself.

use log::{info, warn};

use crate::app::ports::StoragePort;
use crate::error::{OtaError, Result};
use crate::ota::slot::PartitionSlot;
use crate::ota::version_store::VersionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Uploading,
    Verifying,
    Committed,
    RebootPending,
    Failed(OtaError),
}

impl UpdateState {
    /// Short lowercase name for status reporting.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Verifying => "verifying",
            Self::Committed => "committed",
            Self::RebootPending => "rebooting",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug)]
pub struct UpdateOrchestrator {
    state: UpdateState,
}

impl Default for UpdateOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateOrchestrator {
    pub const fn new() -> Self {
        Self {
            state: UpdateState::Idle,
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn is_reboot_pending(&self) -> bool {
        self.state == UpdateState::RebootPending
    }

    fn transition(&mut self, to: UpdateState) {
        if self.state != to {
            info!("Orchestrator: {:?} -> {:?}", self.state, to);
        }
        self.state = to;
    }

    /// Start a new upload attempt. A previous failure resets implicitly.
    pub fn begin_upload(&mut self) -> Result<()> {
        match self.state {
            UpdateState::RebootPending => Err(OtaError::RebootPending),
            UpdateState::Uploading | UpdateState::Verifying => {
                warn!("Orchestrator: upload restarted mid-transfer");
                self.transition(UpdateState::Uploading);
                Ok(())
            }
            _ => {
                self.transition(UpdateState::Uploading);
                Ok(())
            }
        }
    }

    /// All bytes received; the sink is about to finalize.
    pub fn begin_verify(&mut self) -> Result<()> {
        if self.state != UpdateState::Uploading {
            return Err(OtaError::NotReceiving);
        }
        self.transition(UpdateState::Verifying);
        Ok(())
    }

    /// Record a finalized image. Store failures are logged and tolerated:
    /// the image is already the boot target.
    pub fn commit<S: StoragePort>(
        &mut self,
        store: &mut VersionStore<S>,
        slot: PartitionSlot,
        version: &str,
        now_ms: u64,
    ) {
        if let Err(e) = store.record_update(slot, version, now_ms) {
            warn!("Orchestrator: {} written but not recorded: {}", slot, e);
        }
        self.transition(UpdateState::Committed);
    }

    /// The attempt failed; the next upload starts fresh.
    pub fn fail(&mut self, error: OtaError) {
        if self.state == UpdateState::RebootPending {
            return;
        }
        self.transition(UpdateState::Failed(error));
    }

    /// A restart has been queued.
    pub fn reboot_scheduled(&mut self) {
        self.transition(UpdateState::RebootPending);
    }
}
