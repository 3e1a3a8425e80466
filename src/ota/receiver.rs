//! Streamed image receiver.
//!
//! Forwards upload bytes verbatim to the [`FlashSink`] and tracks one
//! [`TransferSession`]. The receiver never buffers and never parses the
//! image; validation happens inside the sink on finalize.

use log::{info, warn};

use crate::app::ports::FlashSink;
use crate::error::{FlashError, OtaError, Result};
use crate::ota::slot::PartitionSlot;

/// Upload filename as reported by the client (truncated).
pub type FileName = heapless::String<64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Receiving,
    Committing,
    Failed,
    Done,
}

/// Transient state of the single active upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    pub state: SessionState,
    pub bytes: u64,
    pub chunks: u32,
    pub filename: FileName,
    pub target: Option<PartitionSlot>,
}

impl TransferSession {
    const fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            bytes: 0,
            chunks: 0,
            filename: FileName::new(),
            target: None,
        }
    }
}

pub struct ImageReceiver<F: FlashSink> {
    sink: F,
    session: TransferSession,
}

impl<F: FlashSink> ImageReceiver<F> {
    pub fn new(sink: F) -> Self {
        Self {
            sink,
            session: TransferSession::idle(),
        }
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    pub fn sink(&self) -> &F {
        &self.sink
    }

    /// Arm the sink for a write of unknown size. Returns the target slot.
    ///
    /// A start while another session is receiving abandons that session.
    pub fn on_transfer_start(&mut self, filename: &str) -> Result<PartitionSlot> {
        if matches!(
            self.session.state,
            SessionState::Receiving | SessionState::Committing
        ) {
            warn!(
                "Receiver: new upload while {} bytes in flight, abandoning previous",
                self.session.bytes
            );
            self.sink.abort();
        }

        self.session = TransferSession::idle();
        for ch in filename.chars() {
            if self.session.filename.push(ch).is_err() {
                break;
            }
        }

        match self.sink.begin() {
            Ok(target) => {
                info!("Receiver: '{}' -> {}", filename, target);
                self.session.state = SessionState::Receiving;
                self.session.target = Some(target);
                Ok(target)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Forward `chunk` to the sink, in order.
    pub fn on_transfer_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if self.session.state != SessionState::Receiving {
            return Err(OtaError::NotReceiving);
        }
        if chunk.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.sink.write(chunk) {
            return Err(self.fail(e.into()));
        }
        self.session.bytes += chunk.len() as u64;
        self.session.chunks += 1;
        Ok(())
    }

    /// Finalize the image. Returns the slot that will boot next.
    pub fn on_transfer_end(&mut self) -> Result<PartitionSlot> {
        if self.session.state != SessionState::Receiving {
            return Err(OtaError::NotReceiving);
        }
        if self.session.bytes == 0 {
            return Err(self.fail(FlashError::NothingWritten.into()));
        }

        self.session.state = SessionState::Committing;
        match self.sink.finalize() {
            Ok(slot) => {
                info!(
                    "Receiver: {} bytes in {} chunks committed to {}",
                    self.session.bytes, self.session.chunks, slot
                );
                self.session.state = SessionState::Done;
                Ok(slot)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Client disconnected mid-stream.
    pub fn on_transfer_aborted(&mut self) -> OtaError {
        warn!(
            "Receiver: transfer aborted after {} bytes",
            self.session.bytes
        );
        self.fail(OtaError::TransferAborted)
    }

    fn fail(&mut self, error: OtaError) -> OtaError {
        self.sink.abort();
        self.session.state = SessionState::Failed;
        warn!("Receiver: session failed: {}", error);
        error
    }
}
