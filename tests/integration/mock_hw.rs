//! Mock platform adapters for integration tests.
//!
//! The flash sink and boot manager share the boot target through an
//! `Rc<Cell<_>>`, so a finalized upload moves the next-boot slot exactly
//! as on the device. The NVS mock can be switched to failing mode at any
//! time through the handle returned by [`Rig`].

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use otadash::adapters::partition::inactive_ota_slot;
use otadash::app::events::AppEvent;
use otadash::app::ports::{BootManager, EventSink, FlashSink, StorageError, StoragePort};
use otadash::error::{BootError, FlashError};
use otadash::ota::OtaContext;
use otadash::ota::PartitionSlot;
use otadash::ota::version_store::VersionStore;

// ── MockNvs ───────────────────────────────────────────────────

/// Clones share the same backing map, like two handles on one partition.
#[derive(Clone)]
pub struct MockNvs {
    store: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    down: Rc<Cell<bool>>,
}

impl MockNvs {
    pub fn new() -> Self {
        Self {
            store: Rc::new(RefCell::new(HashMap::new())),
            down: Rc::new(Cell::new(false)),
        }
    }

    /// Handle that makes every operation fail with `IoError` while set.
    pub fn failure_switch(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.down)
    }

    pub fn raw(&self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        self.store.borrow().get(&format!("{}::{}", namespace, key)).cloned()
    }
}

impl Default for MockNvs {
    fn default() -> Self {
        Self::new()
    }
}

impl StoragePort for MockNvs {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        if self.down.get() {
            return Err(StorageError::IoError);
        }
        match self.store.borrow().get(&format!("{}::{}", namespace, key)) {
            Some(v) if v.len() > buf.len() => Err(StorageError::TooLarge),
            Some(v) => {
                buf[..v.len()].copy_from_slice(v);
                Ok(v.len())
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.down.get() {
            return Err(StorageError::IoError);
        }
        self.store
            .borrow_mut()
            .insert(format!("{}::{}", namespace, key), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        if self.down.get() {
            return Err(StorageError::IoError);
        }
        self.store
            .borrow_mut()
            .remove(&format!("{}::{}", namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        !self.down.get()
            && self
                .store
                .borrow()
                .contains_key(&format!("{}::{}", namespace, key))
    }
}

// ── MockFlash ─────────────────────────────────────────────────

pub struct MockFlash {
    running: PartitionSlot,
    boot: Rc<Cell<PartitionSlot>>,
    target: Option<PartitionSlot>,
    /// Zero-based chunk index whose write is rejected.
    fail_at_chunk: Option<usize>,
    chunks: usize,
    pub written: Vec<u8>,
    pub aborts: usize,
}

impl MockFlash {
    pub fn is_armed(&self) -> bool {
        self.target.is_some()
    }
}

impl FlashSink for MockFlash {
    fn begin(&mut self) -> Result<PartitionSlot, FlashError> {
        let target = inactive_ota_slot(self.running);
        self.target = Some(target);
        self.written.clear();
        self.chunks = 0;
        Ok(target)
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), FlashError> {
        if self.target.is_none() {
            return Err(FlashError::WriteFailed);
        }
        if self.fail_at_chunk == Some(self.chunks) {
            return Err(FlashError::WriteFailed);
        }
        self.chunks += 1;
        self.written.extend_from_slice(chunk);
        Ok(())
    }

    fn finalize(&mut self) -> Result<PartitionSlot, FlashError> {
        let target = self.target.take().ok_or(FlashError::NothingWritten)?;
        match self.written.first() {
            None => Err(FlashError::NothingWritten),
            Some(&0xE9) => {
                self.boot.set(target);
                Ok(target)
            }
            Some(_) => Err(FlashError::InvalidImage),
        }
    }

    fn abort(&mut self) {
        if self.target.take().is_some() {
            self.aborts += 1;
        }
    }
}

// ── MockBoot ──────────────────────────────────────────────────

pub struct MockBoot {
    running: PartitionSlot,
    boot: Rc<Cell<PartitionSlot>>,
    missing: Option<PartitionSlot>,
    reject: bool,
}

impl MockBoot {
    pub fn boot_slot(&self) -> PartitionSlot {
        self.boot.get()
    }
}

impl BootManager for MockBoot {
    fn running_slot(&self) -> PartitionSlot {
        self.running
    }

    fn has_slot(&self, slot: PartitionSlot) -> bool {
        self.missing != Some(slot)
    }

    fn set_boot_slot(&mut self, slot: PartitionSlot) -> Result<(), BootError> {
        if self.reject {
            return Err(BootError::FlashFailed);
        }
        self.boot.set(slot);
        Ok(())
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub type TestCtx = OtaContext<MockNvs, MockFlash, MockBoot>;

pub const BUILD_VERSION: &str = "1.0.0 (host)";

#[derive(Default, Clone, Copy)]
pub struct RigOptions {
    pub fail_at_chunk: Option<usize>,
    pub missing: Option<PartitionSlot>,
    pub reject_boot: bool,
    pub nvs_down: bool,
    pub history_capacity: Option<usize>,
}

pub struct Rig {
    pub ctx: TestCtx,
    pub sink: RecordingSink,
    pub nvs_down: Rc<Cell<bool>>,
}

impl Rig {
    pub fn new(running: PartitionSlot) -> Self {
        Self::with(running, RigOptions::default())
    }

    pub fn with(running: PartitionSlot, opts: RigOptions) -> Self {
        let boot_cell = Rc::new(Cell::new(running));
        let nvs = MockNvs::new();
        let nvs_down = nvs.failure_switch();
        nvs_down.set(opts.nvs_down);

        let mut sink = RecordingSink::new();
        let store = VersionStore::open(
            nvs,
            running,
            BUILD_VERSION,
            opts.history_capacity.unwrap_or(10),
            &mut sink,
        );
        let flash = MockFlash {
            running,
            boot: Rc::clone(&boot_cell),
            target: None,
            fail_at_chunk: opts.fail_at_chunk,
            chunks: 0,
            written: Vec::new(),
            aborts: 0,
        };
        let boot = MockBoot {
            running,
            boot: boot_cell,
            missing: opts.missing,
            reject: opts.reject_boot,
        };
        Self {
            ctx: OtaContext::new(store, flash, boot, 500),
            sink,
            nvs_down,
        }
    }

    /// Push a whole image through the context in `chunk`-byte pieces.
    pub fn upload(&mut self, filename: &str, image: &[u8], chunk: usize, now_ms: u64) -> otadash::error::Result<PartitionSlot> {
        self.ctx.begin_upload(filename, &mut self.sink)?;
        for piece in image.chunks(chunk) {
            self.ctx.upload_chunk(piece, &mut self.sink)?;
        }
        self.ctx.finish_upload(now_ms, &mut self.sink)
    }

    /// Run the control loop until the deferred restart fires.
    pub fn drain_reboot(&mut self, from_ms: u64) -> bool {
        (0..100).any(|i| self.ctx.poll_actions(from_ms + i * 20).is_some())
    }
}

// ── Payload builders ──────────────────────────────────────────

/// An app image whose descriptor carries `version`, `date` and `time`.
pub fn firmware_image(version: &str, date: &str, time: &str, body_len: usize) -> Vec<u8> {
    const DESC: usize = 32;
    let mut img = vec![0u8; DESC + 256 + body_len];
    img[0] = 0xE9;
    img[DESC..DESC + 4].copy_from_slice(&0xABCD_5432u32.to_le_bytes());
    img[DESC + 16..DESC + 16 + version.len()].copy_from_slice(version.as_bytes());
    img[DESC + 48..DESC + 48 + 7].copy_from_slice(b"otadash");
    img[DESC + 80..DESC + 80 + time.len()].copy_from_slice(time.as_bytes());
    img[DESC + 96..DESC + 96 + date.len()].copy_from_slice(date.as_bytes());
    for (i, b) in img[DESC + 256..].iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    img
}

pub const BOUNDARY: &str = "----otadashBoundary4f9a";

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// A form body with a single `update` file field.
pub fn multipart_body(filename: &str, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    out.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"update\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    out.extend_from_slice(data);
    out.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    out
}

/// Body reader yielding at most `step` bytes per call, then end of stream.
pub fn reader(body: &[u8], step: usize) -> impl FnMut(&mut [u8]) -> Result<usize, &'static str> + '_ {
    let mut pos = 0;
    move |buf: &mut [u8]| {
        let n = step.min(buf.len()).min(body.len() - pos);
        buf[..n].copy_from_slice(&body[pos..pos + n]);
        pos += n;
        Ok(n)
    }
}

/// Body reader that fails with a connection error after `fail_after` bytes.
pub fn broken_reader(body: &[u8], step: usize, fail_after: usize) -> impl FnMut(&mut [u8]) -> Result<usize, &'static str> + '_ {
    let mut pos = 0;
    move |buf: &mut [u8]| {
        if pos >= fail_after {
            return Err("connection reset");
        }
        let n = step.min(buf.len()).min(fail_after - pos).min(body.len() - pos);
        buf[..n].copy_from_slice(&body[pos..pos + n]);
        pos += n;
        Ok(n)
    }
}
