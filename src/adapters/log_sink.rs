//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Booted { running, version } => {
                info!("BOOT  | running={} version='{}'", running, version);
            }
            AppEvent::SelfRegistered(slot) => {
                info!("BOOT  | self-registered {}", slot);
            }
            AppEvent::UploadStarted { target } => {
                info!("OTA   | upload started -> {}", target);
            }
            AppEvent::UploadProgress { bytes } => {
                info!("OTA   | {} KiB received", bytes / 1024);
            }
            AppEvent::UploadCommitted {
                slot,
                version,
                bytes,
            } => {
                info!(
                    "OTA   | committed {} bytes to {} as '{}'",
                    bytes, slot, version
                );
            }
            AppEvent::UploadFailed { error, bytes } => {
                warn!("OTA   | upload failed after {} bytes: {}", bytes, error);
            }
            AppEvent::BootTargetChanged(slot) => {
                info!("BOOT  | next boot -> {}", slot);
            }
            AppEvent::RebootScheduled => {
                info!("BOOT  | restart scheduled");
            }
            AppEvent::Temperature(c) => {
                debug!("TEMP  | {:.2}\u{00b0}C", c);
            }
            AppEvent::LedChanged { led, on } => {
                info!("GPIO  | led{}={}", led, if *on { "on" } else { "off" });
            }
        }
    }
}
