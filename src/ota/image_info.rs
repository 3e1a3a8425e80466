//! ESP-IDF application descriptor sniffing.
//!
//! An app image starts with a 24-byte image header and an 8-byte segment
//! header, followed by the 256-byte `esp_app_desc_t`:
//!
//! ```text
//!  off  size  field
//!    0     4  magic_word (0xABCD5432, LE)
//!   16    32  version
//!   48    32  project_name
//!   80    16  time
//!   96    16  date
//! ```
//!
//! The sniffer copies the first [`SNIFF_LEN`] bytes of an upload so the
//! committed slot can be recorded under the version baked into the image.

use crate::ota::version_store::{UNKNOWN, VersionString, bounded_version};

const IMAGE_MAGIC: u8 = 0xE9;
const IMAGE_HEADER_LEN: usize = 24;
const SEGMENT_HEADER_LEN: usize = 8;
const APP_DESC_OFFSET: usize = IMAGE_HEADER_LEN + SEGMENT_HEADER_LEN;
const APP_DESC_MAGIC: u32 = 0xABCD_5432;
const APP_DESC_LEN: usize = 256;

/// Bytes needed to read the descriptor.
pub const SNIFF_LEN: usize = APP_DESC_OFFSET + APP_DESC_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub version: heapless::String<32>,
    pub project: heapless::String<32>,
    pub date: heapless::String<16>,
    pub time: heapless::String<16>,
}

fn c_field<const N: usize>(raw: &[u8]) -> heapless::String<N> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let text = String::from_utf8_lossy(&raw[..end]);
    let mut out = heapless::String::new();
    for ch in text.trim().chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

impl FirmwareInfo {
    /// Parse the descriptor from the first bytes of an image.
    pub fn parse(header: &[u8]) -> Option<Self> {
        if header.len() < SNIFF_LEN || header[0] != IMAGE_MAGIC {
            return None;
        }
        let desc = &header[APP_DESC_OFFSET..SNIFF_LEN];
        let magic = u32::from_le_bytes([desc[0], desc[1], desc[2], desc[3]]);
        if magic != APP_DESC_MAGIC {
            return None;
        }
        Some(Self {
            version: c_field(&desc[16..48]),
            project: c_field(&desc[48..80]),
            time: c_field(&desc[80..96]),
            date: c_field(&desc[96..112]),
        })
    }

    /// `<version> (<date> <time>)`, or just the version when undated.
    pub fn version_string(&self) -> VersionString {
        if self.date.is_empty() && self.time.is_empty() {
            return bounded_version(&self.version);
        }
        bounded_version(&format!("{} ({} {})", self.version, self.date, self.time))
    }
}

/// Version to record for an upload: descriptor, else filename, else `Unknown`.
pub fn derive_version(info: Option<&FirmwareInfo>, filename: &str) -> VersionString {
    match info {
        Some(info) if !info.version.is_empty() => info.version_string(),
        _ if !filename.is_empty() => bounded_version(filename),
        _ => bounded_version(UNKNOWN),
    }
}

/// Captures the head of an upload stream.
#[derive(Debug, Default)]
pub struct FirmwareInfoSniffer {
    head: heapless::Vec<u8, SNIFF_LEN>,
}

impl FirmwareInfoSniffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.head.clear();
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        let room = SNIFF_LEN - self.head.len();
        let take = room.min(chunk.len());
        // Cannot overflow: `take` is bounded by the remaining capacity.
        let _ = self.head.extend_from_slice(&chunk[..take]);
    }

    pub fn info(&self) -> Option<FirmwareInfo> {
        FirmwareInfo::parse(&self.head)
    }
}

#[cfg(test)]
pub(crate) fn synthetic_image(version: &str, date: &str, time: &str, body_len: usize) -> Vec<u8> {
    let mut img = vec![0u8; SNIFF_LEN + body_len];
    img[0] = IMAGE_MAGIC;
    let desc = &mut img[APP_DESC_OFFSET..];
    desc[..4].copy_from_slice(&APP_DESC_MAGIC.to_le_bytes());
    desc[16..16 + version.len()].copy_from_slice(version.as_bytes());
    desc[48..48 + 7].copy_from_slice(b"otadash");
    desc[80..80 + time.len()].copy_from_slice(time.as_bytes());
    desc[96..96 + date.len()].copy_from_slice(date.as_bytes());
    img
}
