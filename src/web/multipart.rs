//! Streaming `multipart/form-data` decoder for firmware uploads.
//!
//! The body looks like:
//!
//! ```text
//!   --<boundary>\r\n
//!   Content-Disposition: form-data; name="update"; filename="fw.bin"\r\n
//!   Content-Type: application/octet-stream\r\n
//!   \r\n
//!   <image bytes>
//!   \r\n--<boundary>--\r\n
//! ```
//!
//! Input arrives in arbitrary chunks. While inside a part the decoder
//! holds back the last `end_marker.len()` bytes so a delimiter split
//! across two reads is still found; everything before the hold-back zone
//! is passed on immediately. Only the firmware part (field `update`) is
//! forwarded; other parts are skipped, file fields included, and anything
//! after the firmware part is ignored.

use core::fmt;

/// Longest boundary accepted (RFC 2046 limit).
pub const MAX_BOUNDARY_LEN: usize = 70;
/// Cap on a single part's header block.
const MAX_PART_HEADERS: usize = 1024;
/// Form field carrying the image.
pub const FIRMWARE_FIELD: &str = "update";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartError {
    /// `Content-Type` lacks a usable `boundary=` parameter.
    MissingBoundary,
    /// The part header block exceeded its cap.
    HeadersTooLarge,
    /// The body ended without a firmware part.
    NoFirmwarePart,
    /// The body ended before the closing delimiter of the firmware part.
    Truncated,
}

impl fmt::Display for MultipartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBoundary => write!(f, "missing multipart boundary"),
            Self::HeadersTooLarge => write!(f, "part headers too large"),
            Self::NoFirmwarePart => write!(f, "no '{}' file field", FIRMWARE_FIELD),
            Self::Truncated => write!(f, "body truncated"),
        }
    }
}

/// Decoder output, in stream order.
#[derive(Debug, PartialEq, Eq)]
pub enum Part<'a> {
    /// The firmware part begins.
    Start { filename: &'a str },
    /// Image bytes, verbatim.
    Data(&'a [u8]),
    /// The firmware part's closing delimiter was seen.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Preamble,
    AfterDelimiter,
    Headers,
    Body { forward: bool },
    Done,
}

pub struct MultipartDecoder {
    /// `\r\n--<boundary>`; the first delimiter is matched without the CRLF.
    end_marker: Vec<u8>,
    buf: Vec<u8>,
    phase: Phase,
    completed: bool,
}

impl MultipartDecoder {
    pub fn new(boundary: &str) -> Result<Self, MultipartError> {
        if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
            return Err(MultipartError::MissingBoundary);
        }
        let mut end_marker = Vec::with_capacity(4 + boundary.len());
        end_marker.extend_from_slice(b"\r\n--");
        end_marker.extend_from_slice(boundary.as_bytes());
        Ok(Self {
            end_marker,
            buf: Vec::new(),
            phase: Phase::Preamble,
            completed: false,
        })
    }

    /// Build a decoder from a `Content-Type` header value.
    pub fn from_content_type(content_type: &str) -> Result<Self, MultipartError> {
        let boundary = find_boundary(content_type).ok_or(MultipartError::MissingBoundary)?;
        Self::new(boundary)
    }

    /// Whether the firmware part has been fully delivered.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Push `input` through the decoder, reporting parts to `on`.
    pub fn feed<E>(
        &mut self,
        input: &[u8],
        on: &mut impl FnMut(Part<'_>) -> Result<(), E>,
    ) -> Result<(), E>
    where
        E: From<MultipartError>,
    {
        if self.phase == Phase::Done {
            return Ok(());
        }
        self.buf.extend_from_slice(input);

        loop {
            match self.phase {
                Phase::Preamble => {
                    let dash_boundary = &self.end_marker[2..];
                    match find_subsequence(&self.buf, dash_boundary) {
                        Some(pos) => {
                            let consumed = pos + dash_boundary.len();
                            self.buf.drain(..consumed);
                            self.phase = Phase::AfterDelimiter;
                        }
                        None => {
                            let keep = dash_boundary.len() - 1;
                            if self.buf.len() > keep {
                                let excess = self.buf.len() - keep;
                                self.buf.drain(..excess);
                            }
                            return Ok(());
                        }
                    }
                }

                Phase::AfterDelimiter => {
                    if self.buf.len() < 2 {
                        return Ok(());
                    }
                    if self.buf.starts_with(b"--") {
                        // Closing delimiter: no more parts.
                        self.phase = Phase::Done;
                        self.buf.clear();
                        return Ok(());
                    }
                    self.buf.drain(..2);
                    self.phase = Phase::Headers;
                }

                Phase::Headers => {
                    let Some(pos) = find_subsequence(&self.buf, b"\r\n\r\n") else {
                        if self.buf.len() > MAX_PART_HEADERS {
                            return Err(MultipartError::HeadersTooLarge.into());
                        }
                        return Ok(());
                    };
                    let headers = &self.buf[..pos];
                    let filename = extract_param(headers, b"filename=\"");
                    let forward = extract_param(headers, b" name=\"")
                        .is_some_and(|n| n == FIRMWARE_FIELD.as_bytes());
                    if forward {
                        let name = filename
                            .and_then(|f| core::str::from_utf8(f).ok())
                            .unwrap_or("");
                        on(Part::Start { filename: name })?;
                    }
                    self.buf.drain(..pos + 4);
                    self.phase = Phase::Body { forward };
                }

                Phase::Body { forward } => {
                    let marker_len = self.end_marker.len();
                    match find_subsequence(&self.buf, &self.end_marker) {
                        Some(pos) => {
                            if forward {
                                if pos > 0 {
                                    on(Part::Data(&self.buf[..pos]))?;
                                }
                                on(Part::End)?;
                                self.completed = true;
                                self.phase = Phase::Done;
                                self.buf.clear();
                                return Ok(());
                            }
                            self.buf.drain(..pos + marker_len);
                            self.phase = Phase::AfterDelimiter;
                        }
                        None => {
                            if self.buf.len() > marker_len {
                                let safe = self.buf.len() - marker_len;
                                if forward {
                                    on(Part::Data(&self.buf[..safe]))?;
                                }
                                self.buf.drain(..safe);
                            }
                            return Ok(());
                        }
                    }
                }

                Phase::Done => return Ok(()),
            }
        }
    }

    /// Call at end of body. Errors if the firmware part is incomplete.
    pub fn finish(&self) -> Result<(), MultipartError> {
        match (self.completed, self.phase) {
            (true, _) => Ok(()),
            (false, Phase::Done) => Err(MultipartError::NoFirmwarePart),
            (false, Phase::Body { forward: true }) => Err(MultipartError::Truncated),
            (false, _) => Err(MultipartError::NoFirmwarePart),
        }
    }
}

// ── Header helpers ────────────────────────────────────────────

/// Extract `boundary=<value>` (quoted or bare) from a Content-Type value.
pub fn find_boundary(content_type: &str) -> Option<&str> {
    let bytes = content_type.as_bytes();
    let marker = b"boundary=";
    let pos = bytes
        .windows(marker.len())
        .position(|w| w.eq_ignore_ascii_case(marker))?;
    let rest = &content_type[pos + marker.len()..];

    let value = if let Some(inner) = rest.strip_prefix('"') {
        &inner[..inner.find('"')?]
    } else {
        let end = rest
            .find(|c: char| c == ';' || c == ' ' || c == '\r' || c == '\n')
            .unwrap_or(rest.len());
        &rest[..end]
    };
    (!value.is_empty()).then_some(value)
}

/// Value of a quoted parameter such as `filename="..."` in part headers.
fn extract_param<'a>(headers: &'a [u8], marker: &[u8]) -> Option<&'a [u8]> {
    let pos = headers
        .windows(marker.len())
        .position(|w| w.eq_ignore_ascii_case(marker))?;
    let rest = &headers[pos + marker.len()..];
    let end = rest.iter().position(|&b| b == b'"')?;
    (end > 0).then(|| &rest[..end])
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
