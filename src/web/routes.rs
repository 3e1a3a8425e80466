//! HTTP route handlers.
//!
//! Every handler is a plain function over explicit state (`OtaContext`,
//! `LedBank`, the latest temperature) returning an [`HttpResponse`]. The
//! ESP-IDF server in [`super::server`] only copies request data in and the
//! response out, so the same handlers run unchanged in host tests.

use std::borrow::Cow;
use core::fmt;

use embedded_hal::digital::OutputPin;
use log::{info, warn};
use serde::Serialize;

use crate::adapters::gpio::LedBank;
use crate::app::events::AppEvent;
use crate::app::ports::{BootManager, EventSink, FlashSink, StoragePort};
use crate::error::OtaError;
use crate::ota::OtaContext;
use crate::ota::orchestrator::UpdateState;
use crate::web::dashboard;
use crate::web::multipart::{MultipartDecoder, MultipartError, Part};

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_HTML: &str = "text/html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Cow<'static, str>,
}

impl HttpResponse {
    pub fn text(status: u16, body: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            content_type: TEXT_PLAIN,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            content_type: APPLICATION_JSON,
            body: body.into(),
        }
    }

    pub fn html(body: &'static str) -> Self {
        Self {
            status: 200,
            content_type: TEXT_HTML,
            body: Cow::Borrowed(body),
        }
    }

    fn serialized(value: &impl Serialize) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self::json(200, body),
            Err(e) => {
                warn!("HTTP: JSON encode failed: {}", e);
                Self::text(500, "Encoding error")
            }
        }
    }
}

/// Value of `key` in the query string of `uri`. No percent-decoding.
pub fn query_param<'a>(uri: &'a str, key: &str) -> Option<&'a str> {
    let (_, query) = uri.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

// ── Firmware upload ───────────────────────────────────────────

/// Failure while receiving an upload body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    Ota(OtaError),
    Body(MultipartError),
}

impl From<OtaError> for UploadError {
    fn from(e: OtaError) -> Self {
        Self::Ota(e)
    }
}

impl From<MultipartError> for UploadError {
    fn from(e: MultipartError) -> Self {
        Self::Body(e)
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ota(e) => write!(f, "{e}"),
            Self::Body(e) => write!(f, "{e}"),
        }
    }
}

/// Request metadata the upload handler needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadRequest<'a> {
    pub content_type: Option<&'a str>,
    pub content_len: Option<u64>,
}

/// `POST /update`.
///
/// `read` pulls the next body bytes into the buffer; `Ok(0)` is end of
/// stream and `Err` is a broken connection. Both before the upload is
/// complete abort the transfer. `clock` is sampled at commit time.
pub fn update<S, F, B, E>(
    ctx: &mut OtaContext<S, F, B>,
    req: UploadRequest<'_>,
    buf: &mut [u8],
    mut read: impl FnMut(&mut [u8]) -> Result<usize, E>,
    clock: impl Fn() -> u64,
    sink: &mut impl EventSink,
) -> HttpResponse
where
    S: StoragePort,
    F: FlashSink,
    B: BootManager,
    E: fmt::Display,
{
    let multipart = req
        .content_type
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/"));

    let result = if multipart {
        match MultipartDecoder::from_content_type(req.content_type.unwrap_or_default()) {
            Ok(decoder) => receive_multipart(ctx, decoder, buf, &mut read, sink),
            Err(e) => Err(e.into()),
        }
    } else {
        receive_raw(ctx, req.content_len, buf, &mut read, sink)
    };

    let result = result.and_then(|()| ctx.finish_upload(clock(), sink).map_err(UploadError::from));

    match result {
        Ok(slot) => {
            info!("HTTP: update written to {}", slot);
            HttpResponse::text(200, "Update OK")
        }
        Err(UploadError::Ota(e)) => HttpResponse::text(e.http_status(), format!("Update Failed: {e}")),
        Err(UploadError::Body(e)) => {
            warn!("HTTP: malformed upload: {}", e);
            HttpResponse::text(400, format!("Bad upload: {e}"))
        }
    }
}

fn receive_multipart<S, F, B, E>(
    ctx: &mut OtaContext<S, F, B>,
    mut decoder: MultipartDecoder,
    buf: &mut [u8],
    read: &mut impl FnMut(&mut [u8]) -> Result<usize, E>,
    sink: &mut impl EventSink,
) -> Result<(), UploadError>
where
    S: StoragePort,
    F: FlashSink,
    B: BootManager,
    E: fmt::Display,
{
    while !decoder.is_complete() {
        let n = match read(buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("HTTP: body read failed: {}", e);
                return Err(ctx.abort_upload(sink).into());
            }
        };
        let fed = decoder.feed(&buf[..n], &mut |part: Part<'_>| forward_part(ctx, part, sink));
        if let Err(e) = fed {
            return Err(abandon(ctx, e, sink));
        }
    }
    decoder.finish().map_err(|e| abandon(ctx, e.into(), sink))
}

fn forward_part<S, F, B>(
    ctx: &mut OtaContext<S, F, B>,
    part: Part<'_>,
    sink: &mut impl EventSink,
) -> Result<(), UploadError>
where
    S: StoragePort,
    F: FlashSink,
    B: BootManager,
{
    match part {
        Part::Start { filename } => {
            ctx.begin_upload(filename, sink)?;
        }
        Part::Data(chunk) => ctx.upload_chunk(chunk, sink)?,
        Part::End => {}
    }
    Ok(())
}

/// A body error while the flash is armed aborts the transfer.
fn abandon<S, F, B>(ctx: &mut OtaContext<S, F, B>, e: UploadError, sink: &mut impl EventSink) -> UploadError
where
    S: StoragePort,
    F: FlashSink,
    B: BootManager,
{
    if matches!(e, UploadError::Body(_)) && ctx.state() == UpdateState::Uploading {
        return ctx.abort_upload(sink).into();
    }
    e
}

fn receive_raw<S, F, B, E>(
    ctx: &mut OtaContext<S, F, B>,
    content_len: Option<u64>,
    buf: &mut [u8],
    read: &mut impl FnMut(&mut [u8]) -> Result<usize, E>,
    sink: &mut impl EventSink,
) -> Result<(), UploadError>
where
    S: StoragePort,
    F: FlashSink,
    B: BootManager,
    E: fmt::Display,
{
    ctx.begin_upload("", sink)?;
    let mut received = 0u64;
    loop {
        match read(buf) {
            Ok(0) => break,
            Ok(n) => {
                ctx.upload_chunk(&buf[..n], sink)?;
                received += n as u64;
            }
            Err(e) => {
                warn!("HTTP: body read failed: {}", e);
                return Err(ctx.abort_upload(sink).into());
            }
        }
        if content_len.is_some_and(|len| received >= len) {
            break;
        }
    }
    if content_len.is_some_and(|len| received < len) {
        warn!("HTTP: body ended at {} of {:?} bytes", received, content_len);
        return Err(ctx.abort_upload(sink).into());
    }
    Ok(())
}

// ── OTA queries ───────────────────────────────────────────────

/// `GET /current_version`
pub fn current_version<S: StoragePort, F: FlashSink, B: BootManager>(
    ctx: &OtaContext<S, F, B>,
) -> HttpResponse {
    HttpResponse::text(200, String::from(ctx.current_version().as_str()))
}

/// `GET /ota_version`
pub fn ota_version<S: StoragePort, F: FlashSink, B: BootManager>(ctx: &OtaContext<S, F, B>) -> HttpResponse {
    HttpResponse::text(200, String::from(ctx.last_written_version().as_str()))
}

/// `GET /ota_time`
pub fn ota_time<S: StoragePort, F: FlashSink, B: BootManager>(ctx: &OtaContext<S, F, B>) -> HttpResponse {
    HttpResponse::text(200, ctx.last_update_timestamp())
}

/// `GET /ota_versions`
pub fn ota_versions<S: StoragePort, F: FlashSink, B: BootManager>(ctx: &OtaContext<S, F, B>) -> HttpResponse {
    HttpResponse::serialized(&ctx.list_partitions())
}

/// `GET /ota_history`: oldest first.
pub fn ota_history<S: StoragePort, F: FlashSink, B: BootManager>(ctx: &OtaContext<S, F, B>) -> HttpResponse {
    let entries: Vec<_> = ctx.history().iter().map(ToString::to_string).collect();
    HttpResponse::serialized(&entries)
}

#[derive(Serialize)]
struct OtaStatus<'a> {
    state: &'a str,
    bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// `GET /ota_status`
pub fn ota_status<S: StoragePort, F: FlashSink, B: BootManager>(ctx: &OtaContext<S, F, B>) -> HttpResponse {
    let state = ctx.state();
    let error = match state {
        UpdateState::Failed(e) => Some(e.to_string()),
        _ => None,
    };
    HttpResponse::serialized(&OtaStatus {
        state: state.name(),
        bytes: ctx.session().bytes,
        error,
    })
}

/// `GET /switch_partition?target=<name>`
pub fn switch_partition<S: StoragePort, F: FlashSink, B: BootManager>(
    ctx: &mut OtaContext<S, F, B>,
    uri: &str,
    now_ms: u64,
    sink: &mut impl EventSink,
) -> HttpResponse {
    let Some(target) = query_param(uri, "target").filter(|t| !t.is_empty()) else {
        return HttpResponse::text(400, "Missing target parameter");
    };
    match ctx.switch_partition(target, now_ms, sink) {
        Ok(slot) => HttpResponse::text(
            200,
            format!("Boot partition set to {}. Rebooting...", slot.name()),
        ),
        Err(e) => {
            warn!("HTTP: switch to '{}' failed: {}", target, e);
            HttpResponse::text(e.http_status(), format!("Switch Failed: {e}"))
        }
    }
}

// ── Dashboard ─────────────────────────────────────────────────

/// `GET /`
pub fn index() -> HttpResponse {
    HttpResponse::html(dashboard::INDEX_HTML)
}

/// `GET /temperature`: degrees Celsius, two decimals.
pub fn temperature(celsius: f32) -> HttpResponse {
    HttpResponse::text(200, format!("{celsius:.2}"))
}

/// `GET /status`
pub fn status<P: OutputPin>(leds: &LedBank<P>) -> HttpResponse {
    let [led1, led2] = leds.states();
    HttpResponse::json(200, serde_json::json!({ "led1": led1, "led2": led2 }).to_string())
}

const fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

/// `GET /led{1,2}{on,off}`
pub fn led<P: OutputPin, S: StoragePort>(
    leds: &mut LedBank<P>,
    storage: &mut S,
    led: u8,
    on: bool,
    sink: &mut impl EventSink,
) -> HttpResponse {
    match leds.set(led, on, storage) {
        Ok(()) => {
            sink.emit(&AppEvent::LedChanged { led, on });
            HttpResponse::json(
                200,
                serde_json::json!({ "led": led, "status": on_off(on) }).to_string(),
            )
        }
        Err(e) => HttpResponse::text(500, format!("LED {led}: {e}")),
    }
}

/// `GET /gpio?pin=<n>&state=<on|off|1|0>`: only pins wired to an LED.
pub fn gpio<P: OutputPin, S: StoragePort>(
    leds: &mut LedBank<P>,
    storage: &mut S,
    uri: &str,
    sink: &mut impl EventSink,
) -> HttpResponse {
    let (Some(pin), Some(state)) = (query_param(uri, "pin"), query_param(uri, "state")) else {
        return HttpResponse::text(400, "Missing pin or state");
    };
    let Ok(pin) = pin.parse::<u8>() else {
        return HttpResponse::text(400, "Invalid pin");
    };
    let on = match state {
        "on" | "1" | "high" => true,
        "off" | "0" | "low" => false,
        _ => return HttpResponse::text(400, "Invalid state"),
    };
    let Some(led) = leds.led_for_pin(pin) else {
        return HttpResponse::text(400, format!("GPIO {pin} is not an LED output"));
    };
    match leds.set(led, on, storage) {
        Ok(()) => {
            sink.emit(&AppEvent::LedChanged { led, on });
            HttpResponse::json(
                200,
                serde_json::json!({ "pin": pin, "state": on_off(on) }).to_string(),
            )
        }
        Err(e) => HttpResponse::text(500, format!("GPIO {pin}: {e}")),
    }
}

/// Fallback for unregistered paths.
pub fn not_found() -> HttpResponse {
    HttpResponse::text(404, "Not found")
}
