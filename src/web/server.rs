//! ESP-IDF HTTP server wiring.
//!
//! Registers one `fn_handler` per route. Each handler locks the shared
//! state it needs, calls the matching function in [`super::routes`] and
//! writes the [`HttpResponse`] back. No route logic lives here.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use esp_idf_svc::hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_svc::http::server::{Configuration as HttpConfiguration, EspHttpConnection, EspHttpServer, Request};
use esp_idf_svc::http::{Headers, Method};
use esp_idf_svc::io::{Read, Write};
use log::info;

use crate::adapters::flash::EspFlashSink;
use crate::adapters::gpio::LedBank;
use crate::adapters::log_sink::LogEventSink;
use crate::adapters::nvs::NvsAdapter;
use crate::adapters::partition::EspBootManager;
use crate::adapters::temperature::LatestReading;
use crate::adapters::time;
use crate::config::SystemConfig;
use crate::ota::OtaContext;
use crate::web::routes::{self, HttpResponse, UploadRequest};

pub type DeviceOta = OtaContext<NvsAdapter, EspFlashSink, EspBootManager>;
pub type SharedOta = Arc<Mutex<DeviceOta>>;

pub type LedPin = PinDriver<'static, AnyOutputPin, Output>;

/// LED outputs together with the store their states persist to.
pub struct GpioPanel {
    pub leds: LedBank<LedPin>,
    pub nvs: NvsAdapter,
}

pub type SharedGpio = Arc<Mutex<GpioPanel>>;

fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> anyhow::Result<MutexGuard<'a, T>> {
    m.lock().map_err(|_| anyhow!("{what} lock poisoned"))
}

fn respond(req: Request<&mut EspHttpConnection<'_>>, resp: &HttpResponse) -> anyhow::Result<()> {
    req.into_response(resp.status, None, &[("Content-Type", resp.content_type)])?
        .write_all(resp.body.as_bytes())?;
    Ok(())
}

pub fn start(
    cfg: &SystemConfig,
    ota: SharedOta,
    gpio: SharedGpio,
    reading: LatestReading,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port: cfg.http_port,
        stack_size: 16 * 1024,
        uri_match_wildcard: true,
        ..Default::default()
    };
    let mut server = EspHttpServer::new(&conf)?;

    server.fn_handler::<anyhow::Error, _>("/", Method::Get, |req| respond(req, &routes::index()))?;

    // ── OTA ───────────────────────────────────────────────────
    {
        let ota = ota.clone();
        let chunk = usize::from(cfg.upload_buffer_bytes);
        server.fn_handler::<anyhow::Error, _>("/update", Method::Post, move |mut req| {
            let content_type = req.header("Content-Type").map(str::to_owned);
            let content_len = req.content_len();
            let mut buf = vec![0u8; chunk];
            let resp = {
                let mut ctx = lock(&ota, "OTA")?;
                routes::update(
                    &mut *ctx,
                    UploadRequest {
                        content_type: content_type.as_deref(),
                        content_len,
                    },
                    &mut buf,
                    |b| req.read(b),
                    time::uptime_ms,
                    &mut LogEventSink::new(),
                )
            };
            respond(req, &resp)
        })?;
    }

    for (path, handler) in [
        ("/current_version", routes::current_version as fn(&DeviceOta) -> HttpResponse),
        ("/ota_version", routes::ota_version),
        ("/ota_time", routes::ota_time),
        ("/ota_versions", routes::ota_versions),
        ("/ota_history", routes::ota_history),
        ("/ota_status", routes::ota_status),
    ] {
        let ota = ota.clone();
        server.fn_handler::<anyhow::Error, _>(path, Method::Get, move |req| {
            let resp = handler(&*lock(&ota, "OTA")?);
            respond(req, &resp)
        })?;
    }

    {
        let ota = ota.clone();
        server.fn_handler::<anyhow::Error, _>("/switch_partition", Method::Get, move |req| {
            let uri = req.uri().to_string();
            let now = time::uptime_ms();
            let resp = routes::switch_partition(&mut *lock(&ota, "OTA")?, &uri, now, &mut LogEventSink::new());
            respond(req, &resp)
        })?;
    }

    // ── Dashboard ─────────────────────────────────────────────
    server.fn_handler::<anyhow::Error, _>("/temperature", Method::Get, move |req| {
        respond(req, &routes::temperature(reading.celsius()))
    })?;

    {
        let gpio = gpio.clone();
        server.fn_handler::<anyhow::Error, _>("/status", Method::Get, move |req| {
            let resp = routes::status(&lock(&gpio, "GPIO")?.leds);
            respond(req, &resp)
        })?;
    }

    for (path, led, on) in [
        ("/led1on", 1, true),
        ("/led1off", 1, false),
        ("/led2on", 2, true),
        ("/led2off", 2, false),
    ] {
        let gpio = gpio.clone();
        server.fn_handler::<anyhow::Error, _>(path, Method::Get, move |req| {
            let resp = {
                let mut panel = lock(&gpio, "GPIO")?;
                let GpioPanel { leds, nvs } = &mut *panel;
                routes::led(leds, nvs, led, on, &mut LogEventSink::new())
            };
            respond(req, &resp)
        })?;
    }

    server.fn_handler::<anyhow::Error, _>("/gpio", Method::Get, move |req| {
        let uri = req.uri().to_string();
        let resp = {
            let mut panel = lock(&gpio, "GPIO")?;
            let GpioPanel { leds, nvs } = &mut *panel;
            routes::gpio(leds, nvs, &uri, &mut LogEventSink::new())
        };
        respond(req, &resp)
    })?;

    // Registered last: wildcard matching tries handlers in order.
    server.fn_handler::<anyhow::Error, _>("/*", Method::Get, |req| respond(req, &routes::not_found()))?;

    info!("HTTP: listening on port {}", cfg.http_port);
    Ok(server)
}
