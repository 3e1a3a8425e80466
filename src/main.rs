//! OtaDash Firmware — Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspFlashSink   EspBootManager   NvsAdapter    LogEventSink    │
//! │  (FlashSink)    (BootManager)    (Config+NVS)  (EventSink)     │
//! │  WifiAdapter    LedBank          TemperatureSensor             │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │     OtaContext (Arc<Mutex>) ◀── HTTP route handlers    │    │
//! │  │  VersionStore · ImageReceiver · PartitionSelector ·    │    │
//! │  │  UpdateOrchestrator · ActionQueue                      │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Control loop: WiFi upkeep · temperature · deferred restart    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::{AnyOutputPin, PinDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use log::{info, warn};

use otadash::adapters::flash::EspFlashSink;
use otadash::adapters::gpio::LedBank;
use otadash::adapters::log_sink::LogEventSink;
use otadash::adapters::nvs::NvsAdapter;
use otadash::adapters::partition::{self, EspBootManager};
use otadash::adapters::temperature::{LatestReading, TemperatureSensor};
use otadash::adapters::time;
use otadash::adapters::wifi::WifiAdapter;
use otadash::app::events::AppEvent;
use otadash::app::ports::{BootManager, ConfigPort, EventSink};
use otadash::config::SystemConfig;
use otadash::ota::OtaContext;
use otadash::ota::version_store::VersionStore;
use otadash::scheduler::{DeferredAction, IntervalTimer};
use otadash::web::server::{self, GpioPanel};

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  OtaDash v{}                         ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // Reaching main means this image boots; cancel any pending rollback.
    partition::mark_running_valid();

    // ── 2. Config from NVS (or defaults) ──────────────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {e}"))?;
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };

    let mut log_sink = LogEventSink::new();

    // ── 3. OTA context ────────────────────────────────────────
    let boot = EspBootManager::new();
    let store = VersionStore::open(
        nvs,
        boot.running_slot(),
        &partition::running_build_version(),
        usize::from(config.history_capacity),
        &mut log_sink,
    );
    let ota = Arc::new(Mutex::new(OtaContext::new(
        store,
        EspFlashSink::new(),
        boot,
        config.reboot_grace_ms,
    )));

    // ── 4. Peripherals ────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;

    // SAFETY: the LED pins come from config and are not claimed by any
    // other driver in this firmware.
    let (led1, led2) = unsafe {
        (
            AnyOutputPin::new(i32::from(config.led1_pin)),
            AnyOutputPin::new(i32::from(config.led2_pin)),
        )
    };
    let mut leds = LedBank::new(
        [PinDriver::output(led1)?, PinDriver::output(led2)?],
        [config.led1_pin, config.led2_pin],
    );
    let gpio_nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {e}"))?;
    leds.restore(&gpio_nvs);
    let gpio = Arc::new(Mutex::new(GpioPanel {
        leds,
        nvs: gpio_nvs,
    }));

    let sensor = TemperatureSensor::new();
    let reading = LatestReading::new();

    // ── 5. Network ────────────────────────────────────────────
    let mut wifi = WifiAdapter::start(peripherals.modem, sys_loop, &config)?;
    if let Err(e) = wifi.connect(config.sta_connect_timeout_ms, time::uptime_ms()) {
        info!("WiFi: station unavailable ({}), dashboard on AP only", e);
    }

    let _http = server::start(&config, ota.clone(), gpio, reading.clone())?;

    info!("System ready. Entering control loop.");

    // ── 6. Control loop ───────────────────────────────────────
    let mut temperature_timer = IntervalTimer::new(config.temperature_interval_ms);

    loop {
        let now = time::uptime_ms();

        wifi.poll(now);

        if temperature_timer.due(now) {
            let celsius = sensor.read_celsius();
            reading.store(celsius);
            log_sink.emit(&AppEvent::Temperature(celsius));
        }

        // An upload holds the lock for its whole body; never stall on it.
        let due = match ota.try_lock() {
            Ok(mut ctx) => ctx.poll_actions(now),
            Err(_) => None,
        };
        if let Some(DeferredAction::Reboot) = due {
            info!("OTA: restarting");
            esp_ota::restart();
        }

        FreeRtos::delay_ms(config.loop_interval_ms);
    }
}
