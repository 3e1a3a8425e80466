//! Monotonic milliseconds since boot.
//!
//! Used by the control loop timers, the deferred restart and the
//! `lastUpdate` / history timestamps. On the device this is the ESP-IDF
//! high-resolution timer; on the host it counts from the first call.

#[cfg(target_os = "espidf")]
pub fn uptime_ms() -> u64 {
    // SAFETY: esp_timer_get_time has no preconditions once the scheduler runs.
    let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
    us.max(0) as u64 / 1_000
}

#[cfg(not(target_os = "espidf"))]
pub fn uptime_ms() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_millis() as u64
}
