//! System configuration parameters
//!
//! All tunable parameters for the OTA dashboard firmware.
//! Values can be overridden via NVS (namespace `otadash`, key `syscfg`).

use serde::{Deserialize, Serialize};

/// Bounded SSID (802.11 limit).
pub type Ssid = heapless::String<32>;
/// Bounded WPA2 passphrase.
pub type Passphrase = heapless::String<64>;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Access point ---
    /// SSID broadcast by the soft-AP
    pub ap_ssid: Ssid,
    /// Soft-AP passphrase (WPA2, 8–63 chars)
    pub ap_password: Passphrase,
    /// Soft-AP gateway address
    pub ap_ip: [u8; 4],

    // --- Station ---
    /// Upstream network SSID; empty disables the station link
    pub sta_ssid: Ssid,
    /// Upstream network passphrase (empty for open networks)
    pub sta_password: Passphrase,
    /// Bound on the blocking station connect at boot (milliseconds)
    pub sta_connect_timeout_ms: u32,

    // --- HTTP ---
    /// Dashboard / OTA listen port
    pub http_port: u16,
    /// Per-read buffer for streamed uploads (bytes)
    pub upload_buffer_bytes: u16,

    // --- OTA ---
    /// Maximum retained update history entries
    pub history_capacity: u8,
    /// Delay between a scheduled restart and the actual reset (milliseconds)
    pub reboot_grace_ms: u32,

    // --- GPIO ---
    /// GPIO number driving LED 1
    pub led1_pin: u8,
    /// GPIO number driving LED 2
    pub led2_pin: u8,

    // --- Timing ---
    /// Control loop interval (milliseconds)
    pub loop_interval_ms: u32,
    /// Temperature sample interval (milliseconds)
    pub temperature_interval_ms: u32,
}

fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for ch in s.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Access point
            ap_ssid: bounded("SmartHome"),
            ap_password: bounded("12345678"),
            ap_ip: [192, 168, 1, 1],

            // Station (unprovisioned)
            sta_ssid: Ssid::new(),
            sta_password: Passphrase::new(),
            sta_connect_timeout_ms: 10_000,

            // HTTP
            http_port: 80,
            upload_buffer_bytes: 4096,

            // OTA
            history_capacity: 10,
            reboot_grace_ms: 500,

            // GPIO
            led1_pin: 2,
            led2_pin: 5,

            // Timing
            loop_interval_ms: 20,          // 50 Hz
            temperature_interval_ms: 1000, // 1 Hz
        }
    }
}

impl SystemConfig {
    /// Range-check every field. Out-of-range values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.ap_ssid.is_empty() {
            return Err("ap_ssid must not be empty");
        }
        if !(8..=63).contains(&self.ap_password.len()) {
            return Err("ap_password must be 8–63 chars");
        }
        if !self.sta_password.is_empty() && self.sta_password.len() < 8 {
            return Err("sta_password must be empty or at least 8 chars");
        }
        if !(1_000..=60_000).contains(&self.sta_connect_timeout_ms) {
            return Err("sta_connect_timeout_ms must be 1000–60000");
        }
        if self.http_port == 0 {
            return Err("http_port must be non-zero");
        }
        if !(512..=16_384).contains(&self.upload_buffer_bytes) {
            return Err("upload_buffer_bytes must be 512–16384");
        }
        if !(1..=50).contains(&self.history_capacity) {
            return Err("history_capacity must be 1–50");
        }
        if !(100..=10_000).contains(&self.reboot_grace_ms) {
            return Err("reboot_grace_ms must be 100–10000");
        }
        if self.led1_pin > 48 || self.led2_pin > 48 {
            return Err("led pins must be 0–48");
        }
        if self.led1_pin == self.led2_pin {
            return Err("led1_pin and led2_pin must differ");
        }
        if !(5..=1_000).contains(&self.loop_interval_ms) {
            return Err("loop_interval_ms must be 5–1000");
        }
        if !(100..=60_000).contains(&self.temperature_interval_ms) {
            return Err("temperature_interval_ms must be 100–60000");
        }
        Ok(())
    }

    /// Whether station credentials have been provisioned.
    pub fn has_station(&self) -> bool {
        !self.sta_ssid.is_empty()
    }
}
