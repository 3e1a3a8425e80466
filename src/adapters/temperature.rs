//! ESP32 internal temperature sensor.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads the on-die sensor through the ROM helper
//! `temprature_sens_read()` (Fahrenheit, sic).
//! On host/test: reads from a static AtomicU8 for injection.

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::AtomicU8;

#[cfg(target_os = "espidf")]
unsafe extern "C" {
    fn temprature_sens_read() -> u8;
}

#[cfg(not(target_os = "espidf"))]
static SIM_TEMP_RAW: AtomicU8 = AtomicU8::new(113); // 45 °C

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_temp_raw(raw: u8) {
    SIM_TEMP_RAW.store(raw, Ordering::Relaxed);
}

/// Convert the sensor's raw Fahrenheit reading to Celsius.
pub fn raw_to_celsius(raw: u8) -> f32 {
    (f32::from(raw) - 32.0) / 1.8
}

pub struct TemperatureSensor;

impl TemperatureSensor {
    pub fn new() -> Self {
        Self
    }

    pub fn read_celsius(&self) -> f32 {
        raw_to_celsius(self.read_raw())
    }

    #[cfg(target_os = "espidf")]
    fn read_raw(&self) -> u8 {
        // SAFETY: ROM routine without preconditions.
        unsafe { temprature_sens_read() }
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_raw(&self) -> u8 {
        SIM_TEMP_RAW.load(Ordering::Relaxed)
    }
}

impl Default for TemperatureSensor {
    fn default() -> Self {
        Self::new()
    }
}

/// Latest sample, shared between the control loop and the HTTP handlers.
#[derive(Debug, Clone, Default)]
pub struct LatestReading(Arc<AtomicU32>);

impl LatestReading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, celsius: f32) {
        self.0.store(celsius.to_bits(), Ordering::Relaxed);
    }

    pub fn celsius(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}
