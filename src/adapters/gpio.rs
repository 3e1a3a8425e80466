//! Dashboard LED outputs with persisted state.
//!
//! Pins are driven through `embedded_hal::digital::OutputPin`, so the bank
//! works with an ESP-IDF `PinDriver` on the device and with an in-memory
//! pin in tests. Each LED's state is stored as one byte in the `gpio` NVS
//! namespace (`led1`, `led2`) and restored at boot.

use core::fmt;

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::app::ports::{StorageError, StoragePort};

pub const NAMESPACE: &str = "gpio";
const KEYS: [&str; 2] = ["led1", "led2"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedError {
    /// LED number outside 1..=2.
    UnknownLed,
    /// The pin driver rejected the level change.
    Pin,
}

impl fmt::Display for LedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownLed => write!(f, "unknown LED"),
            Self::Pin => write!(f, "pin write failed"),
        }
    }
}

pub struct LedBank<P: OutputPin> {
    pins: [P; 2],
    gpio_nums: [u8; 2],
    states: [bool; 2],
}

impl<P: OutputPin> LedBank<P> {
    /// `gpio_nums` are the board pin numbers, for `/gpio?pin=` lookups.
    pub fn new(pins: [P; 2], gpio_nums: [u8; 2]) -> Self {
        Self {
            pins,
            gpio_nums,
            states: [false; 2],
        }
    }

    /// Restore persisted states (missing keys mean off) and drive the pins.
    pub fn restore(&mut self, storage: &impl StoragePort) {
        for (i, key) in KEYS.iter().enumerate() {
            let mut buf = [0u8; 1];
            self.states[i] = match storage.read(NAMESPACE, key, &mut buf) {
                Ok(1) => buf[0] != 0,
                Ok(_) | Err(StorageError::NotFound) => false,
                Err(e) => {
                    warn!("GPIO: restore {} failed: {}", key, e);
                    false
                }
            };
        }
        self.apply();
    }

    /// Switch LED `led` (1-based), persist, and drive the pin.
    pub fn set(&mut self, led: u8, on: bool, storage: &mut impl StoragePort) -> Result<(), LedError> {
        let idx = Self::index(led)?;
        self.states[idx] = on;
        if let Err(e) = storage.write(NAMESPACE, KEYS[idx], &[u8::from(on)]) {
            warn!("GPIO: persist led{} failed: {}", led, e);
        }
        self.drive(idx)
    }

    pub fn is_on(&self, led: u8) -> Result<bool, LedError> {
        Ok(self.states[Self::index(led)?])
    }

    pub fn states(&self) -> [bool; 2] {
        self.states
    }

    /// LED number driven by board pin `gpio`, if any.
    pub fn led_for_pin(&self, gpio: u8) -> Option<u8> {
        self.gpio_nums
            .iter()
            .position(|&n| n == gpio)
            .map(|i| i as u8 + 1)
    }

    /// Re-drive every pin from the stored state.
    pub fn apply(&mut self) {
        for idx in 0..self.pins.len() {
            if self.drive(idx).is_err() {
                warn!("GPIO: led{} drive failed", idx + 1);
            }
        }
    }

    fn drive(&mut self, idx: usize) -> Result<(), LedError> {
        let pin = &mut self.pins[idx];
        let res = if self.states[idx] {
            pin.set_high()
        } else {
            pin.set_low()
        };
        res.map_err(|_| LedError::Pin)
    }

    fn index(led: u8) -> Result<usize, LedError> {
        match led {
            1 | 2 => Ok(usize::from(led - 1)),
            _ => Err(LedError::UnknownLed),
        }
    }

    #[cfg(test)]
    pub(crate) fn pins(&self) -> &[P; 2] {
        &self.pins
    }
}

/// In-memory output pin for host builds.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimPin {
    pub high: bool,
}

#[cfg(not(target_os = "espidf"))]
impl embedded_hal::digital::ErrorType for SimPin {
    type Error = core::convert::Infallible;
}

#[cfg(not(target_os = "espidf"))]
impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        Ok(())
    }
}
