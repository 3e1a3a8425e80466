//! Application boundary — port traits and outbound events.
//!
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping the OTA core fully testable without real
//! peripherals.

pub mod events;
pub mod ports;
