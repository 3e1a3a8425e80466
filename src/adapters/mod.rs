//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements   | Connects to                     |
//! |---------------|--------------|---------------------------------|
//! | `flash`       | FlashSink    | esp-ota / in-memory image       |
//! | `gpio`        | —            | LED outputs (embedded-hal)      |
//! | `log_sink`    | EventSink    | Serial log output               |
//! | `nvs`         | ConfigPort   | NVS / in-memory store           |
//! |               | StoragePort  |                                 |
//! | `partition`   | BootManager  | ESP-IDF partition table/otadata |
//! | `temperature` | —            | ESP32 internal sensor           |
//! | `time`        | —            | ESP32 system timer              |
//! | `wifi`        | —            | ESP-IDF WiFi AP+STA             |

pub mod flash;
pub mod gpio;
pub mod log_sink;
pub mod nvs;
pub mod partition;
pub mod temperature;
pub mod time;
pub mod wifi;
