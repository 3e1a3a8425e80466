//! HTTP surface: dashboard page, OTA routes and the upload body decoder.
//!
//! | Module      | Role                                               |
//! |-------------|----------------------------------------------------|
//! | `routes`    | handler functions returning [`routes::HttpResponse`] |
//! | `multipart` | streaming `multipart/form-data` decoder            |
//! | `dashboard` | embedded HTML page                                 |
//! | `server`    | ESP-IDF `EspHttpServer` registration (device only) |

pub mod dashboard;
pub mod multipart;
pub mod routes;
#[cfg(target_os = "espidf")]
pub mod server;

pub use routes::HttpResponse;
