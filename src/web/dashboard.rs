//! Embedded single-page dashboard.

/// Served at `GET /`.
pub const INDEX_HTML: &str = include_str!("dashboard.html");
