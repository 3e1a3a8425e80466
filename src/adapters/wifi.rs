//! WiFi AP+STA adapter.
//!
//! The soft-AP always runs so the dashboard stays reachable at the
//! configured gateway address. When station credentials are provisioned
//! the adapter also joins the upstream network.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver via `esp_idf_svc::wifi`.
//! - **all other targets**: simulation with an injectable link state.
//!
//! ## Connection policy
//!
//! The boot-time station connect is a bounded poll; on timeout the device
//! carries on AP-only. Afterwards [`WifiAdapter::poll`] retries a dropped
//! link on an exponential backoff (2 s → 4 s → 8 s … capped at 60 s).

use core::fmt;
use log::{info, warn};

use crate::config::{Passphrase, Ssid, SystemConfig};

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    ipv4::{self, Mask, RouterConfiguration, Subnet},
    netif::{EspNetif, NetifConfiguration},
    wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi},
};

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no station credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::ConnectionFailed => write!(f, "station connect timed out"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    /// Soft-AP only; no station configured.
    ApOnly,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

const INITIAL_BACKOFF_MS: u32 = 2_000;
const MAX_BACKOFF_MS: u32 = 60_000;
#[cfg(target_os = "espidf")]
const CONNECT_POLL_MS: u32 = 500;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    let printable = ssid.bytes().all(|b| b == b' ' || b.is_ascii_graphic());
    if ssid.is_empty() || ssid.len() > 32 || !printable {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    ssid: Ssid,
    password: Passphrase,
    backoff_ms: u32,
    next_retry_ms: u64,
    #[cfg(target_os = "espidf")]
    wifi: EspWifi<'static>,
    /// Simulation: whether the upstream AP is reachable.
    #[cfg(not(target_os = "espidf"))]
    sim_link_up: bool,
    /// Simulation: counts reconnect attempts.
    #[cfg(not(target_os = "espidf"))]
    sim_attempts: u32,
}

impl WifiAdapter {
    /// Bring up the soft-AP (and the station interface when provisioned).
    #[cfg(target_os = "espidf")]
    pub fn start(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        cfg: &SystemConfig,
    ) -> anyhow::Result<Self> {
        use anyhow::anyhow;
        use std::net::Ipv4Addr;

        let mut wifi = EspWifi::new(modem, sys_loop, None)?;

        let gateway = Ipv4Addr::from(cfg.ap_ip);
        let ap_netif = EspNetif::new_with_conf(&NetifConfiguration {
            ip_configuration: Some(ipv4::Configuration::Router(RouterConfiguration {
                subnet: Subnet {
                    gateway,
                    mask: Mask(24),
                },
                dhcp_enabled: true,
                dns: None,
                secondary_dns: None,
            })),
            ..NetifConfiguration::wifi_default_router()
        })?;
        wifi.swap_netif_ap(ap_netif)?;

        let ap = AccessPointConfiguration {
            ssid: cfg
                .ap_ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("AP SSID too long"))?,
            password: cfg
                .ap_password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("AP password too long"))?,
            auth_method: AuthMethod::WPA2Personal,
            channel: 1,
            ..Default::default()
        };

        let configuration = if cfg.has_station() {
            Configuration::Mixed(
                ClientConfiguration {
                    ssid: cfg
                        .sta_ssid
                        .as_str()
                        .try_into()
                        .map_err(|_| anyhow!("station SSID too long"))?,
                    password: cfg
                        .sta_password
                        .as_str()
                        .try_into()
                        .map_err(|_| anyhow!("station password too long"))?,
                    auth_method: if cfg.sta_password.is_empty() {
                        AuthMethod::None
                    } else {
                        AuthMethod::WPA2Personal
                    },
                    ..Default::default()
                },
                ap,
            )
        } else {
            Configuration::AccessPoint(ap)
        };

        wifi.set_configuration(&configuration)?;
        wifi.start()?;
        info!("WiFi: AP '{}' up at {}", cfg.ap_ssid, gateway);

        let mut adapter = Self {
            state: WifiState::ApOnly,
            ssid: Ssid::new(),
            password: Passphrase::new(),
            backoff_ms: INITIAL_BACKOFF_MS,
            next_retry_ms: 0,
            wifi,
        };
        if cfg.has_station() {
            adapter
                .set_credentials(&cfg.sta_ssid, &cfg.sta_password)
                .map_err(|e| anyhow!("{e}"))?;
        }
        Ok(adapter)
    }

    /// Bring up the simulated soft-AP (and station when provisioned).
    #[cfg(not(target_os = "espidf"))]
    pub fn start(cfg: &SystemConfig) -> Result<Self, ConnectivityError> {
        let mut adapter = Self {
            state: WifiState::ApOnly,
            ssid: Ssid::new(),
            password: Passphrase::new(),
            backoff_ms: INITIAL_BACKOFF_MS,
            next_retry_ms: 0,
            sim_link_up: true,
            sim_attempts: 0,
        };
        info!(
            "WiFi(sim): AP '{}' up at {}.{}.{}.{}",
            cfg.ap_ssid, cfg.ap_ip[0], cfg.ap_ip[1], cfg.ap_ip[2], cfg.ap_ip[3]
        );
        if cfg.has_station() {
            adapter.set_credentials(&cfg.sta_ssid, &cfg.sta_password)?;
        }
        Ok(adapter)
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }

    pub fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|_| ConnectivityError::InvalidPassword)?;
        info!("WiFi: station credentials set (SSID='{}')", self.ssid);
        Ok(())
    }

    /// Join the upstream network, giving up after `timeout_ms`.
    ///
    /// On timeout the adapter stays up in AP-only mode and [`poll`](Self::poll)
    /// keeps retrying in the background.
    pub fn connect(&mut self, timeout_ms: u32, now_ms: u64) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            info!("WiFi: no station configured, AP-only");
            return Err(ConnectivityError::NoCredentials);
        }

        info!("WiFi: connecting to '{}' ({} ms budget)", self.ssid, timeout_ms);
        self.state = WifiState::Connecting;

        if self.platform_wait_connected(timeout_ms) {
            self.state = WifiState::Connected;
            self.backoff_ms = INITIAL_BACKOFF_MS;
            info!("WiFi: station connected");
            Ok(())
        } else {
            warn!("WiFi: station connect timed out, continuing AP-only");
            self.state = WifiState::Reconnecting { attempt: 0 };
            self.next_retry_ms = now_ms + u64::from(self.backoff_ms);
            Err(ConnectivityError::ConnectionFailed)
        }
    }

    /// Control-loop upkeep: detect a dropped link and retry on backoff.
    pub fn poll(&mut self, now_ms: u64) {
        match self.state {
            WifiState::Connected => {
                if !self.platform_is_connected() {
                    warn!("WiFi: station link lost, entering reconnect");
                    self.backoff_ms = INITIAL_BACKOFF_MS;
                    self.next_retry_ms = now_ms + u64::from(self.backoff_ms);
                    self.state = WifiState::Reconnecting { attempt: 0 };
                }
            }
            WifiState::Reconnecting { attempt } => {
                if self.platform_is_connected() {
                    info!("WiFi: station reconnected after {} attempts", attempt);
                    self.backoff_ms = INITIAL_BACKOFF_MS;
                    self.state = WifiState::Connected;
                } else if now_ms >= self.next_retry_ms {
                    info!(
                        "WiFi: reconnect attempt {} (backoff {} ms)",
                        attempt + 1,
                        self.backoff_ms
                    );
                    self.platform_reconnect();
                    self.backoff_ms = (self.backoff_ms * 2).min(MAX_BACKOFF_MS);
                    self.next_retry_ms = now_ms + u64::from(self.backoff_ms);
                    self.state = WifiState::Reconnecting {
                        attempt: attempt + 1,
                    };
                }
            }
            WifiState::ApOnly | WifiState::Connecting => {}
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_wait_connected(&mut self, timeout_ms: u32) -> bool {
        use esp_idf_svc::hal::delay::FreeRtos;

        if let Err(e) = self.wifi.connect() {
            warn!("WiFi: connect request failed: {}", e);
            return false;
        }
        let mut waited = 0;
        while waited < timeout_ms {
            if self.platform_is_connected() {
                return true;
            }
            FreeRtos::delay_ms(CONNECT_POLL_MS);
            waited += CONNECT_POLL_MS;
        }
        self.platform_is_connected()
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_wait_connected(&mut self, _timeout_ms: u32) -> bool {
        self.sim_attempts = self.sim_attempts.wrapping_add(1);
        self.sim_link_up
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.sim_link_up
    }

    #[cfg(target_os = "espidf")]
    fn platform_reconnect(&mut self) {
        if let Err(e) = self.wifi.connect() {
            warn!("WiFi: reconnect request failed: {}", e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_reconnect(&mut self) {
        self.sim_attempts = self.sim_attempts.wrapping_add(1);
    }

    /// Simulation: make the upstream AP reachable or not.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_link(&mut self, up: bool) {
        self.sim_link_up = up;
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
