//! Wi-Fi adapter: station mode with an access-point fallback.
//!
//! Implements [`NetworkPort`].  On boot the adapter joins the stored
//! network; with no credentials, or when the join fails, it opens a setup
//! access point instead and the core is told via `ap_mode` (which also
//! blocks sleep).
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::BlockingWifi` over
//!   `EspWifi`, attached from `main` with [`WifiAdapter::attach`].
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## Reconnection policy
//!
//! While the link is down [`WifiAdapter::poll`] retries with exponential
//! backoff (2 s → 4 s → 8 s … capped at 60 s).

use log::{info, warn};

use crate::app::ports::{NetworkPort, WifiCredentials};
use crate::error::CommsError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration,
    EspWifi,
};

/// SSID of the setup access point.
pub const SETUP_AP_SSID: &str = "RoverCam-Setup";
const SETUP_AP_CHANNEL: u8 = 1;

const MIN_BACKOFF_SECS: u32 = 2;
const MAX_BACKOFF_SECS: u32 = 60;

// ───────────────────────────────────────────────────────────────
// Link state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Radio not started yet.
    Off,
    Station,
    /// Serving the setup access point.
    AccessPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connected,
    Reconnecting { attempt: u32 },
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    #[cfg(target_os = "espidf")]
    driver: Option<BlockingWifi<EspWifi<'static>>>,
    /// Simulation: the next `n` connect attempts fail.
    #[cfg(not(target_os = "espidf"))]
    sim_failures: u32,
    creds: Option<WifiCredentials>,
    mode: LinkMode,
    state: WifiState,
    backoff_secs: u32,
    next_retry_ms: u64,
}

impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            driver: None,
            #[cfg(not(target_os = "espidf"))]
            sim_failures: 0,
            creds: None,
            mode: LinkMode::Off,
            state: WifiState::Disconnected,
            backoff_secs: MIN_BACKOFF_SECS,
            next_retry_ms: 0,
        }
    }

    /// Hand over the ESP-IDF driver built in `main`.
    #[cfg(target_os = "espidf")]
    pub fn attach(&mut self, driver: BlockingWifi<EspWifi<'static>>) {
        self.driver = Some(driver);
    }

    /// Simulation hook: fail the next `n` connect attempts.
    #[cfg(not(target_os = "espidf"))]
    pub fn fail_next_connects(&mut self, n: u32) {
        self.sim_failures = n;
    }

    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// Bring the radio up: station mode with stored credentials, setup
    /// access point otherwise.  Returns the resulting mode.
    pub fn start(&mut self) -> LinkMode {
        if self.creds.is_some() {
            match self.connect_station() {
                Ok(()) => {
                    self.mode = LinkMode::Station;
                    return self.mode;
                }
                Err(e) => warn!("WiFi: station join failed ({}), opening setup AP", e),
            }
        } else {
            info!("WiFi: no credentials stored, opening setup AP");
        }
        match self.platform_start_ap() {
            Ok(()) => {
                self.mode = LinkMode::AccessPoint;
                info!("WiFi: setup AP '{}' up", SETUP_AP_SSID);
            }
            Err(e) => warn!("WiFi: setup AP failed ({})", e),
        }
        self.mode
    }

    /// Backoff-driven reconnect while in station mode.
    pub fn poll(&mut self, now_ms: u64) {
        if self.mode != LinkMode::Station {
            return;
        }
        match self.state {
            WifiState::Connected => {
                if !self.platform_is_connected() {
                    warn!("WiFi: connection lost, entering reconnect");
                    self.state = WifiState::Reconnecting { attempt: 0 };
                    self.next_retry_ms = now_ms;
                }
            }
            WifiState::Reconnecting { attempt } if now_ms >= self.next_retry_ms => {
                info!("WiFi: reconnect attempt {} (backoff {}s)", attempt, self.backoff_secs);
                if self.connect_station().is_err() {
                    self.next_retry_ms = now_ms + u64::from(self.backoff_secs) * 1000;
                    self.backoff_secs = (self.backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    self.state = WifiState::Reconnecting { attempt: attempt + 1 };
                }
            }
            _ => {}
        }
    }

    fn connect_station(&mut self) -> Result<(), CommsError> {
        let Some(creds) = self.creds.clone() else {
            return Err(CommsError::WifiConnectFailed);
        };
        info!("WiFi: connecting to '{}'", creds.ssid);
        match self.platform_connect(&creds) {
            Ok(()) => {
                self.state = WifiState::Connected;
                self.backoff_secs = MIN_BACKOFF_SECS;
                info!("WiFi: connected (RSSI={:?})", self.platform_rssi());
                Ok(())
            }
            Err(e) => {
                warn!("WiFi: connection failed: {}", e);
                if !matches!(self.state, WifiState::Reconnecting { .. }) {
                    self.state = WifiState::Reconnecting { attempt: 0 };
                }
                Err(e)
            }
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, creds: &WifiCredentials) -> Result<(), CommsError> {
        let wifi = self.driver.as_mut().ok_or(CommsError::WifiConnectFailed)?;
        let auth_method = if creds.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: creds
                .ssid
                .as_str()
                .try_into()
                .map_err(|()| CommsError::WifiConnectFailed)?,
            password: creds
                .password
                .as_str()
                .try_into()
                .map_err(|()| CommsError::WifiConnectFailed)?,
            auth_method,
            ..Default::default()
        });
        wifi.set_configuration(&config)
            .map_err(|_| CommsError::WifiConnectFailed)?;
        if !wifi.is_started().unwrap_or(false) {
            wifi.start().map_err(|_| CommsError::WifiConnectFailed)?;
        }
        wifi.connect().map_err(|_| CommsError::WifiConnectFailed)?;
        wifi.wait_netif_up()
            .map_err(|_| CommsError::WifiConnectFailed)?;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, creds: &WifiCredentials) -> Result<(), CommsError> {
        if self.sim_failures > 0 {
            self.sim_failures -= 1;
            warn!("WiFi(sim): simulated join failure for '{}'", creds.ssid);
            return Err(CommsError::WifiConnectFailed);
        }
        info!("WiFi(sim): joined '{}'", creds.ssid);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_start_ap(&mut self) -> Result<(), CommsError> {
        let wifi = self.driver.as_mut().ok_or(CommsError::WifiConnectFailed)?;
        let config = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: SETUP_AP_SSID
                .try_into()
                .map_err(|()| CommsError::WifiConnectFailed)?,
            channel: SETUP_AP_CHANNEL,
            auth_method: AuthMethod::None,
            max_connections: 4,
            ..Default::default()
        });
        wifi.set_configuration(&config)
            .map_err(|_| CommsError::WifiConnectFailed)?;
        wifi.start().map_err(|_| CommsError::WifiConnectFailed)?;
        wifi.wait_netif_up()
            .map_err(|_| CommsError::WifiConnectFailed)?;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start_ap(&mut self) -> Result<(), CommsError> {
        info!("WiFi(sim): AP on channel {}", SETUP_AP_CHANNEL);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.driver
            .as_ref()
            .is_some_and(|w| w.is_connected().unwrap_or(false))
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i8> {
        let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
        // SAFETY: fills the caller-provided record; fails when not associated.
        let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        (ret == esp_idf_svc::sys::ESP_OK as i32).then_some(ap_info.rssi)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        (self.state == WifiState::Connected).then_some(-58)
    }
}

// ───────────────────────────────────────────────────────────────
// NetworkPort
// ───────────────────────────────────────────────────────────────

impl NetworkPort for WifiAdapter {
    fn is_connected(&self) -> bool {
        self.mode == LinkMode::Station && self.platform_is_connected()
    }

    fn rssi(&self) -> Option<i8> {
        if self.is_connected() {
            self.platform_rssi()
        } else {
            None
        }
    }

    fn reconnect(&mut self) -> Result<(), CommsError> {
        if self.mode != LinkMode::Station {
            return Err(CommsError::WifiDisconnected);
        }
        self.connect_station()
    }

    fn set_credentials(&mut self, creds: &WifiCredentials) -> Result<(), CommsError> {
        info!("WiFi: credentials updated (SSID='{}')", creds.ssid);
        self.creds = Some(creds.clone());
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
