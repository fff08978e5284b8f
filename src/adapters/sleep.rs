//! Light-sleep power adapter.
//!
//! Implements [`PowerPort`] on top of the ESP-IDF sleep API:
//!
//! - wake sources: `esp_sleep_enable_wifi_wakeup()` (network traffic) and
//!   `esp_sleep_enable_timer_wakeup()` (periodic check-in);
//! - `esp_light_sleep_start()` blocks the calling task; RAM, peripherals
//!   and the Wi-Fi association are retained;
//! - Wi-Fi modem power save (`esp_wifi_set_ps`) is required for
//!   Wi-Fi wake and is lifted again on wake.
//!
//! The host build sleeps the thread for a short simulated interval and
//! reports a timer wake.

use log::{debug, info};

use crate::app::ports::{PowerError, PowerPort, WakeCause};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

pub struct EspPowerAdapter {
    armed_timer_ms: Option<u64>,
    power_save: bool,
    sleeps: u32,
}

impl Default for EspPowerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl EspPowerAdapter {
    pub fn new() -> Self {
        Self {
            armed_timer_ms: None,
            power_save: false,
            sleeps: 0,
        }
    }

    /// Light-sleep cycles completed since boot.
    pub fn sleep_count(&self) -> u32 {
        self.sleeps
    }

    pub fn power_save_enabled(&self) -> bool {
        self.power_save
    }
}

/// Map the reset/wake cause reported at boot.  A cold power-on is `None`.
#[cfg(target_os = "espidf")]
pub fn boot_wake_cause() -> WakeCause {
    // SAFETY: reads the latched wake cause register.
    let cause = unsafe { esp_sleep_get_wakeup_cause() };
    map_wake_cause(cause)
}

#[cfg(not(target_os = "espidf"))]
pub fn boot_wake_cause() -> WakeCause {
    WakeCause::None
}

#[cfg(target_os = "espidf")]
fn map_wake_cause(cause: esp_sleep_source_t) -> WakeCause {
    match cause {
        esp_sleep_source_t_ESP_SLEEP_WAKEUP_UNDEFINED => WakeCause::None,
        esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => WakeCause::Timer,
        _ => WakeCause::ExternalActivity,
    }
}

impl PowerPort for EspPowerAdapter {
    fn set_wifi_power_save(&mut self, enabled: bool) {
        #[cfg(target_os = "espidf")]
        {
            let mode = if enabled {
                wifi_ps_type_t_WIFI_PS_MIN_MODEM
            } else {
                wifi_ps_type_t_WIFI_PS_NONE
            };
            // SAFETY: plain driver call; fails harmlessly if Wi-Fi is not started.
            let ret = unsafe { esp_wifi_set_ps(mode) };
            if ret != ESP_OK as i32 {
                log::warn!("power: esp_wifi_set_ps({}) failed ({})", enabled, ret);
            }
        }
        self.power_save = enabled;
        debug!("power: wifi power save {}", if enabled { "on" } else { "off" });
    }

    fn arm_wake_sources(&mut self, timer_ms: u64) -> Result<(), PowerError> {
        if timer_ms == 0 {
            return Err(PowerError::WakeSourceRejected("timer interval is zero"));
        }
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: wake-source configuration only; takes effect at the
            // next esp_light_sleep_start().
            let ret = unsafe { esp_sleep_enable_timer_wakeup(timer_ms.saturating_mul(1000)) };
            if ret != ESP_OK as i32 {
                return Err(PowerError::WakeSourceRejected("timer"));
            }
            let ret = unsafe { esp_sleep_enable_wifi_wakeup() };
            if ret != ESP_OK as i32 {
                return Err(PowerError::WakeSourceRejected("wifi"));
            }
        }
        self.armed_timer_ms = Some(timer_ms);
        Ok(())
    }

    fn light_sleep(&mut self) -> WakeCause {
        let Some(_timer_ms) = self.armed_timer_ms.take() else {
            log::warn!("power: light sleep without armed wake sources, skipped");
            return WakeCause::None;
        };
        self.sleeps = self.sleeps.wrapping_add(1);

        #[cfg(target_os = "espidf")]
        {
            // SAFETY: wake sources were armed above; the call blocks the
            // calling task until one fires.
            let ret = unsafe { esp_light_sleep_start() };
            if ret != ESP_OK as i32 {
                log::warn!("power: esp_light_sleep_start failed ({})", ret);
                return WakeCause::None;
            }
            let cause = map_wake_cause(unsafe { esp_sleep_get_wakeup_cause() });
            info!("power: woke from light sleep ({:?})", cause);
            cause
        }

        #[cfg(not(target_os = "espidf"))]
        {
            std::thread::sleep(std::time::Duration::from_millis(_timer_ms.min(50)));
            info!("power(sim): woke from light sleep (Timer)");
            WakeCause::Timer
        }
    }
}
