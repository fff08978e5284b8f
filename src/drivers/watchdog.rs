//! Task Watchdog Timer (TWDT) driver.
//!
//! Resets the device if the subscribed request loop stalls for longer than
//! the configured timeout.  Light sleep legitimately blocks the loop for up
//! to a full periodic-wake interval, so the loop unsubscribes around it
//! with [`suspend`](Watchdog::suspend) / [`resume`](Watchdog::resume).

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

pub const DEFAULT_TIMEOUT_MS: u32 = 10_000;

pub struct Watchdog {
    #[cfg(target_os = "espidf")]
    subscribed: bool,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS)
    }
}

impl Watchdog {
    /// Configure the TWDT and subscribe the calling task.
    pub fn new(timeout_ms: u32) -> Self {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: TWDT API calls from task context.
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK as i32 {
                    log::warn!(
                        "TWDT reconfigure returned {} (may already be configured)",
                        ret
                    );
                }
            }
            let mut wdt = Self { subscribed: false };
            wdt.resume();
            if wdt.subscribed {
                info!("Watchdog: subscribed ({} ms timeout, panic on trigger)", timeout_ms);
            }
            wdt
        }

        #[cfg(not(target_os = "espidf"))]
        {
            log::info!("Watchdog(sim): no-op ({} ms)", timeout_ms);
            Self {}
        }
    }

    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        {
            if self.subscribed {
                // SAFETY: resets only the calling task's entry.
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }
    }

    /// Unsubscribe the calling task (before a long blocking wait).
    pub fn suspend(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            if self.subscribed {
                // SAFETY: null handle means the calling task.
                let ret = unsafe { esp_task_wdt_delete(core::ptr::null_mut()) };
                if ret == ESP_OK as i32 {
                    self.subscribed = false;
                } else {
                    log::warn!("Watchdog: unsubscribe failed ({})", ret);
                }
            }
        }
    }

    /// Re-subscribe the calling task.
    pub fn resume(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            if !self.subscribed {
                // SAFETY: null handle means the calling task.
                let ret = unsafe { esp_task_wdt_add(core::ptr::null_mut()) };
                self.subscribed = ret == ESP_OK as i32;
                if !self.subscribed {
                    log::warn!("Watchdog: failed to subscribe ({})", ret);
                }
            }
        }
    }
}
