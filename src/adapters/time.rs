//! ESP32 time adapter and blocking delay.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic), and
//!   `esp_idf_hal::delay::Delay` (busy-wait below a tick, FreeRTOS sleep
//!   above).
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` and
//!   `std::thread::sleep` for host-side testing and simulation.

use embedded_hal::delay::DelayNs;

use crate::app::ports::TimePort;

/// Monotonic clock since boot.  Copies share the same epoch, so every
/// activity can hold its own.
#[derive(Debug, Clone, Copy)]
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.uptime_us() / 1_000_000
    }
}

impl TimePort for Esp32TimeAdapter {
    #[cfg(target_os = "espidf")]
    fn uptime_us(&self) -> u64 {
        // SAFETY: reads the free-running esp_timer counter.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    #[cfg(not(target_os = "espidf"))]
    fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

// ── Delay ─────────────────────────────────────────────────────

/// Blocking delay for the calling thread.
pub struct SystemDelay {
    #[cfg(target_os = "espidf")]
    inner: esp_idf_svc::hal::delay::Delay,
}

impl Default for SystemDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemDelay {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            inner: esp_idf_svc::hal::delay::Delay::new_default(),
        }
    }
}

impl DelayNs for SystemDelay {
    #[cfg(target_os = "espidf")]
    fn delay_ns(&mut self, ns: u32) {
        self.inner.delay_ns(ns);
    }

    #[cfg(target_os = "espidf")]
    fn delay_us(&mut self, us: u32) {
        self.inner.delay_us(us);
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        self.inner.delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}
