//! RoverCam firmware entry point.
//!
//! Hexagonal core on three pinned threads sharing one device registry.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter   CameraAdapter   NvsAdapter   Esp32Time      │
//! │  (servo/LED/ADC)   (frame bufs)    (Config)     (TimePort)     │
//! │  WifiAdapter       EspPowerAdapter LogEventSink                │
//! │  (Network)         (light sleep)   (EventSink)                 │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  request loop (core 0)   stream worker (core 1)  sleep monitor │
//! │  AppService              StreamWorker            SleepCycleMgr │
//! │        └──────────── DeviceRegistry (static) ──────────┘       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

use rovercam::adapters::camera::{self, CameraAdapter};
use rovercam::adapters::hardware::HardwareAdapter;
use rovercam::adapters::log_sink::LogEventSink;
use rovercam::adapters::nvs::NvsAdapter;
use rovercam::adapters::sleep::{self, EspPowerAdapter};
use rovercam::adapters::time::{Esp32TimeAdapter, SystemDelay};
use rovercam::adapters::wifi::{LinkMode, WifiAdapter};
use rovercam::app::commands::{LoopRequest, RequestQueue};
use rovercam::app::events::AppEvent;
use rovercam::app::ports::{ConfigPort, EventSink, NetworkPort, TimePort};
use rovercam::app::registry::DeviceRegistry;
use rovercam::app::service::AppService;
use rovercam::drivers::task_pin::{self, SLEEP_MONITOR_TASK, STREAM_TASK};
use rovercam::drivers::watchdog::{self, Watchdog};
use rovercam::drivers::hw_init;
use rovercam::power::SleepCycleManager;
use rovercam::stream::{StreamHandle, StreamSession, StreamWorker};

// ── Shared state ──────────────────────────────────────────────

static REGISTRY: DeviceRegistry = DeviceRegistry::new();
static STREAM: StreamHandle = StreamHandle::new();
/// Inbound work for the request loop: transport commands and sleep entry.
static REQUESTS: RequestQueue = RequestQueue::new();

fn halt(what: &str, e: impl core::fmt::Display) -> ! {
    error!("{} failed: {}, halting for watchdog reset", what, e);
    #[allow(clippy::empty_loop)]
    loop {}
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  RoverCam v{}                         ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let boot_cause = sleep::boot_wake_cause();
    info!("Boot: wake cause {:?}", boot_cause);

    // ── 2. Configuration ──────────────────────────────────────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => halt("NVS init", e),
    };
    let config = nvs.load_or_default();

    // ── 3. Peripherals ────────────────────────────────────────
    if let Err(e) = hw_init::init_peripherals() {
        halt("HAL init", e);
    }
    if let Err(e) = camera::init_camera(&config.camera) {
        halt("camera init", e);
    }

    // ── 4. Network ────────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let esp_wifi = EspWifi::new(peripherals.modem, sysloop.clone(), None)?;
    let mut wifi = WifiAdapter::new();
    wifi.attach(BlockingWifi::wrap(esp_wifi, sysloop)?);
    match nvs.load_credentials() {
        Ok(Some(creds)) => {
            if let Err(e) = wifi.set_credentials(&creds) {
                warn!("stored credentials rejected: {}", e);
            }
        }
        Ok(None) => {}
        Err(e) => warn!("credential load failed: {}", e),
    }
    let link = wifi.start();

    // ── 5. Stream worker (core 1) ─────────────────────────────
    let clock = Esp32TimeAdapter::new();
    let stream_cfg = config.stream;
    task_pin::spawn(STREAM_TASK, move || {
        let session = StreamSession::new(&REGISTRY, CameraAdapter::new(), clock, stream_cfg);
        let mut worker = StreamWorker::new(session, &STREAM);
        worker.run(&mut SystemDelay::new());
    })?;

    // ── 6. Sleep monitor (core 0) ─────────────────────────────
    let monitor = SleepCycleManager::new(config.sleep);
    task_pin::spawn(SLEEP_MONITOR_TASK, move || {
        let mut delay = SystemDelay::new();
        let interval = monitor.config().check_interval_ms as u32;
        loop {
            delay.delay_ms(interval);
            monitor.monitor_pass(&REGISTRY, &REQUESTS, clock.uptime_ms());
        }
    })?;

    // ── 7. Request loop (this thread) ─────────────────────────
    let loop_interval_ms = config.control_loop_interval_ms;
    let mut hw = HardwareAdapter::board();
    let mut power = EspPowerAdapter::new();
    let mut log_sink = LogEventSink::new();
    let mut delay = SystemDelay::new();

    let mut app = AppService::new(config, &REGISTRY, &STREAM, clock);
    app.set_ap_mode(link == LinkMode::AccessPoint);
    app.start(boot_cause, &mut hw, &mut log_sink);

    let mut wdt = Watchdog::new(watchdog::DEFAULT_TIMEOUT_MS);
    info!("System ready. Entering request loop.");

    loop {
        while let Ok(req) = REQUESTS.try_receive() {
            match req {
                LoopRequest::Command { id, command } => {
                    let result = app.handle_command(command, &mut hw, &nvs, &mut wifi);
                    log_sink.emit(&AppEvent::CommandResult { id, result });
                }
                LoopRequest::EnterSleep => {
                    wdt.suspend();
                    match app.enter_sleep(&mut hw, &mut power, &mut wifi, &mut log_sink) {
                        Ok(cause) => info!("request loop: resumed after sleep ({:?})", cause),
                        Err(e) => info!("request loop: sleep skipped: {}", e),
                    }
                    wdt.resume();
                }
            }
        }

        app.tick(&mut hw, &mut delay, &wifi, &mut log_sink);
        wifi.poll(clock.uptime_ms());
        wdt.feed();
        delay.delay_ms(loop_interval_ms);
    }
}
