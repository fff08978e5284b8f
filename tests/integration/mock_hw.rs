//! Mock adapters for integration tests.
//!
//! Every port is backed by plain recorded state so tests can assert on the
//! full call history without touching LEDC, ADC or the camera driver.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use embedded_hal::delay::DelayNs;

use rovercam::app::events::AppEvent;
use rovercam::app::ports::{
    ActuatorPort, BatteryAdcPort, CameraControlPort, CameraPort, ConfigError, ConfigPort,
    EventSink, FrameData, FrameSink, NetworkPort, PixelFormat, PowerError, PowerPort, SinkId,
    TimePort, WakeCause, WifiCredentials,
};
use rovercam::config::{CameraParams, SystemConfig};
use rovercam::error::{ActuatorError, CommsError, SensorError};

// ── MockHardware ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    Drive { left_us: u16, right_us: u16 },
    Illumination(u8),
}

pub struct MockHardware {
    pub calls: Vec<ActuatorCall>,
    pub applied_camera: Vec<CameraParams>,
    /// Next `apply_camera` fails with this parameter name.
    pub reject_camera: Option<&'static str>,
    /// Raw 12-bit code returned by every ADC read.
    pub adc_raw: u16,
    pub adc_fail: bool,
}

impl MockHardware {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            applied_camera: Vec::new(),
            reject_camera: None,
            adc_raw: 0,
            adc_fail: false,
        }
    }

    /// Set the ADC so that the default 2.0 divider reads `volts`.
    pub fn set_battery_volts(&mut self, volts: f32) {
        self.adc_raw = (volts / 2.0 / 3.3 * 4095.0).round() as u16;
    }

    pub fn last_pulses(&self) -> Option<(u16, u16)> {
        self.calls.iter().rev().find_map(|c| match c {
            ActuatorCall::Drive { left_us, right_us } => Some((*left_us, *right_us)),
            ActuatorCall::Illumination(_) => None,
        })
    }

    pub fn last_illumination(&self) -> Option<u8> {
        self.calls.iter().rev().find_map(|c| match c {
            ActuatorCall::Illumination(p) => Some(*p),
            ActuatorCall::Drive { .. } => None,
        })
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl ActuatorPort for MockHardware {
    fn set_drive_pulses(&mut self, left_us: u16, right_us: u16) {
        self.calls.push(ActuatorCall::Drive { left_us, right_us });
    }

    fn set_illumination(&mut self, percent: u8) {
        self.calls.push(ActuatorCall::Illumination(percent));
    }
}

impl BatteryAdcPort for MockHardware {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        if self.adc_fail {
            return Err(SensorError::AdcReadFailed);
        }
        Ok(self.adc_raw)
    }
}

impl CameraControlPort for MockHardware {
    fn apply_camera(&mut self, params: &CameraParams) -> Result<(), ActuatorError> {
        if let Some(name) = self.reject_camera.take() {
            return Err(ActuatorError::CameraRejected(name));
        }
        self.applied_camera.push(*params);
        Ok(())
    }
}

// ── Time ──────────────────────────────────────────────────────

/// Manually advanced clock shared between clones.
#[derive(Clone, Default)]
pub struct MockClock {
    now_us: Arc<AtomicU64>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ms(&self, ms: u64) {
        self.now_us.store(ms * 1000, Ordering::SeqCst);
    }

    pub fn advance_us(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance_us(ms * 1000);
    }
}

impl TimePort for MockClock {
    fn uptime_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }
}

/// Delay that returns immediately.
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ── Frame sink ────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SinkLog {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub writes: usize,
    pub closed: bool,
    pub disconnected: bool,
    /// Writes accepted before every further write fails.
    pub fail_after_writes: Option<usize>,
    pub reject_begin: bool,
}

impl SinkLog {
    /// Number of multipart parts written so far.
    pub fn parts(&self) -> usize {
        let needle = b"--rovercamframe";
        self.bytes
            .windows(needle.len())
            .filter(|w| *w == needle)
            .count()
    }
}

/// Transport sink whose state stays observable after it moved into the
/// stream session.
pub struct MockSink {
    id: SinkId,
    pub log: Arc<Mutex<SinkLog>>,
}

impl MockSink {
    pub fn new(id: SinkId) -> (Self, Arc<Mutex<SinkLog>>) {
        let log = Arc::new(Mutex::new(SinkLog::default()));
        (
            Self {
                id,
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl FrameSink for MockSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn begin(&mut self, content_type: &str) -> bool {
        let mut log = self.log.lock().unwrap();
        if log.reject_begin {
            return false;
        }
        log.content_type = Some(content_type.to_owned());
        true
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        let mut log = self.log.lock().unwrap();
        if log.fail_after_writes.is_some_and(|n| log.writes >= n) {
            return false;
        }
        log.writes += 1;
        log.bytes.extend_from_slice(bytes);
        true
    }

    fn is_connected(&self) -> bool {
        let log = self.log.lock().unwrap();
        !log.closed && !log.disconnected
    }

    fn close(&mut self) {
        self.log.lock().unwrap().closed = true;
    }
}

// ── Camera ────────────────────────────────────────────────────

pub struct MockFrame {
    data: Vec<u8>,
    format: PixelFormat,
}

impl FrameData for MockFrame {
    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn format(&self) -> PixelFormat {
        self.format
    }
}

#[derive(Debug)]
pub struct CameraState {
    pub available: bool,
    pub format: PixelFormat,
    pub acquired: u32,
    pub released: u32,
}

/// Camera producing a tiny JPEG per acquire while `available`.
pub struct MockCamera {
    pub state: Arc<Mutex<CameraState>>,
}

impl MockCamera {
    pub fn new() -> (Self, Arc<Mutex<CameraState>>) {
        let state = Arc::new(Mutex::new(CameraState {
            available: true,
            format: PixelFormat::Jpeg,
            acquired: 0,
            released: 0,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl CameraPort for MockCamera {
    type Frame = MockFrame;

    fn acquire_frame(&mut self) -> Option<MockFrame> {
        let mut s = self.state.lock().unwrap();
        if !s.available {
            return None;
        }
        s.acquired += 1;
        Some(MockFrame {
            data: vec![0xFF, 0xD8, s.acquired as u8, 0xFF, 0xD9],
            format: s.format,
        })
    }

    fn release_frame(&mut self, _frame: MockFrame) {
        self.state.lock().unwrap().released += 1;
    }
}

// ── Settings ──────────────────────────────────────────────────

pub struct MockNvs {
    pub saved: RefCell<Option<SystemConfig>>,
    pub credentials: RefCell<Option<WifiCredentials>>,
    pub saves: RefCell<u32>,
    pub fail_saves: bool,
}

impl MockNvs {
    pub fn new() -> Self {
        Self {
            saved: RefCell::new(None),
            credentials: RefCell::new(None),
            saves: RefCell::new(0),
            fail_saves: false,
        }
    }

    pub fn save_count(&self) -> u32 {
        *self.saves.borrow()
    }
}

impl Default for MockNvs {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigPort for MockNvs {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        Ok(self.saved.borrow().clone().unwrap_or_default())
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        if self.fail_saves {
            return Err(ConfigError::IoError);
        }
        config.validate()?;
        *self.saved.borrow_mut() = Some(config.clone());
        *self.saves.borrow_mut() += 1;
        Ok(())
    }

    fn save_credentials(&self, creds: &WifiCredentials) -> Result<(), ConfigError> {
        if self.fail_saves {
            return Err(ConfigError::IoError);
        }
        *self.credentials.borrow_mut() = Some(creds.clone());
        Ok(())
    }

    fn load_credentials(&self) -> Result<Option<WifiCredentials>, ConfigError> {
        Ok(self.credentials.borrow().clone())
    }
}

// ── Network ───────────────────────────────────────────────────

pub struct MockNet {
    pub connected: bool,
    pub rssi: i8,
    pub reconnects: u32,
    pub credentials: Option<WifiCredentials>,
}

impl MockNet {
    pub fn connected() -> Self {
        Self {
            connected: true,
            rssi: -55,
            reconnects: 0,
            credentials: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::connected()
        }
    }
}

impl NetworkPort for MockNet {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn rssi(&self) -> Option<i8> {
        self.connected.then_some(self.rssi)
    }

    fn reconnect(&mut self) -> Result<(), CommsError> {
        self.reconnects += 1;
        self.connected = true;
        Ok(())
    }

    fn set_credentials(&mut self, creds: &WifiCredentials) -> Result<(), CommsError> {
        self.credentials = Some(creds.clone());
        Ok(())
    }
}

// ── Power ─────────────────────────────────────────────────────

pub struct MockPower {
    /// Causes returned by successive `light_sleep` calls.
    pub wakes: VecDeque<WakeCause>,
    pub fail_arm: bool,
    pub armed_timer_ms: Option<u64>,
    pub power_save: Vec<bool>,
    pub sleeps: u32,
    /// Advanced by the sleep duration on every `light_sleep`.
    pub clock: Option<(MockClock, u64)>,
}

impl MockPower {
    pub fn waking_with(cause: WakeCause) -> Self {
        Self {
            wakes: VecDeque::from([cause]),
            fail_arm: false,
            armed_timer_ms: None,
            power_save: Vec::new(),
            sleeps: 0,
            clock: None,
        }
    }

    /// Each sleep advances `clock` by `slept_ms`.
    pub fn with_clock(mut self, clock: MockClock, slept_ms: u64) -> Self {
        self.clock = Some((clock, slept_ms));
        self
    }
}

impl PowerPort for MockPower {
    fn set_wifi_power_save(&mut self, enabled: bool) {
        self.power_save.push(enabled);
    }

    fn arm_wake_sources(&mut self, timer_ms: u64) -> Result<(), PowerError> {
        if self.fail_arm {
            return Err(PowerError::WakeSourceRejected("timer"));
        }
        self.armed_timer_ms = Some(timer_ms);
        Ok(())
    }

    fn light_sleep(&mut self) -> WakeCause {
        self.sleeps += 1;
        if let Some((clock, ms)) = &self.clock {
            clock.advance_ms(*ms);
        }
        self.wakes.pop_front().unwrap_or(WakeCause::Timer)
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AppEvent::Status(_)))
            .count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
