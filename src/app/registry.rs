//! Device state registry: the single shared-state surface.
//!
//! ```text
//!   request loop ──┐
//!   stream worker ─┼──▶ DeviceRegistry ──▶ snapshot() / broadcast signal
//!   sleep monitor ─┘     (one blocking mutex)
//! ```
//!
//! Every field is read and written under one
//! [`embassy_sync::blocking_mutex::Mutex`], so no activity can observe a
//! torn update such as `streaming = true` next to a stale Critical
//! battery.  Cross-field invariants live in the mutators here, never in
//! callers:
//!
//! - battery Critical ⇒ `streaming == false`
//! - `ota_active` ⇒ `sleeping == false`
//! - entering sleep requires `!streaming && !ota_active && !ap_mode`
//!
//! Closures passed to the lock must not call back into the registry.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use log::{debug, info, warn};
use serde::Serialize;

use crate::app::ports::WakeCause;
use crate::error::CommandError;
use crate::sensors::battery::BatteryStatus;
use crate::stream::StreamEnded;

/// Pending stream-ended events before the request loop drains them.
const STREAM_EVENT_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    #[default]
    Joystick,
    Sliders,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceState {
    pub streaming: bool,
    pub sleeping: bool,
    pub battery_status: BatteryStatus,
    pub battery_voltage: f32,
    pub ota_active: bool,
    pub ap_mode: bool,
    pub control_mode: ControlMode,
    /// Uptime (ms) of the last command or delivered frame.
    pub last_activity_ms: u64,
    pub last_wake_cause: WakeCause,
    pub sleep_enabled: bool,
    pub illumination: u8,
    /// Published by the stream worker; 0 when idle.
    pub fps: f32,
}

impl DeviceState {
    pub const INITIAL: Self = Self {
        streaming: false,
        sleeping: false,
        battery_status: BatteryStatus::Ok,
        battery_voltage: 0.0,
        ota_active: false,
        ap_mode: false,
        control_mode: ControlMode::Joystick,
        last_activity_ms: 0,
        last_wake_cause: WakeCause::None,
        sleep_enabled: true,
        illumination: 0,
        fps: 0.0,
    };
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// Why a sleep entry was refused at the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepBlocker {
    AlreadySleeping,
    Streaming,
    OtaActive,
    ApMode,
    Disabled,
}

impl core::fmt::Display for SleepBlocker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadySleeping => write!(f, "already sleeping"),
            Self::Streaming => write!(f, "stream active"),
            Self::OtaActive => write!(f, "update in progress"),
            Self::ApMode => write!(f, "access-point mode"),
            Self::Disabled => write!(f, "sleep disabled"),
        }
    }
}

pub struct DeviceRegistry {
    state: Mutex<CriticalSectionRawMutex, RefCell<DeviceState>>,
    broadcast: Signal<CriticalSectionRawMutex, ()>,
    stream_events: Channel<CriticalSectionRawMutex, StreamEnded, STREAM_EVENT_DEPTH>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(DeviceState::INITIAL)),
            broadcast: Signal::new(),
            stream_events: Channel::new(),
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Atomic copy of every field.
    pub fn snapshot(&self) -> DeviceState {
        self.state.lock(|cell| *cell.borrow())
    }

    // ── Activity ──────────────────────────────────────────────

    pub fn record_activity(&self, now_ms: u64) {
        self.update(|s| s.last_activity_ms = s.last_activity_ms.max(now_ms));
    }

    /// Overwrite the activity timestamp, including moving it backwards
    /// (used by the partial advance after an idle timer wake).
    pub fn set_last_activity(&self, at_ms: u64) {
        self.update(|s| s.last_activity_ms = at_ms);
    }

    // ── Battery ───────────────────────────────────────────────

    /// Publish a new battery reading.  Entering Critical clears
    /// `streaming` in the same critical section; returns `true` when it
    /// did so.
    pub fn set_battery(&self, voltage: f32, status: BatteryStatus) -> bool {
        let stopped = self.update(|s| {
            s.battery_voltage = voltage;
            s.battery_status = status;
            if status == BatteryStatus::Critical && s.streaming {
                s.streaming = false;
                return true;
            }
            false
        });
        if stopped {
            warn!("registry: battery critical, stream flagged down");
            self.request_broadcast();
        }
        stopped
    }

    pub fn battery_status(&self) -> BatteryStatus {
        self.snapshot().battery_status
    }

    // ── Streaming ─────────────────────────────────────────────

    /// Mark a session live.  Refused while Critical or asleep.
    pub fn try_start_streaming(&self) -> Result<(), CommandError> {
        self.update(|s| {
            if s.battery_status == BatteryStatus::Critical {
                return Err(CommandError::BatteryCritical);
            }
            if s.sleeping {
                return Err(CommandError::Asleep);
            }
            s.streaming = true;
            Ok(())
        })
    }

    /// Clear `streaming` and the published FPS.
    pub fn stop_streaming(&self) {
        self.update(|s| {
            s.streaming = false;
            s.fps = 0.0;
        });
    }

    pub fn is_streaming(&self) -> bool {
        self.snapshot().streaming
    }

    pub fn set_fps(&self, fps: f32) {
        self.update(|s| s.fps = if s.streaming { fps } else { 0.0 });
    }

    pub fn post_stream_ended(&self, ev: StreamEnded) {
        if self.stream_events.try_send(ev).is_err() {
            warn!("registry: stream event queue full, dropping {:?}", ev.reason);
        }
        self.request_broadcast();
    }

    pub fn next_stream_event(&self) -> Option<StreamEnded> {
        self.stream_events.try_receive().ok()
    }

    // ── Sleep ─────────────────────────────────────────────────

    /// Atomically validate the sleep-entry preconditions and set
    /// `sleeping`.
    pub fn try_enter_sleep(&self) -> Result<(), SleepBlocker> {
        self.update(|s| {
            if s.sleeping {
                return Err(SleepBlocker::AlreadySleeping);
            }
            if !s.sleep_enabled {
                return Err(SleepBlocker::Disabled);
            }
            if s.streaming {
                return Err(SleepBlocker::Streaming);
            }
            if s.ota_active {
                return Err(SleepBlocker::OtaActive);
            }
            if s.ap_mode {
                return Err(SleepBlocker::ApMode);
            }
            s.sleeping = true;
            Ok(())
        })
    }

    /// Leave sleep.  Returns `false` if the device was already awake
    /// (for instance after a forced wake).
    pub fn exit_sleep(&self, cause: WakeCause) -> bool {
        self.update(|s| {
            s.last_wake_cause = cause;
            core::mem::replace(&mut s.sleeping, false)
        })
    }

    pub fn set_sleep_enabled(&self, enabled: bool) {
        self.update(|s| s.sleep_enabled = enabled);
        debug!("registry: sleep_enabled={}", enabled);
    }

    // ── OTA / AP / UI state ───────────────────────────────────

    pub fn begin_ota(&self) -> Result<(), CommandError> {
        self.update(|s| {
            if s.sleeping {
                return Err(CommandError::Asleep);
            }
            s.ota_active = true;
            Ok(())
        })?;
        info!("registry: OTA started, sleep suppressed");
        Ok(())
    }

    pub fn end_ota(&self) {
        self.update(|s| s.ota_active = false);
        info!("registry: OTA finished");
    }

    pub fn set_ap_mode(&self, ap: bool) {
        self.update(|s| s.ap_mode = ap);
    }

    pub fn set_illumination(&self, percent: u8) {
        self.update(|s| s.illumination = percent);
    }

    pub fn set_control_mode(&self, mode: ControlMode) {
        self.update(|s| s.control_mode = mode);
    }

    // ── Broadcast requests ────────────────────────────────────

    pub fn request_broadcast(&self) {
        self.broadcast.signal(());
    }

    /// Consume a pending broadcast request.
    pub fn take_broadcast_request(&self) -> bool {
        self.broadcast.try_take().is_some()
    }
}
