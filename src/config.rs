//! System configuration parameters
//!
//! All tunable parameters for the RoverCam system.  The persisted subset
//! (servo calibration, battery divider ratio, camera, sleep preference)
//! is loaded from NVS at boot and rewritten only by explicit save/reset
//! commands.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Per-actuator servo calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoCalibration {
    /// Pulse width (µs) at which the continuous-rotation servo stands still.
    pub stop_us: u16,
    /// Physical dead band (µs) around `stop_us` where the servo does not move.
    pub deadzone_us: u16,
}

impl Default for ServoCalibration {
    fn default() -> Self {
        Self {
            stop_us: 1500,
            deadzone_us: 40,
        }
    }
}

/// Calibration of both drive actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveCalibration {
    pub left: ServoCalibration,
    pub right: ServoCalibration,
    /// Symmetric authority range (µs) either side of `stop_us`.
    pub span_us: u16,
}

impl Default for DriveCalibration {
    fn default() -> Self {
        Self {
            left: ServoCalibration::default(),
            right: ServoCalibration::default(),
            span_us: 500,
        }
    }
}

/// Battery measurement and classification parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryConfig {
    /// Voltage-divider ratio (battery volts per ADC-pin volt).
    pub divider_ratio: f32,
    /// Filtered voltage below which the battery is Low.
    pub low_v: f32,
    /// Filtered voltage below which the battery is Critical.
    pub critical_v: f32,
    /// Extra rise above `critical_v` required to leave Critical.
    pub recover_hysteresis_v: f32,
    /// EMA smoothing factor (0 < α ≤ 1).
    pub ema_alpha: f32,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            divider_ratio: 2.0,
            low_v: 3.5,
            critical_v: 3.2,
            recover_hysteresis_v: 0.05,
            ema_alpha: 0.1,
        }
    }
}

/// Camera frame size, mirroring the sensor's framesize table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameSize {
    Qvga,
    Cif,
    Vga,
    Svga,
    Xga,
    Hd,
}

/// Camera sensor parameters applied live and persisted on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraParams {
    pub frame_size: FrameSize,
    /// JPEG quality, 4 (best) – 63 (worst).
    pub quality: u8,
    /// −2 – 2.
    pub brightness: i8,
    /// −2 – 2.
    pub contrast: i8,
    /// −2 – 2.
    pub saturation: i8,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            frame_size: FrameSize::Vga,
            quality: 12,
            brightness: 0,
            contrast: 0,
            saturation: 0,
        }
    }
}

impl CameraParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(4..=63).contains(&self.quality) {
            return Err(ConfigError::ValidationFailed("camera quality must be 4–63"));
        }
        for v in [self.brightness, self.contrast, self.saturation] {
            if !(-2..=2).contains(&v) {
                return Err(ConfigError::ValidationFailed(
                    "brightness/contrast/saturation must be -2–2",
                ));
            }
        }
        Ok(())
    }
}

/// Inactivity-driven light-sleep policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepConfig {
    /// User preference: allow automatic sleep.
    pub enabled: bool,
    /// Idle time before sleep is entered (ms).
    pub inactivity_timeout_ms: u64,
    /// Periodic timer wake source while asleep (ms).
    pub periodic_wake_ms: u64,
    /// Eligibility check period of the sleep monitor (ms).
    pub check_interval_ms: u64,
    /// After an idle timer wake, time until the device may sleep again (ms).
    pub timer_wake_grace_ms: u64,
    /// Activity newer than this at a timer wake counts as real activity (ms).
    pub recent_activity_window_ms: u64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inactivity_timeout_ms: 5 * 60 * 1000,
            periodic_wake_ms: 60 * 1000,
            check_interval_ms: 15 * 1000,
            timer_wake_grace_ms: 30 * 1000,
            recent_activity_window_ms: 2000,
        }
    }
}

/// MJPEG stream pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Fixed delay between frames (ms).
    pub frame_delay_ms: u32,
    /// Backoff when the camera has no frame ready (ms).
    pub no_frame_backoff_ms: u32,
    /// End the session if no frame was delivered for this long (ms, 0 = off).
    pub sink_idle_timeout_ms: u32,
    /// Upper bound for a synchronous stop (ms).
    pub stop_timeout_ms: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frame_delay_ms: 1,
            no_frame_backoff_ms: 10,
            sink_idle_timeout_ms: 5000,
            stop_timeout_ms: 1000,
        }
    }
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Persisted ---
    pub drive: DriveCalibration,
    pub battery: BatteryConfig,
    pub camera: CameraParams,
    pub sleep: SleepConfig,

    // --- Tuning ---
    pub stream: StreamConfig,
    /// Normalised joystick/slider dead zone.
    pub input_deadzone: f32,
    /// Battery sample interval (milliseconds)
    pub battery_sample_interval_ms: u32,
    /// Status broadcast interval (milliseconds)
    pub status_interval_ms: u32,
    /// Request loop poll interval (milliseconds)
    pub control_loop_interval_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            drive: DriveCalibration::default(),
            battery: BatteryConfig::default(),
            camera: CameraParams::default(),
            sleep: SleepConfig::default(),

            stream: StreamConfig::default(),
            input_deadzone: 0.05,
            battery_sample_interval_ms: 1000, // 1 Hz
            status_interval_ms: 2000,
            control_loop_interval_ms: 20, // 50 Hz
        }
    }
}

impl SystemConfig {
    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_drive(&self.drive)?;

        let b = &self.battery;
        if !(1.0..=10.0).contains(&b.divider_ratio) {
            return Err(ConfigError::ValidationFailed("divider_ratio must be 1.0–10.0"));
        }
        if b.critical_v <= 0.0 || b.low_v <= b.critical_v {
            return Err(ConfigError::ValidationFailed("battery thresholds need 0 < critical < low"));
        }
        if !(0.0..=0.5).contains(&b.recover_hysteresis_v) {
            return Err(ConfigError::ValidationFailed("recover_hysteresis_v must be 0.0–0.5"));
        }
        if !(b.ema_alpha > 0.0 && b.ema_alpha <= 1.0) {
            return Err(ConfigError::ValidationFailed("ema_alpha must be in (0, 1]"));
        }

        self.camera.validate()?;

        if self.sleep.inactivity_timeout_ms <= self.sleep.timer_wake_grace_ms {
            return Err(ConfigError::ValidationFailed(
                "inactivity_timeout_ms must exceed timer_wake_grace_ms",
            ));
        }
        if self.sleep.check_interval_ms == 0 || self.sleep.periodic_wake_ms == 0 {
            return Err(ConfigError::ValidationFailed("sleep intervals must be non-zero"));
        }
        if !(0.0..0.5).contains(&self.input_deadzone) {
            return Err(ConfigError::ValidationFailed("input_deadzone must be 0.0–0.5"));
        }
        if self.control_loop_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("control_loop_interval_ms must be > 0"));
        }
        Ok(())
    }

    /// Restore the user-calibratable subset to factory defaults, keeping
    /// tuning values untouched.
    pub fn reset_calibration(&mut self) {
        let defaults = Self::default();
        self.drive = defaults.drive;
        self.battery.divider_ratio = defaults.battery.divider_ratio;
        self.camera = defaults.camera;
        self.sleep.enabled = defaults.sleep.enabled;
    }
}

/// Servo calibration bounds shared by config validation and the
/// SetCalibration command.
pub fn validate_drive(d: &DriveCalibration) -> Result<(), ConfigError> {
    for servo in [&d.left, &d.right] {
        if !(1000..=2000).contains(&servo.stop_us) {
            return Err(ConfigError::ValidationFailed("stop_us must be 1000–2000"));
        }
        if servo.deadzone_us >= d.span_us {
            return Err(ConfigError::ValidationFailed("deadzone_us must be below span_us"));
        }
    }
    if !(100..=1000).contains(&d.span_us) {
        return Err(ConfigError::ValidationFailed("span_us must be 100–1000"));
    }
    Ok(())
}
