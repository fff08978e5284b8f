//! Hardware adapter: bridges the request loop's peripherals to domain
//! port traits.
//!
//! Owns the drive servos, the illumination LED, the battery ADC channel
//! and the camera sensor control, exposing them through
//! [`ActuatorPort`], [`BatteryAdcPort`] and [`CameraControlPort`].  On
//! non-espidf targets the underlying drivers use cfg-gated simulation
//! stubs.

use crate::app::ports::{ActuatorPort, BatteryAdcPort, CameraControlPort};
use crate::config::CameraParams;
use crate::drivers::hw_init;
use crate::drivers::illumination::IlluminationLed;
use crate::drivers::servo::ServoDriver;
use crate::error::{ActuatorError, SensorError};

use super::camera::CameraControl;

pub struct HardwareAdapter {
    left: ServoDriver,
    right: ServoDriver,
    light: IlluminationLed,
    camera: CameraControl,
    battery_channel: u32,
}

impl HardwareAdapter {
    pub fn new(
        left: ServoDriver,
        right: ServoDriver,
        light: IlluminationLed,
        camera: CameraControl,
    ) -> Self {
        Self {
            left,
            right,
            light,
            camera,
            battery_channel: hw_init::ADC1_CH_BATTERY,
        }
    }

    /// Board defaults from [`crate::pins`].
    pub fn board() -> Self {
        Self::new(
            ServoDriver::left(),
            ServoDriver::right(),
            IlluminationLed::new(),
            CameraControl::new(),
        )
    }

    /// Last commanded (left, right) pulse widths.
    pub fn drive_pulses(&self) -> (u16, u16) {
        (self.left.pulse_us(), self.right.pulse_us())
    }

    pub fn illumination(&self) -> u8 {
        self.light.percent()
    }
}

// ── ActuatorPort ──────────────────────────────────────────────

impl ActuatorPort for HardwareAdapter {
    fn set_drive_pulses(&mut self, left_us: u16, right_us: u16) {
        self.left.set_pulse_us(left_us);
        self.right.set_pulse_us(right_us);
    }

    fn set_illumination(&mut self, percent: u8) {
        self.light.set(percent);
    }
}

// ── BatteryAdcPort ────────────────────────────────────────────

impl BatteryAdcPort for HardwareAdapter {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        hw_init::adc1_read(self.battery_channel)
    }
}

// ── CameraControlPort ─────────────────────────────────────────

impl CameraControlPort for HardwareAdapter {
    fn apply_camera(&mut self, params: &CameraParams) -> Result<(), ActuatorError> {
        self.camera.apply_camera(params)
    }
}
