//! Status broadcast assembly.
//!
//! A read-only projection of the registry plus the request loop's view
//! of settings and network.  Serialises to the JSON object pushed to
//! every status subscriber.

use serde::Serialize;

use crate::app::registry::{ControlMode, DeviceState};
use crate::config::CameraParams;
use crate::sensors::battery::BatteryStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub battery_voltage: f32,
    pub battery_status: BatteryStatus,
    /// dBm, `None` while disconnected.
    pub rssi: Option<i8>,
    pub connected: bool,
    pub streaming: bool,
    pub sleeping: bool,
    pub ap_mode: bool,
    pub ota_active: bool,
    pub control_mode: ControlMode,
    pub fps: f32,
    pub camera: CameraParams,
    pub illumination: u8,
    pub sleep_enabled: bool,
}

impl StatusSnapshot {
    pub fn assemble(
        state: &DeviceState,
        camera: &CameraParams,
        connected: bool,
        rssi: Option<i8>,
    ) -> Self {
        Self {
            battery_voltage: round2(state.battery_voltage),
            battery_status: state.battery_status,
            rssi: if connected { rssi } else { None },
            connected,
            streaming: state.streaming,
            sleeping: state.sleeping,
            ap_mode: state.ap_mode,
            ota_active: state.ota_active,
            control_mode: state.control_mode,
            fps: if state.streaming { state.fps } else { 0.0 },
            camera: *camera,
            illumination: state.illumination,
            sleep_enabled: state.sleep_enabled,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}
