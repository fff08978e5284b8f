//! Inbound commands to the application service.
//!
//! These arrive already decoded by the transport layer (JSON over
//! WebSocket/HTTP) and are queued to the request loop, which hands them
//! to [`AppService::handle_command`](super::service::AppService::handle_command).

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use serde::{Deserialize, Serialize};

use crate::app::status::StatusSnapshot;
use crate::config::{CameraParams, DriveCalibration};
use crate::control::DriveCommand;
use crate::stream::SinkHandle;

/// Calibration subset exchanged by Get/SetCalibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    pub drive: DriveCalibration,
    pub battery_divider_ratio: f32,
}

#[derive(Debug)]
pub enum StreamControl {
    /// Bind this transport connection as the MJPEG sink.
    Start(SinkHandle),
    Stop,
}

/// Commands that the transport can send into the application core.
#[derive(Debug)]
pub enum AppCommand {
    Drive(DriveCommand),

    /// Illumination LED, 0–100 %.
    SetIllumination(u8),

    /// Apply to the sensor, persist on success.
    SetCameraParams(CameraParams),

    StreamControl(StreamControl),

    GetCalibration,

    /// Apply live and persist servo and battery calibration.
    SetCalibration(CalibrationData),

    /// Factory calibration, camera and sleep preference, applied live.
    ResetCalibration,

    GetSleepPref,

    SetSleepPref(bool),

    SetNetworkCredentials { ssid: String, password: String },

    Ping,

    GetFullStatus,
}

impl AppCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Drive(_) => "drive",
            Self::SetIllumination(_) => "set_illumination",
            Self::SetCameraParams(_) => "set_camera_params",
            Self::StreamControl(StreamControl::Start(_)) => "stream_start",
            Self::StreamControl(StreamControl::Stop) => "stream_stop",
            Self::GetCalibration => "get_calibration",
            Self::SetCalibration(_) => "set_calibration",
            Self::ResetCalibration => "reset_calibration",
            Self::GetSleepPref => "get_sleep_pref",
            Self::SetSleepPref(_) => "set_sleep_pref",
            Self::SetNetworkCredentials { .. } => "set_network_credentials",
            Self::Ping => "ping",
            Self::GetFullStatus => "get_full_status",
        }
    }
}

/// Successful command acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Reply {
    Ack(&'static str),
    Pong,
    Calibration(CalibrationData),
    SleepPref { enabled: bool },
    Status(StatusSnapshot),
}

/// Work items for the request loop.
#[derive(Debug)]
pub enum LoopRequest {
    Command { id: u32, command: AppCommand },
    /// Posted by the sleep monitor when the device is eligible.
    EnterSleep,
}

/// Depth of the inbound request queue.
pub const REQUEST_QUEUE_DEPTH: usize = 8;

pub type RequestQueue = Channel<CriticalSectionRawMutex, LoopRequest, REQUEST_QUEUE_DEPTH>;
