//! Error types for the RoverCam firmware, one enum per port family.
//!
//! All variants are `Copy` so they pass through the registry and command
//! replies without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// ADC read returned an error or timed out.
    AdcReadFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdcReadFailed => write!(f, "ADC read failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// The camera sensor refused a parameter.
    CameraRejected(&'static str),
    /// The camera sensor is not initialised.
    CameraUnavailable,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CameraRejected(param) => write!(f, "camera rejected {param}"),
            Self::CameraUnavailable => write!(f, "camera unavailable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

/// Structured rejection returned synchronously to the originating caller.
/// Never retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Battery is critical; streaming and driving are refused.
    BatteryCritical,
    /// The device is asleep; actuators stay neutral.
    Asleep,
    /// A command argument failed range validation.
    InvalidArgument(&'static str),
    /// Hardware rejected the new parameters; nothing was persisted.
    ApplyFailed(ActuatorError),
    /// Parameters were applied but could not be persisted.
    PersistFailed,
    /// The stream worker mailbox is full.
    Busy,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BatteryCritical => write!(f, "battery critical"),
            Self::Asleep => write!(f, "device asleep"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::ApplyFailed(e) => write!(f, "apply failed: {e}"),
            Self::PersistFailed => write!(f, "settings not persisted"),
            Self::Busy => write!(f, "busy, retry later"),
        }
    }
}

impl CommandError {
    /// Short machine-readable code for the transport's error reply.
    pub const fn code(self) -> &'static str {
        match self {
            Self::BatteryCritical => "battery_critical",
            Self::Asleep => "asleep",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::ApplyFailed(_) => "apply_failed",
            Self::PersistFailed => "persist_failed",
            Self::Busy => "busy",
        }
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    WifiConnectFailed,
    WifiDisconnected,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WifiConnectFailed => write!(f, "WiFi connect failed"),
            Self::WifiDisconnected => write!(f, "WiFi disconnected"),
        }
    }
}
