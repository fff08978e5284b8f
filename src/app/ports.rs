//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService / StreamSession / SleepCycleManager
//! ```
//!
//! Driven adapters (camera, servos, ADC, NVS, Wi-Fi, power management,
//! transport sinks) implement these traits.  The domain core consumes them
//! via generics, so it never touches hardware directly.
//!
//! ## Ownership
//!
//! Each port instance belongs to exactly one activity: the request loop
//! owns actuators, ADC, settings and network; the stream worker owns the
//! camera and the current [`FrameSink`].  Nothing here is `Sync`.

use crate::config::{CameraParams, SystemConfig};
use crate::error::{ActuatorError, CommsError, SensorError};

// ───────────────────────────────────────────────────────────────
// Camera ports (driven adapter: sensor → stream worker)
// ───────────────────────────────────────────────────────────────

/// Pixel encoding of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Jpeg,
    Rgb565,
    Yuv422,
    Grayscale,
}

/// A borrowed view of one captured frame.
pub trait FrameData {
    fn bytes(&self) -> &[u8];
    fn format(&self) -> PixelFormat;
}

/// Frame acquisition.  Every acquired frame must be handed back through
/// [`release_frame`](CameraPort::release_frame), success or not.
pub trait CameraPort {
    type Frame: FrameData;

    /// `None` when no frame is ready yet (transient).
    fn acquire_frame(&mut self) -> Option<Self::Frame>;

    fn release_frame(&mut self, frame: Self::Frame);
}

/// Optional conversion stage for non-JPEG sensors.
pub trait FrameConverter: Send {
    /// Encode `frame` into `out` (cleared first).  `false` skips the frame.
    fn to_jpeg(&mut self, frame: &[u8], format: PixelFormat, out: &mut Vec<u8>) -> bool;
}

/// Live sensor parameter control, used by the request loop.
pub trait CameraControlPort {
    /// Push parameters to the sensor.  Partial application is reported as
    /// an error naming the first rejected parameter.
    fn apply_camera(&mut self, params: &CameraParams) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Frame sink (transport capability handed to the stream worker)
// ───────────────────────────────────────────────────────────────

/// Stable identity of a transport connection.
pub type SinkId = u32;

/// Outbound byte channel of one streaming client.
///
/// `false` from [`begin`](FrameSink::begin) or [`write`](FrameSink::write)
/// means the connection is broken and the session must end.
pub trait FrameSink: Send {
    fn id(&self) -> SinkId;

    /// Send the response head with `content_type`.
    fn begin(&mut self, content_type: &str) -> bool;

    fn write(&mut self, bytes: &[u8]) -> bool;

    fn is_connected(&self) -> bool;

    /// Release the connection.  Idempotent.
    fn close(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: best-effort, side-effecting outputs.
pub trait ActuatorPort {
    /// Pulse widths (µs) for the left and right drive servos.
    fn set_drive_pulses(&mut self, left_us: u16, right_us: u16);

    /// Auxiliary illumination LED, 0–100 %.
    fn set_illumination(&mut self, percent: u8);
}

// ───────────────────────────────────────────────────────────────
// Battery ADC port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

pub trait BatteryAdcPort {
    /// One 12-bit conversion of the divider tap.
    fn read_raw(&mut self) -> Result<u16, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Network port
// ───────────────────────────────────────────────────────────────

/// Station credentials.  Lengths follow the 802.11 limits.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WifiCredentials {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

impl WifiCredentials {
    /// SSID: 1–32 printable ASCII bytes.  Password: empty (open network)
    /// or 8–64 bytes (WPA2).
    pub fn new(ssid: &str, password: &str) -> Result<Self, &'static str> {
        if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
            return Err("SSID must be 1-32 printable ASCII bytes");
        }
        if !password.is_empty() && !(8..=64).contains(&password.len()) {
            return Err("password must be 8-64 bytes, or empty for open");
        }
        let mut creds = Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
        };
        creds.ssid.push_str(ssid).map_err(|()| "SSID too long")?;
        creds
            .password
            .push_str(password)
            .map_err(|()| "password too long")?;
        Ok(creds)
    }
}

/// The core reads connectivity and may ask for a reconnect; connection
/// setup itself belongs to the adapter.
pub trait NetworkPort {
    fn is_connected(&self) -> bool;

    /// RSSI (dBm) while associated.
    fn rssi(&self) -> Option<i8>;

    fn reconnect(&mut self) -> Result<(), CommsError>;

    /// Store credentials for the next (re)connect.
    fn set_credentials(&mut self, creds: &WifiCredentials) -> Result<(), CommsError>;
}

// ───────────────────────────────────────────────────────────────
// Power port (light sleep)
// ───────────────────────────────────────────────────────────────

/// What ended the last light sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeCause {
    /// Never slept, or the cause could not be determined.
    #[default]
    None,
    /// Network traffic or another external source.
    ExternalActivity,
    /// The periodic wake timer.
    Timer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerError {
    /// A wake source could not be armed; sleeping would be unsafe.
    WakeSourceRejected(&'static str),
}

impl core::fmt::Display for PowerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::WakeSourceRejected(src) => write!(f, "wake source rejected: {}", src),
        }
    }
}

pub trait PowerPort {
    fn set_wifi_power_save(&mut self, enabled: bool);

    /// Arm network-activity wake plus a periodic timer of `timer_ms`.
    fn arm_wake_sources(&mut self, timer_ms: u64) -> Result<(), PowerError>;

    /// Block in light sleep until a wake source fires.
    fn light_sleep(&mut self) -> WakeCause;
}

// ───────────────────────────────────────────────────────────────
// Time port
// ───────────────────────────────────────────────────────────────

/// Monotonic clock since boot.
pub trait TimePort {
    fn uptime_us(&self) -> u64;

    fn uptime_ms(&self) -> u64 {
        self.uptime_us() / 1000
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → status channel / logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log,
/// WebSocket broadcast, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent settings)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// # Security
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges should be rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;

    /// Persist station credentials.
    fn save_credentials(&self, creds: &WifiCredentials) -> Result<(), ConfigError>;

    /// Stored credentials, `None` on first boot.
    fn load_credentials(&self) -> Result<Option<WifiCredentials>, ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
