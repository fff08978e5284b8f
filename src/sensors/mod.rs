//! Sensor subsystem.
//!
//! Only the battery divider is sampled by the core; camera frames are
//! pulled by the stream worker through [`CameraPort`](crate::app::ports::CameraPort).

pub mod battery;

pub use battery::{BatteryMonitor, BatteryReading, BatteryStatus, BatteryTransition};
