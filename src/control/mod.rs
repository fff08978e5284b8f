//! Control algorithms: drive mixing and signal smoothing.

pub mod drive_mixer;
pub mod rolling_average;

pub use drive_mixer::{DriveCommand, DriveMixer, DriveOutput};
pub use rolling_average::RollingAverage;
