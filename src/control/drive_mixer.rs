//! Differential-drive mixer for two continuous-rotation servos.
//!
//! Maps a normalised control input (joystick vector or independent slider
//! pair) to two calibrated pulse widths.
//!
//! ```text
//!   pulse (µs)
//!   stop+span ┤                    ╱
//!             │                 ╱
//!   stop+dz   ┤            ┌──╱
//!   stop      ┤────────────┤
//!   stop−dz   ┤──╱─────────┘
//!             │╱
//!   stop−span ┤
//!             └──┬─────────┬───────┬──▶ control
//!               −1   −in_dz  +in_dz  +1
//! ```
//!
//! The right servo is mounted mirrored, so its pulse is computed from the
//! negated speed: "forward" drives both wheels forward.
//!
//! ## Safety contract
//!
//! Both entry points return neutral pulses whenever the battery is
//! Critical, bypassing every mapping step.

use serde::{Deserialize, Serialize};

use crate::config::{DriveCalibration, ServoCalibration};
use crate::sensors::battery::BatteryStatus;

/// Inbound drive request, already normalised by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DriveCommand {
    Joystick { x: f32, y: f32 },
    Sliders { left: f32, right: f32 },
}

/// Mixer result: logical wheel speeds and the pulses sent to the servos.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveOutput {
    pub left_speed: f32,
    pub right_speed: f32,
    pub left_us: u16,
    pub right_us: u16,
}

/// Map one control value onto a calibrated pulse width.
///
/// `|control| <= input_deadzone` returns `stop_us` exactly.  Outside the
/// input dead zone the remaining range is mapped linearly onto
/// `[stop + deadzone, stop + span]` (mirrored for negative input), so the
/// pulse always clears the servo's physical dead band.
pub fn compute_pulse(
    control: f32,
    stop_us: u16,
    deadzone_us: u16,
    span_us: u16,
    input_deadzone: f32,
) -> u16 {
    let control = sanitize(control);
    let magnitude = control.abs();
    if magnitude <= input_deadzone {
        return stop_us;
    }

    let t = (magnitude - input_deadzone) / (1.0 - input_deadzone);
    let deadzone = f32::from(deadzone_us);
    let offset = deadzone + t * (f32::from(span_us) - deadzone);
    let offset = offset.round().max(f32::from(deadzone_us.max(1))) as i32;

    let pulse = if control > 0.0 {
        i32::from(stop_us) + offset
    } else {
        i32::from(stop_us) - offset
    };
    pulse.clamp(0, i32::from(u16::MAX)) as u16
}

fn sanitize(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) }
}

/// Stateless apart from calibration; owned by the request loop.
#[derive(Debug, Clone)]
pub struct DriveMixer {
    cal: DriveCalibration,
    input_deadzone: f32,
}

impl DriveMixer {
    pub fn new(cal: DriveCalibration, input_deadzone: f32) -> Self {
        Self {
            cal,
            input_deadzone,
        }
    }

    pub fn calibration(&self) -> DriveCalibration {
        self.cal
    }

    pub fn set_calibration(&mut self, cal: DriveCalibration) {
        self.cal = cal;
    }

    /// Both servos at their stop pulse.
    pub fn neutral(&self) -> DriveOutput {
        DriveOutput {
            left_speed: 0.0,
            right_speed: 0.0,
            left_us: self.cal.left.stop_us,
            right_us: self.cal.right.stop_us,
        }
    }

    pub fn process(&self, cmd: DriveCommand, battery: BatteryStatus) -> DriveOutput {
        match cmd {
            DriveCommand::Joystick { x, y } => self.process_joystick(x, y, battery),
            DriveCommand::Sliders { left, right } => self.process_sliders(left, right, battery),
        }
    }

    /// Arcade-style mixing.  `y` is the base speed of both wheels; `x`
    /// slows the inner wheel proportionally.  With `y` inside the dead
    /// zone, `x` alone pivots the rover in place.
    pub fn process_joystick(&self, x: f32, y: f32, battery: BatteryStatus) -> DriveOutput {
        if battery == BatteryStatus::Critical {
            return self.neutral();
        }
        let x = sanitize(x);
        let y = sanitize(y);

        let (left, right) = if y.abs() <= self.input_deadzone {
            (x, -x)
        } else {
            let scale = 1.0 - x.abs();
            if x > 0.0 {
                (y, y * scale)
            } else if x < 0.0 {
                (y * scale, y)
            } else {
                (y, y)
            }
        };
        self.output(left, right)
    }

    /// Tank-style mixing: each slider drives its own wheel.
    pub fn process_sliders(&self, left: f32, right: f32, battery: BatteryStatus) -> DriveOutput {
        if battery == BatteryStatus::Critical {
            return self.neutral();
        }
        self.output(sanitize(left), sanitize(right))
    }

    fn output(&self, left: f32, right: f32) -> DriveOutput {
        DriveOutput {
            left_speed: left,
            right_speed: right,
            left_us: self.pulse(left, self.cal.left),
            // Mirror-mounted servo.
            right_us: self.pulse(-right, self.cal.right),
        }
    }

    fn pulse(&self, control: f32, servo: ServoCalibration) -> u16 {
        compute_pulse(
            control,
            servo.stop_us,
            servo.deadzone_us,
            self.cal.span_us,
            self.input_deadzone,
        )
    }
}
