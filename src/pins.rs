//! GPIO / peripheral pin assignments for the RoverCam board
//! (ESP32-S3 with an OV2640 camera module).
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Camera (DVP interface, OV2640)
// ---------------------------------------------------------------------------

/// Not wired on this module.
pub const CAM_PWDN_GPIO: i32 = -1;
pub const CAM_RESET_GPIO: i32 = -1;
pub const CAM_XCLK_GPIO: i32 = 15;
pub const CAM_SIOD_GPIO: i32 = 4;
pub const CAM_SIOC_GPIO: i32 = 5;
pub const CAM_D0_GPIO: i32 = 11;
pub const CAM_D1_GPIO: i32 = 9;
pub const CAM_D2_GPIO: i32 = 8;
pub const CAM_D3_GPIO: i32 = 10;
pub const CAM_D4_GPIO: i32 = 12;
pub const CAM_D5_GPIO: i32 = 18;
pub const CAM_D6_GPIO: i32 = 17;
pub const CAM_D7_GPIO: i32 = 16;
pub const CAM_VSYNC_GPIO: i32 = 6;
pub const CAM_HREF_GPIO: i32 = 7;
pub const CAM_PCLK_GPIO: i32 = 13;

/// Sensor master clock.
pub const CAM_XCLK_FREQ_HZ: i32 = 20_000_000;

// ---------------------------------------------------------------------------
// Drive servos (continuous-rotation, 50 Hz PWM)
// ---------------------------------------------------------------------------

pub const SERVO_LEFT_GPIO: i32 = 41;
/// Mounted mirrored: forward is the opposite rotation of the left servo.
pub const SERVO_RIGHT_GPIO: i32 = 42;

// ---------------------------------------------------------------------------
// Illumination LED (MOSFET low-side switch)
// ---------------------------------------------------------------------------

pub const ILLUMINATION_GPIO: i32 = 14;

// ---------------------------------------------------------------------------
// Battery sense (ADC1)
// ---------------------------------------------------------------------------

/// Resistive divider tap.  ADC1 channel 2 (GPIO 3 on ESP32-S3).
pub const BATTERY_ADC_GPIO: i32 = 3;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// Standard hobby-servo frame rate.
pub const SERVO_PWM_FREQ_HZ: u32 = 50;
/// 14 bits over a 20 ms period gives ~1.2 µs per step.
pub const SERVO_PWM_RESOLUTION_BITS: u32 = 14;
/// LED dimming frequency (5 kHz, flicker-free on camera).
pub const ILLUMINATION_PWM_FREQ_HZ: u32 = 5_000;
pub const ILLUMINATION_PWM_RESOLUTION_BITS: u32 = 8;
