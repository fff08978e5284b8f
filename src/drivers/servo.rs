//! Continuous-rotation drive servo on an LEDC channel.
//!
//! The mixer hands us pulse widths in microseconds; this driver converts
//! them to 14-bit duty on the 50 Hz servo timer.

use log::debug;

use crate::pins;

use super::hw_init;

/// One PWM period at the servo frame rate.
pub const PERIOD_US: u32 = 1_000_000 / pins::SERVO_PWM_FREQ_HZ;

const DUTY_MAX: u32 = (1 << pins::SERVO_PWM_RESOLUTION_BITS) - 1;

/// Accepted pulse window; anything outside is clamped.
pub const MIN_PULSE_US: u16 = 500;
pub const MAX_PULSE_US: u16 = 2500;

/// Pulse width (µs) to LEDC duty, rounded to nearest.
pub fn pulse_to_duty(pulse_us: u16) -> u32 {
    let us = u32::from(pulse_us.clamp(MIN_PULSE_US, MAX_PULSE_US));
    ((us * (DUTY_MAX + 1) + PERIOD_US / 2) / PERIOD_US).min(DUTY_MAX)
}

pub struct ServoDriver {
    channel: u32,
    pulse_us: u16,
}

impl ServoDriver {
    pub fn new(channel: u32) -> Self {
        Self { channel, pulse_us: 0 }
    }

    pub fn left() -> Self {
        Self::new(hw_init::LEDC_CH_SERVO_LEFT)
    }

    pub fn right() -> Self {
        Self::new(hw_init::LEDC_CH_SERVO_RIGHT)
    }

    pub fn set_pulse_us(&mut self, pulse_us: u16) {
        let clamped = pulse_us.clamp(MIN_PULSE_US, MAX_PULSE_US);
        if clamped == self.pulse_us {
            return;
        }
        self.pulse_us = clamped;
        hw_init::ledc_set(self.channel, pulse_to_duty(clamped));
        debug!("servo ch{}: {} µs", self.channel, clamped);
    }

    /// Last commanded pulse, 0 before the first write.
    pub fn pulse_us(&self) -> u16 {
        self.pulse_us
    }
}
