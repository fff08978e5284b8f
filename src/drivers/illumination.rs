//! Auxiliary illumination LED, PWM-dimmed 0–100 %.

use crate::pins;

use super::hw_init;

const DUTY_MAX: u32 = (1 << pins::ILLUMINATION_PWM_RESOLUTION_BITS) - 1;

pub struct IlluminationLed {
    percent: u8,
}

impl Default for IlluminationLed {
    fn default() -> Self {
        Self::new()
    }
}

impl IlluminationLed {
    pub fn new() -> Self {
        Self { percent: 0 }
    }

    /// Values above 100 saturate.
    pub fn set(&mut self, percent: u8) {
        let percent = percent.min(100);
        self.percent = percent;
        hw_init::ledc_set(hw_init::LEDC_CH_ILLUMINATION, percent_to_duty(percent));
    }

    pub fn off(&mut self) {
        self.set(0);
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }
}

fn percent_to_duty(percent: u8) -> u32 {
    (u32::from(percent) * DUTY_MAX + 50) / 100
}
