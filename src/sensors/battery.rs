//! LiPo battery monitor.
//!
//! Oversamples the divider tap through [`BatteryAdcPort`], converts to
//! battery volts, smooths with an EMA and classifies into
//! [`BatteryStatus`].  Leaving Critical needs the filtered voltage to
//! climb `recover_hysteresis_v` above the critical threshold so a sagging
//! pack does not flap around the boundary under load.
//!
//! Readings under [`MIN_PLAUSIBLE_V`] are ADC glitches (seen during boot
//! before the divider settles) and never reach the filter.

use embedded_hal::delay::DelayNs;
use serde::{Deserialize, Serialize};

use crate::app::ports::BatteryAdcPort;
use crate::config::BatteryConfig;
use crate::error::SensorError;

/// Reads averaged per sample.
pub const ADC_SAMPLES: u32 = 16;
/// Settling delay between reads (µs).
pub const ADC_SAMPLE_DELAY_US: u32 = 100;
/// ADC full-scale reference (V) at 11 dB attenuation.
pub const ADC_REF_V: f32 = 3.3;
/// 12-bit full-scale code.
pub const ADC_MAX: f32 = 4095.0;
/// Raw battery voltage below which a sample is discarded.
pub const MIN_PLAUSIBLE_V: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryStatus {
    #[default]
    Ok,
    Low,
    Critical,
}

impl BatteryStatus {
    /// Severity rank; higher is worse.
    pub const fn severity(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Low => 1,
            Self::Critical => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Low => "low",
            Self::Critical => "critical",
        }
    }
}

/// Classification thresholds (filtered volts).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryThresholds {
    pub low_v: f32,
    pub critical_v: f32,
}

impl From<&BatteryConfig> for BatteryThresholds {
    fn from(cfg: &BatteryConfig) -> Self {
        Self {
            low_v: cfg.low_v,
            critical_v: cfg.critical_v,
        }
    }
}

/// Pure threshold classification, monotonic in `v`.
pub fn classify(v: f32, t: BatteryThresholds) -> BatteryStatus {
    if v < t.critical_v {
        BatteryStatus::Critical
    } else if v < t.low_v {
        BatteryStatus::Low
    } else {
        BatteryStatus::Ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryTransition {
    pub from: BatteryStatus,
    pub to: BatteryStatus,
}

impl BatteryTransition {
    pub fn entered_critical(&self) -> bool {
        self.to == BatteryStatus::Critical
    }

    pub fn left_critical(&self) -> bool {
        self.from == BatteryStatus::Critical
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    /// Divider-corrected voltage of this sample.
    pub raw_voltage: f32,
    /// EMA after this sample (unchanged if the sample was implausible).
    pub filtered_voltage: f32,
    pub status: BatteryStatus,
    /// Set when this sample changed the tracked status.
    pub transition: Option<BatteryTransition>,
}

pub struct BatteryMonitor {
    cfg: BatteryConfig,
    filtered: Option<f32>,
    status: BatteryStatus,
}

impl BatteryMonitor {
    pub fn new(cfg: BatteryConfig) -> Self {
        Self {
            cfg,
            filtered: None,
            status: BatteryStatus::Ok,
        }
    }

    /// Live divider-ratio update from calibration commands.  The EMA is
    /// kept; it converges onto the corrected scale within a few samples.
    pub fn set_divider_ratio(&mut self, ratio: f32) {
        self.cfg.divider_ratio = ratio;
    }

    pub fn divider_ratio(&self) -> f32 {
        self.cfg.divider_ratio
    }

    pub fn status(&self) -> BatteryStatus {
        self.status
    }

    /// Filtered voltage, `0.0` before the first plausible sample.
    pub fn filtered_voltage(&self) -> f32 {
        self.filtered.unwrap_or(0.0)
    }

    /// Oversample the ADC, convert and feed the filter.
    pub fn sample(
        &mut self,
        adc: &mut impl BatteryAdcPort,
        delay: &mut impl DelayNs,
    ) -> Result<BatteryReading, SensorError> {
        let raw_voltage = self.measure(adc, delay)?;
        Ok(self.update(raw_voltage))
    }

    /// Averaged divider-corrected voltage of [`ADC_SAMPLES`] reads.
    pub fn measure(
        &self,
        adc: &mut impl BatteryAdcPort,
        delay: &mut impl DelayNs,
    ) -> Result<f32, SensorError> {
        let mut sum: u32 = 0;
        for i in 0..ADC_SAMPLES {
            sum += u32::from(adc.read_raw()?);
            if i + 1 < ADC_SAMPLES {
                delay.delay_us(ADC_SAMPLE_DELAY_US);
            }
        }
        let avg = sum as f32 / ADC_SAMPLES as f32;
        Ok(avg / ADC_MAX * ADC_REF_V * self.cfg.divider_ratio)
    }

    /// Blend one raw voltage into the EMA and track status.
    pub fn update(&mut self, raw_voltage: f32) -> BatteryReading {
        if raw_voltage.is_nan() || raw_voltage < MIN_PLAUSIBLE_V {
            log::debug!("battery: discarding implausible {:.2} V", raw_voltage);
            return BatteryReading {
                raw_voltage,
                filtered_voltage: self.filtered_voltage(),
                status: self.status,
                transition: None,
            };
        }

        let alpha = self.cfg.ema_alpha;
        let filtered = match self.filtered {
            None => raw_voltage,
            Some(prev) => alpha * raw_voltage + (1.0 - alpha) * prev,
        };
        self.filtered = Some(filtered);

        let next = self.next_status(filtered);
        let transition = (next != self.status).then_some(BatteryTransition {
            from: self.status,
            to: next,
        });
        self.status = next;

        BatteryReading {
            raw_voltage,
            filtered_voltage: filtered,
            status: next,
            transition,
        }
    }

    fn next_status(&self, filtered: f32) -> BatteryStatus {
        let classified = classify(filtered, BatteryThresholds::from(&self.cfg));
        if self.status == BatteryStatus::Critical
            && classified != BatteryStatus::Critical
            && filtered < self.cfg.critical_v + self.cfg.recover_hysteresis_v
        {
            return BatteryStatus::Critical;
        }
        classified
    }
}
