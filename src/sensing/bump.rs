//! Near-field timing channel
//!
//! Each sensor is a charge/discharge line: drive it high for a short charge
//! pulse, release it, and time how long the phototransistor takes to pull it
//! low. More nearby infrared discharges the line faster, so a shorter time
//! means a stronger signal. Reads saturate at a hard timeout; downstream a
//! saturated read means "very far".
//!
//! Only trust these reads while the acquisition window is in its timing
//! phase and the shared emission line is LOW.

use crate::hal::{Clock, DigitalLine};
use std::sync::Arc;

/// Timing-channel parameters
#[derive(Debug, Clone, Copy)]
pub struct TimingParams {
    /// Charge pulse length (microseconds)
    pub charge_us: u64,

    /// Discharge timeout; reads saturate here (microseconds)
    pub timeout_us: u64,
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            charge_us: 10,
            timeout_us: 4500,
        }
    }
}

/// One timing sensor per side, plus per-sensor background calibration
pub struct TimingChannel {
    lines: Vec<Box<dyn DigitalLine>>,
    clock: Arc<dyn Clock>,
    params: TimingParams,
    readings: Vec<u64>,
    backgrounds: Vec<f32>,
    cal_sums: Vec<u64>,
    cal_count: u32,
}

impl TimingChannel {
    /// Create a channel over the given sensor lines
    pub fn new(lines: Vec<Box<dyn DigitalLine>>, clock: Arc<dyn Clock>, params: TimingParams) -> Self {
        let n = lines.len();
        Self {
            lines,
            clock,
            params,
            readings: vec![params.timeout_us; n],
            backgrounds: vec![0.0; n],
            cal_sums: vec![0; n],
            cal_count: 0,
        }
    }

    /// Number of sensors
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when the channel has no sensors
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Read one sensor: charge, release, time the discharge
    ///
    /// Bounded spin-waits on the microsecond clock; worst case is the
    /// discharge timeout, well under the control cadence.
    fn read_line(line: &mut dyn DigitalLine, clock: &dyn Clock, params: &TimingParams) -> u64 {
        line.drive(true);
        let charge_start = clock.micros();
        while clock.micros().saturating_sub(charge_start) < params.charge_us {}
        line.release();

        let start = clock.micros();
        let mut elapsed = 0;
        while line.is_high() && elapsed < params.timeout_us {
            elapsed = clock.micros().saturating_sub(start);
        }
        elapsed.min(params.timeout_us)
    }

    /// Sample every sensor
    pub fn sample(&mut self) {
        for (i, line) in self.lines.iter_mut().enumerate() {
            self.readings[i] = Self::read_line(line.as_mut(), self.clock.as_ref(), &self.params);
        }
    }

    /// Sample and accumulate into the background calibration
    pub fn calibrate_sample(&mut self) {
        self.sample();
        for (sum, reading) in self.cal_sums.iter_mut().zip(&self.readings) {
            *sum += reading;
        }
        self.cal_count += 1;
    }

    /// Freeze accumulated samples into per-sensor backgrounds
    pub fn finish_calibration(&mut self) {
        if self.cal_count == 0 {
            log::warn!("TimingChannel: calibration finished with no samples");
            return;
        }
        for (background, sum) in self.backgrounds.iter_mut().zip(&self.cal_sums) {
            *background = *sum as f32 / self.cal_count as f32;
        }
        log::info!(
            "TimingChannel: backgrounds frozen from {} samples: {:?}",
            self.cal_count,
            self.backgrounds
        );
        self.cal_sums.iter_mut().for_each(|s| *s = 0);
        self.cal_count = 0;
    }

    /// Raw readings from the last sample (microseconds)
    pub fn readings(&self) -> &[u64] {
        &self.readings
    }

    /// Signed per-sensor signal: `background - reading`
    ///
    /// Positive means stronger-than-background infrared.
    fn signed_signal(&self, idx: usize) -> f32 {
        self.backgrounds[idx] - self.readings[idx] as f32
    }

    /// Mean signal strength across sensors, clamped to >= 0
    ///
    /// Monotonic in the raw reading: a shorter discharge never reads as a
    /// weaker signal.
    pub fn strength(&self) -> f32 {
        if self.readings.is_empty() {
            return 0.0;
        }
        let sum: f32 = (0..self.readings.len())
            .map(|i| self.signed_signal(i))
            .sum();
        (sum / self.readings.len() as f32).max(0.0)
    }

    /// Left-minus-right signed signal imbalance
    ///
    /// Zero for a single-sensor channel.
    pub fn balance(&self) -> f32 {
        if self.readings.len() < 2 {
            return 0.0;
        }
        self.signed_signal(0) - self.signed_signal(self.readings.len() - 1)
    }

    /// True when the mean signal exceeds the threshold
    pub fn has_target(&self, threshold: f32) -> bool {
        self.strength() > threshold
    }
}
