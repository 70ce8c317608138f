//! Analog infrared array channel and lateral estimation
//!
//! A row of adjacent infrared-intensity sensors read via ADC, used to
//! localize the beacon laterally. Reads are only meaningful while the shared
//! emission line is driven HIGH (array phase). Each element carries its own
//! startup calibration: a no-target background plus observed min/max for
//! normalisation.

use crate::hal::AdcChannel;
use serde::Deserialize;

/// Full ADC scale
const ADC_MAX: f32 = 1023.0;

/// Per-element calibration captured during the stationary dwell
#[derive(Debug, Clone, Copy)]
pub struct ElementCalibration {
    /// No-target baseline
    pub background: f32,
    /// Lowest reading seen during calibration
    pub min: f32,
    /// Highest reading seen during calibration
    pub max: f32,
    /// `1 / (max - min)`, guarded against a degenerate range
    pub scale: f32,
}

impl Default for ElementCalibration {
    fn default() -> Self {
        Self {
            background: 0.0,
            min: ADC_MAX,
            max: 0.0,
            scale: 1.0,
        }
    }
}

/// Multi-element analog array
pub struct ArrayChannel {
    elements: Vec<Box<dyn AdcChannel>>,
    /// Discard one conversion per element for ADC settling
    throwaway_read: bool,
    readings: Vec<f32>,
    calibration: Vec<ElementCalibration>,
    cal_sums: Vec<f32>,
    cal_count: u32,
}

impl ArrayChannel {
    /// Create a channel over the given ADC elements
    pub fn new(elements: Vec<Box<dyn AdcChannel>>, throwaway_read: bool) -> Self {
        let n = elements.len();
        Self {
            elements,
            throwaway_read,
            readings: vec![0.0; n],
            calibration: vec![ElementCalibration::default(); n],
            cal_sums: vec![0.0; n],
            cal_count: 0,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when the channel has no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Sample every element
    pub fn sample(&mut self) {
        for (i, element) in self.elements.iter_mut().enumerate() {
            if self.throwaway_read {
                let _ = element.read();
            }
            self.readings[i] = f32::from(element.read().min(ADC_MAX as u16));
        }
    }

    /// Sample and accumulate into the calibration
    pub fn calibrate_sample(&mut self) {
        self.sample();
        for i in 0..self.readings.len() {
            let r = self.readings[i];
            self.cal_sums[i] += r;
            let cal = &mut self.calibration[i];
            cal.min = cal.min.min(r);
            cal.max = cal.max.max(r);
        }
        self.cal_count += 1;
    }

    /// Freeze accumulated samples into per-element calibration
    pub fn finish_calibration(&mut self) {
        if self.cal_count == 0 {
            log::warn!("ArrayChannel: calibration finished with no samples");
            return;
        }
        for (cal, sum) in self.calibration.iter_mut().zip(&self.cal_sums) {
            cal.background = *sum / self.cal_count as f32;
            let range = cal.max - cal.min;
            cal.scale = if range > 0.0 { 1.0 / range } else { 1.0 };
        }
        log::info!(
            "ArrayChannel: backgrounds frozen from {} samples: {:?}",
            self.cal_count,
            self.calibration
                .iter()
                .map(|c| c.background)
                .collect::<Vec<_>>()
        );
        self.cal_sums.iter_mut().for_each(|s| *s = 0.0);
        self.cal_count = 0;
    }

    /// Background-subtracted signal per element, clamped to >= 0
    pub fn signals(&self) -> Vec<f32> {
        self.readings
            .iter()
            .zip(&self.calibration)
            .map(|(r, cal)| (r - cal.background).max(0.0))
            .collect()
    }

    /// Signal of the centre element, usable as a range estimate
    pub fn center_signal(&self) -> f32 {
        let signals = self.signals();
        if signals.is_empty() {
            return 0.0;
        }
        signals[signals.len() / 2]
    }

    /// Sum of all element signals
    pub fn total_signal(&self) -> f32 {
        self.signals().iter().sum()
    }

    /// True when any element signal exceeds the threshold
    pub fn has_target(&self, threshold: f32) -> bool {
        self.signals().iter().any(|s| s.abs() > threshold)
    }
}

/// Lateral estimator selection
///
/// The centroid is more precise; the two-point difference tolerates a single
/// dead element better. Both are valid, so the choice is configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LateralMode {
    /// 5-point weighted centroid over background-subtracted signals
    Centroid,
    /// Rightmost-minus-leftmost difference with deadband, clamp, and
    /// low-pass filtering
    TwoPoint,
}

/// Lateral estimator settings
#[derive(Debug, Clone, Deserialize)]
pub struct LateralSettings {
    #[serde(default = "default_mode")]
    pub mode: LateralMode,

    /// Centroid: total signal below this floor yields a neutral zero
    #[serde(default = "default_centroid_floor")]
    pub centroid_floor: f32,

    /// Two-point: raw differences within this band are exactly zero
    #[serde(default = "default_deadband")]
    pub deadband: f32,

    /// Two-point: symmetric clamp on the raw difference
    #[serde(default = "default_clamp")]
    pub clamp: f32,

    /// Two-point: one-pole low-pass coefficient (1.0 disables)
    #[serde(default = "default_filter_alpha")]
    pub filter_alpha: f32,

    /// Output scale into steering-error units
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_mode() -> LateralMode {
    LateralMode::Centroid
}
fn default_centroid_floor() -> f32 {
    20.0
}
fn default_deadband() -> f32 {
    10.0
}
fn default_clamp() -> f32 {
    200.0
}
fn default_filter_alpha() -> f32 {
    0.4
}
fn default_scale() -> f32 {
    1.0
}

impl Default for LateralSettings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            centroid_floor: default_centroid_floor(),
            deadband: default_deadband(),
            clamp: default_clamp(),
            filter_alpha: default_filter_alpha(),
            scale: default_scale(),
        }
    }
}

/// Converts array signals into a signed lateral error
pub struct LateralEstimator {
    settings: LateralSettings,
    filtered: f32,
}

impl LateralEstimator {
    /// Create an estimator
    pub fn new(settings: LateralSettings) -> Self {
        Self {
            settings,
            filtered: 0.0,
        }
    }

    /// Estimate the lateral error from per-element signals
    ///
    /// Positive means the beacon sits toward the higher-index (right) end.
    pub fn estimate(&mut self, signals: &[f32]) -> f32 {
        match self.settings.mode {
            LateralMode::Centroid => self.centroid(signals),
            LateralMode::TwoPoint => self.two_point(signals),
        }
    }

    fn centroid(&self, signals: &[f32]) -> f32 {
        let total: f32 = signals.iter().sum();
        if total < self.settings.centroid_floor {
            return 0.0;
        }
        let half = (signals.len() as f32 - 1.0) / 2.0;
        let weighted: f32 = signals
            .iter()
            .enumerate()
            .map(|(i, s)| (i as f32 - half) * s)
            .sum();
        weighted / total * self.settings.scale
    }

    fn two_point(&mut self, signals: &[f32]) -> f32 {
        let diff = match (signals.last(), signals.first()) {
            (Some(right), Some(left)) => right - left,
            _ => 0.0,
        };

        // Inside the deadband the steering term is exactly zero, regardless
        // of filter history.
        if diff.abs() <= self.settings.deadband {
            self.filtered = 0.0;
            return 0.0;
        }

        let clamped = diff.clamp(-self.settings.clamp, self.settings.clamp);
        self.filtered = self.settings.filter_alpha * clamped
            + (1.0 - self.settings.filter_alpha) * self.filtered;
        self.filtered * self.settings.scale
    }

    /// Clear filter history
    pub fn reset(&mut self) {
        self.filtered = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubAdc(u16);

    impl AdcChannel for StubAdc {
        fn read(&mut self) -> u16 {
            self.0
        }
    }

    fn array_with(values: &[u16]) -> ArrayChannel {
        let elements: Vec<Box<dyn AdcChannel>> = values
            .iter()
            .map(|&v| Box::new(StubAdc(v)) as Box<dyn AdcChannel>)
            .collect();
        ArrayChannel::new(elements, false)
    }

    #[test]
    fn test_signals_subtract_background_and_clamp() {
        let mut array = array_with(&[100, 100, 100, 100, 100]);
        for _ in 0..4 {
            array.calibrate_sample();
        }
        array.finish_calibration();

        array.readings = vec![150.0, 100.0, 50.0, 100.0, 300.0];
        assert_eq!(array.signals(), vec![50.0, 0.0, 0.0, 0.0, 200.0]);
    }

    #[test]
    fn test_centroid_neutral_below_floor() {
        let mut estimator = LateralEstimator::new(LateralSettings {
            mode: LateralMode::Centroid,
            centroid_floor: 20.0,
            ..LateralSettings::default()
        });

        // Barely any signal: guarded divide returns neutral zero
        assert_eq!(estimator.estimate(&[2.0, 3.0, 1.0, 0.0, 2.0]), 0.0);
    }

    #[test]
    fn test_centroid_sign_follows_offset() {
        let mut estimator = LateralEstimator::new(LateralSettings {
            mode: LateralMode::Centroid,
            centroid_floor: 20.0,
            scale: 1.0,
            ..LateralSettings::default()
        });

        // Beacon biased to the right end
        let right = estimator.estimate(&[0.0, 0.0, 50.0, 120.0, 180.0]);
        assert!(right > 0.0);

        // Centered: zero
        let centered = estimator.estimate(&[10.0, 80.0, 200.0, 80.0, 10.0]);
        assert!(centered.abs() < 1e-5);

        let left = estimator.estimate(&[180.0, 120.0, 50.0, 0.0, 0.0]);
        assert!((left + right).abs() < 1e-5);
    }

    #[test]
    fn test_two_point_deadband_overrides_history() {
        let mut estimator = LateralEstimator::new(LateralSettings {
            mode: LateralMode::TwoPoint,
            deadband: 10.0,
            clamp: 200.0,
            filter_alpha: 0.4,
            scale: 1.0,
            ..LateralSettings::default()
        });

        // Build up filter history with a large imbalance
        let big = estimator.estimate(&[0.0, 0.0, 0.0, 0.0, 150.0]);
        assert!(big > 0.0);

        // Within the deadband the output must be exactly zero
        assert_eq!(estimator.estimate(&[50.0, 0.0, 0.0, 0.0, 55.0]), 0.0);
    }

    #[test]
    fn test_two_point_clamps_and_filters() {
        let mut estimator = LateralEstimator::new(LateralSettings {
            mode: LateralMode::TwoPoint,
            deadband: 10.0,
            clamp: 100.0,
            filter_alpha: 0.5,
            scale: 1.0,
            ..LateralSettings::default()
        });

        // Raw diff 400 clamps to 100; first filtered output is 50
        let first = estimator.estimate(&[0.0, 0.0, 0.0, 0.0, 400.0]);
        assert!((first - 50.0).abs() < 1e-5);

        // Second converges toward the clamp
        let second = estimator.estimate(&[0.0, 0.0, 0.0, 0.0, 400.0]);
        assert!((second - 75.0).abs() < 1e-5);
    }
}
