//! Dual-mode acquisition over one shared emission line
//!
//! The emission line serves two physically distinct sensing modes and has
//! exactly one electrical state at any instant. This type is its sole owner:
//! entering the timing phase drives the line LOW (our own array emitter off,
//! near-field sensors receive the beacon); entering the array phase drives it
//! HIGH and samples the analog elements. Each channel's data is live only
//! during its own phase; the last completed sample of the other channel is
//! held with its capture timestamp for consumers that bridge phases.

use super::bump::{TimingChannel, TimingParams};
use super::line::{ArrayChannel, LateralEstimator, LateralSettings};
use super::window::{AcquisitionWindow, Phase};
use crate::error::Result;
use crate::hal::{AdcChannel, Clock, DigitalLine};
use serde::Deserialize;
use std::sync::Arc;

/// Which channel supplies the range estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeSource {
    /// Timing-channel mean strength
    Timing,
    /// Centre element of the analog array
    ArrayCenter,
}

/// Acquisition parameters
#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionSettings {
    /// Total window length (ms)
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Fraction of the window spent in the timing phase
    #[serde(default = "default_timing_fraction")]
    pub timing_fraction: f32,

    /// Timing-channel charge pulse (us)
    #[serde(default = "default_charge_us")]
    pub charge_us: u64,

    /// Timing-channel discharge timeout (us)
    #[serde(default = "default_timeout_us")]
    pub timeout_us: u64,

    /// Discard one ADC conversion per element for settling
    #[serde(default = "default_throwaway_read")]
    pub throwaway_read: bool,

    /// Range estimate source
    #[serde(default = "default_range_source")]
    pub range_source: RangeSource,

    /// Has-target threshold on the range signal
    #[serde(default = "default_range_threshold")]
    pub range_threshold: f32,

    /// Lateral estimator settings
    #[serde(default)]
    pub lateral: LateralSettings,
}

fn default_period_ms() -> u64 {
    150
}
fn default_timing_fraction() -> f32 {
    0.4
}
fn default_charge_us() -> u64 {
    10
}
fn default_timeout_us() -> u64 {
    4500
}
fn default_throwaway_read() -> bool {
    true
}
fn default_range_source() -> RangeSource {
    RangeSource::Timing
}
fn default_range_threshold() -> f32 {
    100.0
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            timing_fraction: default_timing_fraction(),
            charge_us: default_charge_us(),
            timeout_us: default_timeout_us(),
            throwaway_read: default_throwaway_read(),
            range_source: default_range_source(),
            range_threshold: default_range_threshold(),
            lateral: LateralSettings::default(),
        }
    }
}

/// Held result of the most recent timing-phase sample
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingSample {
    /// Mean background-subtracted strength, clamped >= 0
    pub strength: f32,
    /// Left-minus-right imbalance
    pub balance: f32,
    /// Capture time (ms)
    pub captured_ms: u64,
}

/// Held result of the most recent array-phase sample
#[derive(Debug, Clone, Default)]
pub struct ArraySample {
    /// Background-subtracted per-element signals
    pub signals: Vec<f32>,
    /// Lateral error estimate
    pub lateral: f32,
    /// Centre-element signal
    pub center: f32,
    /// Capture time (ms)
    pub captured_ms: u64,
}

/// Time-multiplexed dual-sensor acquisition
pub struct DualModeIrAcquisition {
    settings: AcquisitionSettings,
    window: AcquisitionWindow,
    emitter: Box<dyn DigitalLine>,
    timing: TimingChannel,
    array: ArrayChannel,
    estimator: LateralEstimator,
    timing_sample: TimingSample,
    array_sample: ArraySample,
    timing_live: bool,
    array_live: bool,
    calibrating: bool,
}

impl DualModeIrAcquisition {
    /// Create the acquisition pipeline and take ownership of the emitter
    pub fn new(
        settings: AcquisitionSettings,
        mut emitter: Box<dyn DigitalLine>,
        timing_lines: Vec<Box<dyn DigitalLine>>,
        array_elements: Vec<Box<dyn AdcChannel>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let window = AcquisitionWindow::new(settings.period_ms, settings.timing_fraction)?;
        let params = TimingParams {
            charge_us: settings.charge_us,
            timeout_us: settings.timeout_us,
        };
        let timing = TimingChannel::new(timing_lines, clock, params);
        let array = ArrayChannel::new(array_elements, settings.throwaway_read);
        let estimator = LateralEstimator::new(settings.lateral.clone());

        // Well-defined line state before the first window poll
        emitter.drive(false);

        log::debug!(
            "DualModeIrAcquisition: {} timing sensors, {} array elements, window {}ms",
            timing.len(),
            array.len(),
            settings.period_ms
        );

        Ok(Self {
            settings,
            window,
            emitter,
            timing,
            array,
            estimator,
            timing_sample: TimingSample::default(),
            array_sample: ArraySample::default(),
            timing_live: false,
            array_live: false,
            calibrating: false,
        })
    }

    /// Start routing samples into the calibration accumulators
    pub fn begin_calibration(&mut self) {
        log::info!("DualModeIrAcquisition: calibration started (keep robot stationary)");
        self.calibrating = true;
    }

    /// Freeze backgrounds and return to live sampling
    pub fn finish_calibration(&mut self) {
        self.timing.finish_calibration();
        self.array.finish_calibration();
        self.estimator.reset();
        self.calibrating = false;
        log::info!("DualModeIrAcquisition: calibration complete");
    }

    /// Advance the window and sample whichever channel owns the line
    pub fn poll(&mut self, now_ms: u64) {
        if let Some(phase) = self.window.poll(now_ms) {
            match phase {
                Phase::Timing => {
                    // Our array emitter off; the near-field sensors now see
                    // only the beacon. Array data from this tick onward is
                    // no longer live.
                    self.emitter.drive(false);
                    self.array_live = false;
                }
                Phase::Array => {
                    self.emitter.drive(true);
                    self.timing_live = false;
                }
            }
        }

        match self.window.phase() {
            Phase::Timing => {
                if self.calibrating {
                    self.timing.calibrate_sample();
                    return;
                }
                self.timing.sample();
                self.timing_sample = TimingSample {
                    strength: self.timing.strength(),
                    balance: self.timing.balance(),
                    captured_ms: now_ms,
                };
                self.timing_live = true;
            }
            Phase::Array => {
                if self.calibrating {
                    self.array.calibrate_sample();
                    return;
                }
                self.array.sample();
                let signals = self.array.signals();
                let lateral = self.estimator.estimate(&signals);
                self.array_sample = ArraySample {
                    center: self.array.center_signal(),
                    signals,
                    lateral,
                    captured_ms: now_ms,
                };
                self.array_live = true;
            }
        }
    }

    /// Currently active phase
    pub fn phase(&self) -> Phase {
        self.window.phase()
    }

    /// Most recent timing sample (held across phases)
    pub fn timing_sample(&self) -> &TimingSample {
        &self.timing_sample
    }

    /// Most recent array sample (held across phases)
    pub fn array_sample(&self) -> &ArraySample {
        &self.array_sample
    }

    /// Array sample, only while it is live in the current phase
    ///
    /// `None` from the instant the window transitions into the timing phase,
    /// even on the same tick.
    pub fn live_array_sample(&self) -> Option<&ArraySample> {
        if self.array_live {
            Some(&self.array_sample)
        } else {
            None
        }
    }

    /// Timing sample, only while it is live in the current phase
    pub fn live_timing_sample(&self) -> Option<&TimingSample> {
        if self.timing_live {
            Some(&self.timing_sample)
        } else {
            None
        }
    }

    /// Range signal per the configured source
    pub fn range_signal(&self) -> f32 {
        match self.settings.range_source {
            RangeSource::Timing => self.timing_sample.strength,
            RangeSource::ArrayCenter => self.array_sample.center,
        }
    }

    /// True when the range signal exceeds the configured threshold
    pub fn has_target(&self) -> bool {
        self.range_signal() > self.settings.range_threshold
    }

    /// Held lateral error estimate
    pub fn lateral_error(&self) -> f32 {
        self.array_sample.lateral
    }
}
