//! Beacon sensing: dual-mode infrared acquisition
//!
//! One shared emission line is time-division multiplexed between a fast
//! charge/discharge timing channel and an analog intensity array, so the two
//! modes never cross-talk. All readings are background-subtracted against a
//! stationary startup calibration.

pub mod acquisition;
pub mod bump;
pub mod line;
pub mod window;

pub use acquisition::{
    AcquisitionSettings, ArraySample, DualModeIrAcquisition, RangeSource, TimingSample,
};
pub use bump::{TimingChannel, TimingParams};
pub use line::{ArrayChannel, ElementCalibration, LateralEstimator, LateralMode, LateralSettings};
pub use window::{AcquisitionWindow, Phase};
