//! Time-division acquisition window
//!
//! A repeating fixed-length window split into two contiguous phases: timing
//! sensors first, then the analog array. The window only gates which sensor
//! reads are trustworthy; the actual line state is owned by
//! [`super::acquisition::DualModeIrAcquisition`].

use crate::error::{Error, Result};

/// Which sensing mode currently owns the shared emission line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Near-field charge/discharge timing reads; emission line held LOW
    Timing,
    /// Analog array ADC reads; emission line held HIGH
    Array,
}

/// Repeating two-phase acquisition cycle
pub struct AcquisitionWindow {
    timing_ms: u64,
    array_ms: u64,
    phase: Phase,
    phase_entered_ms: u64,
    started: bool,
}

impl AcquisitionWindow {
    /// Create a window of `period_ms` total length with the given fraction
    /// spent in the timing phase
    pub fn new(period_ms: u64, timing_fraction: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&timing_fraction) || timing_fraction == 0.0 {
            return Err(Error::InvalidParameter(format!(
                "timing_fraction must be in (0, 1), got {}",
                timing_fraction
            )));
        }
        let timing_ms = ((period_ms as f32 * timing_fraction) as u64).max(1);
        if timing_ms >= period_ms {
            return Err(Error::InvalidParameter(format!(
                "window of {}ms leaves no array phase",
                period_ms
            )));
        }
        Ok(Self {
            timing_ms,
            array_ms: period_ms - timing_ms,
            phase: Phase::Timing,
            phase_entered_ms: 0,
            started: false,
        })
    }

    /// Advance the window; returns `Some(phase)` when a new phase is entered
    ///
    /// The first poll enters the timing phase. Phase boundaries advance by
    /// their nominal length, so the cycle does not drift with poll jitter.
    pub fn poll(&mut self, now_ms: u64) -> Option<Phase> {
        if !self.started {
            self.started = true;
            self.phase = Phase::Timing;
            self.phase_entered_ms = now_ms;
            return Some(Phase::Timing);
        }

        let length = match self.phase {
            Phase::Timing => self.timing_ms,
            Phase::Array => self.array_ms,
        };
        if now_ms.saturating_sub(self.phase_entered_ms) < length {
            return None;
        }

        self.phase = match self.phase {
            Phase::Timing => Phase::Array,
            Phase::Array => Phase::Timing,
        };
        self.phase_entered_ms += length;
        Some(self.phase)
    }

    /// Currently active phase
    pub fn phase(&self) -> Phase {
        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_degenerate_fractions() {
        assert!(AcquisitionWindow::new(100, 0.0).is_err());
        assert!(AcquisitionWindow::new(100, 1.0).is_err());
        assert!(AcquisitionWindow::new(100, 1.5).is_err());
        assert!(AcquisitionWindow::new(100, 0.3).is_ok());
    }

    #[test]
    fn test_phases_alternate_with_configured_lengths() {
        let mut window = AcquisitionWindow::new(100, 0.3).unwrap();

        assert_eq!(window.poll(0), Some(Phase::Timing));
        assert_eq!(window.poll(10), None);
        assert_eq!(window.poll(29), None);
        assert_eq!(window.poll(30), Some(Phase::Array));
        assert_eq!(window.poll(99), None);
        assert_eq!(window.poll(100), Some(Phase::Timing));
        assert_eq!(window.poll(130), Some(Phase::Array));
    }

    #[test]
    fn test_boundaries_do_not_drift_with_late_polls() {
        let mut window = AcquisitionWindow::new(100, 0.5).unwrap();

        window.poll(0);
        // Poll arrives 7ms late; the next boundary stays at the nominal 100
        assert_eq!(window.poll(57), Some(Phase::Array));
        assert_eq!(window.poll(99), None);
        assert_eq!(window.poll(100), Some(Phase::Timing));
    }
}
