//! Beacon-facing sensor stand-ins
//!
//! Maps the simulated world (beacon position, emission line level) onto the
//! raw values the sensing layer reads: discharge times on the timing lines
//! and ADC counts on the array elements.

use super::noise::NoiseGenerator;
use super::world::{SimClock, SimWorld, WorldState};
use crate::hal::{AdcChannel, DigitalLine};
use parking_lot::Mutex;
use std::sync::Arc;

/// Beacon-to-raw-value model parameters
#[derive(Debug, Clone)]
pub struct BeaconModel {
    /// Discharge microseconds per millimetre of range
    pub us_per_mm: f32,
    /// Floor on the discharge time (flooded sensor)
    pub min_discharge_us: f32,
    /// Discharge time with no beacon; past any sane timeout
    pub ambient_discharge_us: f32,
    /// Timing-read noise (us)
    pub timing_noise_us: f32,
    /// ADC counts with no signal
    pub array_background: f32,
    /// Peak element amplitude with the beacon at point-blank range
    pub array_peak: f32,
    /// Range beyond which the array sees nothing (mm)
    pub array_visible_mm: f32,
    /// Physical element pitch (mm)
    pub element_spacing_mm: f32,
    /// Spatial spread of the beacon spot (elements)
    pub element_sigma: f32,
    /// ADC noise (counts)
    pub adc_noise: f32,
}

impl Default for BeaconModel {
    fn default() -> Self {
        Self {
            us_per_mm: 4.0,
            min_discharge_us: 60.0,
            ambient_discharge_us: 8000.0,
            timing_noise_us: 15.0,
            array_background: 80.0,
            array_peak: 700.0,
            array_visible_mm: 600.0,
            element_spacing_mm: 15.0,
            element_sigma: 1.1,
            adc_noise: 3.0,
        }
    }
}

impl BeaconModel {
    /// Discharge time a timing sensor would show right now
    ///
    /// Our own emission flooding the sensor reads as a near-instant
    /// discharge; the phase discipline upstream exists exactly to avoid
    /// sampling in that condition.
    fn discharge_us(&self, state: &WorldState, noise: &mut NoiseGenerator) -> u64 {
        if state.emitter_high {
            return self.min_discharge_us as u64;
        }
        if !state.beacon_on {
            return self.ambient_discharge_us as u64;
        }
        let base = state.beacon_range_mm * self.us_per_mm;
        noise
            .biased_gaussian(base, self.timing_noise_us)
            .clamp(self.min_discharge_us, self.ambient_discharge_us) as u64
    }

    /// ADC counts one array element would show right now
    fn element_counts(
        &self,
        index: usize,
        element_count: usize,
        state: &WorldState,
        noise: &mut NoiseGenerator,
    ) -> u16 {
        let mut value = noise.biased_gaussian(self.array_background, self.adc_noise);

        if state.beacon_on && state.emitter_high {
            let half = (element_count as f32 - 1.0) / 2.0;
            let center = half + state.beacon_lateral_mm / self.element_spacing_mm;
            let amplitude =
                self.array_peak * (1.0 - state.beacon_range_mm / self.array_visible_mm).clamp(0.0, 1.0);
            let offset = index as f32 - center;
            value += amplitude * (-(offset * offset) / (2.0 * self.element_sigma * self.element_sigma)).exp();
        }

        value.clamp(0.0, 1023.0) as u16
    }
}

/// Charge/discharge timing sensor line
pub struct TimingSensorLine {
    world: SimWorld,
    clock: Arc<SimClock>,
    noise: Arc<Mutex<NoiseGenerator>>,
    model: BeaconModel,
    driven_high: bool,
    released_at_us: u64,
    discharge_us: u64,
}

impl TimingSensorLine {
    pub fn new(
        world: SimWorld,
        clock: Arc<SimClock>,
        noise: Arc<Mutex<NoiseGenerator>>,
        model: BeaconModel,
    ) -> Self {
        Self {
            world,
            clock,
            noise,
            model,
            driven_high: false,
            released_at_us: 0,
            discharge_us: 0,
        }
    }
}

impl DigitalLine for TimingSensorLine {
    fn drive(&mut self, high: bool) {
        self.driven_high = high;
    }

    fn release(&mut self) {
        // Discharge time is fixed by the world at the instant of release
        let state = self.world.snapshot();
        self.discharge_us = self.model.discharge_us(&state, &mut self.noise.lock());
        self.released_at_us = self.clock.now_us();
        self.driven_high = false;
    }

    fn is_high(&self) -> bool {
        if self.driven_high {
            return true;
        }
        self.clock.now_us().saturating_sub(self.released_at_us) < self.discharge_us
    }
}

/// One analog array element
pub struct ArrayElementPin {
    index: usize,
    element_count: usize,
    world: SimWorld,
    noise: Arc<Mutex<NoiseGenerator>>,
    model: BeaconModel,
}

impl ArrayElementPin {
    pub fn new(
        index: usize,
        element_count: usize,
        world: SimWorld,
        noise: Arc<Mutex<NoiseGenerator>>,
        model: BeaconModel,
    ) -> Self {
        Self {
            index,
            element_count,
            world,
            noise,
            model,
        }
    }
}

impl AdcChannel for ArrayElementPin {
    fn read(&mut self) -> u16 {
        let state = self.world.snapshot();
        self.model
            .element_counts(self.index, self.element_count, &state, &mut self.noise.lock())
    }
}
