//! Simulated hardware rig
//!
//! A hardware-free stand-in for the whole robot: beacon-facing infrared
//! sensors, the shared emission line, quadrature encoders, and motor
//! outputs, all backed by one shared world.
//!
//! | Component | Simulation method |
//! |-----------|-------------------|
//! | Timing sensors | Discharge time proportional to beacon range |
//! | Analog array | Gaussian spot profile over the elements |
//! | Emission line | Level recorded in the world; floods the timing sensors when HIGH |
//! | Encoders | Wheel position integration, quadrature edges into the decoders |
//! | Motors | PWM recorded in the world, with multiplicative slip noise |
//!
//! Time is fully simulated: coarse time advances only through
//! [`MockRig::advance`], and the microsecond clock self-advances on read so
//! discharge timing loops terminate instantly. With a nonzero seed every run
//! is reproducible.
//!
//! When motion coupling is enabled, driving the wheels closes the loop by
//! moving the robot relative to the beacon: forward motion shortens the
//! range and differential motion steers the lateral offset.

mod beacon;
mod noise;
mod world;

pub use beacon::BeaconModel;
pub use world::{SimClock, SimWorld, WorldState};

use beacon::{ArrayElementPin, TimingSensorLine};
use noise::NoiseGenerator;
use world::{EmitterLine, EncoderSim, SimMotors};

use crate::encoder::TickCounter;
use crate::hal::{AdcChannel, DigitalLine, MotorOutputs};
use parking_lot::Mutex;
use std::sync::Arc;

/// Rig construction parameters
#[derive(Debug, Clone)]
pub struct RigSettings {
    /// Random seed; 0 draws fresh entropy each run
    pub seed: u64,
    /// Wheel speed in ticks/s per PWM unit
    pub ticks_per_pwm: f32,
    /// Multiplicative wheel slip (stddev, fraction of speed)
    pub slip_stddev: f32,
    /// Forward travel per encoder tick (mm)
    pub mm_per_tick: f32,
    /// Number of timing sensors
    pub timing_sensors: usize,
    /// Number of array elements
    pub array_elements: usize,
    /// Move the robot relative to the beacon as the wheels turn
    pub couple_motion: bool,
    /// Beacon-to-raw-value model
    pub beacon: BeaconModel,
}

impl Default for RigSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            ticks_per_pwm: 8.0,
            slip_stddev: 0.01,
            mm_per_tick: 0.28,
            timing_sensors: 2,
            array_elements: 5,
            couple_motion: true,
            beacon: BeaconModel::default(),
        }
    }
}

/// The assembled simulation rig
pub struct MockRig {
    settings: RigSettings,
    world: SimWorld,
    clock: Arc<SimClock>,
    sensor_noise: Arc<Mutex<NoiseGenerator>>,
    slip_noise: NoiseGenerator,
    left_encoder: EncoderSim,
    right_encoder: EncoderSim,
    left_pos_ticks: f64,
    right_pos_ticks: f64,
}

impl MockRig {
    pub fn new(settings: RigSettings) -> Self {
        log::info!(
            "MockRig: {} timing sensors, {} array elements, seed {}",
            settings.timing_sensors,
            settings.array_elements,
            settings.seed
        );
        let sensor_noise = Arc::new(Mutex::new(NoiseGenerator::new(settings.seed)));
        // Independent stream so sensor reads don't perturb wheel slip
        let slip_noise = NoiseGenerator::new(settings.seed.wrapping_add(1));
        Self {
            settings,
            world: SimWorld::new(),
            clock: Arc::new(SimClock::new()),
            sensor_noise,
            slip_noise,
            left_encoder: EncoderSim::new(),
            right_encoder: EncoderSim::new(),
            left_pos_ticks: 0.0,
            right_pos_ticks: 0.0,
        }
    }

    /// Shared world handle for scripting scenarios
    pub fn world(&self) -> SimWorld {
        self.world.clone()
    }

    /// Simulated clock
    pub fn clock(&self) -> Arc<SimClock> {
        Arc::clone(&self.clock)
    }

    /// The shared emission line
    pub fn emitter_line(&self) -> Box<dyn DigitalLine> {
        Box::new(EmitterLine::new(self.world.clone()))
    }

    /// Timing sensor lines
    pub fn timing_lines(&self) -> Vec<Box<dyn DigitalLine>> {
        (0..self.settings.timing_sensors)
            .map(|_| {
                Box::new(TimingSensorLine::new(
                    self.world.clone(),
                    Arc::clone(&self.clock),
                    Arc::clone(&self.sensor_noise),
                    self.settings.beacon.clone(),
                )) as Box<dyn DigitalLine>
            })
            .collect()
    }

    /// Analog array element pins
    pub fn array_elements(&self) -> Vec<Box<dyn AdcChannel>> {
        let count = self.settings.array_elements;
        (0..count)
            .map(|i| {
                Box::new(ArrayElementPin::new(
                    i,
                    count,
                    self.world.clone(),
                    Arc::clone(&self.sensor_noise),
                    self.settings.beacon.clone(),
                )) as Box<dyn AdcChannel>
            })
            .collect()
    }

    /// Motor outputs
    pub fn motors(&self) -> Box<dyn MotorOutputs> {
        Box::new(SimMotors::new(self.world.clone()))
    }

    /// Left wheel tick counter
    pub fn left_counter(&self) -> TickCounter {
        self.left_encoder.counter()
    }

    /// Right wheel tick counter
    pub fn right_counter(&self) -> TickCounter {
        self.right_encoder.counter()
    }

    /// Advance simulation time and integrate wheel motion
    pub fn advance(&mut self, dt_ms: u64) {
        self.clock.advance_ms(dt_ms);
        let dt = dt_ms as f64 / 1000.0;

        let state = self.world.snapshot();
        let left_speed = f64::from(state.left_pwm)
            * f64::from(self.settings.ticks_per_pwm)
            * (1.0 + f64::from(self.slip_noise.gaussian(self.settings.slip_stddev)));
        let right_speed = f64::from(state.right_pwm)
            * f64::from(self.settings.ticks_per_pwm)
            * (1.0 + f64::from(self.slip_noise.gaussian(self.settings.slip_stddev)));

        self.left_pos_ticks += left_speed * dt;
        self.right_pos_ticks += right_speed * dt;
        self.left_encoder.advance_to(self.left_pos_ticks);
        self.right_encoder.advance_to(self.right_pos_ticks);

        if self.settings.couple_motion && state.beacon_on {
            let forward_mm_s = (left_speed + right_speed) * 0.5 * f64::from(self.settings.mm_per_tick);
            // Yawing toward the beacon sweeps it back toward the array
            // center: a faster left wheel reduces a positive (rightward)
            // offset.
            let diff_mm_s = (right_speed - left_speed) * 0.5 * f64::from(self.settings.mm_per_tick);
            let mut world = self.world.lock();
            world.beacon_range_mm =
                ((f64::from(world.beacon_range_mm) - forward_mm_s * dt).max(30.0)) as f32;
            world.beacon_lateral_mm =
                (f64::from(world.beacon_lateral_mm) + diff_mm_s * dt) as f32;
        }
    }
}
