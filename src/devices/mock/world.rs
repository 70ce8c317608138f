//! Shared simulation state, clock, and drive-side device stand-ins

use crate::encoder::{QuadratureDecoder, TickCounter};
use crate::hal::{Clock, DigitalLine, MotorOutputs};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Everything the simulated devices observe or mutate
#[derive(Debug, Clone)]
pub struct WorldState {
    /// Leader beacon transmitting
    pub beacon_on: bool,
    /// Straight-line distance to the beacon (mm)
    pub beacon_range_mm: f32,
    /// Lateral offset of the beacon, positive to the right (mm)
    pub beacon_lateral_mm: f32,
    /// Shared emission line level as last driven
    pub emitter_high: bool,
    /// Last applied wheel commands (PWM units)
    pub left_pwm: i16,
    pub right_pwm: i16,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            beacon_on: false,
            beacon_range_mm: 1000.0,
            beacon_lateral_mm: 0.0,
            emitter_high: false,
            left_pwm: 0,
            right_pwm: 0,
        }
    }
}

/// Cloneable handle to the shared world
#[derive(Clone)]
pub struct SimWorld {
    state: Arc<Mutex<WorldState>>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WorldState::default())),
        }
    }

    /// Position the beacon and switch it on
    pub fn place_beacon(&self, range_mm: f32, lateral_mm: f32) {
        let mut state = self.state.lock();
        state.beacon_on = true;
        state.beacon_range_mm = range_mm;
        state.beacon_lateral_mm = lateral_mm;
    }

    /// Switch the beacon off (occlusion or leader shutdown)
    pub fn remove_beacon(&self) {
        self.state.lock().beacon_on = false;
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> WorldState {
        self.state.lock().clone()
    }

    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, WorldState> {
        self.state.lock()
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulated monotonic clock
///
/// `micros()` advances one microsecond per read, so bounded spin-waits on the
/// clock always terminate without wall time passing. Coarse time advances
/// only through [`SimClock::advance_ms`], which keeps test scenarios
/// deterministic.
pub struct SimClock {
    us: AtomicU64,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            us: AtomicU64::new(0),
        }
    }

    /// Advance coarse simulation time
    pub fn advance_ms(&self, ms: u64) {
        self.us.fetch_add(ms * 1000, Ordering::Relaxed);
    }

    /// Non-advancing microsecond read
    pub fn now_us(&self) -> u64 {
        self.us.load(Ordering::Relaxed)
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn millis(&self) -> u64 {
        self.us.load(Ordering::Relaxed) / 1000
    }

    fn micros(&self) -> u64 {
        self.us.fetch_add(1, Ordering::Relaxed)
    }
}

/// The shared emission line
pub struct EmitterLine {
    world: SimWorld,
}

impl EmitterLine {
    pub fn new(world: SimWorld) -> Self {
        Self { world }
    }
}

impl DigitalLine for EmitterLine {
    fn drive(&mut self, high: bool) {
        self.world.lock().emitter_high = high;
    }

    fn release(&mut self) {
        // Pull-down on the line
        self.world.lock().emitter_high = false;
    }

    fn is_high(&self) -> bool {
        self.world.lock().emitter_high
    }
}

/// Motor outputs writing into the world
pub struct SimMotors {
    world: SimWorld,
}

impl SimMotors {
    pub fn new(world: SimWorld) -> Self {
        Self { world }
    }
}

impl MotorOutputs for SimMotors {
    fn set_wheel_commands(&mut self, left: i16, right: i16) {
        // Actuator duty range is 0-255 per wheel
        let left = left.clamp(-255, 255);
        let right = right.clamp(-255, 255);
        let mut state = self.world.lock();
        if state.left_pwm != left || state.right_pwm != right {
            log::trace!("SimMotors: L={} R={}", left, right);
        }
        state.left_pwm = left;
        state.right_pwm = right;
    }
}

/// Quadrature line levels (a, b) in forward order; one step is one tick.
/// Matches the decoder's state encoding of `(B, A xor B)`.
const FORWARD_SEQ: [(bool, bool); 4] = [(false, false), (true, true), (false, true), (true, false)];

/// Emits quadrature edges into a decoder as the simulated wheel turns
pub struct EncoderSim {
    decoder: QuadratureDecoder,
    seq_idx: usize,
    emitted: i64,
}

impl EncoderSim {
    pub fn new() -> Self {
        let mut decoder = QuadratureDecoder::new();
        let (a, b) = FORWARD_SEQ[0];
        decoder.prime(a, b);
        Self {
            decoder,
            seq_idx: 0,
            emitted: 0,
        }
    }

    /// Read handle for the wheel's tick counter
    pub fn counter(&self) -> TickCounter {
        self.decoder.counter()
    }

    /// Step the decoder until the emitted tick count reaches the integer
    /// part of the wheel position
    pub fn advance_to(&mut self, position_ticks: f64) {
        let target = position_ticks.floor() as i64;
        while self.emitted < target {
            self.step(true);
            self.emitted += 1;
        }
        while self.emitted > target {
            self.step(false);
            self.emitted -= 1;
        }
    }

    fn step(&mut self, forward: bool) {
        self.seq_idx = if forward {
            (self.seq_idx + 1) % 4
        } else {
            (self.seq_idx + 3) % 4
        };
        let (a, b) = FORWARD_SEQ[self.seq_idx];
        self.decoder.on_edge(a, b);
    }
}

impl Default for EncoderSim {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_spin_reads_terminate() {
        let clock = SimClock::new();
        let start = clock.micros();
        while clock.micros().saturating_sub(start) < 100 {}
        assert!(clock.now_us() >= 100);
    }

    #[test]
    fn test_encoder_sim_tracks_position() {
        let mut sim = EncoderSim::new();
        let counter = sim.counter();

        sim.advance_to(10.7);
        assert_eq!(counter.count(), 10);

        sim.advance_to(3.2);
        assert_eq!(counter.count(), 3);

        sim.advance_to(-5.0);
        assert_eq!(counter.count(), -5);
    }

    #[test]
    fn test_motor_commands_clamp_to_actuator_range() {
        let world = SimWorld::new();
        let mut motors = SimMotors::new(world.clone());

        motors.set_wheel_commands(1000, -1000);
        let state = world.snapshot();
        assert_eq!(state.left_pwm, 255);
        assert_eq!(state.right_pwm, -255);
    }

    #[test]
    fn test_emitter_line_reflects_in_world() {
        let world = SimWorld::new();
        let mut line = EmitterLine::new(world.clone());

        line.drive(true);
        assert!(world.snapshot().emitter_high);
        line.release();
        assert!(!world.snapshot().emitter_high);
    }
}
