//! Hardware abstraction traits
//!
//! The control core consumes four abstract services: a monotonic clock, a
//! digital line that can be driven or released, an ADC channel, and a motor
//! output pair. Platform layers (or the mock rig) implement these; the core
//! never touches hardware directly.
//!
//! Encoder edge callbacks have no trait here: the platform's interrupt
//! context calls [`crate::encoder::QuadratureDecoder::on_edge`] directly and
//! the main loop reads the shared tick counter.

/// Monotonic clock with millisecond and microsecond resolution
///
/// Both readings must be monotonic; they need not share an epoch.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin
    fn millis(&self) -> u64;

    /// Microseconds since an arbitrary fixed origin
    ///
    /// Used only for bounded spin-waits well under the control cadence
    /// (charge pulses, discharge timing).
    fn micros(&self) -> u64;
}

/// A digital line that can switch between driven-output and released-input
///
/// Matches the charge/discharge sensor contract: drive to charge, release to
/// let the sensor pull the line down, read to time the discharge.
pub trait DigitalLine: Send {
    /// Configure as output and set the level
    fn drive(&mut self, high: bool);

    /// Configure as input (high impedance)
    fn release(&mut self);

    /// Sample the current level
    fn is_high(&self) -> bool;
}

/// Single ADC channel with a fixed integer range (0-1023)
pub trait AdcChannel: Send {
    /// Read the current conversion value
    fn read(&mut self) -> u16;
}

/// Differential-drive motor output pair
///
/// Sign selects direction, magnitude is duty cycle. Implementations clamp
/// magnitude to the actuator range (0-255) and own any per-wheel
/// mechanical-asymmetry correction.
pub trait MotorOutputs: Send {
    /// Set both wheel commands
    fn set_wheel_commands(&mut self, left: i16, right: i16);
}
