//! Reusable PID controller with anti-windup and output shaping
//!
//! One instance per control axis (wheel speed x2, steering, range-hold).
//! Two controller shapes are supported: the classic absolute form and the
//! incremental form that accumulates an output delta each cycle. Different
//! axes use different shapes; the shape and all shaping options come from
//! [`PidSettings`], so tuning lives entirely in configuration.

use serde::Deserialize;

/// Controller shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PidShape {
    /// `output = clamp(Kp*e + integral + Kd*de/dt)`
    Classic,
    /// `output += Kp*(e - e1) + Ki*e*dt + Kd*(e - 2*e1 + e2)/dt`
    Incremental,
}

/// Gains, bounds, and output-shaping options for one axis
#[derive(Debug, Clone, Deserialize)]
pub struct PidSettings {
    #[serde(default = "default_shape")]
    pub shape: PidShape,

    #[serde(default)]
    pub kp: f32,
    #[serde(default)]
    pub ki: f32,
    #[serde(default)]
    pub kd: f32,

    /// Output clamp bounds
    #[serde(default = "default_output_min")]
    pub output_min: f32,
    #[serde(default = "default_output_max")]
    pub output_max: f32,

    /// Errors below this magnitude are treated as zero (0 disables)
    #[serde(default)]
    pub error_deadzone: f32,

    /// Incremental only: output deltas below this magnitude are dropped
    /// (0 disables)
    #[serde(default)]
    pub output_deadzone: f32,

    /// Incremental only: per-update output delta clamp against mechanical
    /// jerk (0 disables)
    #[serde(default)]
    pub max_delta: f32,

    /// One-pole output low-pass coefficient; 1.0 disables
    #[serde(default = "default_output_filter")]
    pub output_filter: f32,

    /// Outputs below this magnitude snap to exactly zero (stiction)
    #[serde(default)]
    pub zero_threshold: f32,

    /// Nonzero outputs below this magnitude are raised to it, preserving
    /// sign, to overcome motor static friction (0 disables snapping)
    #[serde(default)]
    pub min_effective_output: f32,
}

fn default_shape() -> PidShape {
    PidShape::Classic
}
fn default_output_min() -> f32 {
    -255.0
}
fn default_output_max() -> f32 {
    255.0
}
fn default_output_filter() -> f32 {
    1.0
}

impl Default for PidSettings {
    fn default() -> Self {
        Self {
            shape: default_shape(),
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            output_min: default_output_min(),
            output_max: default_output_max(),
            error_deadzone: 0.0,
            output_deadzone: 0.0,
            max_delta: 0.0,
            output_filter: default_output_filter(),
            zero_threshold: 0.0,
            min_effective_output: 0.0,
        }
    }
}

impl PidSettings {
    /// Proportional-only settings with the given gain
    pub fn proportional(kp: f32) -> Self {
        Self {
            kp,
            ..Self::default()
        }
    }
}

/// PID controller state for one axis
///
/// `update` mutates only this instance; `reset` clears the error history and
/// output while preserving the settings.
pub struct PidController {
    settings: PidSettings,
    last_error: f32,
    prev_error: f32,
    integral: f32,
    output: f32,
    last_update_ms: Option<u64>,
}

impl PidController {
    /// Create a controller from settings
    pub fn new(settings: PidSettings) -> Self {
        Self {
            settings,
            last_error: 0.0,
            prev_error: 0.0,
            integral: 0.0,
            output: 0.0,
            last_update_ms: None,
        }
    }

    /// Clear error history and output; gains and limits are preserved
    pub fn reset(&mut self) {
        self.last_error = 0.0;
        self.prev_error = 0.0;
        self.integral = 0.0;
        self.output = 0.0;
        self.last_update_ms = None;
    }

    /// Last computed output
    pub fn output(&self) -> f32 {
        self.output
    }

    /// Run one update against the caller's monotonic millisecond clock
    ///
    /// The first call after construction or [`reset`](Self::reset) only
    /// records the timestamp and returns the held output, so stale history
    /// can never produce a derivative spike. A zero timestep likewise
    /// returns the previous output unchanged.
    pub fn update(&mut self, demand: f32, measurement: f32, now_ms: u64) -> f32 {
        let dt_ms = match self.last_update_ms {
            Some(last) => now_ms.saturating_sub(last),
            None => {
                self.last_update_ms = Some(now_ms);
                return self.output;
            }
        };
        if dt_ms == 0 {
            return self.output;
        }
        self.last_update_ms = Some(now_ms);
        let dt = dt_ms as f32 / 1000.0;

        let mut error = demand - measurement;
        if self.settings.error_deadzone > 0.0 && error.abs() < self.settings.error_deadzone {
            error = 0.0;
        }

        let previous = self.output;
        let mut output = match self.settings.shape {
            PidShape::Classic => {
                let p = self.settings.kp * error;

                self.integral += self.settings.ki * error * dt;
                self.integral = self
                    .integral
                    .clamp(self.settings.output_min, self.settings.output_max);

                let d = self.settings.kd * (error - self.last_error) / dt;

                (p + self.integral + d).clamp(self.settings.output_min, self.settings.output_max)
            }
            PidShape::Incremental => {
                let mut delta = self.settings.kp * (error - self.last_error)
                    + self.settings.ki * error * dt
                    + self.settings.kd * (error - 2.0 * self.last_error + self.prev_error) / dt;

                if self.settings.output_deadzone > 0.0
                    && delta.abs() < self.settings.output_deadzone
                {
                    delta = 0.0;
                }
                if self.settings.max_delta > 0.0 {
                    delta = delta.clamp(-self.settings.max_delta, self.settings.max_delta);
                }

                (previous + delta).clamp(self.settings.output_min, self.settings.output_max)
            }
        };

        if self.settings.output_filter < 1.0 {
            output = self.settings.output_filter * output
                + (1.0 - self.settings.output_filter) * previous;
        }

        if self.settings.min_effective_output > 0.0 {
            let magnitude = output.abs();
            if magnitude < self.settings.zero_threshold {
                output = 0.0;
            } else if magnitude < self.settings.min_effective_output {
                output = self.settings.min_effective_output.copysign(output);
            }
        }

        self.prev_error = self.last_error;
        self.last_error = error;
        self.output = output;
        output
    }
}
