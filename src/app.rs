//! Application orchestration
//!
//! Wires the acquisition pipeline, odometry, and the follow controller into
//! one cooperative loop. The loop owner calls [`FollowerApp::step`] as fast
//! as it likes; acquisition runs every pass while velocity estimation, the
//! control cycle, and the status line each fire on their own due times, so a
//! late pass never causes drift.

use crate::config::FollowerConfig;
use crate::encoder::{TickCounter, WheelSpeedEstimator};
use crate::error::Result;
use crate::follow::{CycleInput, FollowController, FollowerState, WheelCommand};
use crate::hal::{AdcChannel, Clock, DigitalLine, MotorOutputs};
use crate::kinematics::{DeadReckoner, Pose};
use crate::sensing::DualModeIrAcquisition;
use std::sync::Arc;

/// The device set the application runs against
///
/// Hardware or simulation; the app never knows which.
pub struct Peripherals {
    pub clock: Arc<dyn Clock>,
    pub emitter: Box<dyn DigitalLine>,
    pub timing_lines: Vec<Box<dyn DigitalLine>>,
    pub array_elements: Vec<Box<dyn AdcChannel>>,
    pub motors: Box<dyn MotorOutputs>,
    pub left_ticks: TickCounter,
    pub right_ticks: TickCounter,
}

/// Snapshot of the follower for logging and inspection
#[derive(Debug, Clone, Copy)]
pub struct FollowerStatus {
    pub state: FollowerState,
    pub pose: Pose,
    pub left_speed: f32,
    pub right_speed: f32,
    pub range_signal: f32,
    pub lateral_error: f32,
    pub has_target: bool,
    pub command: WheelCommand,
}

/// The assembled follower application
pub struct FollowerApp {
    clock: Arc<dyn Clock>,
    acquisition: DualModeIrAcquisition,
    controller: FollowController,
    motors: Box<dyn MotorOutputs>,
    left_ticks: TickCounter,
    right_ticks: TickCounter,
    left_estimator: WheelSpeedEstimator,
    right_estimator: WheelSpeedEstimator,
    reckoner: DeadReckoner,
    last_left_count: i32,
    last_right_count: i32,
    left_speed: f32,
    right_speed: f32,
    velocity_cadence_ms: u64,
    control_cadence_ms: u64,
    status_interval_ms: u64,
    next_velocity_ms: u64,
    next_control_ms: u64,
    next_status_ms: u64,
}

impl FollowerApp {
    /// Assemble the application from configuration and devices
    pub fn new(config: &FollowerConfig, peripherals: Peripherals) -> Result<Self> {
        let acquisition = DualModeIrAcquisition::new(
            config.acquisition.clone(),
            peripherals.emitter,
            peripherals.timing_lines,
            peripherals.array_elements,
            Arc::clone(&peripherals.clock),
        )?;
        let controller = FollowController::new(config.follow.clone());
        let reckoner = DeadReckoner::new(config.robot.geometry(), Pose::default());

        Ok(Self {
            clock: peripherals.clock,
            acquisition,
            controller,
            motors: peripherals.motors,
            left_ticks: peripherals.left_ticks,
            right_ticks: peripherals.right_ticks,
            left_estimator: WheelSpeedEstimator::new(config.robot.speed_window),
            right_estimator: WheelSpeedEstimator::new(config.robot.speed_window),
            reckoner,
            last_left_count: 0,
            last_right_count: 0,
            left_speed: 0.0,
            right_speed: 0.0,
            velocity_cadence_ms: config.robot.velocity_cadence_ms,
            control_cadence_ms: config.follow.cadence_ms,
            status_interval_ms: config.logging.status_interval_ms,
            next_velocity_ms: 0,
            next_control_ms: 0,
            next_status_ms: 0,
        })
    }

    /// Start the run: stationary calibration begins immediately
    pub fn start(&mut self) {
        let now = self.clock.millis();
        log::info!("FollowerApp: starting at {}ms", now);
        self.acquisition.begin_calibration();
        self.controller.start(now);
        self.next_velocity_ms = now;
        self.next_control_ms = now;
        self.next_status_ms = now.saturating_add(self.status_interval_ms);
    }

    /// One cooperative pass
    pub fn step(&mut self) {
        let now = self.clock.millis();

        self.acquisition.poll(now);

        if now >= self.next_velocity_ms {
            self.update_odometry(now);
            self.next_velocity_ms = next_due(self.next_velocity_ms, self.velocity_cadence_ms, now);
        }

        if now >= self.next_control_ms {
            self.run_control_cycle(now);
            self.next_control_ms = next_due(self.next_control_ms, self.control_cadence_ms, now);
        }

        if self.status_interval_ms > 0 && now >= self.next_status_ms {
            let status = self.status();
            log::info!(
                "FollowerApp: {:?} pose=({:.0},{:.0},{:.2}) range={:.1} lateral={:.2} L={:.1} R={:.1}",
                status.state,
                status.pose.x_mm,
                status.pose.y_mm,
                status.pose.heading_rad,
                status.range_signal,
                status.lateral_error,
                status.command.left,
                status.command.right
            );
            self.next_status_ms = next_due(self.next_status_ms, self.status_interval_ms, now);
        }
    }

    fn update_odometry(&mut self, now: u64) {
        let left = self.left_ticks.count();
        let right = self.right_ticks.count();

        self.left_speed = self.left_estimator.sample(left, now);
        self.right_speed = self.right_estimator.sample(right, now);

        self.reckoner
            .apply(left - self.last_left_count, right - self.last_right_count);
        self.last_left_count = left;
        self.last_right_count = right;
    }

    fn run_control_cycle(&mut self, now: u64) {
        let was_calibrating = self.controller.wants_calibration();

        let input = CycleInput {
            now_ms: now,
            range_signal: self.acquisition.range_signal(),
            has_target: self.acquisition.has_target(),
            lateral_error: self.acquisition.lateral_error(),
            left_speed: self.left_speed,
            right_speed: self.right_speed,
        };
        let command = self.controller.update(input);

        // The calibration dwell ends inside the controller; freeze the
        // backgrounds on the same cycle.
        if was_calibrating && !self.controller.wants_calibration() {
            self.acquisition.finish_calibration();
        }

        self.motors
            .set_wheel_commands(command.left.round() as i16, command.right.round() as i16);
    }

    /// True once the run has reached its terminal state
    pub fn finished(&self) -> bool {
        self.controller.state() == FollowerState::Finished
    }

    /// Snapshot for logging and tests
    pub fn status(&self) -> FollowerStatus {
        FollowerStatus {
            state: self.controller.state(),
            pose: self.reckoner.pose(),
            left_speed: self.left_speed,
            right_speed: self.right_speed,
            range_signal: self.acquisition.range_signal(),
            lateral_error: self.acquisition.lateral_error(),
            has_target: self.acquisition.has_target(),
            command: self.controller.last_command(),
        }
    }
}

/// Advance a due time by whole periods, skipping missed slots
fn next_due(previous: u64, period: u64, now: u64) -> u64 {
    let period = period.max(1);
    let mut next = previous.saturating_add(period);
    while next <= now {
        next += period;
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_due_regular_advance() {
        assert_eq!(next_due(100, 50, 120), 150);
    }

    #[test]
    fn test_next_due_skips_missed_slots() {
        // Loop stalled past several periods; resume in the future
        assert_eq!(next_due(100, 50, 700), 750);
    }
}
