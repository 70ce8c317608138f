//! Supervisory follow controller
//!
//! Owns the acquisition/track/loss state machine and turns range/lateral
//! estimates into wheel demands through per-axis PID instances. One
//! parametrized controller covers every tuning variant: gains, thresholds,
//! loss policy, steer sign, and drive mode all come from [`FollowSettings`].

use crate::pid::{PidController, PidSettings, PidShape};
use serde::Deserialize;

/// Follower life cycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerState {
    /// Constructed, not yet started
    Idle,
    /// Stationary dwell capturing sensor backgrounds
    Calibrating,
    /// Watching the range channel for the beacon
    WaitingForSignal,
    /// Closed-loop station keeping
    Following,
    /// Beacon lost beyond the loss timeout; wheels forced to zero
    SignalLost,
    /// Run complete; terminal
    Finished,
}

/// What to do when the beacon disappears mid-follow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossPolicy {
    /// Hold the last wheel command until the loss timeout fires
    Coast,
    /// Stop on the first cycle without a target
    Immediate,
}

/// How PID outputs reach the wheels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    /// Range/steer outputs map straight to PWM
    DirectPwm,
    /// Range/steer outputs are wheel-speed targets; per-wheel PIDs close
    /// the inner loop against measured speeds
    WheelSpeed,
}

/// Collision/occlusion guard thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct OcclusionSettings {
    /// Range signal at or above this counts as "very near"
    #[serde(default = "default_near_threshold")]
    pub near_threshold: f32,

    /// Range signal at or below this counts as "very far"
    #[serde(default = "default_far_threshold")]
    pub far_threshold: f32,

    /// Wheel speeds within this magnitude count as "not moving" (ticks/s)
    #[serde(default = "default_speed_epsilon")]
    pub speed_epsilon: f32,

    /// Consecutive suspicious cycles before the forward demand is forced
    /// to zero
    #[serde(default = "default_trigger_cycles")]
    pub trigger_cycles: u32,
}

fn default_near_threshold() -> f32 {
    800.0
}
fn default_far_threshold() -> f32 {
    50.0
}
fn default_speed_epsilon() -> f32 {
    5.0
}
fn default_trigger_cycles() -> u32 {
    5
}

impl Default for OcclusionSettings {
    fn default() -> Self {
        Self {
            near_threshold: default_near_threshold(),
            far_threshold: default_far_threshold(),
            speed_epsilon: default_speed_epsilon(),
            trigger_cycles: default_trigger_cycles(),
        }
    }
}

/// Follow controller tuning
#[derive(Debug, Clone, Deserialize)]
pub struct FollowSettings {
    /// Control cycle cadence (ms); hard deadline per cycle
    #[serde(default = "default_cadence_ms")]
    pub cadence_ms: u64,

    /// Stationary calibration dwell (ms)
    #[serde(default = "default_calibration_dwell_ms")]
    pub calibration_dwell_ms: u64,

    /// Run duration limit (ms); 0 runs until stopped externally
    #[serde(default)]
    pub run_duration_ms: u64,

    /// Range-hold setpoint in range-signal units (nonzero: keep station,
    /// don't close to contact)
    #[serde(default = "default_range_setpoint")]
    pub range_setpoint: f32,

    /// Signal-loss policy
    #[serde(default = "default_loss_policy")]
    pub loss_policy: LossPolicy,

    /// Coast window before declaring the signal lost (ms)
    #[serde(default = "default_loss_timeout_ms")]
    pub loss_timeout_ms: u64,

    /// Window after loss during which reacquisition resumes following (ms)
    #[serde(default = "default_reacquire_grace_ms")]
    pub reacquire_grace_ms: u64,

    /// After this long in SignalLost, fall back to WaitingForSignal (ms);
    /// 0 stays stopped
    #[serde(default = "default_wait_reset_timeout_ms")]
    pub wait_reset_timeout_ms: u64,

    /// Sign convention from lateral imbalance to steer direction (+1 or -1);
    /// an empirical tuning choice, so it is configuration
    #[serde(default = "default_steer_sign")]
    pub steer_sign: f32,

    /// Wheel command clamp (PWM units)
    #[serde(default = "default_max_pwm")]
    pub max_pwm: f32,

    /// Drive mode
    #[serde(default = "default_drive_mode")]
    pub drive_mode: DriveMode,

    /// WheelSpeed mode: ticks/s of wheel-speed target per unit of outer
    /// PID output
    #[serde(default = "default_wheel_speed_scale")]
    pub wheel_speed_scale: f32,

    /// Occlusion guard thresholds
    #[serde(default)]
    pub occlusion: OcclusionSettings,

    /// Range-hold axis
    #[serde(default = "default_range_pid")]
    pub range_pid: PidSettings,

    /// Steering axis
    #[serde(default = "default_steer_pid")]
    pub steer_pid: PidSettings,

    /// Per-wheel speed axes (WheelSpeed mode; instantiated twice)
    #[serde(default = "default_wheel_pid")]
    pub wheel_pid: PidSettings,
}

fn default_cadence_ms() -> u64 {
    40
}
fn default_calibration_dwell_ms() -> u64 {
    2000
}
fn default_range_setpoint() -> f32 {
    250.0
}
fn default_loss_policy() -> LossPolicy {
    LossPolicy::Coast
}
fn default_loss_timeout_ms() -> u64 {
    600
}
fn default_reacquire_grace_ms() -> u64 {
    3000
}
fn default_wait_reset_timeout_ms() -> u64 {
    10_000
}
fn default_steer_sign() -> f32 {
    1.0
}
fn default_max_pwm() -> f32 {
    120.0
}
fn default_drive_mode() -> DriveMode {
    DriveMode::DirectPwm
}
fn default_wheel_speed_scale() -> f32 {
    12.0
}
fn default_range_pid() -> PidSettings {
    PidSettings {
        kp: 0.25,
        ki: 0.02,
        output_min: -120.0,
        output_max: 120.0,
        ..PidSettings::default()
    }
}
fn default_steer_pid() -> PidSettings {
    PidSettings {
        shape: PidShape::Incremental,
        kp: 0.8,
        ki: 0.15,
        output_min: -60.0,
        output_max: 60.0,
        max_delta: 15.0,
        output_filter: 0.6,
        ..PidSettings::default()
    }
}
fn default_wheel_pid() -> PidSettings {
    PidSettings {
        shape: PidShape::Incremental,
        kp: 0.05,
        ki: 0.4,
        output_min: -120.0,
        output_max: 120.0,
        ..PidSettings::default()
    }
}

impl Default for FollowSettings {
    fn default() -> Self {
        Self {
            cadence_ms: default_cadence_ms(),
            calibration_dwell_ms: default_calibration_dwell_ms(),
            run_duration_ms: 0,
            range_setpoint: default_range_setpoint(),
            loss_policy: default_loss_policy(),
            loss_timeout_ms: default_loss_timeout_ms(),
            reacquire_grace_ms: default_reacquire_grace_ms(),
            wait_reset_timeout_ms: default_wait_reset_timeout_ms(),
            steer_sign: default_steer_sign(),
            max_pwm: default_max_pwm(),
            drive_mode: default_drive_mode(),
            wheel_speed_scale: default_wheel_speed_scale(),
            occlusion: OcclusionSettings::default(),
            range_pid: default_range_pid(),
            steer_pid: default_steer_pid(),
            wheel_pid: default_wheel_pid(),
        }
    }
}

/// Per-cycle sensor and odometry inputs
#[derive(Debug, Clone, Copy)]
pub struct CycleInput {
    /// Monotonic time (ms)
    pub now_ms: u64,
    /// Range signal from the configured source
    pub range_signal: f32,
    /// Range signal above the has-target threshold
    pub has_target: bool,
    /// Lateral error estimate
    pub lateral_error: f32,
    /// Measured left wheel speed (ticks/s)
    pub left_speed: f32,
    /// Measured right wheel speed (ticks/s)
    pub right_speed: f32,
}

/// Signed wheel command pair (PWM units)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelCommand {
    pub left: f32,
    pub right: f32,
}

impl WheelCommand {
    /// Both wheels stopped
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Supervisory state machine and control loop core
pub struct FollowController {
    settings: FollowSettings,
    state: FollowerState,
    state_entered_ms: u64,
    follow_started_ms: u64,
    loss_since_ms: Option<u64>,
    range_pid: PidController,
    steer_pid: PidController,
    left_pid: PidController,
    right_pid: PidController,
    prev_range_signal: f32,
    occlusion_flagged: bool,
    occlusion_count: u32,
    last_command: WheelCommand,
}

impl FollowController {
    /// Create a controller in [`FollowerState::Idle`]
    pub fn new(settings: FollowSettings) -> Self {
        let range_pid = PidController::new(settings.range_pid.clone());
        let steer_pid = PidController::new(settings.steer_pid.clone());
        let left_pid = PidController::new(settings.wheel_pid.clone());
        let right_pid = PidController::new(settings.wheel_pid.clone());
        Self {
            settings,
            state: FollowerState::Idle,
            state_entered_ms: 0,
            follow_started_ms: 0,
            loss_since_ms: None,
            range_pid,
            steer_pid,
            left_pid,
            right_pid,
            prev_range_signal: 0.0,
            occlusion_flagged: false,
            occlusion_count: 0,
            last_command: WheelCommand::zero(),
        }
    }

    /// Begin the run: Idle -> Calibrating
    pub fn start(&mut self, now_ms: u64) {
        if self.state == FollowerState::Idle {
            self.transition(FollowerState::Calibrating, now_ms);
        }
    }

    /// Current state
    pub fn state(&self) -> FollowerState {
        self.state
    }

    /// True while the stationary calibration dwell is running
    pub fn wants_calibration(&self) -> bool {
        self.state == FollowerState::Calibrating
    }

    /// Last commanded wheel pair
    pub fn last_command(&self) -> WheelCommand {
        self.last_command
    }

    /// True while the occlusion guard is holding the forward demand at zero
    pub fn occlusion_hold(&self) -> bool {
        self.occlusion_count >= self.settings.occlusion.trigger_cycles
    }

    fn transition(&mut self, to: FollowerState, now_ms: u64) {
        log::info!(
            "FollowController: {:?} -> {:?} at {}ms",
            self.state,
            to,
            now_ms
        );
        self.state = to;
        self.state_entered_ms = now_ms;
    }

    fn reset_pids(&mut self) {
        self.range_pid.reset();
        self.steer_pid.reset();
        self.left_pid.reset();
        self.right_pid.reset();
    }

    /// Run one control cycle; returns the wheel command to apply
    pub fn update(&mut self, input: CycleInput) -> WheelCommand {
        let command = match self.state {
            FollowerState::Idle | FollowerState::Finished => WheelCommand::zero(),
            FollowerState::Calibrating => self.update_calibrating(input),
            FollowerState::WaitingForSignal => self.update_waiting(input),
            FollowerState::Following => self.update_following(input),
            FollowerState::SignalLost => self.update_signal_lost(input),
        };
        self.prev_range_signal = input.range_signal;
        self.last_command = command;
        command
    }

    fn update_calibrating(&mut self, input: CycleInput) -> WheelCommand {
        let elapsed = input.now_ms.saturating_sub(self.state_entered_ms);
        if elapsed >= self.settings.calibration_dwell_ms {
            self.transition(FollowerState::WaitingForSignal, input.now_ms);
        }
        WheelCommand::zero()
    }

    fn update_waiting(&mut self, input: CycleInput) -> WheelCommand {
        if input.has_target {
            log::info!(
                "FollowController: beacon acquired (range_signal={:.1})",
                input.range_signal
            );
            self.follow_started_ms = input.now_ms;
            self.loss_since_ms = None;
            self.occlusion_flagged = false;
            self.occlusion_count = 0;
            self.reset_pids();
            self.transition(FollowerState::Following, input.now_ms);
        }
        WheelCommand::zero()
    }

    fn update_following(&mut self, input: CycleInput) -> WheelCommand {
        // Run-duration limit ends the session regardless of signal
        if self.settings.run_duration_ms > 0
            && input.now_ms.saturating_sub(self.follow_started_ms) >= self.settings.run_duration_ms
        {
            self.transition(FollowerState::Finished, input.now_ms);
            return WheelCommand::zero();
        }

        self.update_occlusion_guard(&input);

        if !input.has_target {
            match self.settings.loss_policy {
                LossPolicy::Immediate => {
                    self.transition(FollowerState::SignalLost, input.now_ms);
                    return WheelCommand::zero();
                }
                LossPolicy::Coast => {
                    let since = *self.loss_since_ms.get_or_insert(input.now_ms);
                    if input.now_ms.saturating_sub(since) >= self.settings.loss_timeout_ms {
                        self.transition(FollowerState::SignalLost, input.now_ms);
                        return WheelCommand::zero();
                    }
                    // An occluded sensor also reads as no-target, so the
                    // guard must override the coasted command too.
                    if self.occlusion_hold() {
                        return WheelCommand::zero();
                    }
                    // Coast on the held command until the timeout fires
                    return self.last_command;
                }
            }
        }
        self.loss_since_ms = None;

        let forward = self
            .range_pid
            .update(self.settings.range_setpoint, input.range_signal, input.now_ms);
        let steer = self.steer_pid.update(0.0, input.lateral_error, input.now_ms)
            * self.settings.steer_sign;

        let forward = if self.occlusion_hold() { 0.0 } else { forward };

        let command = match self.settings.drive_mode {
            DriveMode::DirectPwm => WheelCommand {
                left: (forward - steer).clamp(-self.settings.max_pwm, self.settings.max_pwm),
                right: (forward + steer).clamp(-self.settings.max_pwm, self.settings.max_pwm),
            },
            DriveMode::WheelSpeed => {
                let left_target = (forward - steer) * self.settings.wheel_speed_scale;
                let right_target = (forward + steer) * self.settings.wheel_speed_scale;
                WheelCommand {
                    left: self
                        .left_pid
                        .update(left_target, input.left_speed, input.now_ms)
                        .clamp(-self.settings.max_pwm, self.settings.max_pwm),
                    right: self
                        .right_pid
                        .update(right_target, input.right_speed, input.now_ms)
                        .clamp(-self.settings.max_pwm, self.settings.max_pwm),
                }
            }
        };

        log::trace!(
            "FollowController: range={:.1} lateral={:.2} -> L={:.1} R={:.1}",
            input.range_signal,
            input.lateral_error,
            command.left,
            command.right
        );
        command
    }

    fn update_signal_lost(&mut self, input: CycleInput) -> WheelCommand {
        let elapsed = input.now_ms.saturating_sub(self.state_entered_ms);

        if input.has_target && elapsed <= self.settings.reacquire_grace_ms {
            log::info!("FollowController: beacon reacquired after {}ms", elapsed);
            self.loss_since_ms = None;
            self.reset_pids();
            self.transition(FollowerState::Following, input.now_ms);
        } else if self.settings.wait_reset_timeout_ms > 0
            && elapsed >= self.settings.wait_reset_timeout_ms
        {
            self.transition(FollowerState::WaitingForSignal, input.now_ms);
        }
        WheelCommand::zero()
    }

    /// Sensor/motion contradiction guard
    ///
    /// A range flip from very near to very far within one cycle while both
    /// wheels read stationary is an occlusion or collision, not real motion.
    /// While the contradiction persists the counter climbs; once it reaches
    /// the trigger count the forward demand is held at zero. Any cycle
    /// without the contradiction clears it.
    fn update_occlusion_guard(&mut self, input: &CycleInput) {
        let occ = &self.settings.occlusion;
        let now_far = input.range_signal <= occ.far_threshold;
        let stopped = input.left_speed.abs() <= occ.speed_epsilon
            && input.right_speed.abs() <= occ.speed_epsilon;

        if self.occlusion_flagged {
            if now_far && stopped {
                self.occlusion_count = self.occlusion_count.saturating_add(1);
                if self.occlusion_count == occ.trigger_cycles {
                    log::warn!(
                        "FollowController: occlusion guard engaged after {} cycles",
                        self.occlusion_count
                    );
                }
            } else {
                self.occlusion_flagged = false;
                self.occlusion_count = 0;
            }
        } else if self.prev_range_signal >= occ.near_threshold && now_far && stopped {
            self.occlusion_flagged = true;
            self.occlusion_count = 1;
        }
    }
}
