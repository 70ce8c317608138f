//! End-to-end follower scenarios against the simulated rig
//!
//! Each scenario assembles the full application (acquisition, odometry,
//! controller) on the mock hardware, scripts the beacon through the shared
//! world, and checks the externally visible behavior: states, wheel
//! commands, and the robot's motion relative to the beacon.

#![cfg(feature = "mock")]

use anugami_core::app::{FollowerApp, Peripherals};
use anugami_core::config::FollowerConfig;
use anugami_core::devices::mock::{BeaconModel, MockRig, RigSettings, SimWorld};
use anugami_core::follow::{FollowerState, LossPolicy};
use anugami_core::pid::PidSettings;

/// Deterministic rig: no sensor or slip noise
fn rig() -> MockRig {
    MockRig::new(RigSettings {
        seed: 1,
        slip_stddev: 0.0,
        beacon: BeaconModel {
            timing_noise_us: 0.0,
            adc_noise: 0.0,
            ..BeaconModel::default()
        },
        ..RigSettings::default()
    })
}

/// Blocked drivetrain: commands flow but the wheels never turn, so the
/// measured wheel speeds stay at zero
fn blocked_rig() -> MockRig {
    MockRig::new(RigSettings {
        seed: 1,
        slip_stddev: 0.0,
        ticks_per_pwm: 0.0,
        couple_motion: false,
        beacon: BeaconModel {
            timing_noise_us: 0.0,
            adc_noise: 0.0,
            ..BeaconModel::default()
        },
        ..RigSettings::default()
    })
}

/// Fast cadences so scenarios run in little simulated time.
///
/// The timing background calibrates to the 4500us saturation, so signal
/// strength is `4500 - 4 * range_mm` and a setpoint of 3300 holds station
/// at 300mm.
fn config() -> FollowerConfig {
    let mut config = FollowerConfig::default();
    config.robot.velocity_cadence_ms = 10;
    config.robot.speed_window = 2;
    config.acquisition.period_ms = 20;
    config.acquisition.timing_fraction = 0.5;
    config.follow.cadence_ms = 10;
    config.follow.calibration_dwell_ms = 200;
    config.follow.range_setpoint = 3300.0;
    config.follow.range_pid = PidSettings::proportional(0.05);
    config.follow.steer_pid = PidSettings::proportional(15.0);
    config.logging.status_interval_ms = 0;
    config
}

struct Scenario {
    rig: MockRig,
    app: FollowerApp,
    world: SimWorld,
}

impl Scenario {
    fn new(config: &FollowerConfig) -> Self {
        Self::with_rig(config, rig())
    }

    fn with_rig(config: &FollowerConfig, rig: MockRig) -> Self {
        let world = rig.world();
        let peripherals = Peripherals {
            clock: rig.clock(),
            emitter: rig.emitter_line(),
            timing_lines: rig.timing_lines(),
            array_elements: rig.array_elements(),
            motors: rig.motors(),
            left_ticks: rig.left_counter(),
            right_ticks: rig.right_counter(),
        };
        let mut app = FollowerApp::new(config, peripherals).unwrap();
        app.start();
        Self { rig, app, world }
    }

    fn run_ms(&mut self, ms: u64) {
        for _ in 0..ms / 5 {
            self.rig.advance(5);
            self.app.step();
        }
    }
}

#[test]
fn test_approach_and_center_on_beacon() {
    let mut scenario = Scenario::new(&config());

    // Calibration dwell with no beacon
    scenario.run_ms(250);
    assert_eq!(scenario.app.status().state, FollowerState::WaitingForSignal);

    // Beacon ahead and to the right
    scenario.world.place_beacon(450.0, 30.0);
    scenario.run_ms(20_000);

    let status = scenario.app.status();
    assert_eq!(status.state, FollowerState::Following);

    let world = scenario.world.snapshot();
    assert!(
        (world.beacon_range_mm - 300.0).abs() < 80.0,
        "range did not settle near setpoint: {}mm",
        world.beacon_range_mm
    );
    assert!(
        world.beacon_lateral_mm.abs() < 10.0,
        "lateral offset did not converge: {}mm",
        world.beacon_lateral_mm
    );
}

#[test]
fn test_acquisition_waits_then_locks_quickly() {
    let mut scenario = Scenario::new(&config());
    scenario.run_ms(250);

    // No beacon: the follower keeps waiting with the wheels stopped
    scenario.run_ms(500);
    let status = scenario.app.status();
    assert_eq!(status.state, FollowerState::WaitingForSignal);
    let world = scenario.world.snapshot();
    assert_eq!((world.left_pwm, world.right_pwm), (0, 0));

    // Beacon appears: lock within a couple of acquisition windows
    scenario.world.place_beacon(400.0, 0.0);
    scenario.run_ms(60);
    assert_eq!(scenario.app.status().state, FollowerState::Following);
}

#[test]
fn test_immediate_loss_stops_wheels_exactly() {
    let mut cfg = config();
    cfg.follow.loss_policy = LossPolicy::Immediate;
    let mut scenario = Scenario::new(&cfg);

    scenario.run_ms(250);
    scenario.world.place_beacon(500.0, 0.0);
    scenario.run_ms(1000);
    assert_eq!(scenario.app.status().state, FollowerState::Following);

    scenario.world.remove_beacon();
    scenario.run_ms(60);

    assert_eq!(scenario.app.status().state, FollowerState::SignalLost);
    let world = scenario.world.snapshot();
    assert_eq!(world.left_pwm, 0);
    assert_eq!(world.right_pwm, 0);
}

#[test]
fn test_coast_holds_then_stops() {
    let mut cfg = config();
    cfg.follow.loss_policy = LossPolicy::Coast;
    // Saturated timing reads spend simulated microseconds, so elapsed time
    // runs ahead of the stepped milliseconds once the beacon is gone; keep
    // the timeout well clear of the held window.
    cfg.follow.loss_timeout_ms = 300;
    let mut scenario = Scenario::new(&cfg);

    scenario.run_ms(250);
    scenario.world.place_beacon(600.0, 0.0);
    scenario.run_ms(500);
    let before = scenario.world.snapshot();
    assert!(before.left_pwm > 0);

    // Short dropout: the last command is held
    scenario.world.remove_beacon();
    scenario.run_ms(50);
    assert_eq!(scenario.app.status().state, FollowerState::Following);
    let coasting = scenario.world.snapshot();
    assert_eq!(coasting.left_pwm, before.left_pwm);

    // Past the timeout the wheels stop
    scenario.run_ms(600);
    assert_eq!(scenario.app.status().state, FollowerState::SignalLost);
    let stopped = scenario.world.snapshot();
    assert_eq!((stopped.left_pwm, stopped.right_pwm), (0, 0));
}

#[test]
fn test_centered_beacon_drives_straight() {
    let mut scenario = Scenario::new(&config());

    scenario.run_ms(250);
    scenario.world.place_beacon(550.0, 0.0);
    scenario.run_ms(1000);

    // Balanced array signal: zero steer term, identical wheel commands
    let status = scenario.app.status();
    assert_eq!(status.state, FollowerState::Following);
    assert_eq!(status.lateral_error, 0.0);

    let world = scenario.world.snapshot();
    assert_eq!(world.left_pwm, world.right_pwm);
    assert!(world.left_pwm > 0, "not approaching: pwm={}", world.left_pwm);
}

#[test]
fn test_run_duration_finishes_and_stops() {
    let mut cfg = config();
    cfg.follow.run_duration_ms = 2000;
    let mut scenario = Scenario::new(&cfg);

    scenario.run_ms(250);
    scenario.world.place_beacon(500.0, 10.0);
    scenario.run_ms(3000);

    assert!(scenario.app.finished());
    let world = scenario.world.snapshot();
    assert_eq!((world.left_pwm, world.right_pwm), (0, 0));
}

#[test]
fn test_occlusion_while_blocked_stops_wheels() {
    let mut cfg = config();
    cfg.follow.loss_policy = LossPolicy::Coast;
    cfg.follow.loss_timeout_ms = 60_000;
    let mut scenario = Scenario::with_rig(&cfg, blocked_rig());

    scenario.run_ms(250);
    scenario.world.place_beacon(500.0, 0.0);
    scenario.run_ms(300);

    // Pushing against the obstruction: nonzero command, zero wheel motion
    assert_eq!(scenario.app.status().state, FollowerState::Following);
    let pushing = scenario.world.snapshot();
    assert!(pushing.left_pwm > 0, "not pushing: pwm={}", pushing.left_pwm);

    // The beacon disappears behind the obstruction: the range signal flips
    // from very near to very far while the wheels read stationary. The
    // guard must zero the wheels long before the coast timeout.
    scenario.world.remove_beacon();
    scenario.run_ms(400);

    assert_eq!(scenario.app.status().state, FollowerState::Following);
    let held = scenario.world.snapshot();
    assert_eq!((held.left_pwm, held.right_pwm), (0, 0));
}

#[test]
fn test_reacquire_after_short_dropout() {
    let mut cfg = config();
    cfg.follow.loss_policy = LossPolicy::Immediate;
    cfg.follow.reacquire_grace_ms = 2000;
    let mut scenario = Scenario::new(&cfg);

    scenario.run_ms(250);
    scenario.world.place_beacon(500.0, 0.0);
    scenario.run_ms(500);

    scenario.world.remove_beacon();
    scenario.run_ms(100);
    assert_eq!(scenario.app.status().state, FollowerState::SignalLost);

    // Beacon returns inside the grace window
    scenario.world.place_beacon(500.0, 0.0);
    scenario.run_ms(100);
    assert_eq!(scenario.app.status().state, FollowerState::Following);
}
