//! Follow supervision
//!
//! The state machine that sequences calibration, beacon acquisition, tracking,
//! and signal-loss recovery, and the per-cycle control law that turns sensing
//! estimates into wheel commands.

pub mod controller;

pub use controller::{
    CycleInput, DriveMode, FollowController, FollowSettings, FollowerState, LossPolicy,
    OcclusionSettings, WheelCommand,
};
