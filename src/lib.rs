//! Control core for an infrared leader/follower robot pair
//!
//! The follower keeps station behind a beacon-carrying leader using two
//! infrared sensing modes multiplexed over one shared emission line: a
//! charge/discharge timing channel for range and an analog element array for
//! lateral localization. Quadrature odometry, a reusable PID with output
//! shaping, and a supervisory state machine close the loop down to the wheel
//! commands.
//!
//! Hardware access goes through the traits in [`hal`], so the whole stack
//! runs unchanged against the simulated rig in [`devices::mock`].
//!
//! ## Features
//!
//! - `mock`: enable the simulated hardware rig for hardware-free runs

pub mod app;
pub mod config;
pub mod devices;
pub mod encoder;
pub mod error;
pub mod follow;
pub mod hal;
pub mod kinematics;
pub mod pid;
pub mod sensing;

// Re-export commonly used types
pub use config::FollowerConfig;
pub use error::{Error, Result};
