//! Application configuration
//!
//! Loads configuration from a TOML file. Every field carries a default, so a
//! partial file (or no file at all) yields a usable configuration for the
//! simulated rig.

use crate::error::Result;
use crate::follow::FollowSettings;
use crate::kinematics::DriveGeometry;
use crate::sensing::AcquisitionSettings;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FollowerConfig {
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    #[serde(default)]
    pub follow: FollowSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Drive geometry and odometry cadence
#[derive(Debug, Clone, Deserialize)]
pub struct RobotConfig {
    /// Wheel radius (mm)
    #[serde(default = "default_wheel_radius_mm")]
    pub wheel_radius_mm: f32,

    /// Distance between wheel contact points (mm)
    #[serde(default = "default_wheel_base_mm")]
    pub wheel_base_mm: f32,

    /// Encoder ticks per wheel revolution, gearbox included
    #[serde(default = "default_ticks_per_rev")]
    pub ticks_per_rev: f32,

    /// Wheel-speed smoothing window (samples)
    #[serde(default = "default_speed_window")]
    pub speed_window: usize,

    /// Wheel-speed estimation cadence (ms)
    #[serde(default = "default_velocity_cadence_ms")]
    pub velocity_cadence_ms: u64,
}

fn default_wheel_radius_mm() -> f32 {
    16.0
}
fn default_wheel_base_mm() -> f32 {
    96.0
}
fn default_ticks_per_rev() -> f32 {
    358.3
}
fn default_speed_window() -> usize {
    4
}
fn default_velocity_cadence_ms() -> u64 {
    50
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            wheel_radius_mm: default_wheel_radius_mm(),
            wheel_base_mm: default_wheel_base_mm(),
            ticks_per_rev: default_ticks_per_rev(),
            speed_window: default_speed_window(),
            velocity_cadence_ms: default_velocity_cadence_ms(),
        }
    }
}

impl RobotConfig {
    /// Drive geometry for dead reckoning
    pub fn geometry(&self) -> DriveGeometry {
        DriveGeometry {
            wheel_radius_mm: self.wheel_radius_mm,
            wheel_base_mm: self.wheel_base_mm,
            ticks_per_rev: self.ticks_per_rev,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Periodic status-line interval (ms); 0 disables
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_status_interval_ms() -> u64 {
    1000
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

impl FollowerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: FollowerConfig = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::follow::LossPolicy;
    use crate::sensing::{LateralMode, RangeSource};

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config: FollowerConfig = toml::from_str("").unwrap();
        assert_eq!(config.robot.wheel_base_mm, 96.0);
        assert_eq!(config.acquisition.period_ms, 150);
        assert_eq!(config.follow.loss_policy, LossPolicy::Coast);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_overrides() {
        let toml_content = r#"
[robot]
wheel_base_mm = 120.0

[acquisition]
period_ms = 100
range_source = "array_center"

[acquisition.lateral]
mode = "twopoint"

[follow]
loss_policy = "immediate"
max_pwm = 90.0

[logging]
level = "debug"
"#;

        let config: FollowerConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.robot.wheel_base_mm, 120.0);
        // Untouched fields keep their defaults
        assert_eq!(config.robot.wheel_radius_mm, 16.0);
        assert_eq!(config.acquisition.period_ms, 100);
        assert_eq!(config.acquisition.range_source, RangeSource::ArrayCenter);
        assert_eq!(config.acquisition.lateral.mode, LateralMode::TwoPoint);
        assert_eq!(config.follow.loss_policy, LossPolicy::Immediate);
        assert_eq!(config.follow.max_pwm, 90.0);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_geometry_from_robot_config() {
        let robot = RobotConfig::default();
        let geometry = robot.geometry();
        assert_eq!(geometry.wheel_base_mm, robot.wheel_base_mm);
        assert!(geometry.mm_per_tick() > 0.0);
    }
}
