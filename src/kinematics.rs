//! Differential-drive dead reckoning
//!
//! Integrates per-wheel tick deltas into a 2-D pose. Heading is accumulated
//! without wrapping; callers needing wrapped angle deltas use [`wrap_angle`]
//! explicitly.

use std::f32::consts::{PI, TAU};

/// Physical drive geometry
#[derive(Debug, Clone, Copy)]
pub struct DriveGeometry {
    /// Wheel radius (mm)
    pub wheel_radius_mm: f32,

    /// Wheel separation (mm)
    pub wheel_base_mm: f32,

    /// Encoder ticks per wheel revolution
    pub ticks_per_rev: f32,
}

impl DriveGeometry {
    /// Millimetres of wheel travel per encoder tick
    pub fn mm_per_tick(&self) -> f32 {
        TAU * self.wheel_radius_mm / self.ticks_per_rev
    }
}

/// Robot pose in the odometry frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    /// X position (mm)
    pub x_mm: f32,

    /// Y position (mm)
    pub y_mm: f32,

    /// Heading (radians, CCW positive, unwrapped)
    pub heading_rad: f32,
}

impl Pose {
    /// Create a pose
    pub fn new(x_mm: f32, y_mm: f32, heading_rad: f32) -> Self {
        Self {
            x_mm,
            y_mm,
            heading_rad,
        }
    }
}

/// Dead-reckoning integrator over wheel tick deltas
pub struct DeadReckoner {
    geometry: DriveGeometry,
    pose: Pose,
}

impl DeadReckoner {
    /// Create an integrator starting at the given pose
    pub fn new(geometry: DriveGeometry, start: Pose) -> Self {
        Self {
            geometry,
            pose: start,
        }
    }

    /// Integrate one pair of wheel tick deltas
    pub fn apply(&mut self, delta_left: i32, delta_right: i32) -> Pose {
        let mm_per_tick = self.geometry.mm_per_tick();
        let mean_ticks = (delta_left as f32 + delta_right as f32) / 2.0;

        let delta_forward = mean_ticks * mm_per_tick;
        let delta_heading =
            (delta_right as f32 - delta_left as f32) * mm_per_tick / self.geometry.wheel_base_mm;

        self.pose.x_mm += delta_forward * self.pose.heading_rad.cos();
        self.pose.y_mm += delta_forward * self.pose.heading_rad.sin();
        self.pose.heading_rad += delta_heading;

        self.pose
    }

    /// Current pose
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Re-initialise to the given pose
    pub fn reset(&mut self, pose: Pose) {
        self.pose = pose;
    }
}

/// Wrap an angle to [-pi, pi]
pub fn wrap_angle(mut angle: f32) -> f32 {
    while angle > PI {
        angle -= TAU;
    }
    while angle < -PI {
        angle += TAU;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> DriveGeometry {
        DriveGeometry {
            wheel_radius_mm: 17.475,
            wheel_base_mm: 88.96,
            ticks_per_rev: 358.3,
        }
    }

    #[test]
    fn test_equal_deltas_keep_heading() {
        let mut reckoner = DeadReckoner::new(geometry(), Pose::default());

        let pose = reckoner.apply(200, 200);

        assert_eq!(pose.heading_rad, 0.0);
        assert!(pose.x_mm > 0.0);
        assert!(pose.y_mm.abs() < 1e-6);
    }

    #[test]
    fn test_opposite_deltas_keep_position() {
        let mut reckoner = DeadReckoner::new(geometry(), Pose::default());

        let pose = reckoner.apply(-150, 150);

        assert_eq!(pose.x_mm, 0.0);
        assert_eq!(pose.y_mm, 0.0);
        assert!(pose.heading_rad > 0.0);
    }

    #[test]
    fn test_full_revolution_travels_circumference() {
        let geo = geometry();
        let mut reckoner = DeadReckoner::new(geo, Pose::default());

        let ticks = geo.ticks_per_rev as i32;
        let pose = reckoner.apply(ticks, ticks);

        let circumference = TAU * geo.wheel_radius_mm;
        assert!((pose.x_mm - circumference).abs() < circumference * 0.01);
    }

    #[test]
    fn test_heading_is_not_wrapped() {
        let geo = geometry();
        let mut reckoner = DeadReckoner::new(geo, Pose::default());

        // Spin in place well past pi
        for _ in 0..50 {
            reckoner.apply(-100, 100);
        }

        assert!(reckoner.pose().heading_rad > PI);
        let wrapped = wrap_angle(reckoner.pose().heading_rad);
        assert!((-PI..=PI).contains(&wrapped));
    }

    #[test]
    fn test_reset() {
        let mut reckoner = DeadReckoner::new(geometry(), Pose::default());
        reckoner.apply(500, 300);

        reckoner.reset(Pose::new(1.0, 2.0, 0.5));
        assert_eq!(reckoner.pose(), Pose::new(1.0, 2.0, 0.5));
    }
}
