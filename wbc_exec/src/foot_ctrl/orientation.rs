//! Orientation interpolation trajectory

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{UnitQuaternion, Vector3};
use serde::Serialize;

use util::maths::{smooth_step, smooth_step_accel, smooth_step_rate};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Spherical interpolation between two orientations with a cubic time
/// scaling, so the angular velocity is zero at both ends.
#[derive(Debug, Clone, Serialize)]
pub struct OrientationInterpolationTrajectory {
    initial: UnitQuaternion<f64>,

    /// Rotation vector from the initial to the final orientation
    rotation: Vector3<f64>,

    /// Units: seconds
    duration_s: f64,
}

/// Orientation and its derivatives along a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrientationTrajectoryPoint {
    pub orientation: UnitQuaternion<f64>,
    pub angular_velocity: Vector3<f64>,
    pub angular_acceleration: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl OrientationInterpolationTrajectory {
    pub fn new(initial: UnitQuaternion<f64>, target: UnitQuaternion<f64>, duration_s: f64) -> Self {
        Self {
            initial,
            rotation: (target * initial.inverse()).scaled_axis(),
            duration_s,
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration_s
    }

    /// Evaluate the trajectory. Angular velocity and acceleration are
    /// expressed in the same frame as the orientations.
    pub fn compute(&self, time_s: f64) -> OrientationTrajectoryPoint {
        if self.duration_s <= 0.0 {
            return OrientationTrajectoryPoint {
                orientation: UnitQuaternion::from_scaled_axis(self.rotation) * self.initial,
                angular_velocity: Vector3::zeros(),
                angular_acceleration: Vector3::zeros(),
            };
        }

        let s = time_s / self.duration_s;
        let rate = smooth_step_rate(s) / self.duration_s;
        let accel = smooth_step_accel(s) / (self.duration_s * self.duration_s);

        OrientationTrajectoryPoint {
            orientation: UnitQuaternion::from_scaled_axis(self.rotation * smooth_step(s)) * self.initial,
            angular_velocity: self.rotation * rate,
            angular_acceleration: self.rotation * accel,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_orientation_interpolation() {
        let initial = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.2);
        let target = UnitQuaternion::from_euler_angles(0.1, 0.0, -0.4);
        let traj = OrientationInterpolationTrajectory::new(initial, target, 0.5);

        let start = traj.compute(0.0);
        assert_abs_diff_eq!(start.orientation, initial, epsilon = 1e-12);
        assert_abs_diff_eq!(start.angular_velocity, Vector3::zeros(), epsilon = 1e-12);

        let end = traj.compute(0.5);
        assert_abs_diff_eq!(end.orientation, target, epsilon = 1e-12);
        assert_abs_diff_eq!(end.angular_velocity, Vector3::zeros(), epsilon = 1e-12);

        // Halfway in time is halfway in angle
        let mid = traj.compute(0.25);
        assert_abs_diff_eq!(
            mid.orientation.angle_to(&initial),
            0.5 * initial.angle_to(&target),
            epsilon = 1e-7
        );

        // Held at the target afterwards
        assert_abs_diff_eq!(traj.compute(2.0).orientation, target, epsilon = 1e-12);
    }
}
