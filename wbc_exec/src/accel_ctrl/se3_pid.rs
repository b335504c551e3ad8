//! SE(3) PID controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// Internal
use crate::frames::{FrameGraph, FrameId, FramePose, FrameVector, SpatialAcceleration, Twist};
use crate::pid::{PidController3, PidGains};
use util::maths::clamp_magnitude;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gains of the position and orientation halves of an [`Se3PidController`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Se3PidGains {
    pub position: PidGains,
    pub orientation: PidGains,
}

/// Six degree of freedom PID controller acting in a body-fixed frame.
///
/// Errors are computed in the controlled frame, so the desired position
/// expressed in that frame is the position error and the rotation vector of
/// the desired orientation is the orientation error.
#[derive(Debug, Clone)]
pub struct Se3PidController {
    frame: FrameId,

    /// Units: seconds
    dt_s: f64,

    position_pid: PidController3,
    orientation_pid: PidController3,

    position_limiter: FeedbackLimiter,
    orientation_limiter: FeedbackLimiter,

    /// Position error of the last cycle
    position_error: FrameVector,
}

/// Bounds the magnitude of a feedback acceleration and, per axis, how fast
/// it may change between cycles.
#[derive(Debug, Clone)]
struct FeedbackLimiter {
    /// Units: meters/second^2 or radians/second^2
    max_acceleration: f64,

    /// Units: meters/second^3 or radians/second^3
    max_jerk: f64,

    /// Output of the last cycle, `None` after a reset
    previous: Option<Vector3<f64>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Se3PidController {
    pub fn new(frame: FrameId, dt_s: f64) -> Self {
        Self {
            frame,
            dt_s,
            position_pid: PidController3::new(PidGains::zero()),
            orientation_pid: PidController3::new(PidGains::zero()),
            position_limiter: FeedbackLimiter::new(),
            orientation_limiter: FeedbackLimiter::new(),
            position_error: FrameVector::zero(frame),
        }
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    pub fn reset(&mut self) {
        self.position_pid.reset();
        self.orientation_pid.reset();
        self.position_limiter.reset();
        self.orientation_limiter.reset();
    }

    /// Limit the position feedback (not the feedforward) to
    /// `max_acceleration` in magnitude and `max_jerk` per axis. Infinite
    /// values disable the corresponding limit.
    pub fn set_position_max_acceleration_and_jerk(&mut self, max_acceleration: f64, max_jerk: f64) {
        self.position_limiter.set(max_acceleration, max_jerk);
    }

    /// Orientation counterpart of `set_position_max_acceleration_and_jerk`.
    pub fn set_orientation_max_acceleration_and_jerk(&mut self, max_acceleration: f64, max_jerk: f64) {
        self.orientation_limiter.set(max_acceleration, max_jerk);
    }

    pub fn position_error(&self) -> &FrameVector {
        &self.position_error
    }

    pub fn set_gains(&mut self, gains: &Se3PidGains) {
        self.position_pid.set_gains(gains.position.clone());
        self.orientation_pid.set_gains(gains.orientation.clone());
    }

    pub fn set_position_proportional_gains(&mut self, k_p: Vector3<f64>) {
        self.position_pid.set_proportional_gains(k_p);
    }

    pub fn set_position_derivative_gains(&mut self, k_d: Vector3<f64>) {
        self.position_pid.set_derivative_gains(k_d);
    }

    pub fn set_position_integral_gains(&mut self, k_i: Vector3<f64>, max_integral_error: f64) {
        self.position_pid.set_integral_gains(k_i, max_integral_error);
    }

    pub fn set_orientation_proportional_gains(&mut self, k_p: Vector3<f64>) {
        self.orientation_pid.set_proportional_gains(k_p);
    }

    pub fn set_orientation_derivative_gains(&mut self, k_d: Vector3<f64>) {
        self.orientation_pid.set_derivative_gains(k_d);
    }

    pub fn set_orientation_integral_gains(&mut self, k_i: Vector3<f64>, max_integral_error: f64) {
        self.orientation_pid.set_integral_gains(k_i, max_integral_error);
    }

    /// Compute the spatial acceleration of the controlled frame.
    ///
    /// The output is expressed in the controlled frame and keeps the body and
    /// base frames of the feedforward.
    pub fn compute(
        &mut self,
        frames: &FrameGraph,
        desired_pose: &FramePose,
        desired_twist: &Twist,
        feedforward: &SpatialAcceleration,
        current_twist: &Twist,
    ) -> SpatialAcceleration {
        let pose = desired_pose.changed_to(frames, self.frame);
        let desired_twist = desired_twist.changed_to(frames, self.frame);
        let current_twist = current_twist.changed_to(frames, self.frame);
        let feedforward = feedforward.changed_to(frames, self.frame);

        self.position_error = FrameVector::new(self.frame, pose.isometry().translation.vector);
        let orientation_error = FrameVector::new(self.frame, pose.isometry().rotation.scaled_axis());

        let linear_velocity_error = desired_twist.linear_part() - current_twist.linear_part();
        let angular_velocity_error = desired_twist.angular_part() - current_twist.angular_part();

        let linear_feedback = self.position_pid.compute_in_frame(
            &self.position_error,
            &linear_velocity_error,
            self.dt_s,
        );
        let angular_feedback = self.orientation_pid.compute_in_frame(
            &orientation_error,
            &angular_velocity_error,
            self.dt_s,
        );

        let linear = FrameVector::new(
            self.frame,
            self.position_limiter.apply(linear_feedback.vector(), self.dt_s),
        ) + feedforward.linear_part();
        let angular = FrameVector::new(
            self.frame,
            self.orientation_limiter.apply(angular_feedback.vector(), self.dt_s),
        ) + feedforward.angular_part();

        let mut output = SpatialAcceleration::zero(feedforward.body_frame, feedforward.base_frame, self.frame);
        output.set(&angular, &linear);
        output
    }
}

impl FeedbackLimiter {
    fn new() -> Self {
        Self {
            max_acceleration: std::f64::INFINITY,
            max_jerk: std::f64::INFINITY,
            previous: None,
        }
    }

    fn set(&mut self, max_acceleration: f64, max_jerk: f64) {
        if max_acceleration.is_nan() || max_acceleration < 0.0 || max_jerk.is_nan() || max_jerk < 0.0 {
            util::raise_error!(
                "Invalid feedback limits: max acceleration {}, max jerk {}",
                max_acceleration,
                max_jerk
            );
        }
        self.max_acceleration = max_acceleration;
        self.max_jerk = max_jerk;
    }

    fn reset(&mut self) {
        self.previous = None;
    }

    /// The first cycle after a reset is only bounded in magnitude.
    fn apply(&mut self, feedback: &Vector3<f64>, dt_s: f64) -> Vector3<f64> {
        let mut limited = clamp_magnitude(feedback, self.max_acceleration);

        if let Some(previous) = self.previous {
            let max_step = self.max_jerk * dt_s;
            limited = previous + (limited - previous).map(|d| d.clamp(-max_step, max_step));
        }

        self.previous = Some(limited);
        limited
    }
}
