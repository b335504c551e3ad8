//! Spatial motion vectors
//!
//! A [`Twist`] is the velocity of a body frame relative to a base frame and a
//! [`SpatialAcceleration`] is its time derivative. Both are six-vectors
//! (angular on top of linear) expressed in a third frame. The linear part is
//! the velocity (or acceleration) of the body-fixed point which momentarily
//! coincides with the origin of the expression frame, so changing the
//! expression frame applies the adjoint transform:
//!
//! ```text
//! w_B = R w_A
//! v_B = R v_A + p x w_B
//! ```
//!
//! where `(R, p)` is the transform from frame A to frame B.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::Serialize;

use super::{check_frames_match, FrameGraph, FrameId, FrameVector};
use util::maths::clamp_magnitude;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Velocity of `body_frame` relative to `base_frame`, expressed in
/// `expressed_in`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Twist {
    pub body_frame: FrameId,
    pub base_frame: FrameId,
    pub expressed_in: FrameId,
    pub angular: Vector3<f64>,
    pub linear: Vector3<f64>,
}

/// Acceleration of `body_frame` relative to `base_frame`, expressed in
/// `expressed_in`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpatialAcceleration {
    pub body_frame: FrameId,
    pub base_frame: FrameId,
    pub expressed_in: FrameId,
    pub angular: Vector3<f64>,
    pub linear: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Twist {
    pub fn new(
        body_frame: FrameId,
        base_frame: FrameId,
        expressed_in: FrameId,
        angular: Vector3<f64>,
        linear: Vector3<f64>,
    ) -> Self {
        Self {
            body_frame,
            base_frame,
            expressed_in,
            angular,
            linear,
        }
    }

    pub fn zero(body_frame: FrameId, base_frame: FrameId, expressed_in: FrameId) -> Self {
        Self::new(
            body_frame,
            base_frame,
            expressed_in,
            Vector3::zeros(),
            Vector3::zeros(),
        )
    }

    pub fn angular_part(&self) -> FrameVector {
        FrameVector::new(self.expressed_in, self.angular)
    }

    pub fn linear_part(&self) -> FrameVector {
        FrameVector::new(self.expressed_in, self.linear)
    }

    /// Express the twist in another frame.
    pub fn change_frame(&mut self, frames: &FrameGraph, to: FrameId) {
        if self.expressed_in == to {
            return;
        }

        let (angular, linear) = adjoint(frames, self.expressed_in, to, &self.angular, &self.linear);
        self.angular = angular;
        self.linear = linear;
        self.expressed_in = to;
    }

    pub fn changed_to(&self, frames: &FrameGraph, to: FrameId) -> Self {
        let mut t = *self;
        t.change_frame(frames, to);
        t
    }

    /// Relabel the body frame as a frame rigidly attached to it, with no
    /// relative motion between the two.
    pub fn change_body_frame_no_relative_twist(&mut self, new_body_frame: FrameId) {
        self.body_frame = new_body_frame;
    }
}

impl SpatialAcceleration {
    pub fn new(
        body_frame: FrameId,
        base_frame: FrameId,
        expressed_in: FrameId,
        angular: Vector3<f64>,
        linear: Vector3<f64>,
    ) -> Self {
        Self {
            body_frame,
            base_frame,
            expressed_in,
            angular,
            linear,
        }
    }

    pub fn zero(body_frame: FrameId, base_frame: FrameId, expressed_in: FrameId) -> Self {
        Self::new(
            body_frame,
            base_frame,
            expressed_in,
            Vector3::zeros(),
            Vector3::zeros(),
        )
    }

    /// Build a spatial acceleration from the acceleration of the body's origin.
    ///
    /// `twist` must describe the same body, base and expression frames. The
    /// linear part of a spatial acceleration is not the acceleration of the
    /// origin, the two differ by `w x v`.
    pub fn from_origin_acceleration(
        twist: &Twist,
        angular_acceleration: &Vector3<f64>,
        origin_acceleration: &Vector3<f64>,
    ) -> Self {
        let linear = origin_acceleration - twist.angular.cross(&twist.linear);
        Self::new(
            twist.body_frame,
            twist.base_frame,
            twist.expressed_in,
            *angular_acceleration,
            linear,
        )
    }

    pub fn set_to_zero(&mut self) {
        self.angular = Vector3::zeros();
        self.linear = Vector3::zeros();
    }

    pub fn angular_part(&self) -> FrameVector {
        FrameVector::new(self.expressed_in, self.angular)
    }

    pub fn linear_part(&self) -> FrameVector {
        FrameVector::new(self.expressed_in, self.linear)
    }

    /// Set both parts from frame vectors expressed in `expressed_in`.
    pub fn set(&mut self, angular: &FrameVector, linear: &FrameVector) {
        check_frames_match(self.expressed_in, angular.frame());
        check_frames_match(self.expressed_in, linear.frame());
        self.angular = *angular.vector();
        self.linear = *linear.vector();
    }

    pub fn limit_linear_magnitude(&mut self, max_magnitude: f64) {
        self.linear = clamp_magnitude(&self.linear, max_magnitude);
    }

    pub fn limit_angular_magnitude(&mut self, max_magnitude: f64) {
        self.angular = clamp_magnitude(&self.angular, max_magnitude);
    }

    pub fn change_frame(&mut self, frames: &FrameGraph, to: FrameId) {
        if self.expressed_in == to {
            return;
        }

        let (angular, linear) = adjoint(frames, self.expressed_in, to, &self.angular, &self.linear);
        self.angular = angular;
        self.linear = linear;
        self.expressed_in = to;
    }

    pub fn changed_to(&self, frames: &FrameGraph, to: FrameId) -> Self {
        let mut a = *self;
        a.change_frame(frames, to);
        a
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn adjoint(
    frames: &FrameGraph,
    from: FrameId,
    to: FrameId,
    angular: &Vector3<f64>,
    linear: &Vector3<f64>,
) -> (Vector3<f64>, Vector3<f64>) {
    let transform = frames.transform_between(from, to);
    let angular_to = transform.rotation * angular;
    let linear_to =
        transform.rotation * linear + transform.translation.vector.cross(&angular_to);

    (angular_to, linear_to)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Isometry3, Translation3, UnitQuaternion};

    #[test]
    fn test_twist_change_frame() {
        let mut graph = FrameGraph::new();
        let world = graph.world();
        let body = graph.add_frame(
            "body",
            world,
            Isometry3::from_parts(
                Translation3::new(1.0, 0.0, 0.0),
                UnitQuaternion::identity(),
            ),
        );

        // Body spinning about its own z axis with no velocity at its origin
        let twist = Twist::new(body, world, body, Vector3::z(), Vector3::zeros());

        // The body-fixed point at the world origin is one metre from the
        // spin axis, so it moves at 1 m/s in -y
        let in_world = twist.changed_to(&graph, world);
        assert_abs_diff_eq!(in_world.angular, Vector3::z(), epsilon = 1e-12);
        assert_abs_diff_eq!(in_world.linear, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-12);

        // And back
        let back = in_world.changed_to(&graph, body);
        assert_abs_diff_eq!(back.linear, Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_limit_magnitudes() {
        let world = FrameGraph::new().world();
        let mut acc = SpatialAcceleration::new(
            world,
            world,
            world,
            Vector3::new(0.0, 30.0, -40.0),
            Vector3::new(2.0, 0.0, 0.0),
        );

        acc.limit_angular_magnitude(5.0);
        acc.limit_linear_magnitude(5.0);

        assert_abs_diff_eq!(acc.angular, Vector3::new(0.0, 3.0, -4.0), epsilon = 1e-10);
        assert_eq!(acc.linear, Vector3::new(2.0, 0.0, 0.0));
    }
}
