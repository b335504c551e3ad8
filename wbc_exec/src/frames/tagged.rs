//! Frame-tagged geometric quantities
//!
//! Each quantity carries the id of the frame it is expressed in. Arithmetic
//! between two tagged quantities checks that their frames match, and a
//! mismatch raises an unrecoverable error since it can only come from a
//! wiring bug.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::Serialize;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use super::{check_frames_match, FrameGraph, FrameId};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A free vector expressed in a frame.
///
/// Changing frame only rotates a vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameVector {
    frame: FrameId,
    vector: Vector3<f64>,
}

/// A point expressed in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FramePoint {
    frame: FrameId,
    point: Point3<f64>,
}

/// An orientation expressed in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameOrientation {
    frame: FrameId,
    orientation: UnitQuaternion<f64>,
}

/// A position and orientation expressed in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FramePose {
    frame: FrameId,
    isometry: Isometry3<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FrameVector {
    pub fn new(frame: FrameId, vector: Vector3<f64>) -> Self {
        Self { frame, vector }
    }

    pub fn zero(frame: FrameId) -> Self {
        Self::new(frame, Vector3::zeros())
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    pub fn vector(&self) -> &Vector3<f64> {
        &self.vector
    }

    pub fn x(&self) -> f64 {
        self.vector.x
    }

    pub fn y(&self) -> f64 {
        self.vector.y
    }

    pub fn z(&self) -> f64 {
        self.vector.z
    }

    /// Overwrite the value, keeping the frame.
    pub fn set_vector(&mut self, vector: Vector3<f64>) {
        self.vector = vector;
    }

    /// Overwrite the value and frame from another vector.
    pub fn set(&mut self, other: &FrameVector) {
        *self = *other;
    }

    pub fn set_to_zero(&mut self, frame: FrameId) {
        *self = Self::zero(frame);
    }

    pub fn change_frame(&mut self, frames: &FrameGraph, to: FrameId) {
        if self.frame != to {
            self.vector = frames.transform_between(self.frame, to).rotation * self.vector;
            self.frame = to;
        }
    }

    /// Copy of this vector expressed in another frame.
    pub fn changed_to(&self, frames: &FrameGraph, to: FrameId) -> Self {
        let mut v = *self;
        v.change_frame(frames, to);
        v
    }

    pub fn dot(&self, other: &FrameVector) -> f64 {
        check_frames_match(self.frame, other.frame);
        self.vector.dot(&other.vector)
    }

    pub fn cross(&self, other: &FrameVector) -> FrameVector {
        check_frames_match(self.frame, other.frame);
        Self::new(self.frame, self.vector.cross(&other.vector))
    }

    /// Element-wise product, used to apply per-axis gains.
    pub fn component_mul(&self, gains: &Vector3<f64>) -> FrameVector {
        Self::new(self.frame, self.vector.component_mul(gains))
    }

    pub fn scale(&self, factor: f64) -> FrameVector {
        Self::new(self.frame, self.vector * factor)
    }

    pub fn norm(&self) -> f64 {
        self.vector.norm()
    }
}

impl Add for FrameVector {
    type Output = FrameVector;

    fn add(self, rhs: FrameVector) -> FrameVector {
        check_frames_match(self.frame, rhs.frame);
        FrameVector::new(self.frame, self.vector + rhs.vector)
    }
}

impl AddAssign for FrameVector {
    fn add_assign(&mut self, rhs: FrameVector) {
        check_frames_match(self.frame, rhs.frame);
        self.vector += rhs.vector;
    }
}

impl Sub for FrameVector {
    type Output = FrameVector;

    fn sub(self, rhs: FrameVector) -> FrameVector {
        check_frames_match(self.frame, rhs.frame);
        FrameVector::new(self.frame, self.vector - rhs.vector)
    }
}

impl SubAssign for FrameVector {
    fn sub_assign(&mut self, rhs: FrameVector) {
        check_frames_match(self.frame, rhs.frame);
        self.vector -= rhs.vector;
    }
}

impl Neg for FrameVector {
    type Output = FrameVector;

    fn neg(self) -> FrameVector {
        FrameVector::new(self.frame, -self.vector)
    }
}

impl FramePoint {
    pub fn new(frame: FrameId, point: Point3<f64>) -> Self {
        Self { frame, point }
    }

    pub fn from_xyz(frame: FrameId, x: f64, y: f64, z: f64) -> Self {
        Self::new(frame, Point3::new(x, y, z))
    }

    /// The origin of `frame`.
    pub fn origin(frame: FrameId) -> Self {
        Self::new(frame, Point3::origin())
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    pub fn point(&self) -> &Point3<f64> {
        &self.point
    }

    pub fn coords(&self) -> &Vector3<f64> {
        &self.point.coords
    }

    pub fn x(&self) -> f64 {
        self.point.x
    }

    pub fn y(&self) -> f64 {
        self.point.y
    }

    pub fn z(&self) -> f64 {
        self.point.z
    }

    pub fn set_point(&mut self, point: Point3<f64>) {
        self.point = point;
    }

    pub fn set_z(&mut self, z: f64) {
        self.point.z = z;
    }

    pub fn change_frame(&mut self, frames: &FrameGraph, to: FrameId) {
        if self.frame != to {
            self.point = frames.transform_between(self.frame, to) * self.point;
            self.frame = to;
        }
    }

    pub fn changed_to(&self, frames: &FrameGraph, to: FrameId) -> Self {
        let mut p = *self;
        p.change_frame(frames, to);
        p
    }

    /// Vector from the origin of the frame to this point.
    pub fn to_vector(&self) -> FrameVector {
        FrameVector::new(self.frame, self.point.coords)
    }

    pub fn distance(&self, other: &FramePoint) -> f64 {
        check_frames_match(self.frame, other.frame);
        (self.point - other.point).norm()
    }
}

impl Sub for FramePoint {
    type Output = FrameVector;

    fn sub(self, rhs: FramePoint) -> FrameVector {
        check_frames_match(self.frame, rhs.frame);
        FrameVector::new(self.frame, self.point - rhs.point)
    }
}

impl Add<FrameVector> for FramePoint {
    type Output = FramePoint;

    fn add(self, rhs: FrameVector) -> FramePoint {
        check_frames_match(self.frame, rhs.frame());
        FramePoint::new(self.frame, self.point + *rhs.vector())
    }
}

impl AddAssign<FrameVector> for FramePoint {
    fn add_assign(&mut self, rhs: FrameVector) {
        check_frames_match(self.frame, rhs.frame());
        self.point += *rhs.vector();
    }
}

impl FrameOrientation {
    pub fn new(frame: FrameId, orientation: UnitQuaternion<f64>) -> Self {
        Self { frame, orientation }
    }

    pub fn identity(frame: FrameId) -> Self {
        Self::new(frame, UnitQuaternion::identity())
    }

    pub fn from_yaw_pitch_roll(frame: FrameId, yaw: f64, pitch: f64, roll: f64) -> Self {
        Self::new(frame, UnitQuaternion::from_euler_angles(roll, pitch, yaw))
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    pub fn orientation(&self) -> &UnitQuaternion<f64> {
        &self.orientation
    }

    pub fn set_orientation(&mut self, orientation: UnitQuaternion<f64>) {
        self.orientation = orientation;
    }

    pub fn yaw(&self) -> f64 {
        self.orientation.euler_angles().2
    }

    pub fn change_frame(&mut self, frames: &FrameGraph, to: FrameId) {
        if self.frame != to {
            self.orientation = frames.transform_between(self.frame, to).rotation * self.orientation;
            self.frame = to;
        }
    }

    pub fn changed_to(&self, frames: &FrameGraph, to: FrameId) -> Self {
        let mut o = *self;
        o.change_frame(frames, to);
        o
    }

    /// Rotation vector (axis times angle) taking `other` onto `self`, both
    /// expressed in the same frame: `self = exp(rv) * other`.
    pub fn difference(&self, other: &FrameOrientation) -> FrameVector {
        check_frames_match(self.frame, other.frame);
        FrameVector::new(
            self.frame,
            (self.orientation * other.orientation.inverse()).scaled_axis(),
        )
    }
}

impl FramePose {
    pub fn new(frame: FrameId, isometry: Isometry3<f64>) -> Self {
        Self { frame, isometry }
    }

    /// Build a pose from a position and orientation which must be expressed
    /// in the same frame.
    pub fn from_parts(position: &FramePoint, orientation: &FrameOrientation) -> Self {
        check_frames_match(position.frame(), orientation.frame());
        Self::new(
            position.frame(),
            Isometry3::from_parts(
                Translation3::from(position.point().coords),
                *orientation.orientation(),
            ),
        )
    }

    /// The pose of `frame` itself, i.e. the identity pose in that frame.
    pub fn origin(frame: FrameId) -> Self {
        Self::new(frame, Isometry3::identity())
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    pub fn isometry(&self) -> &Isometry3<f64> {
        &self.isometry
    }

    pub fn position(&self) -> FramePoint {
        FramePoint::new(self.frame, Point3::from(self.isometry.translation.vector))
    }

    pub fn orientation(&self) -> FrameOrientation {
        FrameOrientation::new(self.frame, self.isometry.rotation)
    }

    pub fn change_frame(&mut self, frames: &FrameGraph, to: FrameId) {
        if self.frame != to {
            self.isometry = frames.transform_between(self.frame, to) * self.isometry;
            self.frame = to;
        }
    }

    pub fn changed_to(&self, frames: &FrameGraph, to: FrameId) -> Self {
        let mut p = *self;
        p.change_frame(frames, to);
        p
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn rotated_graph() -> (FrameGraph, FrameId) {
        let mut graph = FrameGraph::new();
        let world = graph.world();
        let body = graph.add_frame(
            "body",
            world,
            Isometry3::from_parts(
                Translation3::new(0.0, 0.0, 1.0),
                UnitQuaternion::from_euler_angles(0.0, 0.0, FRAC_PI_2),
            ),
        );
        (graph, body)
    }

    #[test]
    fn test_change_frame() {
        let (graph, body) = rotated_graph();
        let world = graph.world();

        // Vectors are only rotated
        let v = FrameVector::new(body, Vector3::x()).changed_to(&graph, world);
        assert_eq!(v.frame(), world);
        assert_abs_diff_eq!(*v.vector(), Vector3::y(), epsilon = 1e-12);

        // Points are also translated
        let p = FramePoint::from_xyz(body, 1.0, 0.0, 0.0).changed_to(&graph, world);
        assert_abs_diff_eq!(*p.coords(), Vector3::new(0.0, 1.0, 1.0), epsilon = 1e-12);

        let o = FrameOrientation::identity(body).changed_to(&graph, world);
        assert_abs_diff_eq!(o.yaw(), FRAC_PI_2, epsilon = 1e-12);

        let pose = FramePose::origin(body).changed_to(&graph, world);
        assert_abs_diff_eq!(pose.position().z(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_orientation_difference() {
        let world = FrameGraph::new().world();
        let a = FrameOrientation::from_yaw_pitch_roll(world, 0.3, 0.0, 0.0);
        let b = FrameOrientation::from_yaw_pitch_roll(world, 0.1, 0.0, 0.0);

        let d = a.difference(&b);
        assert_abs_diff_eq!(*d.vector(), Vector3::new(0.0, 0.0, 0.2), epsilon = 1e-12);
    }

    #[test]
    #[should_panic]
    fn test_mismatched_frames() {
        let (graph, body) = rotated_graph();
        let _ = FrameVector::zero(body) + FrameVector::zero(graph.world());
    }
}
