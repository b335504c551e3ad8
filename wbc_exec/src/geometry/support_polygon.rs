//! Support polygon of a quadruped

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Point2, Point3};
use serde::Serialize;

use super::ConvexPolygon2d;
use crate::model::{QuadrantMap, RobotQuadrant};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Footstep positions of a quadruped, in world, for the legs which are on the
/// ground.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QuadrupedSupportPolygon {
    footsteps: QuadrantMap<Option<Point3<f64>>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl QuadrupedSupportPolygon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_footstep(&mut self, quadrant: RobotQuadrant, position: Point3<f64>) {
        self.footsteps[quadrant] = Some(position);
    }

    pub fn remove_footstep(&mut self, quadrant: RobotQuadrant) {
        self.footsteps[quadrant] = None;
    }

    pub fn footstep(&self, quadrant: RobotQuadrant) -> Option<&Point3<f64>> {
        self.footsteps[quadrant].as_ref()
    }

    pub fn num_footsteps(&self) -> usize {
        self.footsteps.values().filter(|f| f.is_some()).count()
    }

    /// Horizontal projection of the footsteps.
    pub fn polygon(&self) -> ConvexPolygon2d {
        let points: Vec<Point2<f64>> = self
            .footsteps
            .values()
            .filter_map(|f| f.map(|p| Point2::new(p.x, p.y)))
            .collect();

        ConvexPolygon2d::from_points(&points)
    }

    /// Mean of the footstep positions, `None` if no foot is on the ground.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        let n = self.num_footsteps();
        if n == 0 {
            return None;
        }

        let sum = self
            .footsteps
            .values()
            .filter_map(|f| f.map(|p| p.coords))
            .sum::<nalgebra::Vector3<f64>>();

        Some(Point3::from(sum / n as f64))
    }

    /// Heading of the robot given by its footsteps: the direction from the
    /// midpoint of the hind feet to the midpoint of the front feet.
    ///
    /// A missing foot is replaced by the other foot at the same end. `None`
    /// if either end has no foot on the ground.
    pub fn nominal_yaw(&self) -> Option<f64> {
        let front = self.end_midpoint(RobotQuadrant::FrontLeft, RobotQuadrant::FrontRight)?;
        let hind = self.end_midpoint(RobotQuadrant::HindLeft, RobotQuadrant::HindRight)?;

        let d = front - hind;
        Some(d.y.atan2(d.x))
    }

    fn end_midpoint(&self, left: RobotQuadrant, right: RobotQuadrant) -> Option<Point3<f64>> {
        match (self.footsteps[left], self.footsteps[right]) {
            (Some(l), Some(r)) => Some(nalgebra::center(&l, &r)),
            (Some(p), None) | (None, Some(p)) => Some(p),
            (None, None) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
