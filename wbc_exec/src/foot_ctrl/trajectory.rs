//! Swing foot position trajectories
//!
//! All generators work in a single frame (usually world) and are evaluated at
//! a time measured from their own start.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Matrix4, Matrix4x3, Point3, RowVector3, Vector3};
use serde::Serialize;
use std::fmt::Debug;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Shortest duration a spline is built over.
///
/// Units: seconds
const MIN_DURATION_S: f64 = 1e-3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Position, velocity and acceleration of a point along a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionTrajectoryPoint {
    pub position: Point3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
}

/// Swing trajectory passing through two waypoints lifted to a given height.
///
/// The four knots (start, the two waypoints at one and two thirds of the
/// path, end) are evenly spaced in time and joined by a clamped cubic spline
/// whose end derivatives are the initial and final velocities.
#[derive(Debug, Clone, Serialize)]
pub struct TwoWaypointPositionTrajectory {
    /// Units: seconds
    duration_s: f64,

    /// Knot positions, one per row
    knots: Matrix4x3<f64>,

    /// Second derivatives of the spline at the knots, one per row
    moments: Matrix4x3<f64>,
}

/// Continues from the final position at a constant velocity, so that a late
/// touchdown happens softly rather than with the foot held in the air.
#[derive(Debug, Clone, Serialize)]
pub struct SoftTouchdownPositionTrajectory {
    position: Point3<f64>,
    velocity: Vector3<f64>,
}

/// A sequence of generators, each one taking over when the previous one is
/// done.
#[derive(Debug)]
pub struct PositionTrajectoryChain {
    /// Time of the owning state at which the chain starts
    ///
    /// Units: seconds
    start_time_s: f64,

    generators: Vec<Box<dyn PositionTrajectoryGenerator>>,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A position trajectory.
pub trait PositionTrajectoryGenerator: Debug {
    /// Time after which the generator is done, infinite if never.
    fn duration(&self) -> f64;

    /// Evaluate the trajectory `time_s` after its start.
    fn compute(&self, time_s: f64) -> PositionTrajectoryPoint;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PositionTrajectoryPoint {
    pub fn new(position: Point3<f64>, velocity: Vector3<f64>) -> Self {
        Self {
            position,
            velocity,
            acceleration: Vector3::zeros(),
        }
    }
}

impl TwoWaypointPositionTrajectory {
    /// Build the trajectory from `initial` (position and velocity) to the
    /// final position and velocity.
    ///
    /// Both waypoints are placed at `waypoint_height_m`, on the straight line
    /// between the start and end points seen from above.
    pub fn new(
        initial: &PositionTrajectoryPoint,
        final_position: &Point3<f64>,
        final_velocity: &Vector3<f64>,
        duration_s: f64,
        waypoint_height_m: f64,
    ) -> Self {
        let duration_s = duration_s.max(MIN_DURATION_S);
        let h = duration_s / 3.0;

        let p0 = initial.position;
        let pf = *final_position;

        let mut w1 = p0 + (pf - p0) / 3.0;
        let mut w2 = p0 + (pf - p0) * (2.0 / 3.0);
        w1.z = waypoint_height_m;
        w2.z = waypoint_height_m;

        let knots = Matrix4x3::from_rows(&[
            RowVector3::from(p0.coords.transpose()),
            RowVector3::from(w1.coords.transpose()),
            RowVector3::from(w2.coords.transpose()),
            RowVector3::from(pf.coords.transpose()),
        ]);

        // Clamped spline moment equations, one column per axis
        #[rustfmt::skip]
        let a = Matrix4::new(
            2.0 * h, h,       0.0,     0.0,
            h,       4.0 * h, h,       0.0,
            0.0,     h,       4.0 * h, h,
            0.0,     0.0,     h,       2.0 * h,
        );

        let slope = |i: usize| (knots.row(i + 1) - knots.row(i)) / h;
        let rhs = Matrix4x3::from_rows(&[
            (slope(0) - initial.velocity.transpose()) * 6.0,
            (slope(1) - slope(0)) * 6.0,
            (slope(2) - slope(1)) * 6.0,
            (final_velocity.transpose() - slope(2)) * 6.0,
        ]);

        // Strictly diagonally dominant so always invertible
        let moments = match a.try_inverse() {
            Some(inv) => inv * rhs,
            None => util::raise_error!("Swing spline matrix is singular for duration {}", duration_s),
        };

        Self {
            duration_s,
            knots,
            moments,
        }
    }

    /// The two lifted waypoints.
    pub fn waypoints(&self) -> [Point3<f64>; 2] {
        [self.knot(1), self.knot(2)]
    }

    fn knot(&self, i: usize) -> Point3<f64> {
        Point3::from(self.knots.row(i).transpose())
    }
}

impl PositionTrajectoryGenerator for TwoWaypointPositionTrajectory {
    fn duration(&self) -> f64 {
        self.duration_s
    }

    /// Times outside the trajectory are saturated to its ends.
    fn compute(&self, time_s: f64) -> PositionTrajectoryPoint {
        let h = self.duration_s / 3.0;
        let t = time_s.clamp(0.0, self.duration_s);
        let i = ((t / h) as usize).min(2);

        // Distances to the segment's knots
        let a = h * (i + 1) as f64 - t;
        let b = t - h * i as f64;

        let y0 = self.knots.row(i).transpose();
        let y1 = self.knots.row(i + 1).transpose();
        let m0 = self.moments.row(i).transpose();
        let m1 = self.moments.row(i + 1).transpose();

        let c0 = y0 / h - m0 * (h / 6.0);
        let c1 = y1 / h - m1 * (h / 6.0);

        let position = m0 * (a * a * a / (6.0 * h)) + m1 * (b * b * b / (6.0 * h)) + c0 * a + c1 * b;
        let velocity = -m0 * (a * a / (2.0 * h)) + m1 * (b * b / (2.0 * h)) - c0 + c1;
        let acceleration = m0 * (a / h) + m1 * (b / h);

        PositionTrajectoryPoint {
            position: Point3::from(position),
            velocity,
            acceleration,
        }
    }
}

impl SoftTouchdownPositionTrajectory {
    pub fn new(position: Point3<f64>, velocity: Vector3<f64>) -> Self {
        Self { position, velocity }
    }
}

impl PositionTrajectoryGenerator for SoftTouchdownPositionTrajectory {
    fn duration(&self) -> f64 {
        std::f64::INFINITY
    }

    fn compute(&self, time_s: f64) -> PositionTrajectoryPoint {
        PositionTrajectoryPoint::new(self.position + self.velocity * time_s.max(0.0), self.velocity)
    }
}

impl PositionTrajectoryChain {
    /// Start a chain with its first generator.
    pub fn new(start_time_s: f64, first: Box<dyn PositionTrajectoryGenerator>) -> Self {
        Self {
            start_time_s,
            generators: vec![first],
        }
    }

    /// Append a generator which takes over once the previous ones are done.
    pub fn then(mut self, next: Box<dyn PositionTrajectoryGenerator>) -> Self {
        self.generators.push(next);
        self
    }

    pub fn start_time(&self) -> f64 {
        self.start_time_s
    }

    /// Index of the generator active at `time_s` and the time local to it.
    fn active(&self, time_s: f64) -> (usize, f64) {
        let mut local = time_s - self.start_time_s;
        let last = self.generators.len() - 1;

        for (i, gen) in self.generators.iter().enumerate() {
            if i == last || local < gen.duration() {
                return (i, local);
            }
            local -= gen.duration();
        }

        (last, local)
    }

    /// Index of the generator active at the given state time.
    pub fn active_index(&self, time_s: f64) -> usize {
        self.active(time_s).0
    }
}

impl PositionTrajectoryGenerator for PositionTrajectoryChain {
    fn duration(&self) -> f64 {
        self.generators.iter().map(|g| g.duration()).sum()
    }

    /// `time_s` is the time of the owning state, not of the chain.
    fn compute(&self, time_s: f64) -> PositionTrajectoryPoint {
        let (i, local) = self.active(time_s);
        self.generators[i].compute(local)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn swing() -> TwoWaypointPositionTrajectory {
        TwoWaypointPositionTrajectory::new(
            &PositionTrajectoryPoint::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(0.1, 0.0, 0.2)),
            &Point3::new(0.3, 0.0, 0.05),
            &Vector3::new(0.0, 0.0, -0.1),
            0.6,
            0.15,
        )
    }

    #[test]
    fn test_two_waypoint_boundary_conditions() {
        let traj = swing();

        let start = traj.compute(0.0);
        assert_abs_diff_eq!(start.position, Point3::origin(), epsilon = 1e-12);
        assert_abs_diff_eq!(start.velocity, Vector3::new(0.1, 0.0, 0.2), epsilon = 1e-9);

        let end = traj.compute(0.6);
        assert_abs_diff_eq!(end.position, Point3::new(0.3, 0.0, 0.05), epsilon = 1e-12);
        assert_abs_diff_eq!(end.velocity, Vector3::new(0.0, 0.0, -0.1), epsilon = 1e-9);

        // Waypoints lifted to the requested height
        let [w1, w2] = traj.waypoints();
        assert_abs_diff_eq!(w1, Point3::new(0.1, 0.0, 0.15), epsilon = 1e-12);
        assert_abs_diff_eq!(traj.compute(0.2).position, w1, epsilon = 1e-12);
        assert_abs_diff_eq!(traj.compute(0.4).position, w2, epsilon = 1e-12);

        // Saturated outside the swing
        assert_eq!(traj.compute(1.0).position, end.position);
    }

    #[test]
    fn test_two_waypoint_continuity() {
        let traj = swing();

        // Velocity is continuous across the knots
        for t in [0.2, 0.4].iter() {
            let before = traj.compute(t - 1e-7);
            let after = traj.compute(t + 1e-7);
            assert_abs_diff_eq!(before.velocity, after.velocity, epsilon = 1e-5);
        }

        // And matches the finite difference of the position
        let dt = 1e-6;
        let fd = (traj.compute(0.31 + dt).position - traj.compute(0.31 - dt).position) / (2.0 * dt);
        assert_abs_diff_eq!(fd, traj.compute(0.31).velocity, epsilon = 1e-6);
    }

    #[test]
    fn test_chain() {
        let final_position = Point3::new(0.3, 0.0, 0.05);
        let touchdown = Vector3::new(0.0, 0.0, -0.1);

        let chain = PositionTrajectoryChain::new(0.5, Box::new(swing()))
            .then(Box::new(SoftTouchdownPositionTrajectory::new(final_position, touchdown)));

        assert_eq!(chain.duration(), std::f64::INFINITY);
        assert_eq!(chain.active_index(0.5), 0);
        assert_eq!(chain.active_index(1.05), 0);
        assert_eq!(chain.active_index(1.15), 1);

        assert_abs_diff_eq!(chain.compute(0.5).position, Point3::origin(), epsilon = 1e-12);

        // 0.2 s after the end of the swing the foot keeps going down
        let late = chain.compute(1.3);
        assert_abs_diff_eq!(late.position, Point3::new(0.3, 0.0, 0.03), epsilon = 1e-12);
        assert_eq!(late.velocity, touchdown);
    }
}
