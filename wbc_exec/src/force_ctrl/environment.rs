//! # Runtime environment
//!
//! Context shared by every force controller, handed by reference to each
//! lifecycle call.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};

// Internal
use crate::frames::{
    check_frames_match, FrameGraph, FrameId, FrameOrientation, FramePoint, FrameVector,
};
use crate::geometry::QuadrupedSupportPolygon;
use crate::model::{FullRobotModel, QuadrantMap, RobotQuadrant};
use crate::telemetry::{TelemetryError, TelemetrySink};
use util::{params::ParameterRepository, time::ControlClock};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Standard gravity
///
/// Units: meters/second^2
pub const STANDARD_GRAVITY_MPS2: f64 = 9.81;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Source of the operator's commands, polled once per cycle.
///
/// Values may be expressed in any frame, the controllers use them in the
/// support frame.
pub trait ControllerInputProvider {
    fn com_position_input(&self) -> FramePoint;

    fn com_velocity_input(&self) -> FrameVector;

    fn body_orientation_input(&self) -> FrameOrientation;

    fn body_angular_rate_input(&self) -> FrameVector;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Everything a force controller needs apart from its own state.
pub struct RuntimeEnvironment<M, I> {
    pub model: M,
    pub frames: FrameGraph,
    pub reference_frames: QuadrupedReferenceFrames,
    pub input: I,
    pub params: ParameterRepository,
    pub telemetry: Box<dyn TelemetrySink>,
    pub clock: ControlClock,

    /// Units: meters/second^2
    pub gravity_mps2: f64,
}

/// Frames of a quadruped which are not attached to a single body.
#[derive(Debug, Clone, Copy)]
pub struct QuadrupedReferenceFrames {
    /// Frame at the centre of the support polygon, at the mean height of the
    /// lowest front and lowest hind feet and yawed along the nominal heading
    /// of the feet
    support_frame: FrameId,
}

/// Input provider holding constant commands, which can be changed between
/// cycles.
#[derive(Debug, Clone)]
pub struct StaticInputProvider {
    pub com_position: FramePoint,
    pub com_velocity: FrameVector,
    pub body_orientation: FrameOrientation,
    pub body_angular_rate: FrameVector,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<M: FullRobotModel, I: ControllerInputProvider> RuntimeEnvironment<M, I> {
    /// Create the environment.
    ///
    /// `reference_frames` must have been registered in `frames`.
    pub fn new(
        model: M,
        mut frames: FrameGraph,
        reference_frames: QuadrupedReferenceFrames,
        input: I,
        params: ParameterRepository,
        telemetry: Box<dyn TelemetrySink>,
        control_dt_s: f64,
    ) -> Self {
        model.update_frames(&mut frames);

        Self {
            model,
            frames,
            reference_frames,
            input,
            params,
            telemetry,
            clock: ControlClock::new(control_dt_s),
            gravity_mps2: STANDARD_GRAVITY_MPS2,
        }
    }

    /// Units: seconds
    pub fn control_dt(&self) -> f64 {
        self.clock.period_s()
    }

    pub fn world_frame(&self) -> FrameId {
        self.frames.world()
    }

    /// Commit this cycle's telemetry and advance the clock.
    pub fn end_cycle(&mut self) -> Result<(), TelemetryError> {
        self.telemetry.record("time_s", self.clock.time_s());
        self.clock.tick();
        self.telemetry.end_cycle()
    }
}

impl QuadrupedReferenceFrames {
    pub fn new(frames: &mut FrameGraph) -> Self {
        Self {
            support_frame: frames.add_frame("support", frames.world(), Isometry3::identity()),
        }
    }

    pub fn support_frame(&self) -> FrameId {
        self.support_frame
    }

    /// Move the support frame onto the given sole positions and return the
    /// polygon they form.
    ///
    /// Soles must be expressed in world.
    pub fn update_support_frame(
        &self,
        frames: &mut FrameGraph,
        sole_positions: &QuadrantMap<FramePoint>,
    ) -> QuadrupedSupportPolygon {
        let mut polygon = QuadrupedSupportPolygon::new();
        for (q, sole) in sole_positions.iter() {
            check_frames_match(frames.world(), sole.frame());
            polygon.set_footstep(q, *sole.point());
        }

        let z = |q: RobotQuadrant| sole_positions[q].z();
        let min_front = z(RobotQuadrant::FrontLeft).min(z(RobotQuadrant::FrontRight));
        let min_hind = z(RobotQuadrant::HindLeft).min(z(RobotQuadrant::HindRight));

        // All four footsteps are set so neither can fail
        let centroid = polygon.centroid().unwrap_or_else(Point3::origin);
        let yaw = polygon.nominal_yaw().unwrap_or(0.0);

        frames.set_transform_to_parent(
            self.support_frame,
            Isometry3::from_parts(
                Translation3::new(centroid.x, centroid.y, 0.5 * (min_front + min_hind)),
                UnitQuaternion::from_euler_angles(0.0, 0.0, yaw),
            ),
        );

        polygon
    }
}

impl StaticInputProvider {
    /// Stand still at `com_height_m` above the support frame, level.
    pub fn standing(support_frame: FrameId, com_height_m: f64) -> Self {
        Self {
            com_position: FramePoint::from_xyz(support_frame, 0.0, 0.0, com_height_m),
            com_velocity: FrameVector::zero(support_frame),
            body_orientation: FrameOrientation::identity(support_frame),
            body_angular_rate: FrameVector::zero(support_frame),
        }
    }
}

impl ControllerInputProvider for StaticInputProvider {
    fn com_position_input(&self) -> FramePoint {
        self.com_position
    }

    fn com_velocity_input(&self) -> FrameVector {
        self.com_velocity
    }

    fn body_orientation_input(&self) -> FrameOrientation {
        self.body_orientation
    }

    fn body_angular_rate_input(&self) -> FrameVector {
        self.body_angular_rate
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_support_frame() {
        let mut frames = FrameGraph::new();
        let world = frames.world();
        let reference_frames = QuadrupedReferenceFrames::new(&mut frames);

        // Feet of a robot turned by 90 deg, front feet on a 0.1 m step
        let soles = QuadrantMap::from_fn(|q| {
            let x = -q.side_sign() * 0.2;
            let y = q.end_sign() * 0.35;
            let z = if q.is_front() { 0.1 } else { 0.0 };
            FramePoint::from_xyz(world, 1.0 + x, y, z)
        });

        let polygon = reference_frames.update_support_frame(&mut frames, &soles);
        assert_eq!(polygon.num_footsteps(), 4);

        let support = reference_frames.support_frame();
        let origin = FramePoint::origin(support).changed_to(&frames, world);
        assert_abs_diff_eq!(*origin.coords(), Vector3::new(1.0, 0.0, 0.05), epsilon = 1e-12);
        assert_abs_diff_eq!(
            FrameOrientation::identity(support).changed_to(&frames, world).yaw(),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-12
        );
    }
}
