//! Task-space estimator
//!
//! Reads the robot model and the frame graph and produces a snapshot of the
//! task-space state, all expressed in world.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use crate::frames::{FrameGraph, FrameId, FrameOrientation, FramePoint, FrameVector};
use crate::model::{FullRobotModel, QuadrantMap};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Snapshot of the task-space state of the robot for one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSpaceEstimates {
    pub com_position: FramePoint,
    pub com_velocity: FrameVector,
    pub body_orientation: FrameOrientation,
    pub body_angular_velocity: FrameVector,
    pub sole_position: QuadrantMap<FramePoint>,
    pub sole_orientation: QuadrantMap<FrameOrientation>,
    pub sole_linear_velocity: QuadrantMap<FrameVector>,
}

/// Computes [`TaskSpaceEstimates`] from the robot model.
#[derive(Debug, Clone)]
pub struct TaskSpaceEstimator {
    world_frame: FrameId,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TaskSpaceEstimates {
    /// Zeroed estimates expressed in the given frame.
    pub fn new(frame: FrameId) -> Self {
        Self {
            com_position: FramePoint::origin(frame),
            com_velocity: FrameVector::zero(frame),
            body_orientation: FrameOrientation::identity(frame),
            body_angular_velocity: FrameVector::zero(frame),
            sole_position: QuadrantMap::splat(FramePoint::origin(frame)),
            sole_orientation: QuadrantMap::splat(FrameOrientation::identity(frame)),
            sole_linear_velocity: QuadrantMap::splat(FrameVector::zero(frame)),
        }
    }
}

impl TaskSpaceEstimator {
    pub fn new(world_frame: FrameId) -> Self {
        Self { world_frame }
    }

    /// Fill `estimates` from the current model state.
    ///
    /// Only reads the model and frames, so calling this twice within a cycle
    /// gives the same result. The frame graph must already have been updated
    /// from the model.
    pub fn compute<M: FullRobotModel>(
        &self,
        model: &M,
        frames: &FrameGraph,
        estimates: &mut TaskSpaceEstimates,
    ) {
        let world = self.world_frame;

        estimates.com_position = model.com_position().changed_to(frames, world);
        estimates.com_velocity = model.com_velocity().changed_to(frames, world);

        let body = model.body_frame();
        estimates.body_orientation = FrameOrientation::identity(body).changed_to(frames, world);
        estimates.body_angular_velocity = model
            .relative_twist(frames, world, body)
            .angular_part()
            .changed_to(frames, world);

        for (q, position) in estimates.sole_position.iter_mut() {
            let sole = model.sole_frame(q);
            *position = FramePoint::origin(sole).changed_to(frames, world);
        }

        for (q, orientation) in estimates.sole_orientation.iter_mut() {
            let sole = model.sole_frame(q);
            *orientation = FrameOrientation::identity(sole).changed_to(frames, world);
        }

        // Expressed in the sole frame the linear part of the twist is the
        // velocity of the sole origin, so a rotation is enough.
        for (q, velocity) in estimates.sole_linear_velocity.iter_mut() {
            let sole = model.sole_frame(q);
            *velocity = model
                .relative_twist(frames, world, sole)
                .linear_part()
                .changed_to(frames, world);
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{CartesianQuadrupedModel, QuadrupedModelParams, RobotQuadrant};
    use approx::assert_abs_diff_eq;
    use nalgebra::{Isometry3, Vector3};

    #[test]
    fn test_estimates() {
        let mut frames = FrameGraph::new();
        let mut model = CartesianQuadrupedModel::new(QuadrupedModelParams::default(), &mut frames);
        let world = frames.world();

        model.set_body_pose(Isometry3::new(Vector3::new(0.1, 0.0, 0.5), Vector3::new(0.0, 0.0, 0.2)));
        model.set_body_velocity(Vector3::new(0.0, 0.0, 0.5), Vector3::new(0.2, 0.0, 0.0));
        model.update_frames(&mut frames);

        let estimator = TaskSpaceEstimator::new(world);
        let mut estimates = TaskSpaceEstimates::new(world);
        estimator.compute(&model, &frames, &mut estimates);

        assert_abs_diff_eq!(*estimates.com_position.coords(), Vector3::new(0.1, 0.0, 0.5), epsilon = 1e-12);
        assert_abs_diff_eq!(estimates.body_orientation.yaw(), 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(*estimates.body_angular_velocity.vector(), Vector3::new(0.0, 0.0, 0.5), epsilon = 1e-12);

        let q = RobotQuadrant::HindLeft;
        assert_abs_diff_eq!(
            *estimates.sole_position[q].point(),
            model.sole_position_in_world(q),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            *estimates.sole_linear_velocity[q].vector(),
            model.sole_velocity_in_world(q),
            epsilon = 1e-12
        );

        // Idempotent within a cycle
        let first = estimates.clone();
        estimator.compute(&model, &frames, &mut estimates);
        assert_eq!(first.sole_position, estimates.sole_position);
        assert_eq!(first.com_velocity, estimates.com_velocity);
    }
}
