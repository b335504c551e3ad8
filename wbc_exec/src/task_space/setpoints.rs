//! Task-space setpoints and commands

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use super::TaskSpaceEstimates;
use crate::frames::{FrameId, FrameOrientation, FramePoint, FrameVector};
use crate::model::QuadrantMap;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Desired task-space state plus feedforward wrenches.
///
/// Each value may be expressed in any frame, errors are computed in the frame
/// of the setpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSpaceSetpoints {
    pub body_orientation: FrameOrientation,
    pub body_angular_velocity: FrameVector,
    pub body_torque_feedforward: FrameVector,
    pub com_position: FramePoint,
    pub com_velocity: FrameVector,
    pub com_force_feedforward: FrameVector,
    pub sole_position: QuadrantMap<FramePoint>,
    pub sole_linear_velocity: QuadrantMap<FrameVector>,
    pub sole_force_feedforward: QuadrantMap<FrameVector>,
}

/// Output of the task-space controller, expressed in world.
///
/// Sole forces are the forces the legs apply at their soles.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSpaceCommands {
    pub com_force: FrameVector,
    pub com_torque: FrameVector,
    pub sole_force: QuadrantMap<FrameVector>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TaskSpaceSetpoints {
    pub fn new(frame: FrameId) -> Self {
        Self {
            body_orientation: FrameOrientation::identity(frame),
            body_angular_velocity: FrameVector::zero(frame),
            body_torque_feedforward: FrameVector::zero(frame),
            com_position: FramePoint::origin(frame),
            com_velocity: FrameVector::zero(frame),
            com_force_feedforward: FrameVector::zero(frame),
            sole_position: QuadrantMap::splat(FramePoint::origin(frame)),
            sole_linear_velocity: QuadrantMap::splat(FrameVector::zero(frame)),
            sole_force_feedforward: QuadrantMap::splat(FrameVector::zero(frame)),
        }
    }

    /// Hold the current state: positions and orientations from the estimates,
    /// velocities and feedforwards zeroed.
    pub fn initialize(&mut self, estimates: &TaskSpaceEstimates) {
        let frame = estimates.com_position.frame();

        self.body_orientation = estimates.body_orientation;
        self.body_angular_velocity.set_to_zero(frame);
        self.body_torque_feedforward.set_to_zero(frame);
        self.com_position = estimates.com_position;
        self.com_velocity.set_to_zero(frame);
        self.com_force_feedforward.set_to_zero(frame);

        for (q, position) in self.sole_position.iter_mut() {
            *position = estimates.sole_position[q];
        }
        for (_, velocity) in self.sole_linear_velocity.iter_mut() {
            velocity.set_to_zero(frame);
        }
        for (_, force) in self.sole_force_feedforward.iter_mut() {
            force.set_to_zero(frame);
        }
    }
}

impl TaskSpaceCommands {
    pub fn new(world_frame: FrameId) -> Self {
        Self {
            com_force: FrameVector::zero(world_frame),
            com_torque: FrameVector::zero(world_frame),
            sole_force: QuadrantMap::splat(FrameVector::zero(world_frame)),
        }
    }
}
