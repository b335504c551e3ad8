//! Task-space controller settings

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::Serialize;

use crate::model::{ContactState, QuadrantMap, RobotQuadrant};
use crate::pid::PidGains;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Per-cycle configuration of the task-space controller: contact states,
/// virtual model weights and feedback gains.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSpaceControllerSettings {
    contact_state: QuadrantMap<ContactState>,

    /// Weights on tracking the desired CoM force in the virtual model
    com_force_command_weights: Vector3<f64>,

    /// Weights on tracking the desired body torque in the virtual model
    com_torque_command_weights: Vector3<f64>,

    /// Weights pulling each contact force towards its feedforward
    sole_force_command_weights: QuadrantMap<Vector3<f64>>,

    body_orientation_gains: PidGains,
    com_position_gains: PidGains,
    sole_position_gains: QuadrantMap<PidGains>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TaskSpaceControllerSettings {
    pub fn new() -> Self {
        Self {
            contact_state: QuadrantMap::splat(ContactState::InContact),
            com_force_command_weights: Vector3::repeat(1.0),
            com_torque_command_weights: Vector3::repeat(1.0),
            sole_force_command_weights: QuadrantMap::splat(Vector3::zeros()),
            body_orientation_gains: PidGains::zero(),
            com_position_gains: PidGains::zero(),
            sole_position_gains: QuadrantMap::splat(PidGains::zero()),
        }
    }

    /// Restore the defaults: all legs in contact, unit wrench weights, zero
    /// sole weights and zero gains.
    pub fn initialize(&mut self) {
        *self = Self::new();
    }

    pub fn contact_state(&self, quadrant: RobotQuadrant) -> ContactState {
        self.contact_state[quadrant]
    }

    pub fn contact_states(&self) -> &QuadrantMap<ContactState> {
        &self.contact_state
    }

    pub fn set_contact_state(&mut self, quadrant: RobotQuadrant, state: ContactState) {
        self.contact_state[quadrant] = state;
    }

    pub fn com_force_command_weights(&self) -> &Vector3<f64> {
        &self.com_force_command_weights
    }

    pub fn set_com_force_command_weights(&mut self, x: f64, y: f64, z: f64) {
        self.com_force_command_weights = Vector3::new(x, y, z);
    }

    pub fn com_torque_command_weights(&self) -> &Vector3<f64> {
        &self.com_torque_command_weights
    }

    pub fn set_com_torque_command_weights(&mut self, x: f64, y: f64, z: f64) {
        self.com_torque_command_weights = Vector3::new(x, y, z);
    }

    pub fn sole_force_command_weights(&self, quadrant: RobotQuadrant) -> &Vector3<f64> {
        &self.sole_force_command_weights[quadrant]
    }

    pub fn set_sole_force_command_weights(&mut self, quadrant: RobotQuadrant, x: f64, y: f64, z: f64) {
        self.sole_force_command_weights[quadrant] = Vector3::new(x, y, z);
    }

    pub fn body_orientation_gains(&self) -> &PidGains {
        &self.body_orientation_gains
    }

    pub fn set_body_orientation_feedback_gains(&mut self, gains: PidGains) {
        self.body_orientation_gains = gains;
    }

    pub fn com_position_gains(&self) -> &PidGains {
        &self.com_position_gains
    }

    pub fn set_com_position_feedback_gains(&mut self, gains: PidGains) {
        self.com_position_gains = gains;
    }

    pub fn sole_position_gains(&self, quadrant: RobotQuadrant) -> &PidGains {
        &self.sole_position_gains[quadrant]
    }

    pub fn set_sole_position_feedback_gains(&mut self, quadrant: RobotQuadrant, gains: PidGains) {
        self.sole_position_gains[quadrant] = gains;
    }
}

impl Default for TaskSpaceControllerSettings {
    fn default() -> Self {
        Self::new()
    }
}
