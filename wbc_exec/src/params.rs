//! # Whole-Body Control Executable Parameters
//!
//! This module provides the parameters of the whole-body control executable,
//! which runs the force controllers against the cartesian quadruped model.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::frames::{FrameId, FramePoint};
use crate::force_ctrl::QuadrupedTimedStep;
use crate::model::{CartesianQuadrupedModel, QuadrupedModelParams, RobotQuadrant};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct WbcExecParams {
    /// Length of the run
    ///
    /// Units: seconds
    pub run_duration_s: f64,

    /// Hold each cycle to the control period instead of running as fast as
    /// possible
    pub real_time: bool,

    /// Commanded height of the CoM above the support frame
    ///
    /// Units: meters
    pub com_height_m: f64,

    /// Parameter file holding the controller gains, relative to the params
    /// directory
    pub gains_file: String,

    /// Time spent standing before the step plan is requested
    ///
    /// Units: seconds
    pub stand_duration_s: f64,

    /// Steps to take, may be empty
    #[serde(default)]
    pub steps: Vec<StepParams>,

    /// Push applied to the body during the run
    pub push: Option<PushParams>,

    pub model: QuadrupedModelParams,
}

/// A step relative to the sole position when the plan is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepParams {
    pub quadrant: RobotQuadrant,

    /// Units: meters, in world
    pub offset_m: [f64; 3],

    /// Units: seconds, from the start of stepping
    pub start_time_s: f64,

    /// Units: seconds, from the start of stepping
    pub end_time_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushParams {
    /// Units: seconds, from the start of the run
    pub time_s: f64,

    /// Change of the body velocity
    ///
    /// Units: meters/second, in world
    pub delta_velocity_mps: [f64; 3],

    /// Swing to replan when the push is applied
    pub replan_quadrant: Option<RobotQuadrant>,

    /// Units: seconds
    #[serde(default = "default_replan_time_remaining_s")]
    pub replan_time_remaining_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl StepParams {
    /// Build the timed step from the current sole position of the model.
    pub fn to_timed_step(
        &self,
        model: &CartesianQuadrupedModel,
        world_frame: FrameId,
    ) -> QuadrupedTimedStep {
        let goal = model.sole_position_in_world(self.quadrant) + Vector3::from(self.offset_m);

        QuadrupedTimedStep {
            quadrant: self.quadrant,
            goal_position: FramePoint::new(world_frame, goal),
            start_time_s: self.start_time_s,
            end_time_s: self.end_time_s,
        }
    }
}

impl PushParams {
    pub fn delta_velocity(&self) -> Vector3<f64> {
        Vector3::from(self.delta_velocity_mps)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn default_replan_time_remaining_s() -> f64 {
    0.1
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::frames::FrameGraph;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_deserialise() {
        let params: WbcExecParams = toml::from_str(
            r#"
            run_duration_s = 4.0
            real_time = false
            com_height_m = 0.5
            gains_file = "wbc_gains.toml"
            stand_duration_s = 1.0

            [[steps]]
            quadrant = "hind_left"
            offset_m = [0.1, 0.0, 0.0]
            start_time_s = 0.1
            end_time_s = 0.4

            [push]
            time_s = 1.3
            delta_velocity_mps = [0.0, 0.2, 0.0]
            replan_quadrant = "hind_left"

            [model]
            mass_kg = 20.0
            inertia_kgm2 = [0.5, 1.5, 1.8]
            hip_offset_x_m = 0.35
            hip_offset_y_m = 0.2
            nominal_leg_length_m = 0.5
            joint_effort_limit_n = 600.0
            swing_leg_damping_ns_m = 100.0
            "#,
        )
        .unwrap();

        assert_eq!(params.steps.len(), 1);
        assert_eq!(params.steps[0].quadrant, RobotQuadrant::HindLeft);

        let push = params.push.as_ref().unwrap();
        assert_eq!(push.replan_time_remaining_s, 0.1);
        assert_eq!(push.delta_velocity(), Vector3::new(0.0, 0.2, 0.0));

        let mut frames = FrameGraph::new();
        let model = CartesianQuadrupedModel::new(params.model.clone(), &mut frames);
        let step = params.steps[0].to_timed_step(&model, frames.world());
        assert_abs_diff_eq!(
            *step.goal_position.point(),
            nalgebra::Point3::new(-0.25, 0.2, 0.0),
            epsilon = 1e-12
        );
    }
}
