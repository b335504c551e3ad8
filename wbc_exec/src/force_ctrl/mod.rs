//! # Force control module
//!
//! Whole-body force controllers of the quadruped and the state machine which
//! sequences them.
//!
//! All controllers implement [`util::module::Controller`] over a
//! [`RuntimeEnvironment`], which carries the robot model, the frame graph,
//! the operator's inputs, the parameters and the telemetry sink. The
//! controllers only hold their own state.
//!
//! - [`VirtualModelStandController`] balances the robot on all four feet.
//! - [`VirtualModelStepController`] balances while executing a timed step
//!   plan.
//! - [`ForceControllerManager`] switches between the two.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod balance;
mod environment;
mod manager;
mod stand;
mod step;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use balance::*;
pub use environment::*;
pub use manager::*;
pub use stand::*;
pub use step::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use thiserror::Error;

use crate::dcm_ctrl::DcmCtrlError;
use util::params::ParamError;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Events emitted by the force controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceControllerEvent {
    /// Every step of the plan has touched down
    StepsCompleted,
}

#[derive(Debug, Error)]
pub enum ForceControllerError {
    #[error("DCM controller error: {0}")]
    DcmError(#[from] DcmCtrlError),

    #[error("Parameter error: {0}")]
    ParamError(#[from] ParamError),

    #[error("Invalid step plan: {0}")]
    InvalidStepPlan(String),
}

// ---------------------------------------------------------------------------
// TEST SUPPORT
// ---------------------------------------------------------------------------

/// Closed loop harness shared by the controller tests.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::frames::FrameGraph;
    use crate::model::{
        CartesianQuadrupedModel, ContactState, QuadrantMap, QuadrupedModelParams,
    };
    use crate::telemetry::MemorySink;
    use util::params::ParameterRepository;

    pub type TestEnvironment = RuntimeEnvironment<CartesianQuadrupedModel, StaticInputProvider>;

    /// Units: seconds
    pub const TEST_DT_S: f64 = 0.002;

    /// Environment with the default model stood at 0.5 m and gains suited to
    /// its small body inertia.
    pub fn environment(sink: MemorySink) -> TestEnvironment {
        let mut frames = FrameGraph::new();
        let model = CartesianQuadrupedModel::new(QuadrupedModelParams::default(), &mut frames);

        let reference_frames = QuadrupedReferenceFrames::new(&mut frames);
        let input = StaticInputProvider::standing(reference_frames.support_frame(), 0.5);

        let mut params = ParameterRepository::new();
        for ns in [STAND_PARAMS_NAMESPACE, STEP_PARAMS_NAMESPACE].iter() {
            let map = params.namespace_mut(ns);
            map.set("body_orientation_proportional_gains", &[500.0, 500.0, 250.0]);
            map.set("body_orientation_derivative_gains", &[50.0, 50.0, 25.0]);
        }

        RuntimeEnvironment::new(
            model,
            frames,
            reference_frames,
            input,
            params,
            Box::new(sink),
            TEST_DT_S,
        )
    }

    /// Run the loop for `duration_s`, `cycle` runs the controller and returns
    /// the contact state of the legs to simulate.
    pub fn run_for<F>(env: &mut TestEnvironment, duration_s: f64, mut cycle: F)
    where
        F: FnMut(&mut TestEnvironment) -> QuadrantMap<ContactState>,
    {
        let num_cycles = (duration_s / env.control_dt()).round() as usize;
        for _ in 0..num_cycles {
            let contact = cycle(env);
            let gravity = env.gravity_mps2;
            let dt = env.control_dt();
            env.model
                .step_simulation(&contact, gravity, dt, &mut env.frames);
            env.end_cycle().unwrap();
        }
    }
}
