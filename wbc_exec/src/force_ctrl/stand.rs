//! Virtual model based stand controller
//!
//! Keeps all four feet on the ground and balances the body on them, tracking
//! the commanded CoM position and body orientation. See [`BalanceCore`] for
//! the control law.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::info;

// Internal
use super::{
    BalanceCore, ControllerInputProvider, ForceControllerError, ForceControllerEvent,
    RuntimeEnvironment,
};
use crate::model::{FullRobotModel, QuadrantMap};
use util::module::Controller;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Parameter namespace of the controller
pub const STAND_PARAMS_NAMESPACE: &str = "virtual_model_stand";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct VirtualModelStandController {
    balance: BalanceCore,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VirtualModelStandController {
    pub fn new<M: FullRobotModel, I: ControllerInputProvider>(
        env: &mut RuntimeEnvironment<M, I>,
    ) -> Result<Self, ForceControllerError> {
        Ok(Self {
            balance: BalanceCore::new(env, STAND_PARAMS_NAMESPACE)?,
        })
    }

    pub fn balance(&self) -> &BalanceCore {
        &self.balance
    }
}

impl<M: FullRobotModel, I: ControllerInputProvider> Controller<RuntimeEnvironment<M, I>>
    for VirtualModelStandController
{
    type Event = ForceControllerEvent;
    type Error = ForceControllerError;

    fn on_entry(&mut self, env: &mut RuntimeEnvironment<M, I>) -> Result<(), Self::Error> {
        info!("Entering stand");
        self.balance.on_entry(env)
    }

    fn process(
        &mut self,
        env: &mut RuntimeEnvironment<M, I>,
    ) -> Result<Option<Self::Event>, Self::Error> {
        self.balance.update_com_height(env)?;
        self.balance.update_estimates(env, &QuadrantMap::splat(None));
        self.balance.update_setpoints(env);
        self.balance.record_telemetry(env);

        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::dcm_ctrl::DcmCtrlError;
    use crate::force_ctrl::test_support::{environment, run_for};
    use crate::model::{JointControlMode, RobotQuadrant};
    use crate::telemetry::MemorySink;
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_on_entry() {
        let sink = MemorySink::new();
        let mut env = environment(sink);
        let mut stand = VirtualModelStandController::new(&mut env).unwrap();

        // Defaults registered on construction
        let params = env.params.namespace(STAND_PARAMS_NAMESPACE).unwrap();
        assert!(params.contains("dcm_position_proportional_gains"));

        stand.on_entry(&mut env).unwrap();
        for q in RobotQuadrant::ALL.iter().copied() {
            for name in env.model.leg_joint_names(q) {
                let joint = env.model.joint(name).unwrap();
                assert_eq!(joint.control_mode, JointControlMode::Force);
            }
        }
    }

    #[test]
    fn test_holds_weight() {
        let sink = MemorySink::new();
        let mut env = environment(sink.clone());
        let mut stand = VirtualModelStandController::new(&mut env).unwrap();
        stand.on_entry(&mut env).unwrap();

        assert_eq!(stand.process(&mut env).unwrap(), None);

        // At rest on the setpoint every leg carries a quarter of the weight
        let weight = env.model.total_mass() * env.gravity_mps2;
        let commands = &stand.balance().commands;
        assert_abs_diff_eq!(commands.com_force.z(), weight, epsilon = 1e-9);
        for q in RobotQuadrant::ALL.iter().copied() {
            assert_abs_diff_eq!(commands.sole_force[q].z(), -weight / 4.0, epsilon = 1e-2);
        }

        env.end_cycle().unwrap();
        assert_eq!(sink.num_cycles(), 1);
        assert_abs_diff_eq!(sink.latest("com_position_z").unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_recovers_from_push() {
        let sink = MemorySink::new();
        let mut env = environment(sink.clone());
        let mut stand = VirtualModelStandController::new(&mut env).unwrap();
        stand.on_entry(&mut env).unwrap();

        // Sideways shove
        env.model
            .set_body_velocity(Vector3::zeros(), Vector3::new(0.3, -0.2, 0.0));

        run_for(&mut env, 3.0, |env| {
            stand.process(env).unwrap();
            *stand.balance().contact_states()
        });

        let com = env.model.com_position();
        assert_abs_diff_eq!(com.x(), 0.0, epsilon = 5e-3);
        assert_abs_diff_eq!(com.y(), 0.0, epsilon = 5e-3);
        assert_abs_diff_eq!(com.z(), 0.5, epsilon = 5e-3);
        assert!(env.model.com_velocity().norm() < 1e-2);

        // The DCM estimate followed the CoM back
        let dcm = sink.latest("dcm_position_estimate_x").unwrap();
        assert_abs_diff_eq!(dcm, 0.0, epsilon = 1e-2);
    }

    #[test]
    fn test_invalid_height_command() {
        let sink = MemorySink::new();
        let mut env = environment(sink);
        let mut stand = VirtualModelStandController::new(&mut env).unwrap();
        stand.on_entry(&mut env).unwrap();

        env.input.com_position.set_z(0.0);
        match stand.process(&mut env) {
            Err(ForceControllerError::DcmError(DcmCtrlError::InvalidComHeight(h))) => {
                assert_eq!(h, 0.0)
            }
            other => panic!("Expected an invalid height error, got {:?}", other),
        }
    }
}
