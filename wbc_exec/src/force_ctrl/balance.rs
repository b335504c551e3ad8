//! Virtual model balance
//!
//! Balance core shared by the stand and step controllers. Each cycle:
//!
//! 1. Estimates: the task-space estimates are read from the model, the DCM
//!    is estimated from the CoM state and the support frame is moved onto
//!    the feet.
//! 2. Setpoints: the commanded CoM state is turned into a DCM setpoint, whose
//!    controller gives the horizontal CoM force feedforward. The vertical
//!    feedforward holds the weight of the robot. The commanded body
//!    orientation and rate pass straight through.
//! 3. The task-space controller computes the joint efforts.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// Internal
use super::{ControllerInputProvider, ForceControllerError, RuntimeEnvironment};
use crate::dcm_ctrl::DcmController;
use crate::frames::{FrameId, FramePoint, FrameVector};
use crate::geometry::QuadrupedSupportPolygon;
use crate::model::{ContactState, FullRobotModel, JointControlMode, QuadrantMap, RobotQuadrant};
use crate::pid::PidGains;
use crate::task_space::{
    TaskSpaceCommands, TaskSpaceController, TaskSpaceControllerSettings, TaskSpaceEstimates,
    TaskSpaceEstimator, TaskSpaceSetpoints,
};
use util::params::{ParamError, ParameterMap};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const BODY_ORIENTATION: &str = "body_orientation";
const DCM_POSITION: &str = "dcm_position";
const COM_POSITION: &str = "com_position";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Feedback gains of the balance core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceGains {
    pub body_orientation: PidGains,
    pub dcm_position: PidGains,
    pub com_position: PidGains,
}

/// See the module documentation.
#[derive(Debug)]
pub struct BalanceCore {
    /// Parameter namespace of the owning controller
    namespace: &'static str,

    world_frame: FrameId,
    support_frame: FrameId,

    /// Units: kilograms
    mass_kg: f64,

    /// Units: meters/second^2
    gravity_mps2: f64,

    dcm_ctrl: DcmController,
    dcm_position_estimate: FramePoint,
    dcm_position_setpoint: FramePoint,

    support_polygon: QuadrupedSupportPolygon,

    estimator: TaskSpaceEstimator,
    controller: TaskSpaceController,
    pub estimates: TaskSpaceEstimates,
    pub setpoints: TaskSpaceSetpoints,
    pub settings: TaskSpaceControllerSettings,
    pub commands: TaskSpaceCommands,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for BalanceGains {
    fn default() -> Self {
        Self {
            body_orientation: PidGains::pd(
                Vector3::new(5000.0, 5000.0, 2500.0),
                Vector3::new(750.0, 750.0, 500.0),
            ),
            dcm_position: PidGains::pd(Vector3::new(2.0, 2.0, 0.0), Vector3::zeros()),
            com_position: PidGains::pd(Vector3::new(0.0, 0.0, 5000.0), Vector3::new(0.0, 0.0, 750.0)),
        }
    }
}

impl BalanceGains {
    /// Register the default gains, keeping any value already in the map.
    pub fn register_defaults(params: &mut ParameterMap) {
        let defaults = Self::default();
        defaults
            .body_orientation
            .register_defaults(params, BODY_ORIENTATION);
        defaults.dcm_position.register_defaults(params, DCM_POSITION);
        defaults.com_position.register_defaults(params, COM_POSITION);
    }

    pub fn from_parameters(params: &ParameterMap) -> Result<Self, ParamError> {
        Ok(Self {
            body_orientation: PidGains::from_parameters(params, BODY_ORIENTATION)?,
            dcm_position: PidGains::from_parameters(params, DCM_POSITION)?,
            com_position: PidGains::from_parameters(params, COM_POSITION)?,
        })
    }
}

impl BalanceCore {
    /// Create the core and register its default gains under `namespace`.
    pub fn new<M: FullRobotModel, I: ControllerInputProvider>(
        env: &mut RuntimeEnvironment<M, I>,
        namespace: &'static str,
    ) -> Result<Self, ForceControllerError> {
        BalanceGains::register_defaults(env.params.namespace_mut(namespace));

        let world = env.world_frame();
        let support = env.reference_frames.support_frame();
        let com_height = env
            .input
            .com_position_input()
            .changed_to(&env.frames, support)
            .z();

        Ok(Self {
            namespace,
            world_frame: world,
            support_frame: support,
            mass_kg: env.model.total_mass(),
            gravity_mps2: env.gravity_mps2,
            dcm_ctrl: DcmController::new(
                support,
                env.control_dt(),
                env.model.total_mass(),
                env.gravity_mps2,
                com_height,
            )?,
            dcm_position_estimate: FramePoint::origin(world),
            dcm_position_setpoint: FramePoint::origin(support),
            support_polygon: QuadrupedSupportPolygon::new(),
            estimator: TaskSpaceEstimator::new(world),
            controller: TaskSpaceController::new(world, env.control_dt()),
            estimates: TaskSpaceEstimates::new(world),
            setpoints: TaskSpaceSetpoints::new(world),
            settings: TaskSpaceControllerSettings::new(),
            commands: TaskSpaceCommands::new(world),
        })
    }

    pub fn support_polygon(&self) -> &QuadrupedSupportPolygon {
        &self.support_polygon
    }

    pub fn dcm_position_estimate(&self) -> &FramePoint {
        &self.dcm_position_estimate
    }

    pub fn contact_states(&self) -> &QuadrantMap<ContactState> {
        self.settings.contact_states()
    }

    /// Switch the legs to force control, reset every integrator, hold the
    /// current state and load the gains.
    pub fn on_entry<M: FullRobotModel, I: ControllerInputProvider>(
        &mut self,
        env: &mut RuntimeEnvironment<M, I>,
    ) -> Result<(), ForceControllerError> {
        for q in RobotQuadrant::ALL.iter().copied() {
            let names = env.model.leg_joint_names(q).to_vec();
            for name in names {
                if let Some(joint) = env.model.joint_mut(&name) {
                    joint.control_mode = JointControlMode::Force;
                }
            }
        }

        let gains = BalanceGains::from_parameters(env.params.namespace_mut(self.namespace))?;
        debug!("{} gains: {:?}", self.namespace, gains);

        self.dcm_ctrl.set_gains(gains.dcm_position);
        self.dcm_ctrl.reset();

        env.model.update_frames(&mut env.frames);
        self.estimator
            .compute(&env.model, &env.frames, &mut self.estimates);
        self.setpoints.initialize(&self.estimates);

        self.settings.initialize();
        self.settings.set_com_force_command_weights(1.0, 1.0, 1.0);
        self.settings.set_com_torque_command_weights(1.0, 1.0, 1.0);
        for q in RobotQuadrant::ALL.iter().copied() {
            self.settings.set_sole_force_command_weights(q, 0.0, 0.0, 0.0);
            self.settings.set_contact_state(q, ContactState::InContact);
        }
        self.settings
            .set_body_orientation_feedback_gains(gains.body_orientation);
        self.settings.set_com_position_feedback_gains(gains.com_position);
        self.controller.reset();

        Ok(())
    }

    /// Track the commanded CoM height with the pendulum model.
    pub fn update_com_height<M: FullRobotModel, I: ControllerInputProvider>(
        &mut self,
        env: &RuntimeEnvironment<M, I>,
    ) -> Result<(), ForceControllerError> {
        let com_height = env
            .input
            .com_position_input()
            .changed_to(&env.frames, self.support_frame)
            .z();
        self.dcm_ctrl.set_com_height(com_height)?;
        Ok(())
    }

    /// Refresh the frames and estimates and move the support frame.
    ///
    /// The support polygon is built from the measured soles, except where
    /// `footholds` gives a position (in world) to use instead.
    pub fn update_estimates<M: FullRobotModel, I: ControllerInputProvider>(
        &mut self,
        env: &mut RuntimeEnvironment<M, I>,
        footholds: &QuadrantMap<Option<FramePoint>>,
    ) {
        env.model.update_frames(&mut env.frames);
        self.estimator
            .compute(&env.model, &env.frames, &mut self.estimates);

        self.dcm_position_estimate = self
            .dcm_ctrl
            .dcm(&self.estimates.com_position, &self.estimates.com_velocity);

        let soles = QuadrantMap::from_fn(|q| match footholds[q] {
            Some(p) => p.changed_to(&env.frames, self.world_frame),
            None => self.estimates.sole_position[q],
        });
        self.support_polygon = env
            .reference_frames
            .update_support_frame(&mut env.frames, &soles);
    }

    /// Compute the setpoints from the commands and run the task-space
    /// controller.
    pub fn update_setpoints<M: FullRobotModel, I: ControllerInputProvider>(
        &mut self,
        env: &mut RuntimeEnvironment<M, I>,
    ) {
        let support = self.support_frame;
        let frames = &env.frames;

        let com_position = env.input.com_position_input().changed_to(frames, support);
        let com_velocity = env.input.com_velocity_input().changed_to(frames, support);

        // DCM feedback into the CoM force feedforward
        self.dcm_position_setpoint =
            com_position + com_velocity.scale(1.0 / self.dcm_ctrl.natural_frequency());
        let dcm_velocity_setpoint = FrameVector::zero(support);
        let mut com_force = FrameVector::zero(support);
        self.dcm_ctrl.compute(
            frames,
            &mut com_force,
            &self.dcm_position_setpoint,
            &dcm_velocity_setpoint,
            &self.dcm_position_estimate,
        );
        com_force.set_vector(Vector3::new(
            com_force.x(),
            com_force.y(),
            self.mass_kg * self.gravity_mps2,
        ));

        self.setpoints.com_position = com_position;
        self.setpoints.com_velocity = com_velocity;
        self.setpoints.com_force_feedforward = com_force;

        self.setpoints.body_orientation = env
            .input
            .body_orientation_input()
            .changed_to(frames, support);
        self.setpoints.body_angular_velocity = env
            .input
            .body_angular_rate_input()
            .changed_to(frames, support);

        self.controller.compute(
            &mut env.model,
            &env.frames,
            &self.settings,
            &self.setpoints,
            &self.estimates,
            &mut self.commands,
        );
    }

    /// Record the state of the balance core.
    pub fn record_telemetry<M, I>(&self, env: &mut RuntimeEnvironment<M, I>) {
        let frames = &env.frames;
        let world = self.world_frame;
        let telemetry = &mut env.telemetry;

        telemetry.record_point("com_position", &self.estimates.com_position);
        telemetry.record_vector("com_velocity", &self.estimates.com_velocity);
        telemetry.record_point("dcm_position_estimate", &self.dcm_position_estimate);
        telemetry.record_point(
            "dcm_position_setpoint",
            &self.dcm_position_setpoint.changed_to(frames, world),
        );
        telemetry.record("dcm_natural_frequency", self.dcm_ctrl.natural_frequency());
        telemetry.record_vector("com_force_command", &self.commands.com_force);
        telemetry.record_vector("com_torque_command", &self.commands.com_torque);
        for (q, force) in self.commands.sole_force.iter() {
            telemetry.record_vector(&format!("{}_sole_force", q.name()), force);
        }
    }
}
