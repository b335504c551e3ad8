//! Task-space controller
//!
//! Turns setpoints and estimates into joint efforts in three stages:
//!
//! 1. Feedback: PID loops on the CoM position, the body orientation and the
//!    position of every sole out of contact, each added to its feedforward.
//! 2. Virtual model: the CoM force and body torque are distributed over the
//!    soles in contact. With `f` the stacked forces the legs apply at their
//!    soles and `W` the desired wrench on the body about the CoM, the contact
//!    forces satisfy `G f = -W` where each sole contributes the block
//!    `[I; skew(r_i)]`, `r_i` being the sole position relative to the CoM.
//!    The system is solved in weighted least squares:
//!
//!    ```text
//!    (G^T Wc G + Ws + eps I) f = -G^T Wc W + Ws f_ff
//!    ```
//!
//! 3. Joint efforts: `tau = J^T f` for every leg, saturated to the joints'
//!    effort limits.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

// Internal
use super::{TaskSpaceCommands, TaskSpaceControllerSettings, TaskSpaceEstimates, TaskSpaceSetpoints};
use crate::frames::{FrameGraph, FrameId, FrameVector};
use crate::model::{ContactState, FullRobotModel, QuadrantMap, RobotQuadrant};
use crate::pid::{PidController3, PidGains};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Tikhonov regularisation of the contact force distribution
const FORCE_REGULARISATION: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TaskSpaceController {
    world_frame: FrameId,

    /// Units: seconds
    control_dt_s: f64,

    body_orientation_pid: PidController3,
    com_position_pid: PidController3,
    sole_position_pid: QuadrantMap<PidController3>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TaskSpaceController {
    pub fn new(world_frame: FrameId, control_dt_s: f64) -> Self {
        Self {
            world_frame,
            control_dt_s,
            body_orientation_pid: PidController3::new(PidGains::zero()),
            com_position_pid: PidController3::new(PidGains::zero()),
            sole_position_pid: QuadrantMap::splat(PidController3::new(PidGains::zero())),
        }
    }

    /// Zero the integral of every feedback loop.
    pub fn reset(&mut self) {
        self.body_orientation_pid.reset();
        self.com_position_pid.reset();
        for (_, pid) in self.sole_position_pid.iter_mut() {
            pid.reset();
        }
    }

    /// Run one control cycle and write the desired efforts into the model's
    /// leg joints.
    pub fn compute<M: FullRobotModel>(
        &mut self,
        model: &mut M,
        frames: &FrameGraph,
        settings: &TaskSpaceControllerSettings,
        setpoints: &TaskSpaceSetpoints,
        estimates: &TaskSpaceEstimates,
        commands: &mut TaskSpaceCommands,
    ) {
        self.push_gains(settings);

        commands.com_force = self.compute_com_force(frames, setpoints, estimates);
        commands.com_torque = self.compute_body_torque(frames, setpoints, estimates);

        for q in RobotQuadrant::ALL.iter().copied() {
            commands.sole_force[q] = match settings.contact_state(q) {
                ContactState::NoContact => self.compute_swing_sole_force(q, frames, setpoints, estimates),
                // Overwritten by the virtual model below
                ContactState::InContact => FrameVector::zero(self.world_frame),
            };
        }

        self.distribute_contact_forces(frames, settings, setpoints, estimates, commands);

        for q in RobotQuadrant::ALL.iter().copied() {
            apply_sole_force(model, q, commands.sole_force[q].vector());
        }
    }

    fn push_gains(&mut self, settings: &TaskSpaceControllerSettings) {
        self.body_orientation_pid
            .set_gains(settings.body_orientation_gains().clone());
        self.com_position_pid
            .set_gains(settings.com_position_gains().clone());
        for (q, pid) in self.sole_position_pid.iter_mut() {
            pid.set_gains(settings.sole_position_gains(q).clone());
        }
    }

    fn compute_com_force(
        &mut self,
        frames: &FrameGraph,
        setpoints: &TaskSpaceSetpoints,
        estimates: &TaskSpaceEstimates,
    ) -> FrameVector {
        let frame = setpoints.com_position.frame();

        let position_error =
            setpoints.com_position - estimates.com_position.changed_to(frames, frame);
        let velocity_error = setpoints.com_velocity.changed_to(frames, frame)
            - estimates.com_velocity.changed_to(frames, frame);

        let force = self
            .com_position_pid
            .compute_in_frame(&position_error, &velocity_error, self.control_dt_s)
            + setpoints.com_force_feedforward.changed_to(frames, frame);

        force.changed_to(frames, self.world_frame)
    }

    fn compute_body_torque(
        &mut self,
        frames: &FrameGraph,
        setpoints: &TaskSpaceSetpoints,
        estimates: &TaskSpaceEstimates,
    ) -> FrameVector {
        let frame = setpoints.body_orientation.frame();

        let orientation_error = setpoints
            .body_orientation
            .difference(&estimates.body_orientation.changed_to(frames, frame));
        let velocity_error = setpoints.body_angular_velocity.changed_to(frames, frame)
            - estimates.body_angular_velocity.changed_to(frames, frame);

        let torque = self
            .body_orientation_pid
            .compute_in_frame(&orientation_error, &velocity_error, self.control_dt_s)
            + setpoints.body_torque_feedforward.changed_to(frames, frame);

        torque.changed_to(frames, self.world_frame)
    }

    fn compute_swing_sole_force(
        &mut self,
        quadrant: RobotQuadrant,
        frames: &FrameGraph,
        setpoints: &TaskSpaceSetpoints,
        estimates: &TaskSpaceEstimates,
    ) -> FrameVector {
        let frame = setpoints.sole_position[quadrant].frame();

        let position_error = setpoints.sole_position[quadrant]
            - estimates.sole_position[quadrant].changed_to(frames, frame);
        let velocity_error = setpoints.sole_linear_velocity[quadrant].changed_to(frames, frame)
            - estimates.sole_linear_velocity[quadrant].changed_to(frames, frame);

        let force = self.sole_position_pid[quadrant].compute_in_frame(
            &position_error,
            &velocity_error,
            self.control_dt_s,
        ) + setpoints.sole_force_feedforward[quadrant].changed_to(frames, frame);

        force.changed_to(frames, self.world_frame)
    }

    /// Solve the virtual model for the soles in contact, see the module
    /// documentation.
    fn distribute_contact_forces(
        &self,
        frames: &FrameGraph,
        settings: &TaskSpaceControllerSettings,
        setpoints: &TaskSpaceSetpoints,
        estimates: &TaskSpaceEstimates,
        commands: &mut TaskSpaceCommands,
    ) {
        let contacts: Vec<RobotQuadrant> = RobotQuadrant::ALL
            .iter()
            .copied()
            .filter(|q| settings.contact_state(*q) == ContactState::InContact)
            .collect();

        if contacts.is_empty() {
            return;
        }

        let n = 3 * contacts.len();
        let com = estimates.com_position.changed_to(frames, self.world_frame);

        let mut g = DMatrix::<f64>::zeros(6, n);
        let mut w_s = DMatrix::<f64>::zeros(n, n);
        let mut f_ff = DVector::<f64>::zeros(n);

        for (i, q) in contacts.iter().enumerate() {
            let r = estimates.sole_position[*q].changed_to(frames, self.world_frame) - com;

            g.fixed_slice_mut::<nalgebra::U3, nalgebra::U3>(0, 3 * i)
                .copy_from(&Matrix3::identity());
            g.fixed_slice_mut::<nalgebra::U3, nalgebra::U3>(3, 3 * i)
                .copy_from(&r.vector().cross_matrix());

            let weights = settings.sole_force_command_weights(*q);
            for k in 0..3 {
                w_s[(3 * i + k, 3 * i + k)] = weights[k];
            }

            let ff = setpoints.sole_force_feedforward[*q].changed_to(frames, self.world_frame);
            f_ff.fixed_rows_mut::<nalgebra::U3>(3 * i).copy_from(ff.vector());
        }

        let mut w_c = DMatrix::<f64>::zeros(6, 6);
        for k in 0..3 {
            w_c[(k, k)] = settings.com_force_command_weights()[k];
            w_c[(k + 3, k + 3)] = settings.com_torque_command_weights()[k];
        }

        let mut wrench = DVector::<f64>::zeros(6);
        wrench
            .fixed_rows_mut::<nalgebra::U3>(0)
            .copy_from(commands.com_force.vector());
        wrench
            .fixed_rows_mut::<nalgebra::U3>(3)
            .copy_from(commands.com_torque.vector());

        let g_t_wc = g.transpose() * &w_c;
        let lhs = &g_t_wc * &g + &w_s + DMatrix::<f64>::identity(n, n) * FORCE_REGULARISATION;
        let rhs = -(&g_t_wc * &wrench) + &w_s * &f_ff;

        let forces = match lhs.cholesky() {
            Some(chol) => chol.solve(&rhs),
            None => {
                warn!("Virtual model is not positive definite, contact forces zeroed");
                DVector::zeros(n)
            }
        };

        for (i, q) in contacts.iter().enumerate() {
            commands.sole_force[*q] = FrameVector::new(
                self.world_frame,
                Vector3::new(forces[3 * i], forces[3 * i + 1], forces[3 * i + 2]),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Map a sole force onto the leg's joints, `tau = J^T f`.
fn apply_sole_force<M: FullRobotModel>(model: &mut M, quadrant: RobotQuadrant, force: &Vector3<f64>) {
    let jacobian = model.sole_jacobian(quadrant);
    let efforts = jacobian.transpose() * DVector::from_column_slice(force.as_slice());

    let names = model.leg_joint_names(quadrant).to_vec();
    for (name, effort) in names.iter().zip(efforts.iter()) {
        match model.joint_mut(name) {
            Some(joint) => joint.set_desired_effort(*effort),
            None => warn!("Leg joint {} not found in the model", name),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{CartesianQuadrupedModel, QuadrupedModelParams};
    use crate::task_space::TaskSpaceEstimator;
    use approx::assert_abs_diff_eq;

    struct Fixture {
        frames: FrameGraph,
        model: CartesianQuadrupedModel,
        estimates: TaskSpaceEstimates,
        setpoints: TaskSpaceSetpoints,
        settings: TaskSpaceControllerSettings,
        commands: TaskSpaceCommands,
        controller: TaskSpaceController,
    }

    fn fixture() -> Fixture {
        let mut frames = FrameGraph::new();
        let model = CartesianQuadrupedModel::new(QuadrupedModelParams::default(), &mut frames);
        let world = frames.world();

        let mut estimates = TaskSpaceEstimates::new(world);
        TaskSpaceEstimator::new(world).compute(&model, &frames, &mut estimates);

        let mut setpoints = TaskSpaceSetpoints::new(world);
        setpoints.initialize(&estimates);

        Fixture {
            frames,
            model,
            estimates,
            setpoints,
            settings: TaskSpaceControllerSettings::new(),
            commands: TaskSpaceCommands::new(world),
            controller: TaskSpaceController::new(world, 0.002),
        }
    }

    #[test]
    fn test_weight_distribution() {
        let mut f = fixture();
        let weight = f.model.total_mass() * 9.81;
        f.setpoints
            .com_force_feedforward
            .set_vector(Vector3::new(0.0, 0.0, weight));

        f.controller.compute(
            &mut f.model,
            &f.frames,
            &f.settings,
            &f.setpoints,
            &f.estimates,
            &mut f.commands,
        );

        // Symmetric stance: every leg pushes down with a quarter of the weight
        for q in RobotQuadrant::ALL.iter().copied() {
            assert_abs_diff_eq!(
                *f.commands.sole_force[q].vector(),
                Vector3::new(0.0, 0.0, -weight / 4.0),
                epsilon = 1e-3
            );
            assert_abs_diff_eq!(f.model.leg_desired_effort(q).z, -weight / 4.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_three_leg_wrench_balance() {
        let mut f = fixture();
        let weight = f.model.total_mass() * 9.81;
        f.setpoints
            .com_force_feedforward
            .set_vector(Vector3::new(0.0, 0.0, weight));
        f.settings
            .set_contact_state(RobotQuadrant::FrontLeft, ContactState::NoContact);

        f.controller.compute(
            &mut f.model,
            &f.frames,
            &f.settings,
            &f.setpoints,
            &f.estimates,
            &mut f.commands,
        );

        // Reaction of the stance legs balances the desired wrench
        let com = f.estimates.com_position;
        let mut force = Vector3::zeros();
        let mut torque = Vector3::zeros();
        for q in RobotQuadrant::ALL.iter().copied() {
            if q == RobotQuadrant::FrontLeft {
                continue;
            }
            let r = f.estimates.sole_position[q] - com;
            force -= f.commands.sole_force[q].vector();
            torque -= r.vector().cross(f.commands.sole_force[q].vector());
        }
        assert_abs_diff_eq!(force, Vector3::new(0.0, 0.0, weight), epsilon = 1e-2);
        assert_abs_diff_eq!(torque, Vector3::zeros(), epsilon = 1e-2);

        // Swing leg with zero gains and zero feedforward does nothing
        assert_eq!(f.model.leg_desired_effort(RobotQuadrant::FrontLeft), Vector3::zeros());
    }

    #[test]
    fn test_swing_sole_feedback_and_saturation() {
        let mut f = fixture();
        let q = RobotQuadrant::HindRight;
        f.settings.set_contact_state(q, ContactState::NoContact);
        f.settings.set_sole_position_feedback_gains(
            q,
            PidGains::pd(Vector3::repeat(1000.0), Vector3::zeros()),
        );

        let target = f.setpoints.sole_position[q] + FrameVector::new(f.frames.world(), Vector3::new(0.0, 0.0, 0.1));
        f.setpoints.sole_position[q] = target;

        f.controller.compute(
            &mut f.model,
            &f.frames,
            &f.settings,
            &f.setpoints,
            &f.estimates,
            &mut f.commands,
        );
        assert_abs_diff_eq!(f.commands.sole_force[q].z(), 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(f.model.leg_desired_effort(q).z, 100.0, epsilon = 1e-9);

        // Efforts saturate at the joint limit
        f.settings.set_sole_position_feedback_gains(
            q,
            PidGains::pd(Vector3::repeat(1e5), Vector3::zeros()),
        );
        f.controller.compute(
            &mut f.model,
            &f.frames,
            &f.settings,
            &f.setpoints,
            &f.estimates,
            &mut f.commands,
        );
        let limit = f.model.params().joint_effort_limit_n;
        assert_abs_diff_eq!(f.model.leg_desired_effort(q).z, limit, epsilon = 1e-9);
    }
}
