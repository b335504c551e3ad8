//! Virtual model based step controller
//!
//! Balances the robot like the stand controller while executing a plan of
//! timed steps. When a step starts its foot is handed to the foot control
//! module as a swing towards the goal, and the task-space controller tracks
//! the swing with the sole's position loop. The desired sole velocity is fed
//! forward through the swing leg's damping.
//!
//! From the step's end time on the foot is put back into support as soon as
//! the sole is down to the height of its goal. Until then the swing carries on
//! down at the touchdown velocity, for at most `max_touchdown_delay_s`.
//!
//! Step times are relative to the entry into the controller. Once the last
//! step has touched down `StepsCompleted` is emitted and the controller keeps
//! balancing on all four feet.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use nalgebra::Vector3;
use ordered_float::OrderedFloat;

// Internal
use super::{
    BalanceCore, ControllerInputProvider, ForceControllerError, ForceControllerEvent,
    RuntimeEnvironment,
};
use crate::accel_ctrl::Se3PidGains;
use crate::foot_ctrl::{FootControlModule, FootRequest, SwingParams};
use crate::frames::{FrameGraph, FrameId, FrameOrientation, FramePoint, FramePose, FrameVector};
use crate::model::{ContactState, FullRobotModel, QuadrantMap, RobotQuadrant};
use crate::pid::PidGains;
use util::module::Controller;
use util::params::{ParamError, ParameterMap};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Parameter namespace of the controller
pub const STEP_PARAMS_NAMESPACE: &str = "virtual_model_step";

const SOLE_POSITION: &str = "sole_position";
const FOOT_POSITION: &str = "foot_position";
const FOOT_ORIENTATION: &str = "foot_orientation";
const SWING_MASS: &str = "swing_mass_kg";
const SWING_DAMPING: &str = "swing_damping_ns_m";
const TOUCHDOWN_HEIGHT_THRESHOLD: &str = "touchdown_height_threshold_m";
const MAX_TOUCHDOWN_DELAY: &str = "max_touchdown_delay_s";
const SWING_GROUND_CLEARANCE: &str = "swing_ground_clearance_m";
const SWING_TOUCHDOWN_VELOCITY: &str = "swing_touchdown_velocity_mps";
const FOOT_MAX_LINEAR_ACCELERATION: &str = "foot_max_linear_acceleration_mps2";
const FOOT_MAX_ANGULAR_ACCELERATION: &str = "foot_max_angular_acceleration_radps2";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A step of one foot between two times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadrupedTimedStep {
    pub quadrant: RobotQuadrant,

    /// Touchdown position of the sole
    pub goal_position: FramePoint,

    /// Units: seconds
    pub start_time_s: f64,

    /// Units: seconds
    pub end_time_s: f64,
}

/// Parameters of the swing legs, read from the controller's namespace on
/// entry.
#[derive(Debug, Clone, PartialEq)]
struct SwingLegParams {
    sole_position: PidGains,
    foot: Se3PidGains,

    /// Effective mass of a swing leg, scales the foot's acceleration command
    ///
    /// Units: kilograms
    swing_mass_kg: f64,

    /// Viscous damping of a swing leg, scales the desired sole velocity
    ///
    /// Units: newton seconds/meter
    swing_damping_ns_m: f64,

    /// Height above its goal under which a late foot is considered down
    ///
    /// Units: meters
    touchdown_height_threshold_m: f64,

    /// Longest a foot is kept swinging after the end of its step
    ///
    /// Units: seconds
    max_touchdown_delay_s: f64,

    swing: SwingParams,

    /// Units: meters/second^2
    max_linear_acceleration_mps2: f64,

    /// Units: radians/second^2
    max_angular_acceleration_radps2: f64,
}

#[derive(Debug)]
pub struct VirtualModelStepController {
    balance: BalanceCore,

    world_frame: FrameId,
    sole_frames: QuadrantMap<FrameId>,

    /// Units: seconds
    control_dt_s: f64,

    feet: QuadrantMap<FootControlModule>,
    leg_params: SwingLegParams,

    plan: Vec<QuadrupedTimedStep>,

    /// Index in the plan of the next step to start
    next_step: usize,

    /// Step being executed by each foot
    active: QuadrantMap<Option<QuadrupedTimedStep>>,

    num_cycles: u64,
    completed: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SwingLegParams {
    fn default() -> Self {
        Self {
            sole_position: PidGains::pd(
                Vector3::new(4000.0, 4000.0, 4000.0),
                Vector3::new(20.0, 20.0, 20.0),
            ),
            foot: Se3PidGains {
                position: PidGains::pd(
                    Vector3::new(100.0, 100.0, 100.0),
                    Vector3::new(20.0, 20.0, 20.0),
                ),
                orientation: PidGains::pd(
                    Vector3::new(100.0, 100.0, 100.0),
                    Vector3::new(20.0, 20.0, 20.0),
                ),
            },
            swing_mass_kg: 0.02,
            swing_damping_ns_m: 100.0,
            touchdown_height_threshold_m: 0.005,
            max_touchdown_delay_s: 0.2,
            swing: SwingParams::default(),
            max_linear_acceleration_mps2: 50.0,
            max_angular_acceleration_radps2: 100.0,
        }
    }
}

impl SwingLegParams {
    fn register_defaults(params: &mut ParameterMap) {
        let defaults = Self::default();
        defaults.sole_position.register_defaults(params, SOLE_POSITION);
        defaults.foot.position.register_defaults(params, FOOT_POSITION);
        defaults
            .foot
            .orientation
            .register_defaults(params, FOOT_ORIENTATION);
        params.set_default(SWING_MASS, &[defaults.swing_mass_kg]);
        params.set_default(SWING_DAMPING, &[defaults.swing_damping_ns_m]);
        params.set_default(
            TOUCHDOWN_HEIGHT_THRESHOLD,
            &[defaults.touchdown_height_threshold_m],
        );
        params.set_default(MAX_TOUCHDOWN_DELAY, &[defaults.max_touchdown_delay_s]);
        params.set_default(SWING_GROUND_CLEARANCE, &[defaults.swing.ground_clearance_m]);
        params.set_default(
            SWING_TOUCHDOWN_VELOCITY,
            &[defaults.swing.touchdown_velocity_mps],
        );
        params.set_default(
            FOOT_MAX_LINEAR_ACCELERATION,
            &[defaults.max_linear_acceleration_mps2],
        );
        params.set_default(
            FOOT_MAX_ANGULAR_ACCELERATION,
            &[defaults.max_angular_acceleration_radps2],
        );
    }

    fn from_parameters(params: &ParameterMap) -> Result<Self, ParamError> {
        Ok(Self {
            sole_position: PidGains::from_parameters(params, SOLE_POSITION)?,
            foot: Se3PidGains {
                position: PidGains::from_parameters(params, FOOT_POSITION)?,
                orientation: PidGains::from_parameters(params, FOOT_ORIENTATION)?,
            },
            swing_mass_kg: params.get(SWING_MASS)?,
            swing_damping_ns_m: params.get(SWING_DAMPING)?,
            touchdown_height_threshold_m: params.get(TOUCHDOWN_HEIGHT_THRESHOLD)?,
            max_touchdown_delay_s: params.get(MAX_TOUCHDOWN_DELAY)?,
            swing: SwingParams {
                ground_clearance_m: params.get(SWING_GROUND_CLEARANCE)?,
                touchdown_velocity_mps: params.get(SWING_TOUCHDOWN_VELOCITY)?,
            },
            max_linear_acceleration_mps2: params.get(FOOT_MAX_LINEAR_ACCELERATION)?,
            max_angular_acceleration_radps2: params.get(FOOT_MAX_ANGULAR_ACCELERATION)?,
        })
    }
}

impl VirtualModelStepController {
    pub fn new<M: FullRobotModel, I: ControllerInputProvider>(
        env: &mut RuntimeEnvironment<M, I>,
    ) -> Result<Self, ForceControllerError> {
        let balance = BalanceCore::new(env, STEP_PARAMS_NAMESPACE)?;
        SwingLegParams::register_defaults(env.params.namespace_mut(STEP_PARAMS_NAMESPACE));

        let world_frame = env.world_frame();
        let sole_frames = QuadrantMap::from_fn(|q| env.model.sole_frame(q));
        let control_dt_s = env.control_dt();

        Ok(Self {
            balance,
            world_frame,
            sole_frames,
            control_dt_s,
            feet: build_feet(&sole_frames, world_frame, control_dt_s, &SwingParams::default()),
            leg_params: SwingLegParams::default(),
            plan: Vec::new(),
            next_step: 0,
            active: QuadrantMap::splat(None),
            num_cycles: 0,
            completed: false,
        })
    }

    pub fn balance(&self) -> &BalanceCore {
        &self.balance
    }

    pub fn foot(&self, quadrant: RobotQuadrant) -> &FootControlModule {
        &self.feet[quadrant]
    }

    /// Time since the controller was entered.
    ///
    /// Units: seconds
    pub fn time_in_state(&self) -> f64 {
        self.num_cycles as f64 * self.control_dt_s
    }

    /// Number of steps of the plan not yet started.
    pub fn num_pending_steps(&self) -> usize {
        self.plan.len() - self.next_step
    }

    /// Replace the step plan.
    ///
    /// Steps are executed in order of start time, steps whose start time has
    /// already passed start on the next cycle. Steps being executed are not
    /// affected.
    ///
    /// # Errors
    /// - If a step ends before it starts.
    /// - If two steps of the same foot overlap.
    pub fn set_step_plan(
        &mut self,
        mut steps: Vec<QuadrupedTimedStep>,
    ) -> Result<(), ForceControllerError> {
        for step in steps.iter() {
            if !step.start_time_s.is_finite()
                || !step.end_time_s.is_finite()
                || step.end_time_s <= step.start_time_s
            {
                return Err(ForceControllerError::InvalidStepPlan(format!(
                    "{} step from {} s to {} s",
                    step.quadrant.name(),
                    step.start_time_s,
                    step.end_time_s
                )));
            }
        }

        steps.sort_by_key(|s| OrderedFloat(s.start_time_s));

        let mut last_end: QuadrantMap<Option<f64>> = QuadrantMap::splat(None);
        for step in steps.iter() {
            if let Some(end) = last_end[step.quadrant] {
                if step.start_time_s < end {
                    return Err(ForceControllerError::InvalidStepPlan(format!(
                        "{} step at {} s starts before the previous one ends at {} s",
                        step.quadrant.name(),
                        step.start_time_s,
                        end
                    )));
                }
            }
            last_end[step.quadrant] = Some(step.end_time_s);
        }

        info!("New step plan of {} steps", steps.len());
        self.plan = steps;
        self.next_step = 0;
        self.completed = false;

        Ok(())
    }

    /// Request a push recovery of the swing of `quadrant`, which will then
    /// touch down in `time_remaining_s`.
    ///
    /// Returns `false` if the foot is not swinging.
    pub fn replan_swing(&mut self, quadrant: RobotQuadrant, time_remaining_s: f64) -> bool {
        let step = match self.active[quadrant].as_mut() {
            Some(s) => s,
            None => {
                warn!(
                    "Swing replan requested for {} which is not stepping",
                    quadrant.name()
                );
                return false;
            }
        };

        if !self.feet[quadrant].replan_trajectory(time_remaining_s) {
            return false;
        }

        step.end_time_s = self.num_cycles as f64 * self.control_dt_s + time_remaining_s;
        debug!(
            "{} step now ends at {:.3} s",
            quadrant.name(),
            step.end_time_s
        );

        true
    }

    /// Start and end steps according to the plan.
    fn update_step_plan(&mut self, frames: &FrameGraph) {
        // Half a cycle of slack on the times
        let t = self.time_in_state() + 0.5 * self.control_dt_s;

        let world = self.world_frame;
        let threshold_m = self.leg_params.touchdown_height_threshold_m;

        for q in RobotQuadrant::ALL.iter().copied() {
            let step = match self.active[q] {
                Some(s) if s.end_time_s <= t => s,
                _ => continue,
            };

            let sole = FramePoint::origin(self.sole_frames[q]).changed_to(frames, world);
            let height_m = sole.z() - step.goal_position.changed_to(frames, world).z();

            if height_m <= threshold_m {
                info!("{} step touching down", q.name());
            } else if t - step.end_time_s >= self.leg_params.max_touchdown_delay_s {
                warn!(
                    "{} step forced down {:.3} m above its goal",
                    q.name(),
                    height_m
                );
            } else {
                continue;
            }

            self.feet[q].request_state(FootRequest::Support);
            self.active[q] = None;
        }

        while let Some(step) = self.plan.get(self.next_step).copied() {
            if step.start_time_s > t {
                break;
            }
            self.next_step += 1;

            let q = step.quadrant;
            if self.active[q].is_some() {
                warn!("{} is still stepping, step skipped", q.name());
                continue;
            }

            let footstep = FramePose::from_parts(
                &step.goal_position.changed_to(frames, world),
                &FrameOrientation::identity(self.sole_frames[q]).changed_to(frames, world),
            );
            info!("{} step lifting off", q.name());
            self.feet[q].request_state(FootRequest::Swing {
                footstep,
                swing_time_s: step.end_time_s - step.start_time_s,
            });
            self.active[q] = Some(step);
        }
    }

    /// Feed the swing setpoints of the feet to the task-space controller.
    fn update_swing_setpoints(&mut self, frames: &FrameGraph) {
        let world = self.world_frame;
        let damping = self.leg_params.swing_damping_ns_m;
        let mass = self.leg_params.swing_mass_kg;
        let setpoints = &mut self.balance.setpoints;
        let settings = &mut self.balance.settings;

        for (q, foot) in self.feet.iter() {
            settings.set_contact_state(q, foot.contact_state());

            match (foot.desired(), foot.acceleration()) {
                (Some(desired), Some(acceleration)) => {
                    setpoints.sole_position[q] = desired.position;
                    setpoints.sole_linear_velocity[q] = desired.linear_velocity;
                    let inertial = acceleration
                        .linear_part()
                        .changed_to(frames, world)
                        .scale(mass);
                    let viscous = desired.linear_velocity.changed_to(frames, world).scale(damping);
                    setpoints.sole_force_feedforward[q] = viscous + inertial;
                }
                _ => setpoints.sole_force_feedforward[q] = FrameVector::zero(world),
            }
        }
    }

    fn record_telemetry<M, I>(&self, env: &mut RuntimeEnvironment<M, I>) {
        self.balance.record_telemetry(env);

        for (q, foot) in self.feet.iter() {
            let in_contact = match foot.contact_state() {
                ContactState::InContact => 1.0,
                ContactState::NoContact => 0.0,
            };
            env.telemetry
                .record(&format!("{}_in_contact", q.name()), in_contact);
        }
    }
}

impl<M: FullRobotModel, I: ControllerInputProvider> Controller<RuntimeEnvironment<M, I>>
    for VirtualModelStepController
{
    type Event = ForceControllerEvent;
    type Error = ForceControllerError;

    fn on_entry(&mut self, env: &mut RuntimeEnvironment<M, I>) -> Result<(), Self::Error> {
        info!("Entering step with {} steps planned", self.plan.len());

        self.balance.on_entry(env)?;

        let params = SwingLegParams::from_parameters(env.params.namespace_mut(STEP_PARAMS_NAMESPACE))?;
        debug!("Swing leg parameters: {:?}", params);

        self.feet = build_feet(
            &self.sole_frames,
            self.world_frame,
            self.control_dt_s,
            &params.swing,
        );
        for (q, foot) in self.feet.iter_mut() {
            foot.set_gains(&params.foot);
            foot.set_maximum_accelerations(
                params.max_linear_acceleration_mps2,
                params.max_angular_acceleration_radps2,
            );
            self.balance
                .settings
                .set_sole_position_feedback_gains(q, params.sole_position.clone());
        }
        self.leg_params = params;

        self.next_step = 0;
        self.active = QuadrantMap::splat(None);
        self.num_cycles = 0;
        self.completed = false;

        Ok(())
    }

    fn process(
        &mut self,
        env: &mut RuntimeEnvironment<M, I>,
    ) -> Result<Option<Self::Event>, Self::Error> {
        self.balance.update_com_height(env)?;

        self.update_step_plan(&env.frames);

        // Swing feet count at their goal in the support polygon
        let footholds = QuadrantMap::from_fn(|q| self.active[q].map(|s| s.goal_position));
        self.balance.update_estimates(env, &footholds);

        for (_, foot) in self.feet.iter_mut() {
            foot.compute(&env.model, &env.frames);
        }
        self.update_swing_setpoints(&env.frames);

        self.balance.update_setpoints(env);
        self.record_telemetry(env);

        self.num_cycles += 1;

        let done = self.next_step == self.plan.len() && self.active.values().all(Option::is_none);
        if done && !self.completed {
            info!("Step plan completed");
            self.completed = true;
            return Ok(Some(ForceControllerEvent::StepsCompleted));
        }

        Ok(None)
    }

    fn on_exit(&mut self, _env: &mut RuntimeEnvironment<M, I>) -> Result<(), Self::Error> {
        let num_abandoned = self.num_pending_steps()
            + self.active.values().filter(|s| s.is_some()).count();
        if num_abandoned > 0 {
            warn!("Leaving step with {} steps not completed", num_abandoned);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn build_feet(
    sole_frames: &QuadrantMap<FrameId>,
    world_frame: FrameId,
    control_dt_s: f64,
    params: &SwingParams,
) -> QuadrantMap<FootControlModule> {
    QuadrantMap::from_fn(|q| {
        FootControlModule::new(q, sole_frames[q], world_frame, control_dt_s, params.clone())
    })
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::force_ctrl::test_support::{environment, run_for, TestEnvironment};
    use crate::telemetry::MemorySink;
    use approx::assert_abs_diff_eq;

    fn step_forward(
        env: &TestEnvironment,
        quadrant: RobotQuadrant,
        start_time_s: f64,
        end_time_s: f64,
    ) -> QuadrupedTimedStep {
        let sole = env.model.sole_position_in_world(quadrant);
        QuadrupedTimedStep {
            quadrant,
            goal_position: FramePoint::from_xyz(env.world_frame(), sole.x + 0.1, sole.y, sole.z),
            start_time_s,
            end_time_s,
        }
    }

    /// Run the controller, returning the times at which it emitted
    /// `StepsCompleted`.
    fn run_steps(
        env: &mut TestEnvironment,
        step: &mut VirtualModelStepController,
        duration_s: f64,
    ) -> Vec<f64> {
        let mut completed_at = Vec::new();
        run_for(env, duration_s, |env| {
            if let Some(ForceControllerEvent::StepsCompleted) = step.process(env).unwrap() {
                completed_at.push(env.clock.time_s());
            }
            *step.balance().contact_states()
        });
        completed_at
    }

    #[test]
    fn test_invalid_plans() {
        let mut env = environment(MemorySink::new());
        let mut step = VirtualModelStepController::new(&mut env).unwrap();

        let backwards = step_forward(&env, RobotQuadrant::FrontLeft, 0.5, 0.2);
        assert!(matches!(
            step.set_step_plan(vec![backwards]),
            Err(ForceControllerError::InvalidStepPlan(_))
        ));

        let overlapping = vec![
            step_forward(&env, RobotQuadrant::HindLeft, 0.6, 0.9),
            step_forward(&env, RobotQuadrant::HindLeft, 0.2, 0.7),
        ];
        assert!(matches!(
            step.set_step_plan(overlapping),
            Err(ForceControllerError::InvalidStepPlan(_))
        ));

        assert!(step.set_step_plan(Vec::new()).is_ok());
    }

    #[test]
    fn test_empty_plan_completes() {
        let mut env = environment(MemorySink::new());
        let mut step = VirtualModelStepController::new(&mut env).unwrap();
        step.on_entry(&mut env).unwrap();

        assert_eq!(
            step.process(&mut env).unwrap(),
            Some(ForceControllerEvent::StepsCompleted)
        );
        assert_eq!(step.process(&mut env).unwrap(), None);
    }

    #[test]
    fn test_walk_forward() {
        let sink = MemorySink::new();
        let mut env = environment(sink.clone());
        let mut step = VirtualModelStepController::new(&mut env).unwrap();

        let plan = vec![
            step_forward(&env, RobotQuadrant::HindLeft, 0.2, 0.5),
            step_forward(&env, RobotQuadrant::FrontLeft, 0.6, 0.9),
            step_forward(&env, RobotQuadrant::HindRight, 1.0, 1.3),
            step_forward(&env, RobotQuadrant::FrontRight, 1.4, 1.7),
        ];
        step.set_step_plan(plan.clone()).unwrap();
        step.on_entry(&mut env).unwrap();
        assert_eq!(step.num_pending_steps(), 4);

        // First swing
        let completed_at = run_steps(&mut env, &mut step, 0.3);
        assert!(completed_at.is_empty());
        assert_eq!(
            step.foot(RobotQuadrant::HindLeft).contact_state(),
            ContactState::NoContact
        );
        assert_eq!(sink.latest("hind_left_in_contact"), Some(0.0));
        assert_eq!(sink.latest("front_left_in_contact"), Some(1.0));

        let completed_at = run_steps(&mut env, &mut step, 3.7);
        assert_eq!(completed_at.len(), 1);
        assert_abs_diff_eq!(completed_at[0], 1.7, epsilon = 0.01);
        assert_eq!(step.num_pending_steps(), 0);

        for s in plan.iter() {
            assert_eq!(step.foot(s.quadrant).contact_state(), ContactState::InContact);
            assert_abs_diff_eq!(
                env.model.sole_position_in_world(s.quadrant),
                *s.goal_position.point(),
                epsilon = 1e-2
            );
        }

        // The body followed the feet
        let com = env.model.com_position();
        assert_abs_diff_eq!(com.x(), 0.1, epsilon = 1e-2);
        assert_abs_diff_eq!(com.y(), 0.0, epsilon = 1e-2);
        assert_abs_diff_eq!(com.z(), 0.5, epsilon = 1e-2);
    }

    #[test]
    fn test_push_recovery() {
        let mut env = environment(MemorySink::new());
        let mut step = VirtualModelStepController::new(&mut env).unwrap();

        let q = RobotQuadrant::FrontLeft;
        let plan = vec![step_forward(&env, q, 0.1, 0.5)];
        step.set_step_plan(plan.clone()).unwrap();
        step.on_entry(&mut env).unwrap();

        assert!(!step.replan_swing(q, 0.1));

        // Halfway through the swing, land in 0.1 s instead of 0.2 s
        assert!(run_steps(&mut env, &mut step, 0.3).is_empty());
        assert!(!step.replan_swing(RobotQuadrant::HindRight, 0.1));
        assert!(step.replan_swing(q, 0.1));

        let goal = *plan[0].goal_position.point();
        let mut max_height = f64::NEG_INFINITY;
        let mut touchdown_height = None;
        let mut completed_at = Vec::new();
        run_for(&mut env, 0.5, |env| {
            if let Some(ForceControllerEvent::StepsCompleted) = step.process(env).unwrap() {
                completed_at.push(env.clock.time_s());
            }

            let z = env.model.sole_position_in_world(q).z;
            match step.foot(q).contact_state() {
                ContactState::NoContact => max_height = max_height.max(z),
                ContactState::InContact => {
                    touchdown_height.get_or_insert(z);
                }
            }
            *step.balance().contact_states()
        });

        assert_eq!(completed_at.len(), 1);
        assert_abs_diff_eq!(completed_at[0], 0.4, epsilon = 0.01);

        // The shortened swing does not fly higher than the nominal one and
        // the foot is on the ground when it goes back into support
        assert!(max_height < goal.z + 0.14, "swing went up to {}", max_height);
        let touchdown_height = touchdown_height.unwrap();
        assert!(touchdown_height <= goal.z + 0.005 + 1e-9);
        assert!(touchdown_height > goal.z - 0.01);

        assert_eq!(step.foot(q).contact_state(), ContactState::InContact);
        assert_abs_diff_eq!(env.model.sole_position_in_world(q), goal, epsilon = 1e-2);
    }
}
