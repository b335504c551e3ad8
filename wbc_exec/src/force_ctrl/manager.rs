//! Force controller manager
//!
//! State machine over the force controllers. Requests are queued and taken
//! at the start of the next cycle: the active controller is exited, the new
//! one built and entered, then processed in the same cycle. When the step
//! controller completes its plan the manager goes back to stand.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};

// Internal
use super::{
    ControllerInputProvider, ForceControllerError, ForceControllerEvent, QuadrupedTimedStep,
    RuntimeEnvironment, VirtualModelStandController, VirtualModelStepController,
};
use crate::model::{ContactState, FullRobotModel, QuadrantMap, RobotQuadrant};
use util::module::Controller;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ForceControllerManager {
    state: ForceControllerState,

    /// Transition taken at the start of the next cycle
    pending: Option<ForceControllerRequest>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Active force controller.
#[derive(Debug)]
pub enum ForceControllerState {
    Stand(VirtualModelStandController),
    Step(VirtualModelStepController),
}

/// Controller requested from the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ForceControllerRequest {
    Stand,
    Step(Vec<QuadrupedTimedStep>),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ForceControllerState {
    pub fn name(&self) -> &'static str {
        match self {
            ForceControllerState::Stand(_) => "stand",
            ForceControllerState::Step(_) => "step",
        }
    }
}

impl ForceControllerManager {
    /// Create the manager, standing.
    ///
    /// The stand controller is entered by the manager's `on_entry`.
    pub fn new<M: FullRobotModel, I: ControllerInputProvider>(
        env: &mut RuntimeEnvironment<M, I>,
    ) -> Result<Self, ForceControllerError> {
        Ok(Self {
            state: ForceControllerState::Stand(VirtualModelStandController::new(env)?),
            pending: None,
        })
    }

    pub fn state(&self) -> &ForceControllerState {
        &self.state
    }

    /// Contact state of each leg as commanded on the last cycle.
    pub fn contact_states(&self) -> &QuadrantMap<ContactState> {
        match &self.state {
            ForceControllerState::Stand(c) => c.balance().contact_states(),
            ForceControllerState::Step(c) => c.balance().contact_states(),
        }
    }

    /// Queue a transition, replacing any request not yet taken.
    pub fn request_state(&mut self, request: ForceControllerRequest) {
        self.pending = Some(request);
    }

    /// Queue a transition into step with the given plan.
    pub fn set_step_plan(&mut self, steps: Vec<QuadrupedTimedStep>) {
        self.request_state(ForceControllerRequest::Step(steps));
    }

    /// Forward a push recovery request to the swing of `quadrant`.
    ///
    /// Returns `false` if the robot is not stepping or the foot is not
    /// swinging.
    pub fn replan_swing(&mut self, quadrant: RobotQuadrant, time_remaining_s: f64) -> bool {
        match &mut self.state {
            ForceControllerState::Step(step) => step.replan_swing(quadrant, time_remaining_s),
            ForceControllerState::Stand(_) => {
                warn!("Swing replan requested while standing, ignored");
                false
            }
        }
    }

    fn transition<M: FullRobotModel, I: ControllerInputProvider>(
        &mut self,
        request: ForceControllerRequest,
        env: &mut RuntimeEnvironment<M, I>,
    ) -> Result<(), ForceControllerError> {
        // Validate the new controller before leaving the current one
        let mut next = match request {
            ForceControllerRequest::Stand => {
                ForceControllerState::Stand(VirtualModelStandController::new(env)?)
            }
            ForceControllerRequest::Step(steps) => {
                let mut step = VirtualModelStepController::new(env)?;
                step.set_step_plan(steps)?;
                ForceControllerState::Step(step)
            }
        };

        info!(
            "Force controller transition {} -> {}",
            self.state.name(),
            next.name()
        );

        self.state.on_exit(env)?;
        next.on_entry(env)?;
        self.state = next;

        Ok(())
    }
}

impl<M: FullRobotModel, I: ControllerInputProvider> Controller<RuntimeEnvironment<M, I>>
    for ForceControllerState
{
    type Event = ForceControllerEvent;
    type Error = ForceControllerError;

    fn on_entry(&mut self, env: &mut RuntimeEnvironment<M, I>) -> Result<(), Self::Error> {
        match self {
            ForceControllerState::Stand(c) => c.on_entry(env),
            ForceControllerState::Step(c) => c.on_entry(env),
        }
    }

    fn process(
        &mut self,
        env: &mut RuntimeEnvironment<M, I>,
    ) -> Result<Option<Self::Event>, Self::Error> {
        match self {
            ForceControllerState::Stand(c) => c.process(env),
            ForceControllerState::Step(c) => c.process(env),
        }
    }

    fn on_exit(&mut self, env: &mut RuntimeEnvironment<M, I>) -> Result<(), Self::Error> {
        match self {
            ForceControllerState::Stand(c) => c.on_exit(env),
            ForceControllerState::Step(c) => c.on_exit(env),
        }
    }
}

impl<M: FullRobotModel, I: ControllerInputProvider> Controller<RuntimeEnvironment<M, I>>
    for ForceControllerManager
{
    type Event = ForceControllerEvent;
    type Error = ForceControllerError;

    fn on_entry(&mut self, env: &mut RuntimeEnvironment<M, I>) -> Result<(), Self::Error> {
        info!("Force controller manager starting in {}", self.state.name());
        self.state.on_entry(env)
    }

    fn process(
        &mut self,
        env: &mut RuntimeEnvironment<M, I>,
    ) -> Result<Option<Self::Event>, Self::Error> {
        if let Some(request) = self.pending.take() {
            self.transition(request, env)?;
        }

        let event = self.state.process(env)?;

        if let Some(ForceControllerEvent::StepsCompleted) = event {
            if self.pending.is_none() {
                self.request_state(ForceControllerRequest::Stand);
            }
        }

        Ok(event)
    }

    fn on_exit(&mut self, env: &mut RuntimeEnvironment<M, I>) -> Result<(), Self::Error> {
        self.state.on_exit(env)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::force_ctrl::test_support::{environment, run_for, TestEnvironment};
    use crate::frames::FramePoint;
    use crate::telemetry::MemorySink;
    use approx::assert_abs_diff_eq;

    fn single_step(env: &TestEnvironment) -> QuadrupedTimedStep {
        let q = RobotQuadrant::HindRight;
        let sole = env.model.sole_position_in_world(q);
        QuadrupedTimedStep {
            quadrant: q,
            goal_position: FramePoint::from_xyz(env.world_frame(), sole.x + 0.05, sole.y, sole.z),
            start_time_s: 0.05,
            end_time_s: 0.35,
        }
    }

    #[test]
    fn test_step_and_back() {
        let mut env = environment(MemorySink::new());
        let mut manager = ForceControllerManager::new(&mut env).unwrap();
        manager.on_entry(&mut env).unwrap();
        assert_eq!(manager.state().name(), "stand");
        assert!(!manager.replan_swing(RobotQuadrant::HindRight, 0.1));

        manager.set_step_plan(vec![single_step(&env)]);

        // Not taken until the next cycle
        assert_eq!(manager.state().name(), "stand");

        let mut events = Vec::new();
        let mut states = Vec::new();
        run_for(&mut env, 0.6, |env| {
            events.push(manager.process(env).unwrap());
            states.push(manager.state().name());
            *manager.contact_states()
        });

        assert_eq!(states[0], "step");
        let completed: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| **e == Some(ForceControllerEvent::StepsCompleted))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(completed.len(), 1);

        // Back to stand on the cycle after completion
        let i = completed[0];
        assert_eq!(states[i], "step");
        assert_eq!(states[i + 1], "stand");
        assert_eq!(manager.state().name(), "stand");

        let com = env.model.com_position();
        assert_abs_diff_eq!(com.z(), 0.5, epsilon = 1e-2);
    }

    #[test]
    fn test_invalid_plan_keeps_state() {
        let mut env = environment(MemorySink::new());
        let mut manager = ForceControllerManager::new(&mut env).unwrap();
        manager.on_entry(&mut env).unwrap();

        let mut step = single_step(&env);
        step.end_time_s = 0.0;
        manager.set_step_plan(vec![step]);

        assert!(matches!(
            manager.process(&mut env),
            Err(ForceControllerError::InvalidStepPlan(_))
        ));
        assert_eq!(manager.state().name(), "stand");

        // The request was dropped, standing carries on
        assert_eq!(manager.process(&mut env).unwrap(), None);
    }
}
