//! Foot control module
//!
//! Per-leg state machine switching a foot between support and swing. State
//! requests are queued and taken at the start of the next `compute`, so a
//! transition always happens on a cycle boundary.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};

// Internal
use super::{SwingParams, SwingSetpoint, SwingState};
use crate::accel_ctrl::{RigidBodySpatialAccelerationControlModule, Se3PidGains};
use crate::frames::{
    FrameGraph, FrameId, FrameOrientation, FramePoint, FramePose, SpatialAcceleration,
};
use crate::model::{ContactState, FullRobotModel, RobotQuadrant};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FootControlModule {
    quadrant: RobotQuadrant,

    world_frame: FrameId,
    sole_frame: FrameId,

    /// Units: seconds
    control_dt_s: f64,

    params: SwingParams,

    state: FootState,

    /// Transition taken on the next compute
    pending: Option<FootRequest>,

    /// Units: seconds
    time_in_state_s: f64,

    /// Setpoint of the last swing cycle
    desired: Option<SwingSetpoint>,

    accel_module: RigidBodySpatialAccelerationControlModule,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// State of a foot.
#[derive(Debug)]
pub enum FootState {
    Support,
    Swing(Box<SwingState>),
}

/// Requested state of a foot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FootRequest {
    Support,
    Swing {
        /// Target pose of the sole at touchdown
        footstep: FramePose,

        /// Units: seconds
        swing_time_s: f64,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FootControlModule {
    /// Create the module for one foot, starting in support.
    pub fn new(
        quadrant: RobotQuadrant,
        sole_frame: FrameId,
        world_frame: FrameId,
        control_dt_s: f64,
        params: SwingParams,
    ) -> Self {
        Self {
            quadrant,
            world_frame,
            sole_frame,
            control_dt_s,
            params,
            state: FootState::Support,
            pending: None,
            time_in_state_s: 0.0,
            desired: None,
            accel_module: RigidBodySpatialAccelerationControlModule::new(
                &format!("{}_foot", quadrant.name()),
                sole_frame,
                control_dt_s,
            ),
        }
    }

    pub fn quadrant(&self) -> RobotQuadrant {
        self.quadrant
    }

    pub fn state(&self) -> &FootState {
        &self.state
    }

    pub fn time_in_state(&self) -> f64 {
        self.time_in_state_s
    }

    pub fn contact_state(&self) -> ContactState {
        match self.state {
            FootState::Support => ContactState::InContact,
            FootState::Swing(_) => ContactState::NoContact,
        }
    }

    /// Queue a transition, replacing any request not yet taken.
    pub fn request_state(&mut self, request: FootRequest) {
        self.pending = Some(request);
    }

    /// Request a push recovery replan of the current swing.
    ///
    /// Returns `false` (and does nothing) if the foot is not swinging.
    pub fn replan_trajectory(&mut self, time_remaining_s: f64) -> bool {
        match &mut self.state {
            FootState::Swing(swing) => {
                swing.replan_trajectory(time_remaining_s);
                true
            }
            FootState::Support => {
                warn!(
                    "Replan requested on {} which is not swinging, ignored",
                    self.quadrant.name()
                );
                false
            }
        }
    }

    /// Desired motion of the sole on the last swing cycle, `None` in support.
    pub fn desired(&self) -> Option<&SwingSetpoint> {
        self.desired.as_ref()
    }

    /// Spatial acceleration command of the sole on the last swing cycle,
    /// `None` in support.
    pub fn acceleration(&self) -> Option<SpatialAcceleration> {
        match self.state {
            FootState::Swing(_) => {
                let sole = self.sole_frame;
                let mut acceleration = SpatialAcceleration::zero(sole, self.world_frame, sole);
                self.accel_module.pack_acceleration(&mut acceleration);
                Some(acceleration)
            }
            FootState::Support => None,
        }
    }

    pub fn set_gains(&mut self, gains: &Se3PidGains) {
        self.accel_module.set_gains(gains);
    }

    pub fn set_maximum_accelerations(&mut self, linear_mps2: f64, angular_radps2: f64) {
        self.accel_module
            .set_maximum_linear_acceleration_magnitude(linear_mps2);
        self.accel_module
            .set_maximum_angular_acceleration_magnitude(angular_radps2);
        self.accel_module.set_limit_accelerations(true);
    }

    /// Run one cycle of the foot.
    ///
    /// The frame graph must already have been updated from the model.
    pub fn compute<M: FullRobotModel>(&mut self, model: &M, frames: &FrameGraph) {
        if let Some(request) = self.pending.take() {
            self.enter(request, model, frames);
        }

        let swing = match &mut self.state {
            FootState::Swing(swing) => swing,
            FootState::Support => {
                self.time_in_state_s += self.control_dt_s;
                return;
            }
        };

        let setpoint = swing.compute(self.time_in_state_s);

        self.accel_module.do_position_control_from_parts(
            model,
            frames,
            &setpoint.position,
            &setpoint.orientation,
            &setpoint.linear_velocity,
            &setpoint.angular_velocity,
            &setpoint.linear_acceleration,
            &setpoint.angular_acceleration,
            self.world_frame,
        );

        self.desired = Some(setpoint);
        self.time_in_state_s += self.control_dt_s;
    }

    fn enter<M: FullRobotModel>(&mut self, request: FootRequest, model: &M, frames: &FrameGraph) {
        let world = self.world_frame;
        self.time_in_state_s = 0.0;
        self.desired = None;

        match request {
            FootRequest::Support => {
                info!("{} foot entering support", self.quadrant.name());
                self.state = FootState::Support;
            }
            FootRequest::Swing {
                footstep,
                swing_time_s,
            } => {
                info!("{} foot entering swing", self.quadrant.name());

                let sole = self.sole_frame;
                let initial_pose = FramePose::from_parts(
                    &FramePoint::origin(sole).changed_to(frames, world),
                    &FrameOrientation::identity(sole).changed_to(frames, world),
                );
                let initial_velocity = model
                    .relative_twist(frames, world, sole)
                    .linear_part()
                    .changed_to(frames, world);

                self.accel_module.reset();
                self.state = FootState::Swing(Box::new(SwingState::new(
                    &self.params,
                    &initial_pose,
                    &initial_velocity,
                    &footstep.changed_to(frames, world),
                    swing_time_s,
                )));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::foot_ctrl::ReplanState;
    use crate::model::{CartesianQuadrupedModel, QuadrupedModelParams};
    use approx::assert_abs_diff_eq;
    use nalgebra::{Isometry3, Point3};

    fn setup() -> (FrameGraph, CartesianQuadrupedModel, FootControlModule) {
        let mut frames = FrameGraph::new();
        let model = CartesianQuadrupedModel::new(QuadrupedModelParams::default(), &mut frames);
        let q = RobotQuadrant::FrontLeft;
        let foot = FootControlModule::new(
            q,
            model.sole_frame(q),
            frames.world(),
            0.004,
            SwingParams::default(),
        );
        (frames, model, foot)
    }

    fn swing_request(frames: &FrameGraph) -> FootRequest {
        FootRequest::Swing {
            footstep: FramePose::new(frames.world(), Isometry3::translation(0.5, 0.2, 0.0)),
            swing_time_s: 0.4,
        }
    }

    #[test]
    fn test_transitions_on_cycle_boundary() {
        let (frames, model, mut foot) = setup();

        foot.request_state(swing_request(&frames));
        assert_eq!(foot.contact_state(), ContactState::InContact);
        assert!(foot.desired().is_none());

        foot.compute(&model, &frames);
        assert_eq!(foot.contact_state(), ContactState::NoContact);
        assert_abs_diff_eq!(foot.time_in_state(), 0.004, epsilon = 1e-12);

        // First setpoint is the measured sole position
        let desired = foot.desired().unwrap();
        assert_abs_diff_eq!(
            *desired.position.point(),
            model.sole_position_in_world(RobotQuadrant::FrontLeft),
            epsilon = 1e-12
        );

        // Acceleration is expressed in the sole frame
        let sole = model.sole_frame(RobotQuadrant::FrontLeft);
        assert_eq!(foot.acceleration().unwrap().expressed_in, sole);

        foot.request_state(FootRequest::Support);
        assert_eq!(foot.contact_state(), ContactState::NoContact);
        foot.compute(&model, &frames);
        assert_eq!(foot.contact_state(), ContactState::InContact);
        assert!(foot.desired().is_none());
        assert!(foot.acceleration().is_none());
    }

    #[test]
    fn test_replan() {
        let (frames, model, mut foot) = setup();

        // Ignored in support, and not carried over into the next swing
        assert!(!foot.replan_trajectory(0.1));
        foot.compute(&model, &frames);
        assert_eq!(foot.contact_state(), ContactState::InContact);

        foot.request_state(swing_request(&frames));
        foot.compute(&model, &frames);
        match foot.state() {
            FootState::Swing(swing) => assert_eq!(swing.replan_state(), ReplanState::Nominal),
            FootState::Support => panic!("Foot should be swinging"),
        }
        for _ in 0..9 {
            foot.compute(&model, &frames);
        }
        assert!(foot.replan_trajectory(0.1));
        foot.compute(&model, &frames);

        match foot.state() {
            FootState::Swing(swing) => assert_eq!(swing.replan_state(), ReplanState::Replanned),
            FootState::Support => panic!("Foot should be swinging"),
        }

        // Lands on the footstep once the remaining time has passed
        for _ in 0..25 {
            foot.compute(&model, &frames);
        }
        assert_abs_diff_eq!(
            *foot.desired().unwrap().position.point(),
            Point3::new(0.5, 0.2, 0.0),
            epsilon = 1e-3
        );
    }
}
