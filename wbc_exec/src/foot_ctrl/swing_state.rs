//! Swing state of a foot
//!
//! On entry the nominal trajectory chain (two-waypoint swing followed by a
//! soft touchdown) and the orientation interpolation are seeded from the
//! measured sole pose and velocity towards the commanded footstep.
//!
//! A push recovery replan can be requested at any time during the swing. The
//! request is consumed on the next call to `compute`, which seeds the push
//! recovery chain from the state of the tracked chain (nominal, or the
//! previous push recovery one) at that instant and allots it the requested
//! remaining time. Its waypoints are never placed
//! higher than the nominal ones. The push recovery chain is then tracked until
//! the end of the swing.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// Internal
use super::{
    OrientationInterpolationTrajectory, PositionTrajectoryChain, PositionTrajectoryGenerator,
    PositionTrajectoryPoint, SoftTouchdownPositionTrajectory, TwoWaypointPositionTrajectory,
};
use crate::frames::{check_frames_match, FrameId, FrameOrientation, FramePoint, FramePose, FrameVector};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the swing trajectories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingParams {
    /// Height of the swing waypoints above the higher of the start and end
    /// points
    ///
    /// Units: meters
    pub ground_clearance_m: f64,

    /// Vertical velocity of the foot at touchdown, negative downwards
    ///
    /// Units: meters/second
    pub touchdown_velocity_mps: f64,
}

/// Desired motion of the sole for one cycle, in the swing frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SwingSetpoint {
    pub position: FramePoint,
    pub linear_velocity: FrameVector,
    pub linear_acceleration: FrameVector,
    pub orientation: FrameOrientation,
    pub angular_velocity: FrameVector,
    pub angular_acceleration: FrameVector,
}

/// State of a single swing.
#[derive(Debug)]
pub struct SwingState {
    /// Frame all trajectories are expressed in
    frame: FrameId,

    params: SwingParams,

    footstep: FramePose,

    /// Units: seconds
    swing_time_s: f64,

    /// Height of the nominal waypoints
    ///
    /// Units: meters
    waypoint_height_m: f64,

    nominal: PositionTrajectoryChain,
    push_recovery: Option<PositionTrajectoryChain>,
    orientation: OrientationInterpolationTrajectory,

    replan: ReplanState,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Push recovery replanning state of a swing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ReplanState {
    /// Tracking the nominal chain
    Nominal,

    /// A replan will happen on the next compute
    ReplanRequested { time_remaining_s: f64 },

    /// Tracking the push recovery chain until the end of the swing
    Replanned,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SwingParams {
    fn default() -> Self {
        Self {
            ground_clearance_m: 0.1,
            touchdown_velocity_mps: -0.1,
        }
    }
}

impl SwingState {
    /// Start a swing from the measured sole pose and linear velocity towards
    /// `footstep`.
    ///
    /// All poses and velocities must be expressed in the same frame, which
    /// becomes the frame of the swing.
    pub fn new(
        params: &SwingParams,
        initial_pose: &FramePose,
        initial_velocity: &FrameVector,
        footstep: &FramePose,
        swing_time_s: f64,
    ) -> Self {
        let frame = initial_pose.frame();
        check_frames_match(frame, initial_velocity.frame());
        check_frames_match(frame, footstep.frame());

        let initial = PositionTrajectoryPoint::new(
            *initial_pose.position().point(),
            *initial_velocity.vector(),
        );

        let waypoint_height_m =
            initial.position.z.max(footstep.position().z()) + params.ground_clearance_m;
        let nominal = Self::build_chain(
            params,
            0.0,
            &initial,
            footstep,
            swing_time_s,
            waypoint_height_m,
        );
        let orientation = OrientationInterpolationTrajectory::new(
            initial_pose.isometry().rotation,
            footstep.isometry().rotation,
            swing_time_s,
        );

        debug!(
            "Swing started towards {:?} over {:.3} s",
            footstep.isometry().translation.vector,
            swing_time_s
        );

        Self {
            frame,
            params: params.clone(),
            footstep: *footstep,
            swing_time_s,
            waypoint_height_m,
            nominal,
            push_recovery: None,
            orientation,
            replan: ReplanState::Nominal,
        }
    }

    pub fn footstep(&self) -> &FramePose {
        &self.footstep
    }

    pub fn swing_time(&self) -> f64 {
        self.swing_time_s
    }

    pub fn replan_state(&self) -> ReplanState {
        self.replan
    }

    /// Request a push recovery replan, to land on the same footstep
    /// `time_remaining_s` after the next compute.
    ///
    /// A later request before the next compute replaces this one.
    pub fn replan_trajectory(&mut self, time_remaining_s: f64) {
        self.replan = ReplanState::ReplanRequested { time_remaining_s };
    }

    /// Compute the desired motion `time_in_state_s` after the start of the
    /// swing.
    pub fn compute(&mut self, time_in_state_s: f64) -> SwingSetpoint {
        if let ReplanState::ReplanRequested { time_remaining_s } = self.replan {
            // Seeded from whichever chain is being tracked
            let seed = match &self.push_recovery {
                Some(chain) => chain.compute(time_in_state_s),
                None => self.nominal.compute(time_in_state_s),
            };
            let height = (seed.position.z.max(self.footstep.position().z())
                + self.params.ground_clearance_m)
                .min(self.waypoint_height_m);
            self.push_recovery = Some(Self::build_chain(
                &self.params,
                time_in_state_s,
                &seed,
                &self.footstep,
                time_remaining_s,
                height,
            ));
            self.replan = ReplanState::Replanned;

            info!(
                "Swing replanned at {:.3} s, {:.3} s remaining",
                time_in_state_s, time_remaining_s
            );
        }

        let linear = match (&self.replan, &self.push_recovery) {
            (ReplanState::Replanned, Some(chain)) => chain.compute(time_in_state_s),
            _ => self.nominal.compute(time_in_state_s),
        };
        let angular = self.orientation.compute(time_in_state_s);

        SwingSetpoint {
            position: FramePoint::new(self.frame, linear.position),
            linear_velocity: FrameVector::new(self.frame, linear.velocity),
            linear_acceleration: FrameVector::new(self.frame, linear.acceleration),
            orientation: FrameOrientation::new(self.frame, angular.orientation),
            angular_velocity: FrameVector::new(self.frame, angular.angular_velocity),
            angular_acceleration: FrameVector::new(self.frame, angular.angular_acceleration),
        }
    }

    fn build_chain(
        params: &SwingParams,
        start_time_s: f64,
        initial: &PositionTrajectoryPoint,
        footstep: &FramePose,
        duration_s: f64,
        waypoint_height_m: f64,
    ) -> PositionTrajectoryChain {
        let final_position = *footstep.position().point();
        let touchdown_velocity = Vector3::new(0.0, 0.0, params.touchdown_velocity_mps);

        PositionTrajectoryChain::new(
            start_time_s,
            Box::new(TwoWaypointPositionTrajectory::new(
                initial,
                &final_position,
                &touchdown_velocity,
                duration_s,
                waypoint_height_m,
            )),
        )
        .then(Box::new(SoftTouchdownPositionTrajectory::new(
            final_position,
            touchdown_velocity,
        )))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
