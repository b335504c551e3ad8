//! # Robot model module
//!
//! The controllers do not own a robot model, they read one through the
//! [`FullRobotModel`] trait each cycle and write desired joint efforts back
//! into it. [`CartesianQuadrupedModel`] is a simple implementation with
//! prismatic legs, used by the executable and by tests.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod cartesian;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

// Internal
use crate::frames::{FrameGraph, FrameId, FramePoint, FrameVector, Twist};

pub use cartesian::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A value for each leg of a quadruped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QuadrantMap<T>([T; 4]);

/// A single degree of freedom joint.
#[derive(Debug, Clone, Serialize)]
pub struct OneDofJoint {
    name: String,

    /// Joint position (m or rad)
    pub position: f64,

    /// Joint velocity (m/s or rad/s)
    pub velocity: f64,

    /// Effort requested by the controllers (N or Nm)
    pub desired_effort: f64,

    /// Maximum absolute effort the joint can produce
    pub effort_limit: f64,

    pub control_mode: JointControlMode,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Legs of a quadruped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotQuadrant {
    FrontLeft,
    FrontRight,
    HindLeft,
    HindRight,
}

/// Whether a limb bears load against the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactState {
    InContact,
    NoContact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointControlMode {
    Position,
    Force,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Computes relative velocities between frames of the robot.
pub trait TwistCalculator {
    /// Twist of `body` relative to `base`, expressed in `body`.
    ///
    /// # Panics
    /// - If either frame is not attached to the robot (or the world).
    fn relative_twist(&self, frames: &FrameGraph, base: FrameId, body: FrameId) -> Twist;
}

/// Kinematic and dynamic model of a quadruped.
pub trait FullRobotModel: TwistCalculator {
    /// Total mass of the robot (kg).
    fn total_mass(&self) -> f64;

    /// Frame attached to the floating base (body).
    fn body_frame(&self) -> FrameId;

    /// Frame attached to the sole of a leg.
    fn sole_frame(&self, quadrant: RobotQuadrant) -> FrameId;

    /// Centre of mass position, in world.
    fn com_position(&self) -> FramePoint;

    /// Centre of mass velocity, in world.
    fn com_velocity(&self) -> FrameVector;

    /// Names of the joints of a leg, in Jacobian column order.
    fn leg_joint_names(&self, quadrant: RobotQuadrant) -> &[String];

    fn joint(&self, name: &str) -> Option<&OneDofJoint>;

    fn joint_mut(&mut self, name: &str) -> Option<&mut OneDofJoint>;

    /// Jacobian mapping the leg's joint velocities onto the sole's linear
    /// velocity relative to the body, expressed in world.
    fn sole_jacobian(&self, quadrant: RobotQuadrant) -> DMatrix<f64>;

    /// Write the current model state into the frame graph.
    fn update_frames(&self, frames: &mut FrameGraph);
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RobotQuadrant {
    pub const ALL: [RobotQuadrant; 4] = [
        RobotQuadrant::FrontLeft,
        RobotQuadrant::FrontRight,
        RobotQuadrant::HindLeft,
        RobotQuadrant::HindRight,
    ];

    pub fn index(self) -> usize {
        match self {
            RobotQuadrant::FrontLeft => 0,
            RobotQuadrant::FrontRight => 1,
            RobotQuadrant::HindLeft => 2,
            RobotQuadrant::HindRight => 3,
        }
    }

    pub fn is_front(self) -> bool {
        matches!(self, RobotQuadrant::FrontLeft | RobotQuadrant::FrontRight)
    }

    /// +1 for legs on the left side, -1 on the right.
    pub fn side_sign(self) -> f64 {
        match self {
            RobotQuadrant::FrontLeft | RobotQuadrant::HindLeft => 1.0,
            _ => -1.0,
        }
    }

    /// +1 for front legs, -1 for hind legs.
    pub fn end_sign(self) -> f64 {
        if self.is_front() {
            1.0
        } else {
            -1.0
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RobotQuadrant::FrontLeft => "front_left",
            RobotQuadrant::FrontRight => "front_right",
            RobotQuadrant::HindLeft => "hind_left",
            RobotQuadrant::HindRight => "hind_right",
        }
    }
}

impl<T> QuadrantMap<T> {
    /// Build a map by evaluating `f` for each quadrant.
    pub fn from_fn<F: FnMut(RobotQuadrant) -> T>(mut f: F) -> Self {
        QuadrantMap([
            f(RobotQuadrant::FrontLeft),
            f(RobotQuadrant::FrontRight),
            f(RobotQuadrant::HindLeft),
            f(RobotQuadrant::HindRight),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = (RobotQuadrant, &T)> + '_ {
        RobotQuadrant::ALL.iter().copied().zip(self.0.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RobotQuadrant, &mut T)> + '_ {
        RobotQuadrant::ALL.iter().copied().zip(self.0.iter_mut())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.0.iter()
    }
}

impl<T: Clone> QuadrantMap<T> {
    pub fn splat(value: T) -> Self {
        Self::from_fn(|_| value.clone())
    }
}

impl<T> Index<RobotQuadrant> for QuadrantMap<T> {
    type Output = T;

    fn index(&self, q: RobotQuadrant) -> &T {
        &self.0[q.index()]
    }
}

impl<T> IndexMut<RobotQuadrant> for QuadrantMap<T> {
    fn index_mut(&mut self, q: RobotQuadrant) -> &mut T {
        &mut self.0[q.index()]
    }
}

impl Default for ContactState {
    fn default() -> Self {
        ContactState::InContact
    }
}

impl OneDofJoint {
    pub fn new(name: &str, effort_limit: f64) -> Self {
        Self {
            name: name.to_string(),
            position: 0.0,
            velocity: 0.0,
            desired_effort: 0.0,
            effort_limit,
            control_mode: JointControlMode::Position,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the desired effort, saturated to the joint's effort limit.
    pub fn set_desired_effort(&mut self, effort: f64) {
        self.desired_effort = effort.clamp(-self.effort_limit, self.effort_limit);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
