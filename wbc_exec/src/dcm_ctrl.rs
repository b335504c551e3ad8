//! # DCM controller
//!
//! Balance controller acting on the divergent component of motion (DCM, also
//! known as the capture point) of a linear inverted pendulum:
//!
//! ```text
//! omega = sqrt(g / h)
//! dcm   = x + xdot / omega
//! ```
//!
//! A single PID loop runs on the CoM position error with the CoM velocity
//! error as derivative. The velocity is estimated by differencing the CoM
//! position in world over one control period, then rotated into the control
//! frame, so a control frame that moves with the feet adds no velocity. The
//! output of the loop is a CMP offset, turned into a force through the
//! pendulum stiffness `m * omega^2` and added onto the caller's force.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use nalgebra::Vector3;
use thiserror::Error;

// Internal
use crate::frames::{FrameGraph, FrameId, FramePoint, FrameVector};
use crate::pid::{PidController3, PidGains};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Lowest CoM height the pendulum model accepts.
///
/// Units: meters
pub const MIN_COM_HEIGHT_M: f64 = 0.05;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// DCM balance controller, see the module documentation.
#[derive(Debug, Clone)]
pub struct DcmController {
    /// Frame the errors and gains are expressed in
    control_frame: FrameId,

    /// Units: seconds
    control_dt_s: f64,

    /// Units: kilograms
    mass_kg: f64,

    /// Units: meters/second^2
    gravity_mps2: f64,

    /// Units: meters
    com_height_m: f64,

    /// Natural frequency of the pendulum
    ///
    /// Units: radians/second
    omega: f64,

    pid: PidController3,

    /// CoM position on the previous cycle, in world
    previous_position: Option<Vector3<f64>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum DcmCtrlError {
    #[error("Invalid CoM height {0} m, must be finite and above the minimum")]
    InvalidComHeight(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DcmController {
    /// Create a new controller with zero gains.
    pub fn new(
        control_frame: FrameId,
        control_dt_s: f64,
        mass_kg: f64,
        gravity_mps2: f64,
        com_height_m: f64,
    ) -> Result<Self, DcmCtrlError> {
        let mut ctrl = Self {
            control_frame,
            control_dt_s,
            mass_kg,
            gravity_mps2,
            com_height_m: 0.0,
            omega: 0.0,
            pid: PidController3::new(PidGains::zero()),
            previous_position: None,
        };

        ctrl.set_com_height(com_height_m)?;

        Ok(ctrl)
    }

    /// Set the height of the pendulum and recompute its natural frequency.
    ///
    /// On error the previous height is kept.
    pub fn set_com_height(&mut self, com_height_m: f64) -> Result<(), DcmCtrlError> {
        if !com_height_m.is_finite() || com_height_m < MIN_COM_HEIGHT_M {
            return Err(DcmCtrlError::InvalidComHeight(com_height_m));
        }

        if (com_height_m - self.com_height_m).abs() > std::f64::EPSILON {
            self.com_height_m = com_height_m;
            self.omega = (self.gravity_mps2 / com_height_m).sqrt();
            trace!(
                "DCM height set to {:.3} m, omega = {:.3} rad/s",
                com_height_m,
                self.omega
            );
        }

        Ok(())
    }

    pub fn com_height(&self) -> f64 {
        self.com_height_m
    }

    pub fn natural_frequency(&self) -> f64 {
        self.omega
    }

    pub fn control_frame(&self) -> FrameId {
        self.control_frame
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.pid.set_gains(gains);
    }

    pub fn gains(&self) -> &PidGains {
        self.pid.gains()
    }

    /// Zero the integral and forget the previous position, so the next
    /// velocity estimate is zero.
    pub fn reset(&mut self) {
        debug!("DCM controller reset");
        self.pid.reset();
        self.previous_position = None;
    }

    /// Current DCM, given the CoM position and velocity in any frame.
    pub fn dcm(&self, com_position: &FramePoint, com_velocity: &FrameVector) -> FramePoint {
        *com_position + com_velocity.scale(1.0 / self.omega)
    }

    /// Add the balance feedback onto `output_force`.
    ///
    /// The PID output is a CMP offset in meters, scaled into newtons by the
    /// pendulum stiffness `m * omega^2` (the mass times `g / h`). The output
    /// force keeps its own frame, the feedback is rotated into it.
    pub fn compute(
        &mut self,
        frames: &FrameGraph,
        output_force: &mut FrameVector,
        desired_position: &FramePoint,
        desired_velocity: &FrameVector,
        current_position: &FramePoint,
    ) {
        let desired = desired_position.changed_to(frames, self.control_frame);
        let desired_vel = desired_velocity.changed_to(frames, self.control_frame);
        let current = current_position.changed_to(frames, self.control_frame);

        let current_world = *current_position.changed_to(frames, frames.world()).coords();
        let estimated_vel = match self.previous_position {
            Some(prev) => *FrameVector::new(frames.world(), (current_world - prev) / self.control_dt_s)
                .changed_to(frames, self.control_frame)
                .vector(),
            None => Vector3::zeros(),
        };
        self.previous_position = Some(current_world);

        let position_error = desired.coords() - current.coords();
        let velocity_error = desired_vel.vector() - estimated_vel;

        let feedback = self
            .pid
            .compute(&position_error, &velocity_error, self.control_dt_s);

        let stiffness = self.mass_kg * self.omega * self.omega;
        let feedback_force = FrameVector::new(self.control_frame, feedback * stiffness)
            .changed_to(frames, output_force.frame());

        *output_force += feedback_force;
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
