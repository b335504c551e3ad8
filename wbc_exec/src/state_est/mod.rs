//! # State estimation module
//!
//! Estimators of the floating base state which complement the kinematics of
//! the robot model.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod imu_linear_state;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use imu_linear_state::*;
