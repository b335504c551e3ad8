//! # Spatial acceleration control module
//!
//! Six degree of freedom feedback on the pose of a rigid body, used to
//! command end effectors such as swing feet. The module computes the desired
//! spatial acceleration of the body relative to a base from a desired pose,
//! a desired twist and a feedforward acceleration, optionally clamping the
//! linear and angular parts to a maximum magnitude.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod control_module;
mod se3_pid;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use control_module::*;
pub use se3_pid::*;
