//! # Task-space module
//!
//! The estimator and controller pair which maps between joint space and
//! Cartesian task space. Each cycle the [`TaskSpaceEstimator`] reads the
//! robot model into [`TaskSpaceEstimates`], the orchestrating controller
//! fills in [`TaskSpaceSetpoints`] and [`TaskSpaceControllerSettings`], and
//! the [`TaskSpaceController`] computes the [`TaskSpaceCommands`] and the
//! resulting joint efforts.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod controller;
mod estimator;
mod settings;
mod setpoints;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use controller::*;
pub use estimator::*;
pub use settings::*;
pub use setpoints::*;
