//! # Whole-body control library.
//!
//! This library allows other crates in the workspace (and the benchmarks) to
//! access the items defined inside the whole-body control crate.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Spatial acceleration control module - PD control of a rigid body in SE(3)
pub mod accel_ctrl;

/// Divergent component of motion controller - horizontal balance of the CoM
pub mod dcm_ctrl;

/// Foot control module - support and swing state machine of each foot
pub mod foot_ctrl;

/// Force controllers - stand, step and the manager sequencing them
pub mod force_ctrl;

/// Reference frames and frame-tagged quantities
pub mod frames;

/// Planar geometry - polygons, support polygon and polygon wiggling
pub mod geometry;

/// Robot model interface and the cartesian quadruped model
pub mod model;

/// Executable parameters
pub mod params;

/// Three axis PID controller
pub mod pid;

/// State estimation - IMU based linear state of the floating base
pub mod state_est;

/// Task-space estimator and controller
pub mod task_space;

/// Telemetry sinks
pub mod telemetry;
