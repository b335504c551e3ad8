//! # Foot control module
//!
//! Per-leg control of the feet. A [`FootControlModule`] switches its foot
//! between support and swing. In swing it tracks a [`SwingState`], built
//! from a chain of position trajectories and an orientation interpolation,
//! with a spatial acceleration control module.
//!
//! A swing can be replanned once it has started, for instance to land
//! earlier after a push. The request is taken on the next cycle and the rest
//! of the swing follows the replanned trajectory.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod foot_control_module;
mod orientation;
mod swing_state;
mod trajectory;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use foot_control_module::*;
pub use orientation::*;
pub use swing_state::*;
pub use trajectory::*;
