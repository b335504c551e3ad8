//! # Geometry module
//!
//! Planar geometry used for footholds: convex polygons, planar regions, the
//! support polygon of a quadruped and polygon wiggling, which moves a
//! foothold inside a convex patch of terrain with the smallest rigid motion.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod polygon;
mod region;
mod support_polygon;
mod wiggle;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use polygon::*;
pub use region::*;
pub use support_polygon::*;
pub use wiggle::*;
