//! # Reference frames module
//!
//! All geometric quantities handled by the controllers are tagged with the
//! frame they are expressed in. Frames live in an explicit [`FrameGraph`],
//! which is owned by the runtime environment and handed by reference to
//! whoever needs to change the frame of a quantity. The graph is written
//! during the estimation phase of a cycle and only read afterwards.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod graph;
mod spatial;
mod tagged;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use graph::*;
pub use spatial::*;
pub use tagged::*;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Raise an unrecoverable error if two frames are not identical.
pub fn check_frames_match(expected: FrameId, actual: FrameId) {
    if expected != actual {
        util::raise_error!(
            "Frame mismatch: expected {:?}, found {:?}",
            expected,
            actual
        );
    }
}
