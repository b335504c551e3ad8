//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// First order low pass (alpha) filter.
///
/// `y[k] = alpha * y[k-1] + (1 - alpha) * x[k]`, so an alpha of 0 passes the
/// input straight through and an alpha of 1 freezes the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaFilter {
    alpha: f64,
    value: Option<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AlphaFilter {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: None,
        }
    }

    /// Feed a new sample in and get the filtered value. The first sample
    /// initialises the filter.
    pub fn update(&mut self, input: f64) -> f64 {
        let out = match self.value {
            Some(v) => self.alpha * v + (1.0 - self.alpha) * input,
            None => input,
        };
        self.value = Some(out);
        out
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    /// Current output, `None` until the first sample.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Scale a vector down so that its norm does not exceed `max_magnitude`.
///
/// The direction of the vector is unchanged. Vectors already within the limit
/// are returned as is.
pub fn clamp_magnitude(vector: &Vector3<f64>, max_magnitude: f64) -> Vector3<f64> {
    let norm = vector.norm();

    if norm > max_magnitude && norm > 0.0 {
        vector * (max_magnitude / norm)
    } else {
        *vector
    }
}

/// Cubic smooth step on [0, 1]: zero slope at both ends.
///
/// Inputs outside [0, 1] are saturated.
pub fn smooth_step(s: f64) -> f64 {
    let s = s.clamp(0.0, 1.0);
    s * s * (3.0 - 2.0 * s)
}

/// Time derivative scale of `smooth_step` at `s`, i.e. `d/ds smooth_step`.
pub fn smooth_step_rate(s: f64) -> f64 {
    if !(0.0..=1.0).contains(&s) {
        return 0.0;
    }
    6.0 * s * (1.0 - s)
}

/// Second derivative of `smooth_step` at `s`.
pub fn smooth_step_accel(s: f64) -> f64 {
    if !(0.0..=1.0).contains(&s) {
        return 0.0;
    }
    6.0 - 12.0 * s
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
