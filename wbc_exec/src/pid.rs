//! # PID controllers
//!
//! Three-axis PID controller used by every task-space feedback loop, and the
//! gains bundle it is configured with.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// Internal
use crate::frames::{check_frames_match, FrameVector};
use util::maths::clamp_magnitude;
use util::params::{ParamError, ParameterMap};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gains of a three-axis PID controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    /// Proportional gains
    pub k_p: Vector3<f64>,

    /// Integral gains
    pub k_i: Vector3<f64>,

    /// Derivative gains
    pub k_d: Vector3<f64>,

    /// Maximum magnitude of the accumulated (integrated) error. Zero disables
    /// the integral term.
    pub max_integral_error: f64,
}

/// A three-axis PID controller.
///
/// The derivative term acts on a velocity error supplied by the caller rather
/// than on a numerical derivative of the position error.
#[derive(Debug, Clone, Serialize)]
pub struct PidController3 {
    gains: PidGains,

    /// The integral accumulation
    integral: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidGains {
    pub fn new(k_p: Vector3<f64>, k_i: Vector3<f64>, k_d: Vector3<f64>, max_integral_error: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            max_integral_error,
        }
    }

    /// Proportional-derivative gains only.
    pub fn pd(k_p: Vector3<f64>, k_d: Vector3<f64>) -> Self {
        Self::new(k_p, Vector3::zeros(), k_d, 0.0)
    }

    pub fn zero() -> Self {
        Self::pd(Vector3::zeros(), Vector3::zeros())
    }

    /// Register these gains as defaults under `prefix`.
    ///
    /// Uses the parameter names `{prefix}_proportional_gains`,
    /// `{prefix}_integral_gains`, `{prefix}_derivative_gains` and
    /// `{prefix}_max_integral_error`.
    pub fn register_defaults(&self, params: &mut ParameterMap, prefix: &str) {
        params.set_default(&format!("{}_proportional_gains", prefix), self.k_p.as_slice());
        params.set_default(&format!("{}_integral_gains", prefix), self.k_i.as_slice());
        params.set_default(&format!("{}_derivative_gains", prefix), self.k_d.as_slice());
        params.set_default(
            &format!("{}_max_integral_error", prefix),
            &[self.max_integral_error],
        );
    }

    /// Read the gains stored under `prefix`, see `register_defaults`.
    pub fn from_parameters(params: &ParameterMap, prefix: &str) -> Result<Self, ParamError> {
        Ok(Self {
            k_p: params.get_vector3(&format!("{}_proportional_gains", prefix))?,
            k_i: params.get_vector3(&format!("{}_integral_gains", prefix))?,
            k_d: params.get_vector3(&format!("{}_derivative_gains", prefix))?,
            max_integral_error: params.get(&format!("{}_max_integral_error", prefix))?,
        })
    }
}

impl Default for PidGains {
    fn default() -> Self {
        Self::zero()
    }
}

impl PidController3 {
    /// Create a new controller with the given gains.
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: Vector3::zeros(),
        }
    }

    pub fn gains(&self) -> &PidGains {
        &self.gains
    }

    /// Replace the gains. The integral accumulation is kept.
    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }

    pub fn set_proportional_gains(&mut self, k_p: Vector3<f64>) {
        self.gains.k_p = k_p;
    }

    pub fn set_integral_gains(&mut self, k_i: Vector3<f64>, max_integral_error: f64) {
        self.gains.k_i = k_i;
        self.gains.max_integral_error = max_integral_error;
    }

    pub fn set_derivative_gains(&mut self, k_d: Vector3<f64>) {
        self.gains.k_d = k_d;
    }

    /// Zero the integral accumulation.
    pub fn reset(&mut self) {
        self.integral = Vector3::zeros();
    }

    pub fn integral(&self) -> &Vector3<f64> {
        &self.integral
    }

    /// Get the output of the controller for the given errors.
    ///
    /// The integral is accumulated over `dt_s` and then clamped in magnitude
    /// to the gains' maximum integral error.
    pub fn compute(
        &mut self,
        position_error: &Vector3<f64>,
        velocity_error: &Vector3<f64>,
        dt_s: f64,
    ) -> Vector3<f64> {
        self.integral = clamp_magnitude(
            &(self.integral + position_error * dt_s),
            self.gains.max_integral_error,
        );

        self.gains.k_p.component_mul(position_error)
            + self.gains.k_i.component_mul(&self.integral)
            + self.gains.k_d.component_mul(velocity_error)
    }

    /// Frame-tagged version of `compute`. Both errors must be expressed in
    /// the same frame, which is also the frame of the output.
    pub fn compute_in_frame(
        &mut self,
        position_error: &FrameVector,
        velocity_error: &FrameVector,
        dt_s: f64,
    ) -> FrameVector {
        check_frames_match(position_error.frame(), velocity_error.frame());
        FrameVector::new(
            position_error.frame(),
            self.compute(position_error.vector(), velocity_error.vector(), dt_s),
        )
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_pid_integral_clamp() {
        let mut pid = PidController3::new(PidGains::new(
            Vector3::zeros(),
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::zeros(),
            0.5,
        ));

        // 1 m of error on x for 2 s would integrate to 2, but is held at 0.5
        let mut out = Vector3::zeros();
        for _ in 0..200 {
            out = pid.compute(&Vector3::x(), &Vector3::zeros(), 0.01);
        }
        assert_abs_diff_eq!(out, Vector3::new(0.5, 0.0, 0.0), epsilon = 1e-12);

        pid.reset();
        assert_eq!(*pid.integral(), Vector3::zeros());

        // No integral at all when the max is zero
        pid.set_integral_gains(Vector3::new(1.0, 1.0, 1.0), 0.0);
        let out = pid.compute(&Vector3::x(), &Vector3::zeros(), 0.01);
        assert_eq!(out, Vector3::zeros());
    }

    #[test]
    fn test_pid_pd_terms() {
        let mut pid = PidController3::new(PidGains::pd(
            Vector3::new(10.0, 20.0, 30.0),
            Vector3::new(1.0, 2.0, 3.0),
        ));

        let out = pid.compute(&Vector3::new(1.0, -1.0, 0.5), &Vector3::new(0.0, 1.0, 2.0), 0.001);
        assert_abs_diff_eq!(out, Vector3::new(10.0, -18.0, 21.0), epsilon = 1e-12);
    }

    #[test]
    fn test_gains_from_parameters() {
        let mut params = ParameterMap::new();
        params.set("com_position_proportional_gains", &[0.0, 0.0, 4000.0]);

        let defaults = PidGains::pd(Vector3::new(0.0, 0.0, 5000.0), Vector3::new(0.0, 0.0, 750.0));
        defaults.register_defaults(&mut params, "com_position");

        let gains = PidGains::from_parameters(&params, "com_position").unwrap();
        assert_eq!(gains.k_p, Vector3::new(0.0, 0.0, 4000.0));
        assert_eq!(gains.k_d, Vector3::new(0.0, 0.0, 750.0));
        assert_eq!(gains.max_integral_error, 0.0);

        assert!(PidGains::from_parameters(&params, "body_orientation").is_err());
    }
}
