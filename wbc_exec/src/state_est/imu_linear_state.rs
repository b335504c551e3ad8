//! IMU based linear state calculator
//!
//! Integrates the linear acceleration measured by an IMU mounted on the root
//! body into the root's linear velocity and position in world. Gravity is
//! removed from the measurement before integration, its magnitude either
//! fixed or estimated by low pass filtering the norm of the measurement.
//!
//! The IMU is generally not at the origin of the root frame, so its velocity
//! differs from the root's by the lever arm term `w x r`, with `w` the root's
//! angular velocity and `r` the IMU offset from the root origin.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use nalgebra::Vector3;
use thiserror::Error;

// Internal
use crate::frames::{check_frames_match, FrameGraph, FrameId, FramePoint, FrameVector, Twist};
use util::maths::AlphaFilter;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ImuLinearStateCalculator {
    world_frame: FrameId,
    root_frame: FrameId,

    /// Frame of the IMU, `None` if the robot has no IMU
    measurement_frame: Option<FrameId>,

    /// Units: seconds
    estimator_dt_s: f64,

    estimation_enabled: bool,
    gravity_estimation_enabled: bool,

    /// Magnitude of gravity
    gravity: AlphaFilter,

    /// Last measured acceleration with gravity removed, in world
    acceleration_in_world: FrameVector,

    /// Last measured acceleration with gravity removed, in the IMU frame
    acceleration_in_measurement_frame: Option<FrameVector>,

    root_linear_velocity: FrameVector,
    root_position: FramePoint,

    /// Lever arm velocity of the IMU relative to the root, in world
    lever_arm_velocity: FrameVector,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ImuStateError {
    #[error("IMU based linear state estimation is disabled")]
    EstimationDisabled,

    #[error("Cannot enable IMU based linear state estimation, the robot has no IMU")]
    NoImu,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ImuLinearStateCalculator {
    /// Create a new calculator, enabled if the robot has an IMU.
    ///
    /// Gravity estimation starts disabled with the magnitude of
    /// `gravity_mps2`.
    pub fn new(
        world_frame: FrameId,
        root_frame: FrameId,
        measurement_frame: Option<FrameId>,
        estimator_dt_s: f64,
        gravity_mps2: f64,
    ) -> Self {
        let mut gravity = AlphaFilter::new(0.0);
        gravity.update(gravity_mps2.abs());

        if measurement_frame.is_none() {
            info!("No IMU, IMU based linear state estimation disabled");
        }

        Self {
            world_frame,
            root_frame,
            measurement_frame,
            estimator_dt_s,
            estimation_enabled: measurement_frame.is_some(),
            gravity_estimation_enabled: false,
            gravity,
            acceleration_in_world: FrameVector::zero(world_frame),
            acceleration_in_measurement_frame: None,
            root_linear_velocity: FrameVector::zero(world_frame),
            root_position: FramePoint::origin(world_frame),
            lever_arm_velocity: FrameVector::zero(world_frame),
        }
    }

    pub fn enable_estimation(&mut self, enable: bool) -> Result<(), ImuStateError> {
        if enable && self.measurement_frame.is_none() {
            return Err(ImuStateError::NoImu);
        }

        debug!("IMU based linear state estimation enabled: {}", enable);
        self.estimation_enabled = enable;
        Ok(())
    }

    pub fn is_estimation_enabled(&self) -> bool {
        self.estimation_enabled
    }

    pub fn enable_gravity_estimation(&mut self, enable: bool) {
        self.gravity_estimation_enabled = enable;
    }

    pub fn set_alpha_gravity_estimation(&mut self, alpha: f64) {
        self.gravity.set_alpha(alpha);
    }

    /// Current estimate of the magnitude of gravity.
    pub fn gravity_estimate(&self) -> f64 {
        self.gravity.value().unwrap_or(0.0)
    }

    /// Last measured acceleration with gravity removed, in world.
    pub fn linear_acceleration_in_world(&self) -> &FrameVector {
        &self.acceleration_in_world
    }

    /// Last measured acceleration with gravity removed, in the IMU frame.
    pub fn linear_acceleration_in_measurement_frame(&self) -> Option<&FrameVector> {
        self.acceleration_in_measurement_frame.as_ref()
    }

    /// Take in a new IMU measurement, expressed in the IMU frame.
    ///
    /// The measurement is the specific force, so an IMU at rest reads
    /// gravity pointing up.
    pub fn update_linear_acceleration(
        &mut self,
        frames: &FrameGraph,
        measurement: &FrameVector,
    ) -> Result<(), ImuStateError> {
        let measurement_frame = self.enabled_measurement_frame()?;
        check_frames_match(measurement_frame, measurement.frame());

        if self.gravity_estimation_enabled {
            self.gravity.update(measurement.norm());
        }
        let gravity = FrameVector::new(
            self.world_frame,
            Vector3::new(0.0, 0.0, self.gravity_estimate()),
        );

        self.acceleration_in_world = measurement.changed_to(frames, self.world_frame) - gravity;
        self.acceleration_in_measurement_frame =
            Some(*measurement - gravity.changed_to(frames, measurement_frame));

        Ok(())
    }

    /// Integrate the last acceleration into the root linear velocity.
    pub fn update_root_linear_velocity(
        &mut self,
        previous: &FrameVector,
    ) -> Result<FrameVector, ImuStateError> {
        self.enabled_measurement_frame()?;

        self.root_linear_velocity =
            *previous + self.acceleration_in_world.scale(self.estimator_dt_s);

        Ok(self.root_linear_velocity)
    }

    /// Integrate the root linear velocity into the root position.
    pub fn update_root_position(&mut self, previous: &FramePoint) -> Result<FramePoint, ImuStateError> {
        self.enabled_measurement_frame()?;

        self.root_position = *previous + self.root_linear_velocity.scale(self.estimator_dt_s);

        Ok(self.root_position)
    }

    /// Integrate the last acceleration into the velocity of the IMU, in
    /// world, and return the root velocity with the lever arm removed.
    ///
    /// `root_twist` is the twist of the root relative to world.
    pub fn update_imu_and_root_linear_velocity(
        &mut self,
        frames: &FrameGraph,
        root_twist: &Twist,
        imu_velocity: &mut FrameVector,
    ) -> Result<FrameVector, ImuStateError> {
        let measurement_frame = self.enabled_measurement_frame()?;
        check_frames_match(self.root_frame, root_twist.body_frame);

        *imu_velocity += self.acceleration_in_world.scale(self.estimator_dt_s);

        let angular_velocity = root_twist
            .angular_part()
            .changed_to(frames, self.root_frame);
        let offset = FramePoint::origin(measurement_frame)
            .changed_to(frames, self.root_frame)
            .to_vector();
        self.lever_arm_velocity = angular_velocity
            .cross(&offset)
            .changed_to(frames, self.world_frame);

        self.root_linear_velocity = *imu_velocity - self.lever_arm_velocity;

        Ok(self.root_linear_velocity)
    }

    /// Velocity of the IMU in world given the root velocity, using the lever
    /// arm of the last update.
    pub fn correct_imu_linear_velocity(&self, root_velocity: &FrameVector) -> FrameVector {
        *root_velocity + self.lever_arm_velocity
    }

    fn enabled_measurement_frame(&self) -> Result<FrameId, ImuStateError> {
        match (self.estimation_enabled, self.measurement_frame) {
            (true, Some(frame)) => Ok(frame),
            _ => Err(ImuStateError::EstimationDisabled),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Isometry3, UnitQuaternion};

    /// World, root at 1 m up yawed by 90 deg, IMU 0.1 m ahead of the root.
    fn setup() -> (FrameGraph, FrameId, FrameId) {
        let mut frames = FrameGraph::new();
        let root = frames.add_frame(
            "root",
            frames.world(),
            Isometry3::new(
                Vector3::new(0.0, 0.0, 1.0),
                Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            ),
        );
        let imu = frames.add_frame("imu", root, Isometry3::translation(0.1, 0.0, 0.0));
        (frames, root, imu)
    }

    #[test]
    fn test_no_imu() {
        let (frames, root, _) = setup();
        let mut calc = ImuLinearStateCalculator::new(frames.world(), root, None, 0.002, 9.81);

        assert!(!calc.is_estimation_enabled());
        assert_eq!(calc.enable_estimation(true), Err(ImuStateError::NoImu));
        assert_eq!(
            calc.update_root_linear_velocity(&FrameVector::zero(frames.world())),
            Err(ImuStateError::EstimationDisabled)
        );
    }

    #[test]
    fn test_disabled() {
        let (frames, root, imu) = setup();
        let world = frames.world();
        let mut calc = ImuLinearStateCalculator::new(world, root, Some(imu), 0.002, 9.81);
        assert!(calc.is_estimation_enabled());

        calc.enable_estimation(false).unwrap();
        assert_eq!(
            calc.update_linear_acceleration(&frames, &FrameVector::zero(imu)),
            Err(ImuStateError::EstimationDisabled)
        );
        assert_eq!(
            calc.update_root_position(&FramePoint::origin(world)),
            Err(ImuStateError::EstimationDisabled)
        );
    }

    #[test]
    fn test_integration() {
        let (frames, root, imu) = setup();
        let world = frames.world();
        let dt = 0.01;
        let mut calc = ImuLinearStateCalculator::new(world, root, Some(imu), dt, 9.81);

        // Accelerating at 1 m/s^2 along world x, which is -y in the IMU frame
        let measurement = FrameVector::new(imu, Vector3::new(0.0, -1.0, 9.81));
        calc.update_linear_acceleration(&frames, &measurement).unwrap();
        assert_abs_diff_eq!(
            *calc.linear_acceleration_in_world().vector(),
            Vector3::new(1.0, 0.0, 0.0),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            *calc.linear_acceleration_in_measurement_frame().unwrap().vector(),
            Vector3::new(0.0, -1.0, 0.0),
            epsilon = 1e-12
        );

        let velocity = calc
            .update_root_linear_velocity(&FrameVector::new(world, Vector3::new(0.5, 0.0, 0.0)))
            .unwrap();
        assert_abs_diff_eq!(velocity.x(), 0.51, epsilon = 1e-12);

        let position = calc
            .update_root_position(&FramePoint::from_xyz(world, 0.0, 0.0, 1.0))
            .unwrap();
        assert_abs_diff_eq!(position.x(), 0.0051, epsilon = 1e-12);
        assert_abs_diff_eq!(position.z(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lever_arm() {
        let (frames, root, imu) = setup();
        let world = frames.world();
        let mut calc = ImuLinearStateCalculator::new(world, root, Some(imu), 0.01, 9.81);

        // At rest, spinning at 2 rad/s about z
        let at_rest = FrameVector::new(imu, Vector3::new(0.0, 0.0, 9.81));
        calc.update_linear_acceleration(&frames, &at_rest).unwrap();

        let twist = Twist::new(root, world, root, Vector3::new(0.0, 0.0, 2.0), Vector3::zeros());
        let mut imu_velocity = FrameVector::new(world, Vector3::new(-0.2, 0.0, 0.0));
        let root_velocity = calc
            .update_imu_and_root_linear_velocity(&frames, &twist, &mut imu_velocity)
            .unwrap();

        // IMU is 0.1 m along world y, so w x r = (-0.2, 0, 0) in world
        assert_abs_diff_eq!(*imu_velocity.vector(), Vector3::new(-0.2, 0.0, 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!(*root_velocity.vector(), Vector3::zeros(), epsilon = 1e-12);

        let corrected = calc.correct_imu_linear_velocity(&root_velocity);
        assert_abs_diff_eq!(*corrected.vector(), *imu_velocity.vector(), epsilon = 1e-12);
    }

    #[test]
    fn test_gravity_estimation() {
        let (frames, root, imu) = setup();
        let world = frames.world();
        let mut calc = ImuLinearStateCalculator::new(world, root, Some(imu), 0.01, 9.81);
        calc.enable_gravity_estimation(true);
        calc.set_alpha_gravity_estimation(0.5);

        // Tilted IMU at rest on a planet with slightly weaker gravity
        let reading = UnitQuaternion::from_euler_angles(0.1, 0.0, 0.0) * Vector3::new(0.0, 0.0, 9.7);
        for _ in 0..60 {
            calc.update_linear_acceleration(&frames, &FrameVector::new(imu, reading))
                .unwrap();
        }

        assert_abs_diff_eq!(calc.gravity_estimate(), 9.7, epsilon = 1e-9);
    }
}
