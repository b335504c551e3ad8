//! Rigid body spatial acceleration control module

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::Vector3;

// Internal
use super::{Se3PidController, Se3PidGains};
use crate::frames::{
    check_frames_match, FrameGraph, FrameId, FrameOrientation, FramePoint, FramePose,
    FrameVector, SpatialAcceleration, Twist,
};
use crate::model::TwistCalculator;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Tracks a desired pose of an end effector by commanding its spatial
/// acceleration relative to a base body.
#[derive(Debug, Clone)]
pub struct RigidBodySpatialAccelerationControlModule {
    name: String,

    /// Frame rigidly attached to the end effector, in which the tracking
    /// happens and the output is expressed
    tracking_frame: FrameId,

    se3_pid: Se3PidController,

    /// Output of the last call to `do_position_control`
    acceleration: SpatialAcceleration,

    /// Units: meters/second^2
    max_linear_acceleration: f64,

    /// Units: radians/second^2
    max_angular_acceleration: f64,

    limit_accelerations: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RigidBodySpatialAccelerationControlModule {
    /// Create a module tracking `tracking_frame`, with zero gains and no
    /// acceleration limit.
    pub fn new(name: &str, tracking_frame: FrameId, dt_s: f64) -> Self {
        Self {
            name: name.to_string(),
            tracking_frame,
            se3_pid: Se3PidController::new(tracking_frame, dt_s),
            acceleration: SpatialAcceleration::zero(tracking_frame, tracking_frame, tracking_frame),
            max_linear_acceleration: std::f64::INFINITY,
            max_angular_acceleration: std::f64::INFINITY,
            limit_accelerations: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tracking_frame(&self) -> FrameId {
        self.tracking_frame
    }

    /// Clear the integral state of the controller.
    pub fn reset(&mut self) {
        self.se3_pid.reset();
    }

    pub fn set_maximum_linear_acceleration_magnitude(&mut self, max: f64) {
        self.max_linear_acceleration = max;
    }

    pub fn set_maximum_angular_acceleration_magnitude(&mut self, max: f64) {
        self.max_angular_acceleration = max;
    }

    pub fn set_limit_accelerations(&mut self, limit: bool) {
        self.limit_accelerations = limit;
    }

    /// Limit the position feedback in magnitude and, per axis, in rate.
    ///
    /// Units: meters/second^2, meters/second^3
    pub fn set_position_max_acceleration_and_jerk(&mut self, max_acceleration: f64, max_jerk: f64) {
        self.se3_pid
            .set_position_max_acceleration_and_jerk(max_acceleration, max_jerk);
    }

    /// Limit the orientation feedback in magnitude and, per axis, in rate.
    ///
    /// Units: radians/second^2, radians/second^3
    pub fn set_orientation_max_acceleration_and_jerk(&mut self, max_acceleration: f64, max_jerk: f64) {
        self.se3_pid
            .set_orientation_max_acceleration_and_jerk(max_acceleration, max_jerk);
    }

    /// The acceleration computed on the last cycle.
    pub fn acceleration(&self) -> &SpatialAcceleration {
        &self.acceleration
    }

    /// Copy the acceleration of the last cycle into `output`.
    ///
    /// # Panics
    /// - If `output` is not expressed in the tracking frame.
    pub fn pack_acceleration(&self, output: &mut SpatialAcceleration) {
        check_frames_match(self.tracking_frame, output.expressed_in);
        *output = self.acceleration;
    }

    /// Position error of the last cycle, in world.
    pub fn position_error_in_world(&self, frames: &FrameGraph) -> FrameVector {
        self.se3_pid.position_error().changed_to(frames, frames.world())
    }

    /// Compute the spatial acceleration of the end effector relative to
    /// `base` which tracks the desired pose and twist. The result is
    /// expressed in the tracking frame.
    pub fn do_position_control<T: TwistCalculator + ?Sized>(
        &mut self,
        twist_calculator: &T,
        frames: &FrameGraph,
        desired_pose: &FramePose,
        desired_twist: &Twist,
        feedforward: &SpatialAcceleration,
        base: FrameId,
    ) {
        let mut current_twist = twist_calculator.relative_twist(frames, base, self.tracking_frame);
        current_twist.change_body_frame_no_relative_twist(self.tracking_frame);
        current_twist.change_frame(frames, self.tracking_frame);

        self.acceleration = self.se3_pid.compute(
            frames,
            desired_pose,
            desired_twist,
            feedforward,
            &current_twist,
        );

        if self.limit_accelerations {
            self.acceleration
                .limit_linear_magnitude(self.max_linear_acceleration);
            self.acceleration
                .limit_angular_magnitude(self.max_angular_acceleration);
        }

        trace!(
            "{}: linear {:?}, angular {:?}",
            self.name,
            self.acceleration.linear,
            self.acceleration.angular
        );
    }

    /// Same as `do_position_control`, building the desired pose, twist and
    /// feedforward from their separate parts.
    #[allow(clippy::too_many_arguments)]
    pub fn do_position_control_from_parts<T: TwistCalculator + ?Sized>(
        &mut self,
        twist_calculator: &T,
        frames: &FrameGraph,
        desired_position: &FramePoint,
        desired_orientation: &FrameOrientation,
        desired_linear_velocity: &FrameVector,
        desired_angular_velocity: &FrameVector,
        desired_linear_acceleration: &FrameVector,
        desired_angular_acceleration: &FrameVector,
        base: FrameId,
    ) {
        let pose = self.calculate_desired_pose(frames, desired_position, desired_orientation);
        let twist = self.calculate_desired_twist(
            frames,
            desired_linear_velocity,
            desired_angular_velocity,
            base,
        );
        let feedforward = self.calculate_desired_spatial_acceleration(
            twist_calculator,
            frames,
            desired_linear_acceleration,
            desired_angular_acceleration,
            base,
        );

        self.do_position_control(twist_calculator, frames, &pose, &twist, &feedforward, base);
    }

    /// Desired pose of the end effector in the tracking frame.
    pub fn calculate_desired_pose(
        &self,
        frames: &FrameGraph,
        position: &FramePoint,
        orientation: &FrameOrientation,
    ) -> FramePose {
        FramePose::from_parts(
            &position.changed_to(frames, self.tracking_frame),
            &orientation.changed_to(frames, self.tracking_frame),
        )
    }

    /// Desired twist of the end effector relative to `base`, from the
    /// velocity of its origin and its angular velocity.
    pub fn calculate_desired_twist(
        &self,
        frames: &FrameGraph,
        linear_velocity_of_origin: &FrameVector,
        angular_velocity: &FrameVector,
        base: FrameId,
    ) -> Twist {
        Twist::new(
            self.tracking_frame,
            base,
            self.tracking_frame,
            *angular_velocity.changed_to(frames, self.tracking_frame).vector(),
            *linear_velocity_of_origin
                .changed_to(frames, self.tracking_frame)
                .vector(),
        )
    }

    /// Feedforward spatial acceleration from the acceleration of the end
    /// effector's origin and its angular acceleration, using the current
    /// twist: `a_spatial = a_origin - w x v_origin`.
    pub fn calculate_desired_spatial_acceleration<T: TwistCalculator + ?Sized>(
        &self,
        twist_calculator: &T,
        frames: &FrameGraph,
        linear_acceleration_of_origin: &FrameVector,
        angular_acceleration: &FrameVector,
        base: FrameId,
    ) -> SpatialAcceleration {
        let mut twist = twist_calculator.relative_twist(frames, base, self.tracking_frame);
        twist.change_body_frame_no_relative_twist(self.tracking_frame);
        twist.change_frame(frames, self.tracking_frame);

        SpatialAcceleration::from_origin_acceleration(
            &twist,
            angular_acceleration
                .changed_to(frames, self.tracking_frame)
                .vector(),
            linear_acceleration_of_origin
                .changed_to(frames, self.tracking_frame)
                .vector(),
        )
    }

    pub fn set_gains(&mut self, gains: &Se3PidGains) {
        self.se3_pid.set_gains(gains);
    }

    pub fn set_position_proportional_gains(&mut self, kx: f64, ky: f64, kz: f64) {
        self.se3_pid
            .set_position_proportional_gains(Vector3::new(kx, ky, kz));
    }

    pub fn set_position_derivative_gains(&mut self, kx: f64, ky: f64, kz: f64) {
        self.se3_pid
            .set_position_derivative_gains(Vector3::new(kx, ky, kz));
    }

    pub fn set_position_integral_gains(&mut self, kx: f64, ky: f64, kz: f64, max_integral_error: f64) {
        self.se3_pid
            .set_position_integral_gains(Vector3::new(kx, ky, kz), max_integral_error);
    }

    pub fn set_orientation_proportional_gains(&mut self, kx: f64, ky: f64, kz: f64) {
        self.se3_pid
            .set_orientation_proportional_gains(Vector3::new(kx, ky, kz));
    }

    pub fn set_orientation_derivative_gains(&mut self, kx: f64, ky: f64, kz: f64) {
        self.se3_pid
            .set_orientation_derivative_gains(Vector3::new(kx, ky, kz));
    }

    pub fn set_orientation_integral_gains(&mut self, kx: f64, ky: f64, kz: f64, max_integral_error: f64) {
        self.se3_pid
            .set_orientation_integral_gains(Vector3::new(kx, ky, kz), max_integral_error);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{CartesianQuadrupedModel, FullRobotModel, QuadrupedModelParams, RobotQuadrant};
    use approx::assert_abs_diff_eq;
    use nalgebra::{Isometry3, UnitQuaternion};

    fn moving_robot() -> (FrameGraph, CartesianQuadrupedModel) {
        let mut frames = FrameGraph::new();
        let mut model = CartesianQuadrupedModel::new(QuadrupedModelParams::default(), &mut frames);
        model.set_body_pose(Isometry3::new(Vector3::new(0.0, 0.1, 0.45), Vector3::new(0.05, 0.0, 0.3)));
        model.set_body_velocity(Vector3::new(0.1, -0.2, 0.4), Vector3::new(0.3, 0.1, -0.05));
        model.set_leg_velocity(RobotQuadrant::FrontLeft, &Vector3::new(0.2, 0.0, 0.5));
        model.update_frames(&mut frames);
        (frames, model)
    }

    fn module(frame: FrameId) -> RigidBodySpatialAccelerationControlModule {
        let mut module = RigidBodySpatialAccelerationControlModule::new("front_left_sole", frame, 0.002);
        module.set_position_proportional_gains(500.0, 500.0, 800.0);
        module.set_position_derivative_gains(20.0, 20.0, 30.0);
        module.set_position_integral_gains(10.0, 10.0, 10.0, 0.5);
        module.set_orientation_proportional_gains(100.0, 100.0, 100.0);
        module.set_orientation_derivative_gains(5.0, 5.0, 5.0);
        module
    }

    #[test]
    fn test_zero_error_gives_feedforward() {
        let (frames, model) = moving_robot();
        let world = frames.world();
        let sole = model.sole_frame(RobotQuadrant::FrontLeft);
        let mut module = module(sole);

        // Desired state equal to the current state
        let pose = FramePose::origin(sole).changed_to(&frames, world);
        let current = model.relative_twist(&frames, world, sole);
        let twist = module.calculate_desired_twist(
            &frames,
            &current.linear_part(),
            &current.angular_part(),
            world,
        );

        let feedforward = SpatialAcceleration::new(
            sole,
            world,
            sole,
            Vector3::new(0.3, -1.0, 2.0),
            Vector3::new(-4.0, 0.5, 9.0),
        );

        for _ in 0..3 {
            module.do_position_control(&model, &frames, &pose, &twist, &feedforward, world);
            let out = module.acceleration();
            assert_eq!(out.expressed_in, sole);
            assert_abs_diff_eq!(out.linear, feedforward.linear, epsilon = 1e-10);
            assert_abs_diff_eq!(out.angular, feedforward.angular, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_acceleration_limits() {
        let (frames, model) = moving_robot();
        let world = frames.world();
        let sole = model.sole_frame(RobotQuadrant::FrontLeft);
        let mut module = module(sole);

        let position = FramePoint::origin(sole).changed_to(&frames, world)
            + FrameVector::new(world, Vector3::new(0.3, -0.2, 0.4));
        let orientation = FrameOrientation::new(
            world,
            UnitQuaternion::from_euler_angles(0.4, -0.3, 1.0),
        );
        let zero = FrameVector::zero(world);

        module.do_position_control_from_parts(
            &model, &frames, &position, &orientation, &zero, &zero, &zero, &zero, world,
        );
        let unlimited = *module.acceleration();
        assert!(unlimited.linear.norm() > 10.0);
        assert!(unlimited.angular.norm() > 5.0);

        module.reset();
        module.set_maximum_linear_acceleration_magnitude(10.0);
        module.set_maximum_angular_acceleration_magnitude(5.0);
        module.set_limit_accelerations(true);
        module.do_position_control_from_parts(
            &model, &frames, &position, &orientation, &zero, &zero, &zero, &zero, world,
        );
        let limited = *module.acceleration();

        assert_abs_diff_eq!(limited.linear.norm(), 10.0, epsilon = 1e-10);
        assert_abs_diff_eq!(limited.angular.norm(), 5.0, epsilon = 1e-10);
        assert_abs_diff_eq!(limited.linear.normalize(), unlimited.linear.normalize(), epsilon = 1e-10);
        assert_abs_diff_eq!(limited.angular.normalize(), unlimited.angular.normalize(), epsilon = 1e-10);
    }

    #[test]
    fn test_feedback_jerk_limit() {
        let (frames, model) = moving_robot();
        let world = frames.world();
        let sole = model.sole_frame(RobotQuadrant::FrontLeft);
        let mut module = module(sole);
        module.set_position_max_acceleration_and_jerk(50.0, 1000.0);

        let zero = FrameVector::zero(world);
        let orientation = FrameOrientation::identity(sole).changed_to(&frames, world);
        let here = FramePoint::origin(sole).changed_to(&frames, world);

        // Velocity product term, left untouched by the limits
        let feedforward = module
            .calculate_desired_spatial_acceleration(&model, &frames, &zero, &zero, world)
            .linear;

        // Settle on the current position, then jump the setpoint away
        module.do_position_control_from_parts(
            &model, &frames, &here, &orientation, &zero, &zero, &zero, &zero, world,
        );
        let before = module.acceleration().linear - feedforward;

        let away = here + FrameVector::new(world, Vector3::new(0.2, 0.0, -0.1));
        let mut previous = before;
        for _ in 0..200 {
            module.do_position_control_from_parts(
                &model, &frames, &away, &orientation, &zero, &zero, &zero, &zero, world,
            );
            let linear = module.acceleration().linear - feedforward;
            assert!(linear.norm() <= 50.0 + 1e-9);
            // 1000 m/s^3 over 2 ms
            for i in 0..3 {
                assert!((linear[i] - previous[i]).abs() <= 2.0 + 1e-9);
            }
            previous = linear;
        }

        // The limits are eventually reached
        assert_abs_diff_eq!(previous.norm(), 50.0, epsilon = 1e-6);

        // A reset forgets the previous output, only the magnitude is bounded
        module.reset();
        module.do_position_control_from_parts(
            &model, &frames, &away, &orientation, &zero, &zero, &zero, &zero, world,
        );
        assert_abs_diff_eq!(
            (module.acceleration().linear - feedforward).norm(),
            50.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_pack_acceleration() {
        let (frames, model) = moving_robot();
        let world = frames.world();
        let sole = model.sole_frame(RobotQuadrant::FrontLeft);
        let mut module = module(sole);

        let target = FramePoint::origin(sole).changed_to(&frames, world)
            + FrameVector::new(world, Vector3::new(0.0, 0.0, 0.05));
        let orientation = FrameOrientation::identity(sole).changed_to(&frames, world);
        let zero = FrameVector::zero(world);
        module.do_position_control_from_parts(
            &model, &frames, &target, &orientation, &zero, &zero, &zero, &zero, world,
        );

        let mut out = SpatialAcceleration::zero(sole, world, sole);
        module.pack_acceleration(&mut out);
        assert_eq!(out, *module.acceleration());
    }

    #[test]
    #[should_panic]
    fn test_pack_acceleration_in_wrong_frame() {
        let (frames, model) = moving_robot();
        let world = frames.world();
        let sole = model.sole_frame(RobotQuadrant::FrontLeft);
        let module = module(sole);

        let mut out = SpatialAcceleration::zero(sole, world, world);
        module.pack_acceleration(&mut out);
    }

    #[test]
    fn test_spatial_acceleration_from_origin() {
        let (frames, model) = moving_robot();
        let world = frames.world();
        let sole = model.sole_frame(RobotQuadrant::FrontLeft);
        let module = module(sole);

        let a = module.calculate_desired_spatial_acceleration(
            &model,
            &frames,
            &FrameVector::zero(world),
            &FrameVector::zero(world),
            world,
        );
        let twist = model.relative_twist(&frames, world, sole);

        assert_eq!(a.expressed_in, sole);
        assert_abs_diff_eq!(a.linear, -twist.angular.cross(&twist.linear), epsilon = 1e-12);
    }
}
