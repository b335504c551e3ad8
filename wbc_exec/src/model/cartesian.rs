//! Cartesian-legged quadruped model
//!
//! Each leg is three prismatic joints aligned with the body axes, so the sole
//! of a leg sits at `hip_offset + q` in the body frame. The legs are massless
//! and the centre of mass is at the body origin.
//!
//! The model also carries a small rigid-body plant (`step_simulation`) so the
//! executable and the tests can close the loop without an external
//! simulator.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::{
    DMatrix, Isometry3, Matrix3, Point3, Translation3, UnitQuaternion, Vector3,
};
use serde::Deserialize;
use util::raise_error;

// Internal
use super::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Joint axis suffixes, in Jacobian column order
const AXES: [&str; 3] = ["x", "y", "z"];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the cartesian quadruped model
#[derive(Debug, Clone, Deserialize)]
pub struct QuadrupedModelParams {
    /// Body mass
    ///
    /// Units: kilograms
    pub mass_kg: f64,

    /// Principal moments of inertia of the body about its own axes
    ///
    /// Units: kilogram metres squared
    pub inertia_kgm2: [f64; 3],

    /// Longitudinal distance from the body origin to the hips
    ///
    /// Units: meters
    pub hip_offset_x_m: f64,

    /// Lateral distance from the body origin to the hips
    ///
    /// Units: meters
    pub hip_offset_y_m: f64,

    /// Leg length when the robot is stood at its nominal height
    ///
    /// Units: meters
    pub nominal_leg_length_m: f64,

    /// Absolute limit on the force of every joint
    ///
    /// Units: newtons
    pub joint_effort_limit_n: f64,

    /// Viscous damping of a leg out of contact, used by the simulation
    ///
    /// Units: newton seconds per meter
    pub swing_leg_damping_ns_m: f64,
}

/// A quadruped with three cartesian prismatic joints per leg.
#[derive(Debug, Clone)]
pub struct CartesianQuadrupedModel {
    params: QuadrupedModelParams,

    world_frame: FrameId,
    body_frame: FrameId,
    sole_frames: QuadrantMap<FrameId>,

    /// Body pose in world
    body_pose: Isometry3<f64>,

    /// Body origin velocity in world
    body_linear_velocity: Vector3<f64>,

    /// Body angular velocity in world
    body_angular_velocity: Vector3<f64>,

    hip_offsets: QuadrantMap<Vector3<f64>>,
    joint_names: QuadrantMap<Vec<String>>,
    joints: Vec<OneDofJoint>,

    /// Sole positions held fixed on the ground by the simulation
    pinned_soles: QuadrantMap<Option<Point3<f64>>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for QuadrupedModelParams {
    fn default() -> Self {
        Self {
            mass_kg: 20.0,
            inertia_kgm2: [0.5, 1.5, 1.8],
            hip_offset_x_m: 0.35,
            hip_offset_y_m: 0.2,
            nominal_leg_length_m: 0.5,
            joint_effort_limit_n: 600.0,
            swing_leg_damping_ns_m: 100.0,
        }
    }
}

impl CartesianQuadrupedModel {
    /// Create the model and register its frames in the graph.
    ///
    /// The robot starts stood at its nominal height above the world origin,
    /// with all soles on the ground.
    pub fn new(params: QuadrupedModelParams, frames: &mut FrameGraph) -> Self {
        let body_pose = Isometry3::translation(0.0, 0.0, params.nominal_leg_length_m);
        let body_frame = frames.add_frame("body", frames.world(), body_pose);

        let hip_offsets = QuadrantMap::from_fn(|q| {
            Vector3::new(
                q.end_sign() * params.hip_offset_x_m,
                q.side_sign() * params.hip_offset_y_m,
                0.0,
            )
        });

        let sole_frames = QuadrantMap::from_fn(|q| {
            frames.add_frame(
                &format!("{}_sole", q.name()),
                body_frame,
                Isometry3::identity(),
            )
        });

        let joint_names = QuadrantMap::from_fn(|q| {
            AXES.iter()
                .map(|a| format!("{}_{}", q.name(), a))
                .collect::<Vec<_>>()
        });

        let mut joints = Vec::with_capacity(12);
        for (_, names) in joint_names.iter() {
            for name in names {
                joints.push(OneDofJoint::new(name, params.joint_effort_limit_n));
            }
        }

        let mut model = Self {
            params,
            world_frame: frames.world(),
            body_frame,
            sole_frames,
            body_pose,
            body_linear_velocity: Vector3::zeros(),
            body_angular_velocity: Vector3::zeros(),
            hip_offsets,
            joint_names,
            joints,
            pinned_soles: QuadrantMap::splat(None),
        };

        for q in RobotQuadrant::ALL.iter().copied() {
            model.set_leg_position(q, &Vector3::new(0.0, 0.0, -model.params.nominal_leg_length_m));
        }
        model.update_frames(frames);

        model
    }

    pub fn params(&self) -> &QuadrupedModelParams {
        &self.params
    }

    pub fn body_pose(&self) -> &Isometry3<f64> {
        &self.body_pose
    }

    /// Move the body without moving the soles in the body frame.
    pub fn set_body_pose(&mut self, pose: Isometry3<f64>) {
        self.body_pose = pose;
    }

    /// Set the body velocity, both parts expressed in world.
    pub fn set_body_velocity(&mut self, angular: Vector3<f64>, linear: Vector3<f64>) {
        self.body_angular_velocity = angular;
        self.body_linear_velocity = linear;
    }

    /// Instantaneous change of the body velocity, as from an external push.
    ///
    /// Units: meters/second, in world
    pub fn push(&mut self, delta_velocity_mps: Vector3<f64>) {
        self.body_linear_velocity += delta_velocity_mps;
    }

    /// Joint positions of a leg, i.e. the sole position relative to its hip in
    /// the body frame.
    pub fn leg_position(&self, quadrant: RobotQuadrant) -> Vector3<f64> {
        self.leg_vector(quadrant, |j| j.position)
    }

    pub fn set_leg_position(&mut self, quadrant: RobotQuadrant, q: &Vector3<f64>) {
        self.set_leg_vector(quadrant, q, |j, v| j.position = v);
    }

    pub fn leg_velocity(&self, quadrant: RobotQuadrant) -> Vector3<f64> {
        self.leg_vector(quadrant, |j| j.velocity)
    }

    pub fn set_leg_velocity(&mut self, quadrant: RobotQuadrant, qd: &Vector3<f64>) {
        self.set_leg_vector(quadrant, qd, |j, v| j.velocity = v);
    }

    pub fn leg_desired_effort(&self, quadrant: RobotQuadrant) -> Vector3<f64> {
        self.leg_vector(quadrant, |j| j.desired_effort)
    }

    /// Place a sole at a world position by moving its leg joints.
    pub fn place_sole(&mut self, quadrant: RobotQuadrant, sole_in_world: &Point3<f64>) {
        let in_body = self.body_pose.inverse_transform_point(sole_in_world);
        let q = in_body.coords - self.hip_offsets[quadrant];
        self.set_leg_position(quadrant, &q);
    }

    /// Sole position in world.
    pub fn sole_position_in_world(&self, quadrant: RobotQuadrant) -> Point3<f64> {
        self.body_pose * Point3::from(self.hip_offsets[quadrant] + self.leg_position(quadrant))
    }

    /// Sole linear velocity in world.
    pub fn sole_velocity_in_world(&self, quadrant: RobotQuadrant) -> Vector3<f64> {
        let r = self.sole_position_in_world(quadrant) - Point3::from(self.body_pose.translation.vector);
        self.body_linear_velocity
            + self.body_angular_velocity.cross(&r)
            + self.body_pose.rotation * self.leg_velocity(quadrant)
    }

    /// Advance the plant by `dt_s` under the joints' desired efforts.
    ///
    /// Legs with `InContact` have their sole pinned to the ground where it was
    /// when contact started, and push the body with the reaction of the force
    /// they apply. Legs out of contact are treated as massless and move in
    /// proportion to their effort.
    pub fn step_simulation(
        &mut self,
        contact: &QuadrantMap<ContactState>,
        gravity_mps2: f64,
        dt_s: f64,
        frames: &mut FrameGraph,
    ) {
        let rotation = self.body_pose.rotation;
        let com = Point3::from(self.body_pose.translation.vector);

        let mut force = Vector3::new(0.0, 0.0, -self.params.mass_kg * gravity_mps2);
        let mut torque = Vector3::zeros();

        for q in RobotQuadrant::ALL.iter().copied() {
            // J = R so the force the leg applies at the sole is R * effort
            let leg_force = rotation * self.leg_desired_effort(q);

            match contact[q] {
                ContactState::InContact => {
                    let pinned = self.pinned_soles[q];
                    let sole = match pinned {
                        Some(p) => p,
                        None => {
                            let p = self.sole_position_in_world(q);
                            self.pinned_soles[q] = Some(p);
                            p
                        }
                    };
                    force -= leg_force;
                    torque -= (sole - com).cross(&leg_force);
                }
                ContactState::NoContact => {
                    self.pinned_soles[q] = None;
                    let qd = self.leg_desired_effort(q) / self.params.swing_leg_damping_ns_m;
                    let q_new = self.leg_position(q) + qd * dt_s;
                    self.set_leg_velocity(q, &qd);
                    self.set_leg_position(q, &q_new);
                }
            }
        }

        // Semi-implicit Euler on the floating base
        let inertia = Matrix3::from_diagonal(&Vector3::from(self.params.inertia_kgm2));
        let omega_body = rotation.inverse() * self.body_angular_velocity;
        let torque_body = rotation.inverse() * torque;
        let omega_dot = match inertia.try_inverse() {
            Some(inv) => inv * (torque_body - omega_body.cross(&(inertia * omega_body))),
            None => raise_error!("Body inertia {:?} is singular", self.params.inertia_kgm2),
        };

        self.body_linear_velocity += force / self.params.mass_kg * dt_s;
        let omega_body = omega_body + omega_dot * dt_s;
        self.body_angular_velocity = rotation * omega_body;

        let translation = self.body_pose.translation.vector + self.body_linear_velocity * dt_s;
        let orientation = rotation * UnitQuaternion::from_scaled_axis(omega_body * dt_s);
        self.body_pose = Isometry3::from_parts(Translation3::from(translation), orientation);

        // Stance legs follow the body so the soles stay where they are
        for q in RobotQuadrant::ALL.iter().copied() {
            if let Some(sole) = self.pinned_soles[q] {
                let r = sole - Point3::from(self.body_pose.translation.vector);
                let qd = self.body_pose.rotation.inverse()
                    * (-self.body_linear_velocity - self.body_angular_velocity.cross(&r));
                self.place_sole(q, &sole);
                self.set_leg_velocity(q, &qd);
            }
        }

        trace!(
            "Plant: body at {:?}, velocity {:?}",
            self.body_pose.translation.vector,
            self.body_linear_velocity
        );

        self.update_frames(frames);
    }

    /// World-frame angular and linear velocity of a frame's origin.
    fn frame_velocity_in_world(&self, frames: &FrameGraph, frame: FrameId) -> (Vector3<f64>, Vector3<f64>) {
        if frame == frames.world() {
            return (Vector3::zeros(), Vector3::zeros());
        }

        if frame == self.body_frame {
            return (self.body_angular_velocity, self.body_linear_velocity);
        }

        for (q, sole) in self.sole_frames.iter() {
            if *sole == frame {
                return (self.body_angular_velocity, self.sole_velocity_in_world(q));
            }
        }

        raise_error!(
            "Frame \"{}\" is not attached to the robot",
            frames.name(frame)
        )
    }

    fn joint_index(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name() == name)
    }

    fn leg_vector<F: Fn(&OneDofJoint) -> f64>(&self, quadrant: RobotQuadrant, f: F) -> Vector3<f64> {
        let mut v = Vector3::zeros();
        for (i, name) in self.joint_names[quadrant].iter().enumerate() {
            if let Some(j) = self.joint(name) {
                v[i] = f(j);
            }
        }
        v
    }

    fn set_leg_vector<F: Fn(&mut OneDofJoint, f64)>(
        &mut self,
        quadrant: RobotQuadrant,
        value: &Vector3<f64>,
        f: F,
    ) {
        for i in 0..3 {
            if let Some(idx) = self.joint_index(&self.joint_names[quadrant][i]) {
                f(&mut self.joints[idx], value[i]);
            }
        }
    }
}

impl TwistCalculator for CartesianQuadrupedModel {
    fn relative_twist(&self, frames: &FrameGraph, base: FrameId, body: FrameId) -> Twist {
        let (w_base, v_base) = self.frame_velocity_in_world(frames, base);
        let (w_body, v_body) = self.frame_velocity_in_world(frames, body);

        let world = frames.world();
        let p_base = frames.transform_between(base, world).translation.vector;
        let p_body = frames.transform_between(body, world).translation.vector;

        // Velocity of the body origin as seen from the base, in world axes
        let angular = w_body - w_base;
        let linear = v_body - (v_base + w_base.cross(&(p_body - p_base)));

        let mut twist = Twist::new(body, base, world, angular, linear);

        // The linear part is currently the velocity of the body origin, which
        // is what the twist holds once expressed in the body frame. Rotate only.
        let rotation = frames.transform_between(world, body).rotation;
        twist.angular = rotation * twist.angular;
        twist.linear = rotation * twist.linear;
        twist.expressed_in = body;
        twist
    }
}

impl FullRobotModel for CartesianQuadrupedModel {
    fn total_mass(&self) -> f64 {
        self.params.mass_kg
    }

    fn body_frame(&self) -> FrameId {
        self.body_frame
    }

    fn sole_frame(&self, quadrant: RobotQuadrant) -> FrameId {
        self.sole_frames[quadrant]
    }

    fn com_position(&self) -> FramePoint {
        FramePoint::new(
            self.world_frame,
            Point3::from(self.body_pose.translation.vector),
        )
    }

    fn com_velocity(&self) -> FrameVector {
        FrameVector::new(self.world_frame, self.body_linear_velocity)
    }

    fn leg_joint_names(&self, quadrant: RobotQuadrant) -> &[String] {
        &self.joint_names[quadrant]
    }

    fn joint(&self, name: &str) -> Option<&OneDofJoint> {
        self.joints.iter().find(|j| j.name() == name)
    }

    fn joint_mut(&mut self, name: &str) -> Option<&mut OneDofJoint> {
        self.joints.iter_mut().find(|j| j.name() == name)
    }

    fn sole_jacobian(&self, _quadrant: RobotQuadrant) -> DMatrix<f64> {
        let r = self.body_pose.rotation.to_rotation_matrix();
        DMatrix::from_iterator(3, 3, r.matrix().iter().copied())
    }

    fn update_frames(&self, frames: &mut FrameGraph) {
        frames.set_transform_to_parent(self.body_frame, self.body_pose);

        for (q, sole) in self.sole_frames.iter() {
            let offset = self.hip_offsets[q] + self.leg_position(q);
            frames.set_transform_to_parent(
                *sole,
                Isometry3::translation(offset.x, offset.y, offset.z),
            );
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

    #[test]
    fn test_nominal_stance() {
        let mut frames = FrameGraph::new();
        let model = CartesianQuadrupedModel::new(QuadrupedModelParams::default(), &mut frames);

        let sole = FramePoint::origin(model.sole_frame(RobotQuadrant::HindRight))
            .changed_to(&frames, frames.world());
        assert_abs_diff_eq!(*sole.coords(), Vector3::new(-0.35, -0.2, 0.0), epsilon = 1e-12);
        assert_eq!(model.com_position().z(), 0.5);
        assert_eq!(model.leg_joint_names(RobotQuadrant::FrontLeft)[2], "front_left_z");
    }

    #[test]
    fn test_relative_twist() {
        let mut frames = FrameGraph::new();
        let mut model = CartesianQuadrupedModel::new(QuadrupedModelParams::default(), &mut frames);
        let world = frames.world();

        model.set_body_velocity(Vector3::new(0.0, 0.0, 1.0), Vector3::new(0.5, 0.0, 0.0));
        model.update_frames(&mut frames);

        // Sole of the front left leg relative to the world, in the sole frame
        let sole = model.sole_frame(RobotQuadrant::FrontLeft);
        let twist = model.relative_twist(&frames, world, sole);
        assert_eq!(twist.expressed_in, sole);
        assert_abs_diff_eq!(twist.angular, Vector3::z(), epsilon = 1e-12);
        // 0.5 in x plus w x r with r = (0.35, 0.2, -0.5)
        assert_abs_diff_eq!(twist.linear, Vector3::new(0.3, 0.35, 0.0), epsilon = 1e-12);

        // The sole does not move relative to the body
        let body = model.body_frame();
        let twist = model.relative_twist(&frames, body, sole);
        assert_abs_diff_eq!(twist.linear, Vector3::zeros(), epsilon = 1e-12);
        assert_abs_diff_eq!(twist.angular, Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_static_stance_simulation() {
        let mut frames = FrameGraph::new();
        let mut model = CartesianQuadrupedModel::new(QuadrupedModelParams::default(), &mut frames);
        let contact = QuadrantMap::splat(ContactState::InContact);

        // Each leg pushes down with a quarter of the weight
        let weight = model.total_mass() * 9.81;
        for q in RobotQuadrant::ALL.iter().copied() {
            let name = model.leg_joint_names(q)[2].clone();
            if let Some(j) = model.joint_mut(&name) {
                j.set_desired_effort(-weight / 4.0);
            }
        }

        for _ in 0..100 {
            model.step_simulation(&contact, 9.81, 0.002, &mut frames);
        }

        assert_abs_diff_eq!(model.com_position().z(), 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(
            model.sole_position_in_world(RobotQuadrant::FrontRight).coords,
            Vector3::new(0.35, -0.2, 0.0),
            epsilon = 1e-9
        );
    }
}
