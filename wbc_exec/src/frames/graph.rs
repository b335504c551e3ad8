//! Frame graph

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Isometry3;
use serde::Serialize;
use util::raise_error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Identifier of a frame in a `FrameGraph`.
///
/// Identifiers are only meaningful for the graph that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FrameId(usize);

/// A graph of reference frames.
///
/// Each frame owns the transform to its parent. The transform to the root of
/// the frame's tree is cached and refreshed whenever a transform in the
/// frame's ancestry is set, so queries during a control cycle are cheap.
///
/// Frames are stored in creation order, and a frame's parent always exists
/// before the frame itself, so refreshing in index order visits parents
/// before children.
#[derive(Debug, Clone)]
pub struct FrameGraph {
    nodes: Vec<FrameNode>,
}

#[derive(Debug, Clone)]
struct FrameNode {
    name: String,
    parent: Option<FrameId>,
    root: FrameId,

    /// Maps coordinates expressed in this frame into the parent frame
    transform_to_parent: Isometry3<f64>,

    /// Maps coordinates expressed in this frame into the root frame
    transform_to_root: Isometry3<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FrameGraph {
    /// Name of the root frame every graph is created with.
    pub const WORLD_FRAME_NAME: &'static str = "world";

    /// Create a new graph containing only the world frame.
    pub fn new() -> Self {
        let mut graph = Self { nodes: Vec::new() };
        graph.add_root(Self::WORLD_FRAME_NAME);
        graph
    }

    /// The inertial world frame.
    pub fn world(&self) -> FrameId {
        FrameId(0)
    }

    /// Add a frame which is not attached to any other frame.
    ///
    /// Quantities expressed in frames of different trees can never be
    /// converted into each other.
    pub fn add_root(&mut self, name: &str) -> FrameId {
        let id = FrameId(self.nodes.len());
        self.nodes.push(FrameNode {
            name: name.to_string(),
            parent: None,
            root: id,
            transform_to_parent: Isometry3::identity(),
            transform_to_root: Isometry3::identity(),
        });
        id
    }

    /// Add a frame as a child of `parent`.
    pub fn add_frame(
        &mut self,
        name: &str,
        parent: FrameId,
        transform_to_parent: Isometry3<f64>,
    ) -> FrameId {
        let parent_node = self.node(parent);
        let root = parent_node.root;
        let transform_to_root = parent_node.transform_to_root * transform_to_parent;

        let id = FrameId(self.nodes.len());
        self.nodes.push(FrameNode {
            name: name.to_string(),
            parent: Some(parent),
            root,
            transform_to_parent,
            transform_to_root,
        });
        id
    }

    /// Set the transform from `frame` to its parent and refresh the cached
    /// transforms of all its descendants.
    pub fn set_transform_to_parent(&mut self, frame: FrameId, transform: Isometry3<f64>) {
        if self.node(frame).parent.is_none() {
            raise_error!(
                "Cannot set the transform of root frame \"{}\"",
                self.node(frame).name
            );
        }

        self.nodes[frame.0].transform_to_parent = transform;

        // Frames created before this one cannot be descendants of it
        for i in frame.0..self.nodes.len() {
            if let Some(parent) = self.nodes[i].parent {
                let to_root =
                    self.nodes[parent.0].transform_to_root * self.nodes[i].transform_to_parent;
                self.nodes[i].transform_to_root = to_root;
            }
        }
    }

    pub fn transform_to_parent(&self, frame: FrameId) -> &Isometry3<f64> {
        &self.node(frame).transform_to_parent
    }

    /// Transform mapping coordinates in `frame` into its root frame.
    pub fn transform_to_root(&self, frame: FrameId) -> &Isometry3<f64> {
        &self.node(frame).transform_to_root
    }

    /// Transform mapping coordinates expressed in `from` into `to`.
    ///
    /// # Panics
    /// - If the two frames do not share a root.
    pub fn transform_between(&self, from: FrameId, to: FrameId) -> Isometry3<f64> {
        if from == to {
            return Isometry3::identity();
        }

        self.verify_same_roots(from, to);

        self.node(to).transform_to_root.inverse() * self.node(from).transform_to_root
    }

    /// Raise an error if `a` and `b` belong to different trees.
    pub fn verify_same_roots(&self, a: FrameId, b: FrameId) {
        let (root_a, root_b) = (self.node(a).root, self.node(b).root);

        if root_a != root_b {
            raise_error!(
                "Frames \"{}\" and \"{}\" do not share a root (\"{}\" vs \"{}\")",
                self.node(a).name,
                self.node(b).name,
                self.node(root_a).name,
                self.node(root_b).name
            );
        }
    }

    pub fn parent(&self, frame: FrameId) -> Option<FrameId> {
        self.node(frame).parent
    }

    pub fn root(&self, frame: FrameId) -> FrameId {
        self.node(frame).root
    }

    pub fn name(&self, frame: FrameId) -> &str {
        &self.node(frame).name
    }

    /// Find a frame by name.
    pub fn find(&self, name: &str) -> Option<FrameId> {
        self.nodes
            .iter()
            .position(|n| n.name == name)
            .map(FrameId)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, frame: FrameId) -> &FrameNode {
        match self.nodes.get(frame.0) {
            Some(n) => n,
            None => raise_error!("Frame {:?} does not belong to this graph", frame),
        }
    }
}

impl Default for FrameGraph {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Point3, Translation3, UnitQuaternion, Vector3};

    #[test]
    fn test_transform_between() {
        let mut graph = FrameGraph::new();
        let world = graph.world();

        let body = graph.add_frame(
            "body",
            world,
            Isometry3::from_parts(
                Translation3::new(1.0, 0.0, 0.5),
                UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            ),
        );
        let sole = graph.add_frame(
            "sole",
            body,
            Isometry3::translation(0.2, 0.1, -0.5),
        );

        // Sole origin in world: body origin + Rz(90) * (0.2, 0.1, -0.5)
        let p = graph.transform_between(sole, world) * Point3::origin();
        assert_abs_diff_eq!(p.x, 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(p.z, 0.0, epsilon = 1e-12);

        // And back again
        let q = graph.transform_between(world, sole) * p;
        assert_abs_diff_eq!(q.coords.norm(), 0.0, epsilon = 1e-12);

        // Moving the body drags the sole along
        graph.set_transform_to_parent(body, Isometry3::translation(0.0, 0.0, 1.0));
        let p = graph.transform_to_root(sole) * Point3::origin();
        assert_abs_diff_eq!(p.coords, Vector3::new(0.2, 0.1, 0.5), epsilon = 1e-12);

        assert_eq!(graph.find("sole"), Some(sole));
        assert_eq!(graph.name(body), "body");
        assert_eq!(graph.parent(sole), Some(body));
        assert_eq!(graph.root(sole), world);
    }

    #[test]
    #[should_panic]
    fn test_different_roots() {
        let mut graph = FrameGraph::new();
        let other = graph.add_root("other");
        let child = graph.add_frame("child", other, Isometry3::identity());

        graph.transform_between(child, graph.world());
    }
}
