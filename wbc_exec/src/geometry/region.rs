//! Planar regions made of several convex polygons

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::ConvexPolygon2d;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A flat, possibly non-convex, area of terrain described in its own local
/// frame as a union of convex polygons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanarRegion {
    convex_polygons: Vec<ConvexPolygon2d>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PlanarRegion {
    pub fn new(convex_polygons: Vec<ConvexPolygon2d>) -> Self {
        Self { convex_polygons }
    }

    pub fn convex_polygons(&self) -> &[ConvexPolygon2d] {
        &self.convex_polygons
    }

    /// Total area, assuming the polygons do not overlap.
    pub fn area(&self) -> f64 {
        self.convex_polygons.iter().map(|p| p.area()).sum()
    }

    /// Whether the polygon is fully inside one of the region's polygons.
    pub fn contains_polygon(&self, polygon: &ConvexPolygon2d, epsilon: f64) -> bool {
        self.convex_polygons
            .iter()
            .any(|p| p.is_polygon_inside(polygon, epsilon))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Isometry2;

    #[test]
    fn test_contains_polygon() {
        let a = ConvexPolygon2d::rectangle(1.0, 1.0);
        let b = a.transformed(&Isometry2::translation(1.0, 0.0));
        let region = PlanarRegion::new(vec![a, b]);

        assert_eq!(region.area(), 2.0);

        let foot = ConvexPolygon2d::rectangle(0.2, 0.1);
        assert!(region.contains_polygon(&foot.transformed(&Isometry2::translation(1.2, 0.1)), 0.0));

        // Straddling the boundary between the two polygons is not contained
        assert!(!region.contains_polygon(&foot.transformed(&Isometry2::translation(0.5, 0.0)), 0.0));
    }
}
