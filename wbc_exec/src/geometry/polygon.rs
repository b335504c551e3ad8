//! Convex polygons in the plane

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Isometry2, Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A convex polygon with its vertices in counter-clockwise order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvexPolygon2d {
    vertices: Vec<Point2<f64>>,
}

/// Supporting line of a polygon edge, `normal . p <= offset` inside.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HalfPlane {
    pub normal: Vector2<f64>,
    pub offset: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ConvexPolygon2d {
    /// Build the convex hull of a set of points.
    ///
    /// Uses the monotone chain algorithm, so the first vertex is the one with
    /// the lowest x (then y) coordinate. Duplicate and collinear points are
    /// dropped.
    pub fn from_points(points: &[Point2<f64>]) -> Self {
        let mut pts: Vec<Point2<f64>> = points.to_vec();
        pts.sort_by(|a, b| {
            a.x.partial_cmp(&b.x)
                .unwrap_or(Ordering::Equal)
                .then(a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
        });
        pts.dedup();

        if pts.len() <= 2 {
            return Self { vertices: pts };
        }

        let cross = |o: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>| {
            (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
        };

        let mut lower: Vec<Point2<f64>> = Vec::new();
        for p in pts.iter() {
            while lower.len() >= 2 && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0 {
                lower.pop();
            }
            lower.push(*p);
        }

        let mut upper: Vec<Point2<f64>> = Vec::new();
        for p in pts.iter().rev() {
            while upper.len() >= 2 && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0 {
                upper.pop();
            }
            upper.push(*p);
        }

        lower.pop();
        upper.pop();
        lower.extend(upper);

        Self { vertices: lower }
    }

    /// Axis-aligned rectangle centred on the origin.
    pub fn rectangle(length: f64, width: f64) -> Self {
        let (hl, hw) = (0.5 * length, 0.5 * width);
        Self::from_points(&[
            Point2::new(hl, hw),
            Point2::new(hl, -hw),
            Point2::new(-hl, hw),
            Point2::new(-hl, -hw),
        ])
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Enclosed area, zero for polygons with fewer than three vertices.
    pub fn area(&self) -> f64 {
        if self.vertices.len() < 3 {
            return 0.0;
        }

        0.5 * self
            .edges()
            .map(|(a, b)| a.x * b.y - b.x * a.y)
            .sum::<f64>()
    }

    /// Area centroid. Degenerate polygons fall back to the vertex average.
    pub fn centroid(&self) -> Point2<f64> {
        let n = self.vertices.len();
        if n == 0 {
            return Point2::origin();
        }

        let area = self.area();
        if n < 3 || area.abs() < std::f64::EPSILON {
            let sum = self
                .vertices
                .iter()
                .fold(Vector2::zeros(), |acc, v| acc + v.coords);
            return Point2::from(sum / n as f64);
        }

        let mut c = Vector2::zeros();
        for (a, b) in self.edges() {
            let cross = a.x * b.y - b.x * a.y;
            c += (a.coords + b.coords) * cross;
        }

        Point2::from(c / (6.0 * area))
    }

    /// Whether the point lies inside the polygon, or within `epsilon` outside
    /// of it.
    pub fn is_point_inside(&self, point: &Point2<f64>, epsilon: f64) -> bool {
        if self.vertices.len() < 3 {
            return false;
        }

        self.half_planes()
            .iter()
            .all(|h| h.normal.dot(&point.coords) <= h.offset + epsilon)
    }

    /// Whether every vertex of `other` is inside this polygon.
    pub fn is_polygon_inside(&self, other: &ConvexPolygon2d, epsilon: f64) -> bool {
        other
            .vertices
            .iter()
            .all(|v| self.is_point_inside(v, epsilon))
    }

    /// Apply a rigid transform to every vertex.
    pub fn transformed(&self, transform: &Isometry2<f64>) -> Self {
        Self {
            vertices: self.vertices.iter().map(|v| transform * v).collect(),
        }
    }

    /// Scale the polygon about the origin.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            vertices: self.vertices.iter().map(|v| *v * factor).collect(),
        }
    }

    /// Intersection of two convex polygons (Sutherland-Hodgman clipping).
    pub fn intersection(&self, other: &ConvexPolygon2d) -> ConvexPolygon2d {
        if other.vertices.len() < 3 {
            return ConvexPolygon2d { vertices: Vec::new() };
        }

        let mut output = self.vertices.clone();

        for h in other.half_planes() {
            if output.is_empty() {
                break;
            }

            let input = std::mem::take(&mut output);
            let dist = |p: &Point2<f64>| h.normal.dot(&p.coords) - h.offset;

            for i in 0..input.len() {
                let a = input[(i + input.len() - 1) % input.len()];
                let b = input[i];
                let (da, db) = (dist(&a), dist(&b));

                if db <= 0.0 {
                    if da > 0.0 {
                        output.push(a + (b - a) * (da / (da - db)));
                    }
                    output.push(b);
                } else if da <= 0.0 {
                    output.push(a + (b - a) * (da / (da - db)));
                }
            }
        }

        ConvexPolygon2d { vertices: output }
    }

    /// Whether the two polygons have the same vertices, in the same order, to
    /// within `epsilon`.
    pub fn epsilon_equals(&self, other: &ConvexPolygon2d, epsilon: f64) -> bool {
        self.vertices.len() == other.vertices.len()
            && self
                .vertices
                .iter()
                .zip(other.vertices.iter())
                .all(|(a, b)| (a - b).abs().max() <= epsilon)
    }

    pub(crate) fn half_planes(&self) -> Vec<HalfPlane> {
        self.edges()
            .filter_map(|(a, b)| {
                let d = b - a;
                let length = d.norm();
                if length < std::f64::EPSILON {
                    return None;
                }

                // Outward normal of a counter-clockwise edge
                let normal = Vector2::new(d.y, -d.x) / length;
                Some(HalfPlane {
                    normal,
                    offset: normal.dot(&a.coords),
                })
            })
            .collect()
    }

    fn edges(&self) -> impl Iterator<Item = (&Point2<f64>, &Point2<f64>)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (&self.vertices[i], &self.vertices[(i + 1) % n]))
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
    fn test_hull() {
        let poly = ConvexPolygon2d::from_points(&[
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.5, 0.5),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 0.0),
        ]);

        assert_eq!(
            poly.vertices(),
            &[
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 1.0),
                Point2::new(0.0, 1.0)
            ]
        );
        assert_eq!(poly.area(), 1.0);
        assert_eq!(poly.centroid(), Point2::new(0.5, 0.5));

        assert!(poly.is_point_inside(&Point2::new(0.2, 0.9), 0.0));
        assert!(!poly.is_point_inside(&Point2::new(1.1, 0.5), 0.0));
        assert!(poly.is_point_inside(&Point2::new(1.1, 0.5), 0.2));
    }

    #[test]
    fn test_intersection() {
        let a = ConvexPolygon2d::rectangle(2.0, 2.0);
        let b = a.transformed(&Isometry2::translation(1.0, 0.5));

        let c = a.intersection(&b);
        assert_abs_diff_eq!(c.area(), 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(c.centroid().x, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(c.centroid().y, 0.25, epsilon = 1e-12);

        let far = a.transformed(&Isometry2::translation(5.0, 0.0));
        assert_eq!(a.intersection(&far).area(), 0.0);
    }

    #[test]
    fn test_scaled_and_equals() {
        let a = ConvexPolygon2d::rectangle(0.2, 0.1);
        let b = a.scaled(1.1);

        assert!(b.is_polygon_inside(&a, 0.0));
        assert!(!a.is_polygon_inside(&b, 0.0));
        assert!(a.epsilon_equals(&a.transformed(&Isometry2::identity()), 1e-15));
        assert!(!a.epsilon_equals(&b, 1e-3));
    }
}
