//! # Polygon wiggling
//!
//! Finds the smallest planar rigid motion (translation and yaw) that moves a
//! polygon, typically a foothold, inside a convex plane polygon.
//!
//! The motion is found by repeatedly solving a small quadratic program. The
//! yaw is linearised about the centroid of the current polygon, so every
//! vertex `v` must satisfy, for every edge `(n, d)` of the plane,
//!
//! ```text
//! n . (v + t + theta * perp(v - c)) <= d - delta_inside
//! ```
//!
//! while minimising `|t|^2 + rotation_weight * theta^2` inside the configured
//! translation and yaw bounds. The exact rotation is then applied and the
//! process repeated until the polygon is inside. When the program is
//! infeasible the constraint violation is first minimised by a linear
//! program, which gives a best-effort result that can still be outside the
//! plane. Both programs are solved with Clarabel's interior point method.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT::NonnegativeConeT,
};
use log::{debug, trace};
use nalgebra::{Isometry2, Vector2, Vector3};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::{ConvexPolygon2d, PlanarRegion};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Maximum number of linearise-and-solve iterations
const MAX_ITERATIONS: usize = 10;

/// Tolerance used to decide whether a polygon is inside the plane
const INSIDE_EPSILON: f64 = 1e-9;

/// Gap and feasibility tolerance of the interior point solver
const SOLVER_TOLERANCE: f64 = 1e-10;

const SOLVER_MAX_ITERATIONS: u32 = 100;

/// Slack added on top of the minimal violation when the problem is infeasible
const SLACK_MARGIN: f64 = 1e-9;

/// Steps smaller than this on every axis stop the iteration
const MIN_STEP: f64 = 1e-12;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Bounds and weights of the wiggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WiggleParameters {
    /// Units: meters
    pub max_x: f64,

    /// Units: meters
    pub min_x: f64,

    /// Units: meters
    pub max_y: f64,

    /// Units: meters
    pub min_y: f64,

    /// Units: radians
    pub max_yaw: f64,

    /// Units: radians
    pub min_yaw: f64,

    /// Weight of the yaw relative to the translation in the cost
    pub rotation_weight: f64,

    /// Distance every vertex shall keep from the edges of the plane
    ///
    /// Units: meters
    pub delta_inside: f64,
}

/// One linear constraint `a . z <= b` on `z = (dx, dy, sqrt(w) * dyaw)`.
#[derive(Debug, Clone, Copy)]
struct Constraint {
    a: Vector3<f64>,
    b: f64,

    /// Whether this constraint may be relaxed when the problem is infeasible.
    /// The bound constraints never are.
    relaxable: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for WiggleParameters {
    fn default() -> Self {
        Self {
            max_x: 1.0,
            min_x: -1.0,
            max_y: 1.0,
            min_y: -1.0,
            max_yaw: 15f64.to_radians(),
            min_yaw: -15f64.to_radians(),
            rotation_weight: 1.0,
            delta_inside: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Move `polygon` inside `plane`, see the module documentation.
///
/// The result is not guaranteed to be inside the plane if the bounds do not
/// allow it.
pub fn wiggle_polygon(
    polygon: &ConvexPolygon2d,
    plane: &ConvexPolygon2d,
    params: &WiggleParameters,
) -> ConvexPolygon2d {
    let transform = find_wiggle_transform(polygon, plane, params);

    if transform == Isometry2::identity() {
        polygon.clone()
    } else {
        polygon.transformed(&transform)
    }
}

/// Find the rigid transform which moves `polygon` inside `plane`.
pub fn find_wiggle_transform(
    polygon: &ConvexPolygon2d,
    plane: &ConvexPolygon2d,
    params: &WiggleParameters,
) -> Isometry2<f64> {
    let sqrt_w = params.rotation_weight.sqrt();
    let half_planes = plane.half_planes();

    let mut transform = Isometry2::identity();

    // Accumulated motion, used to keep every step within the bounds
    let mut total = Vector3::zeros();

    for iteration in 0..MAX_ITERATIONS {
        let current = polygon.transformed(&transform);

        if plane.is_polygon_inside(&current, INSIDE_EPSILON) {
            trace!("Polygon inside after {} iteration(s)", iteration);
            break;
        }

        let centroid = current.centroid();

        // Vertex-in-plane constraints
        let mut constraints = Vec::with_capacity(half_planes.len() * current.len() + 6);
        for h in half_planes.iter() {
            for v in current.vertices() {
                let r = v - centroid;
                let perp = Vector2::new(-r.y, r.x);
                constraints.push(Constraint {
                    a: Vector3::new(h.normal.x, h.normal.y, h.normal.dot(&perp) / sqrt_w),
                    b: h.offset - params.delta_inside - h.normal.dot(&v.coords),
                    relaxable: true,
                });
            }
        }

        // Remaining room within the bounds
        let bound = |a: Vector3<f64>, b: f64| Constraint {
            a,
            b,
            relaxable: false,
        };
        constraints.push(bound(Vector3::x(), params.max_x - total.x));
        constraints.push(bound(-Vector3::x(), total.x - params.min_x));
        constraints.push(bound(Vector3::y(), params.max_y - total.y));
        constraints.push(bound(-Vector3::y(), total.y - params.min_y));
        constraints.push(bound(Vector3::z() / sqrt_w, params.max_yaw - total.z));
        constraints.push(bound(-Vector3::z() / sqrt_w, total.z - params.min_yaw));

        let z = match min_norm_solution(&constraints) {
            Some(z) => z,
            None => {
                let slack = match min_uniform_slack(&constraints) {
                    Some(s) => s,
                    None => {
                        debug!("Wiggle constraints cannot be relaxed, giving up");
                        break;
                    }
                };
                debug!("Wiggle infeasible, relaxing vertex constraints by {:.3e}", slack);

                let relaxed: Vec<Constraint> = constraints
                    .iter()
                    .map(|c| Constraint {
                        b: if c.relaxable { c.b + slack + SLACK_MARGIN } else { c.b },
                        ..*c
                    })
                    .collect();

                match min_norm_solution(&relaxed) {
                    Some(z) => z,
                    None => break,
                }
            }
        };

        let step = Vector3::new(z.x, z.y, z.z / sqrt_w);

        // Rotate about the centroid, then translate
        let step_transform = Isometry2::translation(centroid.x + step.x, centroid.y + step.y)
            * Isometry2::rotation(step.z)
            * Isometry2::translation(-centroid.x, -centroid.y);

        transform = step_transform * transform;
        total += step;

        if step.iter().all(|s| s.abs() < MIN_STEP) {
            break;
        }
    }

    transform
}

/// Wiggle a polygon into the polygon of a planar region it overlaps most.
///
/// The polygon must be expressed in the region's local frame. Returns `None`
/// if it does not overlap any of the region's polygons.
pub fn wiggle_polygon_into_region(
    polygon: &ConvexPolygon2d,
    region: &PlanarRegion,
    params: &WiggleParameters,
) -> Option<Isometry2<f64>> {
    let (_, plane) = region
        .convex_polygons()
        .iter()
        .map(|p| (polygon.intersection(p).area(), p))
        .filter(|(area, _)| *area > 0.0)
        .max_by_key(|(area, _)| OrderedFloat(*area))?;

    Some(find_wiggle_transform(polygon, plane, params))
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Minimum norm `z` such that `a_i . z <= b_i` for every constraint, `None`
/// if the constraints are infeasible or the solver fails.
fn min_norm_solution(constraints: &[Constraint]) -> Option<Vector3<f64>> {
    let rows: Vec<Vec<f64>> = constraints.iter().map(|c| c.a.iter().copied().collect()).collect();
    let b: Vec<f64> = constraints.iter().map(|c| c.b).collect();

    solve_qp(&[1.0, 1.0, 1.0], &[0.0, 0.0, 0.0], &rows, &b).map(|x| Vector3::new(x[0], x[1], x[2]))
}

/// Smallest `s` for which `a_i . z <= b_i + s` (relaxable) and
/// `a_i . z <= b_i` (fixed) is feasible, a linear program in `(z, s)`.
fn min_uniform_slack(constraints: &[Constraint]) -> Option<f64> {
    let mut rows: Vec<Vec<f64>> = constraints
        .iter()
        .map(|c| {
            let s = if c.relaxable { -1.0 } else { 0.0 };
            vec![c.a.x, c.a.y, c.a.z, s]
        })
        .collect();
    let mut b: Vec<f64> = constraints.iter().map(|c| c.b).collect();

    // s >= 0, only called once the unrelaxed program failed
    rows.push(vec![0.0, 0.0, 0.0, -1.0]);
    b.push(0.0);

    solve_qp(&[0.0; 4], &[0.0, 0.0, 0.0, 1.0], &rows, &b).map(|x| x[3])
}

/// Solve `min 1/2 x^T diag(p) x + q^T x` subject to `rows * x <= b`.
fn solve_qp(p_diag: &[f64], q: &[f64], rows: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = q.len();

    let p = diagonal_to_csc(p_diag);
    let a = rows_to_csc(rows, n);
    let cones = [NonnegativeConeT(rows.len())];

    let settings = DefaultSettingsBuilder::default()
        .verbose(false)
        .max_iter(SOLVER_MAX_ITERATIONS)
        .tol_gap_abs(SOLVER_TOLERANCE)
        .tol_gap_rel(SOLVER_TOLERANCE)
        .tol_feas(SOLVER_TOLERANCE)
        .build()
        .ok()?;

    let mut solver = match DefaultSolver::new(&p, q, &a, b, &cones, settings) {
        Ok(solver) => solver,
        Err(e) => {
            debug!("Wiggle program rejected by the solver: {:?}", e);
            return None;
        }
    };
    solver.solve();

    match solver.solution.status {
        SolverStatus::Solved | SolverStatus::AlmostSolved => Some(solver.solution.x.clone()),
        status => {
            trace!("Wiggle program not solved: {:?}", status);
            None
        }
    }
}

/// Upper triangle of a diagonal matrix, zeros left out.
fn diagonal_to_csc(diag: &[f64]) -> CscMatrix<f64> {
    let n = diag.len();
    let mut colptr = vec![0usize; n + 1];
    let mut rowval = Vec::with_capacity(n);
    let mut nzval = Vec::with_capacity(n);

    for (j, d) in diag.iter().enumerate() {
        if *d != 0.0 {
            rowval.push(j);
            nzval.push(*d);
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(n, n, colptr, rowval, nzval)
}

/// Dense rows, each `ncols` long, to compressed sparse columns.
fn rows_to_csc(rows: &[Vec<f64>], ncols: usize) -> CscMatrix<f64> {
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for (i, row) in rows.iter().enumerate() {
            if row[j] != 0.0 {
                rowval.push(i);
                nzval.push(row[j]);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(rows.len(), ncols, colptr, rowval, nzval)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
