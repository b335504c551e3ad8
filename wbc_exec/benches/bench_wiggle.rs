//! # Wiggle and Stand Cycle Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use nalgebra::{Isometry2, Point2, Vector2};
use util::module::Controller;
use util::params::ParameterRepository;
use wbc_lib::{
    force_ctrl::{
        QuadrupedReferenceFrames, RuntimeEnvironment, StaticInputProvider,
        VirtualModelStandController,
    },
    frames::FrameGraph,
    geometry::{wiggle_polygon, wiggle_polygon_into_region, ConvexPolygon2d, PlanarRegion, WiggleParameters},
    model::{CartesianQuadrupedModel, QuadrupedModelParams},
    telemetry::NullSink,
};

fn wiggle_benchmark(c: &mut Criterion) {
    // 20 cm by 10 cm foot, rotated and half off a 50 cm square plane
    let foot = ConvexPolygon2d::rectangle(0.2, 0.1);
    let foot = ConvexPolygon2d::from_points(
        foot.transformed(&Isometry2::new(
            Vector2::new(-0.1, -0.3),
            (-30f64).to_radians(),
        ))
        .vertices(),
    );
    let plane = ConvexPolygon2d::from_points(&[
        Point2::new(0.0, 0.0),
        Point2::new(0.5, 0.0),
        Point2::new(0.0, 0.5),
        Point2::new(0.5, 0.5),
    ]);
    let params = WiggleParameters::default();

    c.bench_function("wiggle_polygon", |b| {
        b.iter(|| wiggle_polygon(&foot, &plane, &params))
    });

    // Region made of a row of stepping stones
    let region = PlanarRegion::new(
        (0..5)
            .map(|i| {
                ConvexPolygon2d::rectangle(0.3, 0.3).transformed(&Isometry2::new(
                    Vector2::new(-0.6 + 0.35 * i as f64, 0.0),
                    0.0,
                ))
            })
            .collect(),
    );

    c.bench_function("wiggle_polygon_into_region", |b| {
        b.iter(|| wiggle_polygon_into_region(&foot, &region, &params))
    });
}

fn stand_cycle_benchmark(c: &mut Criterion) {
    let mut frames = FrameGraph::new();
    let model = CartesianQuadrupedModel::new(QuadrupedModelParams::default(), &mut frames);
    let reference_frames = QuadrupedReferenceFrames::new(&mut frames);
    let input = StaticInputProvider::standing(reference_frames.support_frame(), 0.5);

    let mut env = RuntimeEnvironment::new(
        model,
        frames,
        reference_frames,
        input,
        ParameterRepository::new(),
        Box::new(NullSink),
        0.004,
    );

    let mut stand = VirtualModelStandController::new(&mut env).unwrap();
    stand.on_entry(&mut env).unwrap();

    c.bench_function("stand_cycle", |b| {
        b.iter(|| stand.process(&mut env).unwrap())
    });
}

criterion_group!(benches, wiggle_benchmark, stand_cycle_benchmark);
criterion_main!(benches);
