use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use pcalign_3d::{mesh::TriangleMesh, sampling};

// a regular grid of `n x n` quads on the z = 0 plane with a bump in the middle
fn grid_mesh(n: usize) -> TriangleMesh {
    let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
    for i in 0..=n {
        for j in 0..=n {
            let x = i as f64 / n as f64;
            let y = j as f64 / n as f64;
            let z = (-((x - 0.5).powi(2) + (y - 0.5).powi(2)) * 10.0).exp();
            vertices.push([x, y, z]);
        }
    }
    let mut faces = Vec::with_capacity(2 * n * n);
    for i in 0..n {
        for j in 0..n {
            let a = i * (n + 1) + j;
            let b = a + n + 1;
            faces.push([a, b, a + 1]);
            faces.push([a + 1, b, b + 1]);
        }
    }
    match TriangleMesh::new(vertices, faces, None) {
        Ok(mesh) => mesh,
        Err(e) => panic!("invalid grid mesh: {e}"),
    }
}

fn bench_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampling");
    let mesh = grid_mesh(100);

    for num_samples in [1_000, 10_000, 100_000].iter() {
        group.bench_with_input(
            BenchmarkId::new("sample_surface_uniform", num_samples),
            num_samples,
            |b, &n| b.iter(|| black_box(sampling::sample_surface_uniform(&mesh, n, 0))),
        );
    }

    let cloud = match sampling::sample_surface_uniform(&mesh, 100_000, 0) {
        Ok(cloud) => cloud,
        Err(e) => panic!("sampling failed: {e}"),
    };
    for min_distance in [0.001, 0.01].iter() {
        group.bench_with_input(
            BenchmarkId::new("min_distance_filter", min_distance),
            min_distance,
            |b, &d| b.iter(|| black_box(sampling::min_distance_filter(&cloud, d))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_sampling);
criterion_main!(benches);
