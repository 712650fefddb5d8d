use std::collections::HashMap;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::linalg::{add3, distance_sq3, scale3};
use crate::mesh::TriangleMesh;
use crate::pointcloud::PointCloud;

/// Error types for the sampling module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SamplingError {
    /// The mesh has zero total area, so no face can be picked.
    #[error("Cannot sample a mesh with zero surface area")]
    ZeroArea,

    /// The requested number of samples is zero.
    #[error("The number of samples must be positive")]
    NoSamples,

    /// The minimum distance is negative or not finite.
    #[error("Minimum distance must be finite and non-negative. Got: {0}")]
    InvalidDistance(f64),
}

/// Sample points uniformly by area on the surface of a triangle mesh.
///
/// Faces are picked by inverse CDF over their areas and points are drawn
/// uniformly inside the face with the square-root barycentric trick. Each sample
/// carries the interpolated vertex normal when the mesh has vertex normals,
/// else the face normal.
///
/// # Arguments
///
/// * `mesh` - The mesh to sample.
/// * `num_samples` - Number of points to draw.
/// * `seed` - Seed of the random generator, same seed gives same samples.
pub fn sample_surface_uniform(
    mesh: &TriangleMesh,
    num_samples: usize,
    seed: u64,
) -> Result<PointCloud, SamplingError> {
    if num_samples == 0 {
        return Err(SamplingError::NoSamples);
    }

    // cumulative areas for inverse CDF face selection
    let mut cdf = Vec::with_capacity(mesh.num_faces());
    let mut total = 0.0;
    for face in 0..mesh.num_faces() {
        total += mesh.face_area(face);
        cdf.push(total);
    }
    if total.is_nan() || total <= 0.0 {
        return Err(SamplingError::ZeroArea);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(num_samples);
    let mut normals = Vec::with_capacity(num_samples);

    for _ in 0..num_samples {
        let u = rng.random::<f64>() * total;
        // first face whose cumulative area reaches u, skipping zero-area faces
        let face = cdf.partition_point(|&c| c < u).min(cdf.len() - 1);

        let r1 = rng.random::<f64>().sqrt();
        let r2 = rng.random::<f64>();
        let barycentric = [1.0 - r1, r1 * (1.0 - r2), r1 * r2];

        let [a, b, c] = mesh.triangle(face);
        let p = add3(
            &add3(&scale3(&a, barycentric[0]), &scale3(&b, barycentric[1])),
            &scale3(&c, barycentric[2]),
        );
        points.push(p);

        let n = mesh
            .interpolate_normal(face, &barycentric)
            .or_else(|| mesh.face_normal(face))
            .unwrap_or([0.0; 3]);
        normals.push(n);
    }

    log::debug!(
        "Sampled {} points on {} faces with total area {}",
        num_samples,
        mesh.num_faces(),
        total
    );

    Ok(PointCloud::new(points, Some(normals)))
}

/// Pick `num_samples` distinct points at random, preserving their order.
///
/// Returns a clone of the input when it has no more than `num_samples` points.
pub fn random_subsample(cloud: &PointCloud, num_samples: usize, seed: u64) -> PointCloud {
    if cloud.len() <= num_samples {
        return cloud.clone();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices = rand::seq::index::sample(&mut rng, cloud.len(), num_samples).into_vec();
    indices.sort_unstable();
    cloud.select(&indices)
}

/// Drop points closer than `min_distance` to an already kept point.
///
/// Points are visited in order, so the first of a cluster of duplicates wins.
/// A hash grid with cell size `min_distance` limits the search to the 27
/// neighbouring cells.
pub fn min_distance_filter(
    cloud: &PointCloud,
    min_distance: f64,
) -> Result<PointCloud, SamplingError> {
    if !min_distance.is_finite() || min_distance < 0.0 {
        return Err(SamplingError::InvalidDistance(min_distance));
    }
    if min_distance == 0.0 {
        return Ok(cloud.clone());
    }

    let cell_of = |p: &[f64; 3]| -> [i64; 3] {
        [
            (p[0] / min_distance).floor() as i64,
            (p[1] / min_distance).floor() as i64,
            (p[2] / min_distance).floor() as i64,
        ]
    };

    let min_distance_sq = min_distance * min_distance;
    let mut grid: HashMap<[i64; 3], Vec<usize>> = HashMap::new();
    let mut kept = Vec::new();

    for (idx, p) in cloud.points().iter().enumerate() {
        let cell = cell_of(p);
        let mut too_close = false;
        'search: for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = [cell[0] + dx, cell[1] + dy, cell[2] + dz];
                    if let Some(bucket) = grid.get(&key) {
                        if bucket
                            .iter()
                            .any(|&j| distance_sq3(p, &cloud.points()[j]) < min_distance_sq)
                        {
                            too_close = true;
                            break 'search;
                        }
                    }
                }
            }
        }
        if !too_close {
            grid.entry(cell).or_default().push(idx);
            kept.push(idx);
        }
    }

    log::debug!(
        "Min distance filter kept {} of {} points",
        kept.len(),
        cloud.len()
    );

    Ok(cloud.select(&kept))
}
