use pcalign_3d::io::Geometry;
use pcalign_3d::mesh::TriangleMesh;
use pcalign_3d::pointcloud::PointCloud;
use pcalign_3d::sampling;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::IcpError;
use crate::icp::{icp, IcpParams, IcpResult};
use crate::oracle::{ClosestPointOracle, KdTreeOracle, MeshOracle};
use crate::transform::RigidTransform;

/// Parameters of a registration: source preparation plus ICP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationParams {
    /// Number of source points used by ICP: samples drawn on a source mesh, or
    /// the size a source point cloud is subsampled to.
    pub samples: usize,
    /// Seed of the sampling.
    pub seed: u64,
    /// Drop source cloud points closer than this to an already kept point.
    pub min_point_distance: Option<f64>,
    /// ICP parameters.
    pub icp: IcpParams,
}

impl Default for RegistrationParams {
    fn default() -> Self {
        Self {
            samples: 2000,
            seed: 0,
            min_point_distance: None,
            icp: IcpParams::default(),
        }
    }
}

/// Outcome of a registration.
#[derive(Debug, Clone)]
pub struct Registration {
    /// ICP result; the transform maps the source onto the target.
    pub result: IcpResult,
    /// The source points ICP ran on, in the source frame.
    pub source_samples: PointCloud,
    /// The source points moved into the target frame.
    pub aligned: PointCloud,
}

fn check_samples(params: &RegistrationParams) -> Result<(), IcpError> {
    if params.samples == 0 {
        return Err(IcpError::InvalidParameter(
            "samples must be positive".to_string(),
        ));
    }
    Ok(())
}

fn sample_mesh(source: &TriangleMesh, params: &RegistrationParams) -> Result<PointCloud, IcpError> {
    check_samples(params)?;
    // meshes without normals get smooth ones before sampling
    let samples = match source.vertex_normals() {
        Some(_) => sampling::sample_surface_uniform(source, params.samples, params.seed)?,
        None => sampling::sample_surface_uniform(
            &source.with_estimated_vertex_normals(),
            params.samples,
            params.seed,
        )?,
    };
    log::debug!(
        "Source: {} samples on {} faces",
        samples.len(),
        source.num_faces()
    );
    Ok(samples)
}

fn subsample_cloud(source: &PointCloud, params: &RegistrationParams) -> Result<PointCloud, IcpError> {
    check_samples(params)?;
    let samples = match params.min_point_distance {
        Some(d) => {
            let filtered = sampling::min_distance_filter(source, d)?;
            sampling::random_subsample(&filtered, params.samples, params.seed)
        }
        None => sampling::random_subsample(source, params.samples, params.seed),
    };
    log::debug!(
        "Source: {} of {} points kept",
        samples.len(),
        source.len()
    );
    Ok(samples)
}

fn prepare_source(source: &Geometry, params: &RegistrationParams) -> Result<PointCloud, IcpError> {
    match source {
        Geometry::Mesh(mesh) => sample_mesh(mesh, params),
        Geometry::Cloud(cloud) => subsample_cloud(cloud, params),
    }
}

fn register_with_oracle<O: ClosestPointOracle + ?Sized>(
    source_samples: PointCloud,
    oracle: &O,
    params: &RegistrationParams,
) -> Result<Registration, IcpError> {
    let result = icp(&source_samples, oracle, &params.icp, None)?;

    let mut points = vec![[0.0; 3]; source_samples.len()];
    result
        .transform
        .apply_points(source_samples.points(), &mut points);
    let normals = source_samples.normals().map(|src| {
        let mut dst = vec![[0.0; 3]; src.len()];
        result.transform.apply_normals(src, &mut dst);
        dst
    });

    Ok(Registration {
        result,
        source_samples,
        aligned: PointCloud::new(points, normals),
    })
}

/// Register a source mesh onto a target mesh.
///
/// Samples `params.samples` points with normals on the source surface and
/// matches them against the target surface.
pub fn register_meshes(
    source: &TriangleMesh,
    target: &TriangleMesh,
    params: &RegistrationParams,
) -> Result<Registration, IcpError> {
    let samples = sample_mesh(source, params)?;
    let oracle = MeshOracle::new(target)?;
    register_with_oracle(samples, &oracle, params)
}

/// Register a source point cloud onto a target point cloud.
pub fn register_point_clouds(
    source: &PointCloud,
    target: &PointCloud,
    params: &RegistrationParams,
) -> Result<Registration, IcpError> {
    let samples = subsample_cloud(source, params)?;
    let oracle = KdTreeOracle::new(target)?;
    register_with_oracle(samples, &oracle, params)
}

/// Register any pair of geometries.
///
/// A target mesh is queried through its surface, a target cloud through its
/// points.
pub fn register_geometries(
    source: &Geometry,
    target: &Geometry,
    params: &RegistrationParams,
) -> Result<Registration, IcpError> {
    let samples = prepare_source(source, params)?;
    match target {
        Geometry::Mesh(mesh) => register_with_oracle(samples, &MeshOracle::new(mesh)?, params),
        Geometry::Cloud(cloud) => register_with_oracle(samples, &KdTreeOracle::new(cloud)?, params),
    }
}

/// Move a mesh: vertices, and vertex normals when present, are transformed.
pub fn transform_mesh(
    mesh: &TriangleMesh,
    transform: &RigidTransform,
) -> Result<TriangleMesh, IcpError> {
    let mut vertices = vec![[0.0; 3]; mesh.vertices().len()];
    transform.apply_points(mesh.vertices(), &mut vertices);
    let normals = mesh.vertex_normals().map(|src| {
        let mut dst = vec![[0.0; 3]; src.len()];
        transform.apply_normals(src, &mut dst);
        dst
    });
    Ok(TriangleMesh::new(vertices, mesh.faces().to_vec(), normals)?)
}

fn mean_distance_sq<O: ClosestPointOracle + ?Sized>(queries: &PointCloud, oracle: &O) -> f64 {
    // collected first so the sum does not depend on the thread schedule
    let distances = queries
        .points()
        .par_iter()
        .map(|q| oracle.closest_point(q).distance_sq)
        .collect::<Vec<_>>();
    distances.iter().sum::<f64>() / distances.len() as f64
}

/// Symmetric Chamfer distance between two surfaces.
///
/// Draws `num_samples` points uniformly on each mesh, then adds the root mean
/// squared nearest sample distance from `a` to `b` and from `b` to `a`. The
/// two sample sets use `seed` and `seed + 1`, so identical meshes give a
/// small positive value that shrinks as `num_samples` grows.
///
/// # Errors
///
/// [`IcpError::InvalidParameter`] when `num_samples` is zero.
pub fn chamfer_distance(
    a: &TriangleMesh,
    b: &TriangleMesh,
    num_samples: usize,
    seed: u64,
) -> Result<f64, IcpError> {
    if num_samples == 0 {
        return Err(IcpError::InvalidParameter(
            "the number of Chamfer samples must be positive".to_string(),
        ));
    }
    let samples_a = sampling::sample_surface_uniform(a, num_samples, seed)?;
    let samples_b = sampling::sample_surface_uniform(b, num_samples, seed.wrapping_add(1))?;

    let a_to_b = mean_distance_sq(&samples_a, &KdTreeOracle::new(&samples_b)?);
    let b_to_a = mean_distance_sq(&samples_b, &KdTreeOracle::new(&samples_a)?);
    log::debug!(
        "Chamfer over {} samples: {:.6e} / {:.6e}",
        num_samples,
        a_to_b,
        b_to_a
    );
    Ok(a_to_b.sqrt() + b_to_a.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pcalign_3d::linalg::{distance_sq3, norm3};
    use pcalign_3d::transforms::axis_angle_to_rotation_matrix;

    // closed box with unequal sides centered at the origin, outward faces
    fn box_mesh(transform: &RigidTransform) -> Result<TriangleMesh, Box<dyn std::error::Error>> {
        let size = [1.0, 0.6, 0.3];
        let mut vertices = Vec::with_capacity(8);
        for x in 0..2 {
            for y in 0..2 {
                for z in 0..2 {
                    let corner = [
                        (x as f64 - 0.5) * size[0],
                        (y as f64 - 0.5) * size[1],
                        (z as f64 - 0.5) * size[2],
                    ];
                    vertices.push(transform.apply(&corner));
                }
            }
        }
        let faces = vec![
            [0, 1, 3],
            [0, 3, 2],
            [4, 6, 7],
            [4, 7, 5],
            [0, 4, 5],
            [0, 5, 1],
            [2, 3, 7],
            [2, 7, 6],
            [0, 2, 6],
            [0, 6, 4],
            [1, 5, 7],
            [1, 7, 3],
        ];
        Ok(TriangleMesh::new(vertices, faces, None)?)
    }

    fn precise_params(samples: usize) -> RegistrationParams {
        RegistrationParams {
            samples,
            icp: IcpParams {
                max_iterations: 200,
                tolerance: 1e-10,
                min_delta_rotation: 1e-10,
                min_delta_translation: 1e-10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_register_meshes() -> Result<(), Box<dyn std::error::Error>> {
        let truth = RigidTransform::new(
            axis_angle_to_rotation_matrix(&[0.2, 1.0, 0.5], 0.05)?,
            [0.02, -0.01, 0.015],
            1.0,
        )?;
        let target = box_mesh(&RigidTransform::identity())?;
        let source = box_mesh(&truth.inverse())?;

        let registration = register_meshes(&source, &target, &precise_params(1000))?;
        assert_eq!(registration.source_samples.len(), 1000);
        assert!(registration.source_samples.normals().is_some());

        let error = registration.result.transform.inverse().compose(&truth);
        assert!(error.rotation_angle() < 1e-3, "{error:?}");
        assert!(error.translation_norm() < 1e-3, "{error:?}");
        assert!(registration.result.mean_residual < 1e-3);
        Ok(())
    }

    #[test]
    fn test_register_point_clouds_subsamples() -> Result<(), Box<dyn std::error::Error>> {
        let target = sampling::sample_surface_uniform(
            &box_mesh(&RigidTransform::identity())?,
            3000,
            1,
        )?;
        let params = RegistrationParams {
            samples: 200,
            min_point_distance: Some(0.01),
            ..Default::default()
        };

        // the target registered onto itself stays in place
        let registration = register_point_clouds(&target, &target, &params)?;
        assert_eq!(registration.source_samples.len(), 200);
        assert!(registration.result.transform.rotation_angle() < 1e-9);
        assert!(registration.result.transform.translation_norm() < 1e-9);
        for (p, q) in registration
            .aligned
            .points()
            .iter()
            .zip(registration.source_samples.points())
        {
            assert!(distance_sq3(p, q) < 1e-18);
        }
        Ok(())
    }

    #[test]
    fn test_register_geometries_cloud_onto_mesh() -> Result<(), Box<dyn std::error::Error>> {
        let truth = RigidTransform::from_translation([0.01, 0.02, -0.005]);
        let target = box_mesh(&RigidTransform::identity())?;
        let source = box_mesh(&truth.inverse())?;
        let source_cloud = sampling::sample_surface_uniform(&source, 1500, 2)?;

        let registration = register_geometries(
            &Geometry::Cloud(source_cloud),
            &Geometry::Mesh(target),
            &precise_params(1500),
        )?;
        let error = registration.result.transform.inverse().compose(&truth);
        assert!(error.translation_norm() < 1e-3, "{error:?}");
        assert!(error.rotation_angle() < 1e-3, "{error:?}");
        Ok(())
    }

    #[test]
    fn test_mesh_samples_carry_smooth_normals() -> Result<(), Box<dyn std::error::Error>> {
        let square = TriangleMesh::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0, 1, 2], [0, 2, 3]],
            None,
        )?;
        let samples = sample_mesh(&square, &RegistrationParams::default())?;
        let normals = samples.normals().ok_or("missing normals")?;
        assert_eq!(normals.len(), samples.len());
        for n in normals {
            assert_relative_eq!(n[2], 1.0, epsilon = 1e-12);
        }

        let samples = sample_mesh(&box_mesh(&RigidTransform::identity())?, &precise_params(500))?;
        for n in samples.normals().ok_or("missing normals")? {
            assert_relative_eq!(norm3(n), 1.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_chamfer_distance() -> Result<(), Box<dyn std::error::Error>> {
        let mesh = box_mesh(&RigidTransform::identity())?;
        let same = chamfer_distance(&mesh, &mesh, 2000, 0)?;
        assert!(same > 0.0 && same < 0.05, "{same}");

        let shifted = transform_mesh(&mesh, &RigidTransform::from_translation([0.2, 0.0, 0.0]))?;
        let moved = chamfer_distance(&mesh, &shifted, 2000, 0)?;
        assert!(moved > 2.0 * same, "{moved} vs {same}");

        // sampling error shrinks with more samples
        let coarse = chamfer_distance(&mesh, &mesh, 100, 1)?;
        let medium = chamfer_distance(&mesh, &mesh, 1000, 1)?;
        let fine = chamfer_distance(&mesh, &mesh, 10000, 1)?;
        assert!(fine < medium && medium < coarse, "{coarse} {medium} {fine}");

        assert!(matches!(
            chamfer_distance(&mesh, &mesh, 0, 0),
            Err(IcpError::InvalidParameter(_))
        ));
        Ok(())
    }

    #[test]
    fn test_transform_mesh() -> Result<(), Box<dyn std::error::Error>> {
        let truth = RigidTransform::new(
            axis_angle_to_rotation_matrix(&[0.0, 0.0, 1.0], std::f64::consts::FRAC_PI_2)?,
            [1.0, 0.0, 0.0],
            1.0,
        )?;
        let mesh = box_mesh(&RigidTransform::identity())?.with_estimated_vertex_normals();
        let moved = transform_mesh(&mesh, &truth)?;
        assert_eq!(moved.faces(), mesh.faces());
        let p = moved.vertices()[0];
        let q = truth.apply(&mesh.vertices()[0]);
        assert!(distance_sq3(&p, &q) < 1e-24);
        let n = moved.vertex_normals().ok_or("missing normals")?[0];
        let m = mesh.vertex_normals().ok_or("missing normals")?[0];
        assert_relative_eq!(n[0], -m[1], epsilon = 1e-12);
        assert_relative_eq!(n[1], m[0], epsilon = 1e-12);
        assert_relative_eq!(n[2], m[2], epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_invalid_inputs() -> Result<(), Box<dyn std::error::Error>> {
        let mesh = box_mesh(&RigidTransform::identity())?;
        let params = RegistrationParams {
            samples: 0,
            ..Default::default()
        };
        assert!(matches!(
            register_meshes(&mesh, &mesh, &params),
            Err(IcpError::InvalidParameter(_))
        ));

        let empty = PointCloud::new(vec![], None);
        let cloud = mesh.to_point_cloud();
        assert!(matches!(
            register_point_clouds(&cloud, &empty, &RegistrationParams::default()),
            Err(IcpError::EmptyTarget)
        ));
        assert!(matches!(
            register_point_clouds(&empty, &cloud, &RegistrationParams::default()),
            Err(IcpError::EmptySource)
        ));
        Ok(())
    }

    #[test]
    fn test_params_from_json() -> Result<(), Box<dyn std::error::Error>> {
        let params: RegistrationParams = serde_json::from_str(
            r#"{"samples": 500, "icp": {"correspondence": {"trim_ratio": 0.9}}}"#,
        )?;
        assert_eq!(params.samples, 500);
        assert_eq!(params.seed, 0);
        assert_eq!(params.icp.correspondence.trim_ratio, Some(0.9));
        assert_eq!(params.icp.max_iterations, IcpParams::default().max_iterations);
        Ok(())
    }
}
