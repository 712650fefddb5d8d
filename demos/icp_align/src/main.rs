use argh::FromArgs;
use std::path::PathBuf;

use pcalign_3d::io::{self, Geometry};
use pcalign_icp::format::format_transform;
use pcalign_icp::pipeline::{
    chamfer_distance, register_geometries, transform_mesh, RegistrationParams,
};
use pcalign_icp::IcpMode;

fn parse_mode(value: &str) -> Result<IcpMode, String> {
    match value {
        "point_to_point" | "point-to-point" => Ok(IcpMode::PointToPoint),
        "point_to_plane" | "point-to-plane" => Ok(IcpMode::PointToPlane),
        _ => Err(format!(
            "unknown mode '{value}', expected point_to_point or point_to_plane"
        )),
    }
}

#[derive(FromArgs)]
/// Rigid registration of a source mesh or point cloud onto a target with ICP
struct Args {
    /// path to the source geometry (.ply, .obj or .pcd)
    #[argh(positional)]
    source: PathBuf,

    /// path to the target geometry (.ply, .obj or .pcd)
    #[argh(positional)]
    target: PathBuf,

    /// JSON file with the registration parameters, overridden by the flags
    #[argh(option)]
    config: Option<PathBuf>,

    /// write the aligned source samples to this PLY file
    #[argh(option)]
    output: Option<PathBuf>,

    /// report the Chamfer distance between the aligned meshes over this many samples
    #[argh(option)]
    chamfer: Option<usize>,

    /// number of source points used by ICP
    #[argh(option)]
    samples: Option<usize>,

    /// seed of the source sampling
    #[argh(option)]
    seed: Option<u64>,

    /// minimum distance between source cloud points
    #[argh(option)]
    min_point_distance: Option<f64>,

    /// maximum number of iterations
    #[argh(option)]
    max_iterations: Option<usize>,

    /// relative residual decrease below which ICP stops
    #[argh(option)]
    tolerance: Option<f64>,

    /// mean residual below which ICP stops
    #[argh(option)]
    absolute_tolerance: Option<f64>,

    /// incremental rotation in radians below which ICP stops
    #[argh(option)]
    min_delta_rotation: Option<f64>,

    /// incremental translation below which ICP stops
    #[argh(option)]
    min_delta_translation: Option<f64>,

    /// incremental scale change below which ICP stops
    #[argh(option)]
    min_delta_scale: Option<f64>,

    /// reject correspondences farther apart than this distance
    #[argh(option)]
    max_distance: Option<f64>,

    /// reject correspondences whose normals differ by more degrees than this
    #[argh(option)]
    normal_angle: Option<f64>,

    /// keep only this fraction of the closest correspondences
    #[argh(option)]
    trim_ratio: Option<f64>,

    /// estimate a uniform scale as well
    #[argh(switch)]
    estimate_scale: bool,

    /// error metric: point_to_point or point_to_plane
    #[argh(option, from_str_fn(parse_mode))]
    mode: Option<IcpMode>,
}

impl Args {
    fn params(&self) -> Result<RegistrationParams, Box<dyn std::error::Error>> {
        let mut params = match &self.config {
            Some(path) => serde_json::from_reader(std::fs::File::open(path)?)?,
            None => RegistrationParams::default(),
        };

        if let Some(samples) = self.samples {
            params.samples = samples;
        }
        if let Some(seed) = self.seed {
            params.seed = seed;
        }
        if self.min_point_distance.is_some() {
            params.min_point_distance = self.min_point_distance;
        }

        let icp = &mut params.icp;
        if let Some(max_iterations) = self.max_iterations {
            icp.max_iterations = max_iterations;
        }
        if let Some(tolerance) = self.tolerance {
            icp.tolerance = tolerance;
        }
        if let Some(absolute_tolerance) = self.absolute_tolerance {
            icp.absolute_tolerance = absolute_tolerance;
        }
        if let Some(min_delta_rotation) = self.min_delta_rotation {
            icp.min_delta_rotation = min_delta_rotation;
        }
        if let Some(min_delta_translation) = self.min_delta_translation {
            icp.min_delta_translation = min_delta_translation;
        }
        if let Some(min_delta_scale) = self.min_delta_scale {
            icp.min_delta_scale = min_delta_scale;
        }
        if self.max_distance.is_some() {
            icp.correspondence.max_distance = self.max_distance;
        }
        if self.normal_angle.is_some() {
            icp.correspondence.normal_angle_max_deg = self.normal_angle;
        }
        if self.trim_ratio.is_some() {
            icp.correspondence.trim_ratio = self.trim_ratio;
        }
        if self.estimate_scale {
            icp.estimate_scale = true;
        }
        if let Some(mode) = self.mode {
            icp.mode = mode;
        }

        Ok(params)
    }
}

fn describe(geometry: &Geometry) -> String {
    match geometry {
        Geometry::Mesh(mesh) => format!(
            "mesh with #{} vertices and #{} faces",
            mesh.vertices().len(),
            mesh.num_faces()
        ),
        Geometry::Cloud(cloud) => format!("point cloud with #{} points", cloud.len()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();
    let params = args.params()?;

    let source = io::read_geometry(&args.source)?;
    println!("Source: {}", describe(&source));

    let target = io::read_geometry(&args.target)?;
    println!("Target: {}", describe(&target));

    log::info!("Registration parameters: {:?}", params);

    let registration = register_geometries(&source, &target, &params)?;
    let result = &registration.result;

    println!(
        "{}",
        format_transform(&result.transform, params.icp.estimate_scale)
    );
    println!("Termination: {}", result.termination);
    println!("Iterations: {}", result.num_iterations);
    println!("Correspondences: {}", result.num_correspondences);
    println!("Mean residual: {:.6e}", result.mean_residual);

    if let Some(num_samples) = args.chamfer {
        match (&source, &target) {
            (Geometry::Mesh(source), Geometry::Mesh(target)) => {
                let aligned = transform_mesh(source, &result.transform)?;
                let before = chamfer_distance(source, target, num_samples, params.seed)?;
                let after = chamfer_distance(&aligned, target, num_samples, params.seed)?;
                println!("Chamfer distance: {before:.6e} before, {after:.6e} after");
            }
            _ => log::warn!("Chamfer distance needs a source and a target mesh"),
        }
    }

    if let Some(output) = &args.output {
        io::ply::write_ply_ascii(output, &registration.aligned)?;
        println!("Aligned source written to {}", output.display());
    }

    Ok(())
}
