use pcalign_3d::linalg::{
    add3, cross3, det_mat33, dot3, matmul33, matvec33, scale3, sub3, transpose33,
};
use serde::{Deserialize, Serialize};

use crate::correspondence::Correspondence;
use crate::error::IcpError;
use crate::svd::{nearest_rotation, solve_pseudo_inverse, svd3};
use crate::transform::RigidTransform;

// second over first singular value of the source scatter below which the
// points are considered collinear
const COLLINEARITY_THRESHOLD: f64 = 1e-9;

// Tikhonov damping of the point-to-plane normal equations, relative to their trace
const PLANE_DAMPING: f64 = 1e-12;

/// Error metric minimized at each iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IcpMode {
    /// Euclidean distance between matched points.
    #[default]
    PointToPoint,
    /// Distance along the target normal.
    PointToPlane,
}

/// Validate the inputs and return the weights, defaulting to ones.
fn check_inputs(
    source: &[[f64; 3]],
    target: &[[f64; 3]],
    weights: Option<&[f64]>,
) -> Result<Vec<f64>, IcpError> {
    if source.len() != target.len() {
        return Err(IcpError::InvalidInput(format!(
            "{} source points for {} target points",
            source.len(),
            target.len()
        )));
    }
    let weights = match weights {
        Some(w) if w.len() != source.len() => {
            return Err(IcpError::InvalidInput(format!(
                "{} weights for {} points",
                w.len(),
                source.len()
            )))
        }
        Some(w) => {
            if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(IcpError::InvalidInput(
                    "weights must be finite and non-negative".to_string(),
                ));
            }
            w.to_vec()
        }
        None => vec![1.0; source.len()],
    };

    let usable = weights.iter().filter(|w| **w > 0.0).count();
    if usable < 3 {
        return Err(IcpError::Degenerate(format!(
            "at least 3 weighted correspondences are required, got {usable}"
        )));
    }
    Ok(weights)
}

fn weighted_centroid(points: &[[f64; 3]], weights: &[f64], total: f64) -> [f64; 3] {
    let sum = points
        .iter()
        .zip(weights.iter())
        .fold([0.0; 3], |acc, (p, w)| add3(&acc, &scale3(p, *w)));
    scale3(&sum, 1.0 / total)
}

// weighted sum of (a_i - ca) (b_i - cb)^T
fn weighted_cross_covariance(
    a: &[[f64; 3]],
    ca: &[f64; 3],
    b: &[[f64; 3]],
    cb: &[f64; 3],
    weights: &[f64],
) -> [[f64; 3]; 3] {
    let mut h = [[0.0; 3]; 3];
    for ((pa, pb), w) in a.iter().zip(b.iter()).zip(weights.iter()) {
        let da = sub3(pa, ca);
        let db = sub3(pb, cb);
        for i in 0..3 {
            for j in 0..3 {
                h[i][j] += w * da[i] * db[j];
            }
        }
    }
    h
}

/// Fail when the weighted points do not span at least a plane.
fn check_spread(
    points: &[[f64; 3]],
    centroid: &[f64; 3],
    weights: &[f64],
    what: &str,
) -> Result<(), IcpError> {
    let scatter = weighted_cross_covariance(points, centroid, points, centroid, weights);
    let s = svd3(&scatter).s;
    if s[0] <= 0.0 || s[1] < COLLINEARITY_THRESHOLD * s[0] {
        return Err(IcpError::Degenerate(format!(
            "{what} points are coincident or collinear"
        )));
    }
    Ok(())
}

/// Weighted least squares similarity between corresponding point sets.
///
/// Minimizes `sum w_i |s R p_i + t - q_i|^2` in closed form (Kabsch, and
/// Umeyama when `estimate_scale` is set). The rotation is corrected to never be
/// a reflection.
///
/// # Arguments
///
/// * `source` - Points `p_i` to move.
/// * `target` - Matched points `q_i`, index-aligned with `source`.
/// * `weights` - Optional non-negative weights, all ones when `None`.
/// * `estimate_scale` - Whether to estimate a uniform scale, else `s = 1`.
///
/// # Errors
///
/// [`IcpError::Degenerate`] with fewer than 3 weighted pairs or when the source
/// or target points are collinear; [`IcpError::InvalidInput`] on length mismatch.
pub fn fit_point_to_point(
    source: &[[f64; 3]],
    target: &[[f64; 3]],
    weights: Option<&[f64]>,
    estimate_scale: bool,
) -> Result<RigidTransform, IcpError> {
    let weights = check_inputs(source, target, weights)?;
    let total = weights.iter().sum::<f64>();

    let source_centroid = weighted_centroid(source, &weights, total);
    let target_centroid = weighted_centroid(target, &weights, total);
    check_spread(source, &source_centroid, &weights, "source")?;
    check_spread(target, &target_centroid, &weights, "target")?;

    // H = sum w (p - p_mean) (q - q_mean)^T = U S V^T
    let h = weighted_cross_covariance(source, &source_centroid, target, &target_centroid, &weights);
    let svd = svd3(&h);
    let ut = transpose33(&svd.u);

    // R = V diag(1, 1, det(V U^T)) U^T
    let mut v = svd.v;
    if det_mat33(&matmul33(&v, &ut)) < 0.0 {
        for row in v.iter_mut() {
            row[2] = -row[2];
        }
    }
    let rotation = matmul33(&v, &ut);

    let scale = if estimate_scale {
        let mut num = 0.0;
        let mut den = 0.0;
        for ((p, q), w) in source.iter().zip(target.iter()).zip(weights.iter()) {
            let dp = sub3(p, &source_centroid);
            let dq = sub3(q, &target_centroid);
            num += w * dot3(&dq, &matvec33(&rotation, &dp));
            den += w * dot3(&dp, &dp);
        }
        let scale = num / den;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(IcpError::Degenerate(format!(
                "estimated scale {scale} is not positive"
            )));
        }
        scale
    } else {
        1.0
    };

    let translation = sub3(
        &target_centroid,
        &scale3(&matvec33(&rotation, &source_centroid), scale),
    );

    let mut transform = RigidTransform {
        rotation,
        translation,
        scale,
    };
    transform.orthonormalize();
    Ok(transform)
}

/// Weighted linearized point-to-plane rigid transform.
///
/// Minimizes `sum w_i ((R p_i + t - q_i) . n_i)^2` with the small angle
/// approximation `R = I + [w]x` around the source centroid. The 6x6 normal
/// equations are solved through a pseudo-inverse, so directions the planes do
/// not constrain (e.g. sliding along a single plane) are left unchanged. The
/// rotation is projected back to a proper rotation afterwards.
///
/// # Errors
///
/// [`IcpError::Degenerate`] with fewer than 3 weighted pairs or collinear
/// source points; [`IcpError::InvalidInput`] on length mismatch.
pub fn fit_point_to_plane(
    source: &[[f64; 3]],
    target: &[[f64; 3]],
    target_normals: &[[f64; 3]],
    weights: Option<&[f64]>,
) -> Result<RigidTransform, IcpError> {
    let weights = check_inputs(source, target, weights)?;
    if target_normals.len() != target.len() {
        return Err(IcpError::InvalidInput(format!(
            "{} normals for {} target points",
            target_normals.len(),
            target.len()
        )));
    }
    let total = weights.iter().sum::<f64>();
    let centroid = weighted_centroid(source, &weights, total);
    check_spread(source, &centroid, &weights, "source")?;

    // rows a = [(p - c) x n, n], b = (q - p) . n
    let mut ata = [[0.0; 6]; 6];
    let mut atb = [0.0; 6];
    for (((p, q), n), w) in source
        .iter()
        .zip(target.iter())
        .zip(target_normals.iter())
        .zip(weights.iter())
    {
        let arm = sub3(p, &centroid);
        let rot = cross3(&arm, n);
        let a = [rot[0], rot[1], rot[2], n[0], n[1], n[2]];
        let b = dot3(&sub3(q, p), n);
        for i in 0..6 {
            for j in 0..6 {
                ata[i][j] += w * a[i] * a[j];
            }
            atb[i] += w * a[i] * b;
        }
    }

    let trace = (0..6).map(|i| ata[i][i]).sum::<f64>();
    if trace <= 0.0 {
        return Err(IcpError::Degenerate(
            "target normals do not constrain the transform".to_string(),
        ));
    }
    let damping = PLANE_DAMPING * trace / 6.0;
    for (i, row) in ata.iter_mut().enumerate() {
        row[i] += damping;
    }

    let x = solve_pseudo_inverse(&ata, &atb);
    let [wx, wy, wz, tx, ty, tz] = x;
    let linearized = [
        [1.0, -wz, wy],
        [wz, 1.0, -wx],
        [-wy, wx, 1.0],
    ];
    let rotation = nearest_rotation(&linearized);

    // x -> R (x - c) + c + t'
    let translation = add3(
        &sub3(&centroid, &matvec33(&rotation, &centroid)),
        &[tx, ty, tz],
    );

    Ok(RigidTransform {
        rotation,
        translation,
        scale: 1.0,
    })
}

/// Estimate the incremental transform of one ICP iteration.
///
/// Gathers the moving points referenced by `correspondences` and dispatches on
/// `mode`. Point-to-plane requires every correspondence to carry a target normal.
pub fn estimate_transform(
    moving: &[[f64; 3]],
    correspondences: &[Correspondence],
    mode: IcpMode,
    estimate_scale: bool,
) -> Result<RigidTransform, IcpError> {
    let source = correspondences
        .iter()
        .map(|c| {
            moving.get(c.source_index).copied().ok_or_else(|| {
                IcpError::InvalidInput(format!(
                    "correspondence references moving point {} of {}",
                    c.source_index,
                    moving.len()
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let target = correspondences
        .iter()
        .map(|c| c.target_point)
        .collect::<Vec<_>>();

    match mode {
        IcpMode::PointToPoint => fit_point_to_point(&source, &target, None, estimate_scale),
        IcpMode::PointToPlane => {
            let normals = correspondences
                .iter()
                .map(|c| {
                    c.target_normal.ok_or_else(|| {
                        IcpError::InvalidInput(
                            "point-to-plane requires target normals".to_string(),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            fit_point_to_plane(&source, &target, &normals, None)
        }
    }
}
