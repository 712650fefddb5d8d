use pcalign_3d::linalg::{dot3, norm3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::IcpError;
use crate::oracle::ClosestPointOracle;

/// A matched pair between a moving point and the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// Index of the point in the moving set.
    pub source_index: usize,
    /// The closest point on the target.
    pub target_point: [f64; 3],
    /// The target normal at `target_point`, if available.
    pub target_normal: Option<[f64; 3]>,
    /// Squared distance between the moving point and `target_point`.
    pub distance_sq: f64,
}

impl Correspondence {
    /// Euclidean distance between the moving point and its match.
    #[inline]
    pub fn distance(&self) -> f64 {
        self.distance_sq.sqrt()
    }
}

/// Rejection rules applied to candidate correspondences.
///
/// Every rule is disabled when left as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrespondenceParams {
    /// Reject pairs farther apart than this distance.
    pub max_distance: Option<f64>,
    /// Reject pairs whose normals differ by more than this angle, in degrees.
    ///
    /// Only applies when both the moving point and the target carry a normal.
    /// Normals are oriented: opposite normals differ by 180 degrees.
    pub normal_angle_max_deg: Option<f64>,
    /// Keep only this fraction, in `(0, 1]`, of the closest surviving pairs.
    pub trim_ratio: Option<f64>,
}

impl CorrespondenceParams {
    /// Check that every enabled rule has a usable threshold.
    pub fn validate(&self) -> Result<(), IcpError> {
        if let Some(d) = self.max_distance {
            if d.is_nan() || d < 0.0 {
                return Err(IcpError::InvalidParameter(format!(
                    "max_distance must be non-negative, got {d}"
                )));
            }
        }
        if let Some(angle) = self.normal_angle_max_deg {
            if !angle.is_finite() || angle < 0.0 {
                return Err(IcpError::InvalidParameter(format!(
                    "normal_angle_max_deg must be finite and non-negative, got {angle}"
                )));
            }
        }
        if let Some(ratio) = self.trim_ratio {
            if ratio.is_nan() || ratio <= 0.0 || ratio > 1.0 {
                return Err(IcpError::InvalidParameter(format!(
                    "trim_ratio must be in (0, 1], got {ratio}"
                )));
            }
        }
        Ok(())
    }
}

/// Cosine of the angle between two vectors, `None` when one of them is zero.
fn cos_angle(a: &[f64; 3], b: &[f64; 3]) -> Option<f64> {
    let norms = norm3(a) * norm3(b);
    if norms <= 0.0 || !norms.is_finite() {
        return None;
    }
    Some(dot3(a, b) / norms)
}

/// Number of correspondences kept when trimming `n` of them to `ratio`.
///
/// Rounds up so that a non-empty set never trims down to nothing.
pub fn trimmed_count(n: usize, ratio: f64) -> usize {
    ((ratio * n as f64).ceil() as usize).clamp(n.min(1), n)
}

/// Match every moving point against the target and filter the pairs.
///
/// The closest point queries run in parallel; the output keeps the order of
/// the moving points.
///
/// # Arguments
///
/// * `moving` - Current positions of the moving points.
/// * `moving_normals` - Normals of the moving points, index-aligned with `moving`.
/// * `oracle` - Closest point oracle over the target.
/// * `params` - Rejection rules.
///
/// # Errors
///
/// Returns [`IcpError::NoCorrespondences`] if every pair was rejected and
/// [`IcpError::InvalidInput`] if the normals are not aligned with the points.
pub fn find_correspondences<O: ClosestPointOracle + ?Sized>(
    moving: &[[f64; 3]],
    moving_normals: Option<&[[f64; 3]]>,
    oracle: &O,
    params: &CorrespondenceParams,
) -> Result<Vec<Correspondence>, IcpError> {
    if let Some(normals) = moving_normals {
        if normals.len() != moving.len() {
            return Err(IcpError::InvalidInput(format!(
                "{} normals for {} moving points",
                normals.len(),
                moving.len()
            )));
        }
    }

    let max_distance_sq = params.max_distance.map(|d| d * d);
    // 180 degrees or more accepts every pair
    let min_cos = params
        .normal_angle_max_deg
        .filter(|angle| *angle < 180.0)
        .map(|angle| angle.to_radians().cos());

    let mut correspondences = moving
        .par_iter()
        .enumerate()
        .filter_map(|(source_index, p)| {
            let closest = oracle.closest_point(p);

            if let Some(max_d2) = max_distance_sq {
                if closest.distance_sq > max_d2 {
                    return None;
                }
            }

            if let (Some(min_cos), Some(normals), Some(target_normal)) =
                (min_cos, moving_normals, closest.normal.as_ref())
            {
                if let Some(cos) = cos_angle(&normals[source_index], target_normal) {
                    if cos < min_cos {
                        return None;
                    }
                }
            }

            Some(Correspondence {
                source_index,
                target_point: closest.point,
                target_normal: closest.normal,
                distance_sq: closest.distance_sq,
            })
        })
        .collect::<Vec<_>>();

    let num_survivors = correspondences.len();

    if let Some(ratio) = params.trim_ratio {
        let keep = trimmed_count(correspondences.len(), ratio);
        correspondences.sort_by(|a, b| {
            a.distance_sq
                .total_cmp(&b.distance_sq)
                .then(a.source_index.cmp(&b.source_index))
        });
        correspondences.truncate(keep);
        correspondences.sort_by_key(|c| c.source_index);
    }

    log::debug!(
        "Correspondences: {} queried, {} after rejection, {} kept",
        moving.len(),
        num_survivors,
        correspondences.len()
    );

    if correspondences.is_empty() {
        return Err(IcpError::NoCorrespondences {
            candidates: moving.len(),
        });
    }

    Ok(correspondences)
}

/// Mean Euclidean distance over a set of correspondences.
pub fn mean_distance(correspondences: &[Correspondence]) -> f64 {
    if correspondences.is_empty() {
        return 0.0;
    }
    correspondences.iter().map(|c| c.distance()).sum::<f64>() / correspondences.len() as f64
}
