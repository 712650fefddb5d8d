use pcalign_3d::linalg::{
    add3, det_mat33, matmul33, matvec33, norm3, orthonormality_error, rotate_vectors, scale3,
    transform_points, transpose33, IDENTITY33,
};
use pcalign_3d::transforms::rotation_angle;
use serde::{Deserialize, Serialize};

use crate::error::IcpError;
use crate::svd::nearest_rotation;

// drift of R^T R from the identity tolerated before re-orthonormalizing
const ORTHONORMALITY_TOLERANCE: f64 = 1e-9;

/// A similarity transform `x -> scale * rotation * x + translation`.
///
/// `rotation` is a proper rotation (orthonormal, determinant +1) and `scale` is
/// strictly positive; it is `1.0` for rigid transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// Row-major 3x3 rotation matrix.
    pub rotation: [[f64; 3]; 3],
    /// Translation vector.
    pub translation: [f64; 3],
    /// Uniform scale factor.
    pub scale: f64,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// The identity transform.
    pub const fn identity() -> Self {
        Self {
            rotation: IDENTITY33,
            translation: [0.0; 3],
            scale: 1.0,
        }
    }

    /// Create a transform validating its components.
    ///
    /// # Arguments
    ///
    /// * `rotation` - A rotation matrix, re-orthonormalized if it drifted slightly.
    /// * `translation` - The translation vector.
    /// * `scale` - A finite, strictly positive scale.
    ///
    /// # Errors
    ///
    /// Returns [`IcpError::InvalidParameter`] if the rotation is not close to a
    /// proper rotation or the scale is not positive.
    pub fn new(
        rotation: [[f64; 3]; 3],
        translation: [f64; 3],
        scale: f64,
    ) -> Result<Self, IcpError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(IcpError::InvalidParameter(format!(
                "scale must be finite and positive, got {scale}"
            )));
        }
        if translation.iter().any(|v| !v.is_finite()) {
            return Err(IcpError::InvalidParameter(
                "translation must be finite".to_string(),
            ));
        }
        let error = orthonormality_error(&rotation);
        if !error.is_finite() || error > 1e-3 || det_mat33(&rotation) <= 0.0 {
            return Err(IcpError::InvalidParameter(
                "rotation is not a proper rotation matrix".to_string(),
            ));
        }

        let mut transform = Self {
            rotation,
            translation,
            scale,
        };
        transform.orthonormalize();
        Ok(transform)
    }

    /// A pure translation.
    pub fn from_translation(translation: [f64; 3]) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// Apply the transform to a single point.
    #[inline]
    pub fn apply(&self, point: &[f64; 3]) -> [f64; 3] {
        add3(
            &scale3(&matvec33(&self.rotation, point), self.scale),
            &self.translation,
        )
    }

    /// Apply the transform to a set of points.
    ///
    /// PRECONDITION: `dst` has the same length as `src`.
    pub fn apply_points(&self, src: &[[f64; 3]], dst: &mut [[f64; 3]]) {
        transform_points(src, &self.rotation, &self.translation, self.scale, dst);
    }

    /// Rotate a set of normals; translation and scale do not apply to directions.
    pub fn apply_normals(&self, src: &[[f64; 3]], dst: &mut [[f64; 3]]) {
        rotate_vectors(src, &self.rotation, dst);
    }

    /// The transform that applies `first` and then `self`.
    ///
    /// `R = R2 R1`, `t = s2 R2 t1 + t2` and `s = s2 s1`, with `self` as `(R2, t2, s2)`.
    /// The rotation is re-orthonormalized when the product drifted.
    pub fn compose(&self, first: &RigidTransform) -> RigidTransform {
        let mut out = RigidTransform {
            rotation: matmul33(&self.rotation, &first.rotation),
            translation: self.apply(&first.translation),
            scale: self.scale * first.scale,
        };
        out.orthonormalize();
        out
    }

    /// The inverse transform, `x -> (1/s) R^T (x - t)`.
    pub fn inverse(&self) -> RigidTransform {
        let rotation = transpose33(&self.rotation);
        let scale = 1.0 / self.scale;
        let translation = scale3(&matvec33(&rotation, &self.translation), -scale);
        RigidTransform {
            rotation,
            translation,
            scale,
        }
    }

    /// Project the rotation back onto the rotation group if it drifted.
    ///
    /// Returns `true` when the rotation was modified.
    pub fn orthonormalize(&mut self) -> bool {
        if orthonormality_error(&self.rotation) > ORTHONORMALITY_TOLERANCE
            || det_mat33(&self.rotation) <= 0.0
        {
            self.rotation = nearest_rotation(&self.rotation);
            return true;
        }
        false
    }

    /// Rotation angle in radians, in `[0, pi]`.
    pub fn rotation_angle(&self) -> f64 {
        rotation_angle(&self.rotation)
    }

    /// Euclidean norm of the translation.
    pub fn translation_norm(&self) -> f64 {
        norm3(&self.translation)
    }

    /// The 4x4 homogeneous matrix `[[sR, t], [0, 1]]`, row-major.
    pub fn to_homogeneous(&self) -> [[f64; 4]; 4] {
        let mut m = [[0.0; 4]; 4];
        for i in 0..3 {
            for j in 0..3 {
                m[i][j] = self.scale * self.rotation[i][j];
            }
            m[i][3] = self.translation[i];
        }
        m[3][3] = 1.0;
        m
    }

    /// Decompose a 4x4 homogeneous similarity matrix.
    ///
    /// The scale is the mean norm of the columns of the upper-left block and the
    /// rotation is the nearest proper rotation to the block divided by the scale.
    ///
    /// # Errors
    ///
    /// Returns [`IcpError::InvalidParameter`] if the last row is not `[0, 0, 0, 1]`,
    /// the block is singular or a reflection, or a value is not finite.
    pub fn from_homogeneous(m: &[[f64; 4]; 4]) -> Result<Self, IcpError> {
        if m.iter().flatten().any(|v| !v.is_finite()) {
            return Err(IcpError::InvalidParameter(
                "homogeneous matrix has non-finite values".to_string(),
            ));
        }
        if m[3] != [0.0, 0.0, 0.0, 1.0] {
            return Err(IcpError::InvalidParameter(
                "last row of a homogeneous transform must be [0, 0, 0, 1]".to_string(),
            ));
        }

        let block: [[f64; 3]; 3] = std::array::from_fn(|i| std::array::from_fn(|j| m[i][j]));
        let scale = (0..3)
            .map(|j| norm3(&[block[0][j], block[1][j], block[2][j]]))
            .sum::<f64>()
            / 3.0;
        if scale <= 0.0 || det_mat33(&block) <= 0.0 {
            return Err(IcpError::InvalidParameter(
                "upper-left block is singular or a reflection".to_string(),
            ));
        }

        let unscaled = block.map(|row| row.map(|v| v / scale));
        Ok(Self {
            rotation: nearest_rotation(&unscaled),
            translation: [m[0][3], m[1][3], m[2][3]],
            scale,
        })
    }
}
