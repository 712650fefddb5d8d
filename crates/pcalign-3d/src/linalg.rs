/// The 3x3 identity matrix.
pub const IDENTITY33: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Transform a set of points using a scaled rotation and a translation.
///
/// Each point is mapped as `dst = scale * R * src + t`.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `dst_r_src` - A rotation matrix.
/// * `dst_t_src` - A translation vector.
/// * `scale` - A uniform scale factor.
/// * `dst_points` - A pre-allocated vector to store the transformed points.
///
/// PRECONDITION: dst_points is a pre-allocated vector of the same size as source.
///
/// Example:
///
/// ```
/// use pcalign_3d::linalg::{transform_points, IDENTITY33};
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let translation = [1.0, 0.0, 0.0];
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points(&src_points, &IDENTITY33, &translation, 1.0, &mut dst_points);
/// assert_eq!(dst_points[0], [3.0, 2.0, 2.0]);
/// ```
pub fn transform_points(
    src_points: &[[f64; 3]],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
    scale: f64,
    dst_points: &mut [[f64; 3]],
) {
    assert_eq!(src_points.len(), dst_points.len());

    // fold the scale into the rotation once instead of per point
    let mut sr = *dst_r_src;
    sr.iter_mut()
        .flat_map(|row| row.iter_mut())
        .for_each(|v| *v *= scale);

    for (p_dst, p_src) in dst_points.iter_mut().zip(src_points.iter()) {
        let rotated = matvec33(&sr, p_src);
        *p_dst = add3(&rotated, dst_t_src);
    }
}

/// Rotate a set of vectors (e.g. normals) without translating them.
pub fn rotate_vectors(src: &[[f64; 3]], dst_r_src: &[[f64; 3]; 3], dst: &mut [[f64; 3]]) {
    assert_eq!(src.len(), dst.len());
    for (v_dst, v_src) in dst.iter_mut().zip(src.iter()) {
        *v_dst = matvec33(dst_r_src, v_src);
    }
}

/// Multiply two 3x3 matrices, `a * b`.
pub fn matmul33(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    out
}

/// Multiply a 3x3 matrix by a 3d vector.
#[inline]
pub fn matvec33(m: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Transpose a 3x3 matrix.
pub fn transpose33(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ]
}

/// Determinant of a 3x3 matrix.
pub fn det_mat33(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Frobenius norm of `m^T * m - I`, i.e. how far `m` is from being orthonormal.
pub fn orthonormality_error(m: &[[f64; 3]; 3]) -> f64 {
    let mtm = matmul33(&transpose33(m), m);
    let mut acc = 0.0;
    for i in 0..3 {
        for j in 0..3 {
            let d = mtm[i][j] - IDENTITY33[i][j];
            acc += d * d;
        }
    }
    acc.sqrt()
}

/// Add two 3d vectors.
#[inline]
pub fn add3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Subtract two 3d vectors, `a - b`.
#[inline]
pub fn sub3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Multiply a 3d vector by a scalar.
#[inline]
pub fn scale3(a: &[f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Dot product of two 3d vectors.
#[inline]
pub fn dot3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Cross product of two 3d vectors.
#[inline]
pub fn cross3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Euclidean norm of a 3d vector.
#[inline]
pub fn norm3(a: &[f64; 3]) -> f64 {
    dot3(a, a).sqrt()
}

/// Squared euclidean distance between two points.
#[inline]
pub fn distance_sq3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let d = sub3(a, b);
    dot3(&d, &d)
}

/// Normalize a 3d vector. Returns `None` for (near) zero vectors.
pub fn normalize3(a: &[f64; 3]) -> Option<[f64; 3]> {
    let n = norm3(a);
    if n < 1e-12 || !n.is_finite() {
        return None;
    }
    Some(scale3(a, 1.0 / n))
}
