use faer::Mat;
use pcalign_3d::linalg::{det_mat33, matmul33, transpose33};

// relative threshold under which a singular value is treated as zero
const RCOND: f64 = 1e-12;

/// Singular value decomposition `m = u * diag(s) * v^T` of a 3x3 matrix.
///
/// Singular values are non-negative and sorted in decreasing order.
pub(crate) struct Svd3 {
    pub u: [[f64; 3]; 3],
    pub s: [f64; 3],
    pub v: [[f64; 3]; 3],
}

pub(crate) fn svd3(m: &[[f64; 3]; 3]) -> Svd3 {
    let mat = Mat::<f64>::from_fn(3, 3, |i, j| m[i][j]);
    let svd = mat.svd();
    let (u, s, v) = (svd.u(), svd.s_diagonal(), svd.v());

    Svd3 {
        u: std::array::from_fn(|i| std::array::from_fn(|j| u.read(i, j))),
        s: std::array::from_fn(|i| s.read(i)),
        v: std::array::from_fn(|i| std::array::from_fn(|j| v.read(i, j))),
    }
}

/// Closest proper rotation to `m` in the Frobenius norm.
pub(crate) fn nearest_rotation(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let Svd3 { mut u, v, .. } = svd3(m);
    let vt = transpose33(&v);
    // flip the least significant direction when u * v^T is a reflection
    if det_mat33(&matmul33(&u, &vt)) < 0.0 {
        for row in u.iter_mut() {
            row[2] = -row[2];
        }
    }
    matmul33(&u, &vt)
}

/// Solve the symmetric system `a * x = b` in the least squares sense.
///
/// Uses the SVD pseudo-inverse, so rank deficient systems yield the minimum
/// norm solution instead of failing.
pub(crate) fn solve_pseudo_inverse<const N: usize>(a: &[[f64; N]; N], b: &[f64; N]) -> [f64; N] {
    let mat = Mat::<f64>::from_fn(N, N, |i, j| a[i][j]);
    let svd = mat.svd();
    let (u, s, v) = (svd.u(), svd.s_diagonal(), svd.v());

    let s_max = s.read(0);
    let mut x = [0.0; N];
    if s_max <= 0.0 {
        return x;
    }

    for k in 0..N {
        let sigma = s.read(k);
        if sigma <= RCOND * s_max {
            continue;
        }
        // (u_k . b) / sigma_k projected back on v_k
        let coeff = (0..N).map(|i| u.read(i, k) * b[i]).sum::<f64>() / sigma;
        for (i, xi) in x.iter_mut().enumerate() {
            *xi += coeff * v.read(i, k);
        }
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pcalign_3d::linalg::{orthonormality_error, IDENTITY33};

    #[test]
    fn test_svd3_reconstructs() {
        let m = [[2.0, -1.0, 0.5], [0.3, 4.0, 1.0], [-2.0, 0.1, 3.0]];
        let Svd3 { u, s, v } = svd3(&m);
        assert!(s[0] >= s[1] && s[1] >= s[2] && s[2] >= 0.0);

        for i in 0..3 {
            for j in 0..3 {
                let value = (0..3).map(|k| u[i][k] * s[k] * v[j][k]).sum::<f64>();
                assert_relative_eq!(value, m[i][j], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_nearest_rotation() {
        let reflection = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]];
        let r = nearest_rotation(&reflection);
        assert_relative_eq!(det_mat33(&r), 1.0, epsilon = 1e-12);
        assert!(orthonormality_error(&r) < 1e-12);

        let noisy = [[1.0, 1e-4, 0.0], [-1e-4, 1.0, 2e-5], [0.0, 0.0, 1.0 + 1e-5]];
        let r = nearest_rotation(&noisy);
        assert!(orthonormality_error(&r) < 1e-12);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(r[i][j], noisy[i][j], epsilon = 1e-4);
            }
        }

        let r = nearest_rotation(&IDENTITY33);
        assert!(orthonormality_error(&r) < 1e-12);
    }

    #[test]
    fn test_solve_pseudo_inverse() {
        let a = [[4.0, 1.0, 0.0], [1.0, 3.0, 0.0], [0.0, 0.0, 2.0]];
        let b = [1.0, 2.0, 4.0];
        let x = solve_pseudo_inverse(&a, &b);
        for i in 0..3 {
            let ax = (0..3).map(|j| a[i][j] * x[j]).sum::<f64>();
            assert_relative_eq!(ax, b[i], epsilon = 1e-12);
        }

        // rank deficient: the unconstrained component stays at zero
        let a = [[1.0, 0.0], [0.0, 0.0]];
        let x = solve_pseudo_inverse(&a, &[3.0, 0.0]);
        assert_relative_eq!(x[0], 3.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 0.0, epsilon = 1e-12);
    }
}
