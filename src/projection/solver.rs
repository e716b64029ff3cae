//! Symmetric eigendecomposition by cyclic Jacobi rotations.
//!
//! Used on Gram matrices `S^T S`, whose eigenvectors are the right singular
//! vectors of `S` and whose eigenvalues are its squared singular values.

use tracing::{debug, warn};

const MAX_SWEEPS: usize = 64;

/// Eigenpairs of a symmetric matrix.
#[derive(Debug, Clone)]
pub(crate) struct SymmetricEigen {
    /// Eigenvalues, unordered.
    pub values: Vec<f64>,
    /// Row-major `n x n`; column `j` is the eigenvector of `values[j]`.
    pub vectors: Vec<f64>,
    pub sweeps: usize,
}

/// Diagonalize the row-major symmetric `n x n` matrix `a`.
///
/// Stops once the off-diagonal mass is within `n * eps` of the Frobenius
/// norm, or after a fixed number of sweeps. Each sweep costs `O(n^3)`.
pub(crate) fn symmetric_eigen(mut a: Vec<f64>, n: usize) -> SymmetricEigen {
    debug_assert_eq!(a.len(), n * n);

    // Eigenvectors as rows, so rotations touch contiguous memory
    let mut w = vec![0.0f64; n * n];
    for i in 0..n {
        w[i * n + i] = 1.0;
    }

    let norm = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let threshold = n as f64 * f64::EPSILON * norm;
    let mut sweeps = 0;

    while sweeps < MAX_SWEEPS {
        let off = off_diagonal_norm(&a, n);
        if off <= threshold {
            break;
        }
        sweeps += 1;

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p * n + q];
                if apq == 0.0 {
                    continue;
                }
                let app = a[p * n + p];
                let aqq = a[q * n + q];

                // Below rounding relative to both diagonal entries
                let g = 100.0 * apq.abs();
                if sweeps > 4 && app.abs() + g == app.abs() && aqq.abs() + g == aqq.abs() {
                    a[p * n + q] = 0.0;
                    a[q * n + p] = 0.0;
                    continue;
                }

                // Smaller root of t^2 + 2 theta t - 1 = 0 keeps |angle| <= pi/4
                let theta = (aqq - app) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                // Rows p and q of J^T A; symmetry gives the columns of J^T A J
                rotate_rows(&mut a, n, p, q, c, s);
                for k in 0..n {
                    if k != p && k != q {
                        a[k * n + p] = a[p * n + k];
                        a[k * n + q] = a[q * n + k];
                    }
                }
                a[p * n + p] = app - t * apq;
                a[q * n + q] = aqq + t * apq;
                a[p * n + q] = 0.0;
                a[q * n + p] = 0.0;

                rotate_rows(&mut w, n, p, q, c, s);
            }
        }
    }

    if sweeps == MAX_SWEEPS && off_diagonal_norm(&a, n) > threshold {
        warn!(n, sweeps, "jacobi eigensolver stopped before full convergence");
    } else {
        debug!(n, sweeps, "jacobi eigensolver converged");
    }

    let mut vectors = vec![0.0f64; n * n];
    for i in 0..n {
        for j in 0..n {
            vectors[j * n + i] = w[i * n + j];
        }
    }
    SymmetricEigen {
        values: (0..n).map(|i| a[i * n + i]).collect(),
        vectors,
        sweeps,
    }
}

/// `row_p <- c row_p - s row_q`, `row_q <- s row_p + c row_q`, for `p < q`.
fn rotate_rows(m: &mut [f64], n: usize, p: usize, q: usize, c: f64, s: f64) {
    let (head, tail) = m.split_at_mut(q * n);
    let row_p = &mut head[p * n..(p + 1) * n];
    let row_q = &mut tail[..n];
    for (x, y) in row_p.iter_mut().zip(row_q.iter_mut()) {
        let (xp, xq) = (*x, *y);
        *x = c * xp - s * xq;
        *y = s * xp + c * xq;
    }
}

fn off_diagonal_norm(a: &[f64], n: usize) -> f64 {
    let mut sum = 0.0;
    for p in 0..n {
        for &x in &a[p * n + p + 1..(p + 1) * n] {
            sum += x * x;
        }
    }
    (2.0 * sum).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(eig: &SymmetricEigen) -> Vec<f64> {
        let n = eig.values.len();
        let mut out = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                out[i * n + j] = (0..n)
                    .map(|k| eig.vectors[i * n + k] * eig.values[k] * eig.vectors[j * n + k])
                    .sum();
            }
        }
        out
    }

    #[test]
    fn diagonal_matrix_needs_no_sweeps() {
        let eig = symmetric_eigen(vec![3.0, 0.0, 0.0, 5.0], 2);
        assert_eq!(eig.sweeps, 0);
        assert_eq!(eig.values, vec![3.0, 5.0]);
    }

    #[test]
    fn two_by_two_eigenvalues() {
        // [[2, 1], [1, 2]] has eigenvalues 1 and 3
        let eig = symmetric_eigen(vec![2.0, 1.0, 1.0, 2.0], 2);
        let mut values = eig.values.clone();
        values.sort_by(f64::total_cmp);
        assert!((values[0] - 1.0).abs() < 1e-12);
        assert!((values[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn decomposition_reconstructs_input() {
        let a = vec![
            4.0, 1.0, -2.0, 0.5, //
            1.0, 3.0, 0.0, 1.5, //
            -2.0, 0.0, 5.0, -1.0, //
            0.5, 1.5, -1.0, 2.0,
        ];
        let eig = symmetric_eigen(a.clone(), 4);
        for (x, y) in reconstruct(&eig).iter().zip(&a) {
            assert!((x - y).abs() < 1e-10, "{x} != {y}");
        }

        // Eigenvectors are orthonormal
        for i in 0..4 {
            for j in 0..4 {
                let dot: f64 = (0..4)
                    .map(|k| eig.vectors[k * 4 + i] * eig.vectors[k * 4 + j])
                    .sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn larger_gram_matrix_reconstructs() {
        // S^T S for a deterministic 20 x 12 matrix
        let (rows, n) = (20, 12);
        let s: Vec<f64> = (0..rows * n)
            .map(|i| ((i * 7919 % 101) as f64 / 50.0) - 1.0)
            .collect();
        let mut gram = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                gram[i * n + j] = (0..rows).map(|r| s[r * n + i] * s[r * n + j]).sum();
            }
        }

        let eig = symmetric_eigen(gram.clone(), n);
        assert!(eig.sweeps > 0 && eig.sweeps < MAX_SWEEPS);
        assert!(eig.values.iter().all(|&l| l > -1e-9));
        let scale = gram.iter().fold(0.0f64, |m, x| m.max(x.abs()));
        for (x, y) in reconstruct(&eig).iter().zip(&gram) {
            assert!((x - y).abs() < 1e-10 * scale, "{x} != {y}");
        }
        for i in 0..n {
            let norm: f64 = (0..n).map(|k| eig.vectors[k * n + i].powi(2)).sum();
            assert!((norm - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn singular_matrix_has_zero_eigenvalue() {
        // Rank one: [1, 1]^T [1, 1]
        let eig = symmetric_eigen(vec![1.0, 1.0, 1.0, 1.0], 2);
        let mut values = eig.values.clone();
        values.sort_by(f64::total_cmp);
        assert!(values[0].abs() < 1e-12);
        assert!((values[1] - 2.0).abs() < 1e-12);
    }
}
