//! Least-squares linear maps between embedding spaces.
//!
//! Given the same anchor items embedded in a source space (`n x d_s`) and a
//! target space (`n x d_t`), [`learn_projection`] finds the `d_s x d_t` matrix
//! `M` minimizing `|source . M - target|_F`.
//!
//! The normal-equation matrix `S^T S` is diagonalized rather than inverted.
//! Its eigenvectors are the right singular vectors of `S`, so dropping
//! eigenvalues at rounding level gives the pseudo-inverse solution: when the
//! anchors do not span the source space (fewer anchors than dimensions, or
//! duplicated rows) the minimum-norm `M` is returned instead of an error.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use candle_core::Device;
//! use candle_fewshot::embeddings::EmbeddingMatrix;
//! use candle_fewshot::projection::learn_projection;
//!
//! # fn main() -> candle_fewshot::error::Result<()> {
//! let source = EmbeddingMatrix::from_rows(&[vec![1., 0.], vec![0., 1.]], &Device::Cpu)?;
//! let target = EmbeddingMatrix::from_rows(&[vec![2., 0.], vec![0., 2.]], &Device::Cpu)?;
//!
//! let projection = learn_projection(&source, &target)?;
//! let mapped = projection.apply(&source)?; // ~ target
//! # Ok(())
//! # }
//! ```

pub(crate) mod solver;

use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embeddings::EmbeddingMatrix;
use crate::error::{FewshotError, Result};

/// How to treat small singular values of the source anchors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "solver", rename_all = "kebab-case")]
pub enum SolverPolicy {
    /// Plain least squares; rank-deficient directions are dropped.
    #[default]
    MinimumNorm,
    /// Ridge regression: `alpha` is added to every squared singular value.
    Ridge {
        /// Regularization strength, `>= 0`.
        alpha: f64,
    },
}

/// A learned `source_dim x target_dim` linear map.
#[derive(Debug, Clone)]
pub struct ProjectionMatrix {
    tensor: Tensor,
    rank: usize,
}

impl ProjectionMatrix {
    /// The identity map on `dim`-dimensional embeddings.
    pub fn identity(dim: usize, device: &Device) -> Result<Self> {
        Ok(Self {
            tensor: Tensor::eye(dim, DType::F32, device)?,
            rank: dim,
        })
    }

    /// Row count; must equal the query embedding dimension.
    pub fn source_dim(&self) -> usize {
        self.tensor.dims()[0]
    }

    /// Column count; the dimension of projected embeddings.
    pub fn target_dim(&self) -> usize {
        self.tensor.dims()[1]
    }

    /// Number of source directions the solver kept.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Underlying `f32` tensor.
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    /// Copy the matrix out row by row.
    pub fn to_rows(&self) -> Result<Vec<Vec<f32>>> {
        Ok(self.tensor.to_vec2::<f32>()?)
    }

    /// Map `embeddings` into the target space (`embeddings . M`).
    pub fn apply(&self, embeddings: &EmbeddingMatrix) -> Result<EmbeddingMatrix> {
        if embeddings.dim() != self.source_dim() {
            return Err(FewshotError::shape(
                "apply projection",
                format!("{} columns", self.source_dim()),
                format!("{} columns", embeddings.dim()),
            ));
        }
        let tensor = self.tensor.to_device(embeddings.device())?;
        embeddings.matmul(&tensor)
    }
}

/// Minimum-norm least-squares projection from `source` to `target` rows.
///
/// Row `i` of both matrices must describe the same anchor item.
///
/// # Errors
///
/// - [`FewshotError::EmptyInput`] if either matrix has no rows.
/// - [`FewshotError::ShapeMismatch`] if the row counts differ.
pub fn learn_projection(
    source: &EmbeddingMatrix,
    target: &EmbeddingMatrix,
) -> Result<ProjectionMatrix> {
    learn_projection_with(source, target, SolverPolicy::MinimumNorm)
}

/// [`learn_projection`] with an explicit [`SolverPolicy`].
pub fn learn_projection_with(
    source: &EmbeddingMatrix,
    target: &EmbeddingMatrix,
    policy: SolverPolicy,
) -> Result<ProjectionMatrix> {
    if source.is_empty() || target.is_empty() {
        return Err(FewshotError::EmptyInput("learn_projection"));
    }
    if source.rows() != target.rows() {
        return Err(FewshotError::shape(
            "learn_projection",
            format!("{} target rows (one per source anchor)", source.rows()),
            format!("{} target rows", target.rows()),
        ));
    }
    if let SolverPolicy::Ridge { alpha } = policy {
        if !(alpha.is_finite() && alpha >= 0.0) {
            return Err(FewshotError::InvalidParams(format!(
                "learn_projection: ridge alpha must be finite and >= 0, got {alpha}"
            )));
        }
    }

    let rows = source.rows();
    let d = source.dim();
    let device = source.device().clone();

    // Solve in f64 on the CPU: the Gram matrix squares the condition number
    let s = source.tensor().to_device(&Device::Cpu)?.to_dtype(DType::F64)?;
    let t = target.tensor().to_device(&Device::Cpu)?.to_dtype(DType::F64)?;
    let s_t = s.t()?.contiguous()?;
    let gram = s_t.matmul(&s)?;
    let cross = s_t.matmul(&t.contiguous()?)?;

    let eigen = solver::symmetric_eigen(gram.flatten_all()?.to_vec1::<f64>()?, d);

    let lambda_max = eigen.values.iter().fold(0.0f64, |m, &l| m.max(l));
    let cutoff = lambda_max * d.max(rows) as f64 * f64::EPSILON;

    let mut rank = 0;
    let inverse: Vec<f64> = eigen
        .values
        .iter()
        .map(|&lambda| {
            let lambda = lambda.max(0.0);
            if lambda > cutoff {
                rank += 1;
            }
            let shifted = match policy {
                SolverPolicy::MinimumNorm => lambda,
                SolverPolicy::Ridge { alpha } => lambda + alpha,
            };
            if shifted > cutoff {
                1.0 / shifted
            } else {
                0.0
            }
        })
        .collect();

    if rank == 0 {
        warn!(rows, d, "projection anchors have rank 0; learned map is zero");
    } else if rank < d {
        debug!(rank, d, "projection anchors are rank deficient");
    }

    // M = V diag(1 / lambda) V^T S^T T
    let v = Tensor::from_vec(eigen.vectors, (d, d), &Device::Cpu)?;
    let inverse = Tensor::from_vec(inverse, (d, 1), &Device::Cpu)?;
    let rotated = v.t()?.contiguous()?.matmul(&cross)?;
    let solution = v.matmul(&rotated.broadcast_mul(&inverse)?)?;

    debug!(
        anchors = rows,
        source_dim = d,
        target_dim = target.dim(),
        rank,
        sweeps = eigen.sweeps,
        "projection learned"
    );

    Ok(ProjectionMatrix {
        tensor: solution.to_dtype(DType::F32)?.to_device(&device)?,
        rank,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[Vec<f32>]) -> EmbeddingMatrix {
        EmbeddingMatrix::from_rows(rows, &Device::Cpu).unwrap()
    }

    fn assert_close(actual: &[Vec<f32>], expected: &[Vec<f32>], tol: f32) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().flatten().zip(expected.iter().flatten()) {
            assert!((a - e).abs() < tol, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn learns_uniform_scaling() {
        let source = matrix(&[vec![1., 0.], vec![0., 1.]]);
        let target = matrix(&[vec![2., 0.], vec![0., 2.]]);
        let m = learn_projection(&source, &target).unwrap();
        assert_eq!(m.rank(), 2);
        assert_close(&m.to_rows().unwrap(), &[vec![2., 0.], vec![0., 2.]], 1e-5);
    }

    #[test]
    fn identical_spaces_give_identity() {
        let x = matrix(&[
            vec![0.2, -1.0, 0.5],
            vec![1.5, 0.3, -0.7],
            vec![-0.4, 0.8, 1.1],
            vec![0.9, 0.9, 0.1],
        ]);
        let m = learn_projection(&x, &x).unwrap();
        let identity = vec![vec![1., 0., 0.], vec![0., 1., 0.], vec![0., 0., 1.]];
        assert_close(&m.to_rows().unwrap(), &identity, 1e-4);
    }

    #[test]
    fn maps_between_dimensions() {
        // target = source . [[1, 2], [0, 1], [3, 0]]
        let source = matrix(&[
            vec![1., 0., 0.],
            vec![0., 1., 0.],
            vec![0., 0., 1.],
            vec![1., 1., 1.],
        ]);
        let target = matrix(&[vec![1., 2.], vec![0., 1.], vec![3., 0.], vec![4., 3.]]);
        let m = learn_projection(&source, &target).unwrap();
        assert_eq!((m.source_dim(), m.target_dim()), (3, 2));
        assert_close(
            &m.to_rows().unwrap(),
            &[vec![1., 2.], vec![0., 1.], vec![3., 0.]],
            1e-4,
        );
    }

    #[test]
    fn rank_deficient_anchors_give_minimum_norm_solution() {
        // Only x1 + x2 = 2 is constrained; the minimum-norm answer is [1, 1]
        let source = matrix(&[vec![1., 1.], vec![2., 2.]]);
        let target = matrix(&[vec![2.], vec![4.]]);
        let m = learn_projection(&source, &target).unwrap();
        assert_eq!(m.rank(), 1);
        assert_close(&m.to_rows().unwrap(), &[vec![1.], vec![1.]], 1e-5);
    }

    #[test]
    fn fewer_anchors_than_dimensions() {
        let source = matrix(&[vec![1., 0., 0., 0.]]);
        let target = matrix(&[vec![3., -1.]]);
        let m = learn_projection(&source, &target).unwrap();
        assert_eq!(m.rank(), 1);
        let mapped = m.apply(&source).unwrap().to_rows().unwrap();
        assert_close(&mapped, &[vec![3., -1.]], 1e-5);
        // Unconstrained rows stay zero
        let zeros = [vec![0., 0.], vec![0., 0.], vec![0., 0.]];
        assert_close(&m.to_rows().unwrap()[1..], &zeros, 1e-6);
    }

    #[test]
    fn ridge_shrinks_the_solution() {
        let source = matrix(&[vec![1., 0.], vec![0., 1.]]);
        let target = matrix(&[vec![2., 0.], vec![0., 2.]]);
        let m = learn_projection_with(&source, &target, SolverPolicy::Ridge { alpha: 1.0 }).unwrap();
        // (I + I)^-1 . 2I = I
        assert_close(&m.to_rows().unwrap(), &[vec![1., 0.], vec![0., 1.]], 1e-5);

        let err = learn_projection_with(&source, &target, SolverPolicy::Ridge { alpha: -1.0 });
        assert!(matches!(err, Err(FewshotError::InvalidParams(_))));
    }

    #[test]
    fn empty_and_mismatched_inputs_fail() {
        let empty = EmbeddingMatrix::from_vec(vec![], 0, 2, &Device::Cpu).unwrap();
        let two = matrix(&[vec![1., 0.], vec![0., 1.]]);
        let three = matrix(&[vec![1., 0.], vec![0., 1.], vec![1., 1.]]);

        assert!(matches!(
            learn_projection(&empty, &two),
            Err(FewshotError::EmptyInput(_))
        ));
        assert!(matches!(
            learn_projection(&two, &three),
            Err(FewshotError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn learning_is_deterministic() {
        let source = matrix(&[vec![0.3, 0.7, -0.2], vec![1.0, -0.5, 0.4], vec![0.1, 0.1, 0.9]]);
        let target = matrix(&[vec![1.0, 0.0], vec![0.5, 0.5], vec![-0.3, 1.2]]);
        let a = learn_projection(&source, &target).unwrap().to_rows().unwrap();
        let b = learn_projection(&source, &target).unwrap().to_rows().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn apply_checks_dimensions() {
        let m = ProjectionMatrix::identity(3, &Device::Cpu).unwrap();
        let q = matrix(&[vec![1., 2.]]);
        assert!(matches!(
            m.apply(&q),
            Err(FewshotError::ShapeMismatch { .. })
        ));
    }
}
