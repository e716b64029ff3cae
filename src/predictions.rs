//! Ranked label predictions by cosine similarity.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use candle_core::Device;
//! use candle_fewshot::embeddings::EmbeddingMatrix;
//! use candle_fewshot::predictions::{predict, LabelSet};
//!
//! # fn main() -> candle_fewshot::error::Result<()> {
//! let labels = LabelSet::new(["World", "Sports", "Business"]);
//! let prototypes =
//!     EmbeddingMatrix::from_rows(&[vec![1., 0.], vec![0., 1.], vec![-1., 0.]], &Device::Cpu)?;
//! let queries = EmbeddingMatrix::from_rows(&[vec![0.9, 0.1]], &Device::Cpu)?;
//!
//! let results = predict(&queries, &prototypes, 2)?;
//! // World: 0.99, Sports: 0.11
//! for p in &results[0].ranked {
//!     println!("{}: {:.2}", labels.name(p.label).unwrap_or("?"), p.score);
//! }
//! # Ok(())
//! # }
//! ```

use crate::embeddings::EmbeddingMatrix;
use crate::error::{FewshotError, Result};
use crate::projection::ProjectionMatrix;

/// Ordered category names. Row `i` of a prototype matrix is label `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    /// Build from names in prototype-row order.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// `true` when there are no labels.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of label `index`.
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Index of the label called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// All names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A label index with its cosine similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelScore {
    /// Prototype row index.
    pub label: usize,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
}

/// Top-k labels for one query, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    /// Labels sorted by descending score; ties keep the lower index first.
    pub ranked: Vec<LabelScore>,
}

impl PredictionResult {
    /// Top-1 label.
    pub fn best(&self) -> Option<usize> {
        self.ranked.first().map(|p| p.label)
    }

    /// Whether `label` made the top-k.
    pub fn contains(&self, label: usize) -> bool {
        self.ranked.iter().any(|p| p.label == label)
    }

    /// Label indices in rank order.
    pub fn labels(&self) -> Vec<usize> {
        self.ranked.iter().map(|p| p.label).collect()
    }
}

/// Cosine similarity of two vectors.
///
/// Fails with [`FewshotError::DegenerateVector`] if either has zero norm. The
/// error names `a` as `"queries"` and `b` as `"prototypes"`, always at row 0.
pub fn cosine(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(FewshotError::shape(
            "cosine similarity",
            format!("{} components", a.len()),
            format!("{} components", b.len()),
        ));
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 {
        return Err(FewshotError::DegenerateVector {
            matrix: "queries",
            row: 0,
        });
    }
    if norm_b == 0.0 {
        return Err(FewshotError::DegenerateVector {
            matrix: "prototypes",
            row: 0,
        });
    }
    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Rank every prototype against every query by cosine similarity.
///
/// Returns one result per query holding `min(k, prototypes.rows())` labels.
///
/// # Errors
///
/// - [`FewshotError::InvalidParams`] if `k == 0`.
/// - [`FewshotError::ShapeMismatch`] if the embedding dimensions differ.
/// - [`FewshotError::DegenerateVector`] if any row has zero norm.
pub fn predict(
    queries: &EmbeddingMatrix,
    prototypes: &EmbeddingMatrix,
    k: usize,
) -> Result<Vec<PredictionResult>> {
    if k == 0 {
        return Err(FewshotError::InvalidParams(
            "predict: k must be at least 1".to_string(),
        ));
    }
    if queries.dim() != prototypes.dim() {
        return Err(FewshotError::shape(
            "predict",
            format!("prototypes with {} columns", queries.dim()),
            format!("{} columns", prototypes.dim()),
        ));
    }
    if queries.is_empty() {
        return Ok(Vec::new());
    }
    if prototypes.is_empty() {
        return Err(FewshotError::EmptyInput("predict"));
    }

    let query_norms = nonzero_norms(queries, "queries")?;
    let prototype_norms = nonzero_norms(prototypes, "prototypes")?;

    let dots = queries
        .tensor()
        .contiguous()?
        .matmul(&prototypes.tensor().t()?.contiguous()?)?
        .to_vec2::<f32>()?;

    let k = k.min(prototypes.rows());
    let results = dots
        .iter()
        .zip(&query_norms)
        .map(|(row, &qn)| {
            let scores: Vec<f32> = row
                .iter()
                .zip(&prototype_norms)
                .map(|(&dot, &pn)| (dot / (qn * pn)).clamp(-1.0, 1.0))
                .collect();
            rank(&scores, k)
        })
        .collect();

    Ok(results)
}

/// Project `queries` with `projection`, then [`predict`] against `prototypes`.
///
/// `prototypes` must already live in the projection's target space.
///
/// # Errors
///
/// [`FewshotError::ShapeMismatch`] if `queries` has a column count other than
/// the projection's row count, or `prototypes` a column count other than its
/// column count; otherwise as [`predict`].
pub fn predict_with_projection(
    queries: &EmbeddingMatrix,
    prototypes: &EmbeddingMatrix,
    projection: &ProjectionMatrix,
    k: usize,
) -> Result<Vec<PredictionResult>> {
    if prototypes.dim() != projection.target_dim() {
        return Err(FewshotError::shape(
            "predict with projection",
            format!("prototypes with {} columns", projection.target_dim()),
            format!("{} columns", prototypes.dim()),
        ));
    }
    let projected = projection.apply(queries)?;
    predict(&projected, prototypes, k)
}

fn nonzero_norms(matrix: &EmbeddingMatrix, name: &'static str) -> Result<Vec<f32>> {
    let norms = matrix.row_norms()?;
    if let Some(row) = norms.iter().position(|&n| n == 0.0) {
        return Err(FewshotError::DegenerateVector { matrix: name, row });
    }
    Ok(norms)
}

fn rank(scores: &[f32], k: usize) -> PredictionResult {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // Stable sort keeps equal scores in index order
    order.sort_by(|&i, &j| scores[j].total_cmp(&scores[i]));
    order.truncate(k);

    PredictionResult {
        ranked: order
            .into_iter()
            .map(|label| LabelScore {
                label,
                score: scores[label],
            })
            .collect(),
    }
}
