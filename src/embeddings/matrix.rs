use candle_core::{DType, Device, Tensor};

use crate::error::{FewshotError, Result};

/// Row-major matrix of embeddings, one row per item.
///
/// Wraps a 2-D `f32` [`Tensor`]. Row order is the caller's item order and is
/// never changed by the crate.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    tensor: Tensor,
}

impl EmbeddingMatrix {
    /// Wrap a tensor, converting it to `f32`.
    ///
    /// # Errors
    ///
    /// Returns [`FewshotError::ShapeMismatch`] if the tensor is not 2-D.
    pub fn new(tensor: Tensor) -> Result<Self> {
        if tensor.rank() != 2 {
            return Err(FewshotError::shape(
                "embedding matrix",
                "rank 2 (rows x dim)",
                format!("{:?}", tensor.dims()),
            ));
        }
        let tensor = if tensor.dtype() == DType::F32 {
            tensor
        } else {
            tensor.to_dtype(DType::F32)?
        };
        Ok(Self { tensor })
    }

    /// Build from equal-length rows.
    ///
    /// An empty slice yields a `0 x 0` matrix.
    pub fn from_rows(rows: &[Vec<f32>], device: &Device) -> Result<Self> {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != dim) {
            return Err(FewshotError::shape(
                "embedding matrix",
                format!("{dim} columns"),
                format!("{} columns in row {i}", row.len()),
            ));
        }
        let data: Vec<f32> = rows.iter().flatten().copied().collect();
        Self::from_vec(data, rows.len(), dim, device)
    }

    /// Build from a flat row-major buffer.
    pub fn from_vec(data: Vec<f32>, rows: usize, dim: usize, device: &Device) -> Result<Self> {
        if data.len() != rows * dim {
            return Err(FewshotError::shape(
                "embedding matrix",
                format!("{} values ({rows} x {dim})", rows * dim),
                format!("{} values", data.len()),
            ));
        }
        let tensor = Tensor::from_vec(data, (rows, dim), device)?;
        Ok(Self { tensor })
    }

    /// Number of rows (items).
    pub fn rows(&self) -> usize {
        self.tensor.dims()[0]
    }

    /// Embedding dimension.
    pub fn dim(&self) -> usize {
        self.tensor.dims()[1]
    }

    /// `true` when the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    /// Underlying tensor.
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    /// Device the tensor lives on.
    pub fn device(&self) -> &Device {
        self.tensor.device()
    }

    /// Copy onto `device`; a no-op when already there.
    pub fn to_device(&self, device: &Device) -> Result<Self> {
        if self.tensor.device().same_device(device) {
            return Ok(self.clone());
        }
        Ok(Self {
            tensor: self.tensor.to_device(device)?,
        })
    }

    /// Copy rows out as nested vectors.
    pub fn to_rows(&self) -> Result<Vec<Vec<f32>>> {
        Ok(self.tensor.to_vec2::<f32>()?)
    }

    /// Rows `start..start + len`.
    pub fn slice_rows(&self, start: usize, len: usize) -> Result<Self> {
        if start + len > self.rows() {
            return Err(FewshotError::shape(
                "slice rows",
                format!("at least {} rows", start + len),
                format!("{} rows", self.rows()),
            ));
        }
        Ok(Self {
            tensor: self.tensor.narrow(0, start, len)?,
        })
    }

    /// Stack `self` on top of `other`.
    pub fn concat(&self, other: &EmbeddingMatrix) -> Result<Self> {
        if self.dim() != other.dim() {
            return Err(FewshotError::shape(
                "concat",
                format!("{} columns", self.dim()),
                format!("{} columns", other.dim()),
            ));
        }
        Ok(Self {
            tensor: Tensor::cat(&[&self.tensor, &other.tensor], 0)?,
        })
    }

    /// Split a documents-then-labels matrix into `(documents, labels)`.
    ///
    /// The label embeddings are the trailing `label_count` rows, in label-set
    /// order. The total row count must equal `document_count + label_count`.
    pub fn split_labels(
        &self,
        document_count: usize,
        label_count: usize,
    ) -> Result<(EmbeddingMatrix, EmbeddingMatrix)> {
        let expected = document_count + label_count;
        if self.rows() != expected {
            return Err(FewshotError::shape(
                "split labels",
                format!("{expected} rows ({document_count} documents + {label_count} labels)"),
                format!("{} rows", self.rows()),
            ));
        }
        let documents = self.slice_rows(0, document_count)?;
        let labels = self.slice_rows(document_count, label_count)?;
        Ok((documents, labels))
    }

    /// Per-row Euclidean norms.
    pub fn row_norms(&self) -> Result<Vec<f32>> {
        Ok(self.tensor.sqr()?.sum(1)?.sqrt()?.to_vec1::<f32>()?)
    }

    /// Matrix product `self . rhs`.
    pub(crate) fn matmul(&self, rhs: &Tensor) -> Result<Self> {
        let product = self.tensor.contiguous()?.matmul(&rhs.contiguous()?)?;
        Self::new(product)
    }
}

impl PartialEq for EmbeddingMatrix {
    fn eq(&self, other: &Self) -> bool {
        if self.tensor.dims() != other.tensor.dims() {
            return false;
        }
        match (self.to_rows(), other.to_rows()) {
            (Ok(a), Ok(b)) => a
                .iter()
                .flatten()
                .zip(b.iter().flatten())
                .all(|(x, y)| x.to_bits() == y.to_bits()),
            _ => false,
        }
    }
}
