//! Error types for this crate.
//!
//! All fallible operations return [`Result<T>`] which uses [`FewshotError`] as the error type.

use thiserror::Error;

/// A [`Result`](std::result::Result) alias using [`FewshotError`] as the error type.
pub type Result<T> = std::result::Result<T, FewshotError>;

/// The unified error type for all crate errors.
///
/// Shape, empty-input and degenerate-vector errors are fatal to the step that
/// raised them. The experiment driver records them per vocabulary size and
/// keeps going; everything else surfaces unchanged.
///
/// # Example
///
/// ```rust,no_run
/// use candle_fewshot::error::FewshotError;
///
/// fn handle_error(e: FewshotError) {
///     match &e {
///         FewshotError::ShapeMismatch { step, .. } => {
///             // Paired matrices disagree - check row order and dimensions
///             eprintln!("{step} failed: {e}");
///         }
///         FewshotError::DegenerateVector { .. } => {
///             // An all-zero embedding slipped in - inspect the encoder input
///         }
///         FewshotError::Cache(_) => {
///             // Stale or corrupt artifact - rerun with the refresh policy
///         }
///         _ => {
///             // Future error variants
///         }
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FewshotError {
    /// Paired matrices disagree in rows or columns.
    #[error("{step}: shape mismatch, expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Step that detected the mismatch.
        step: &'static str,
        /// Shape the step required.
        expected: String,
        /// Shape the step received.
        actual: String,
    },

    /// Zero-row input where at least one row is required.
    #[error("{0}: input has no rows")]
    EmptyInput(&'static str),

    /// Zero-norm vector in a cosine comparison.
    #[error("cosine similarity: row {row} of {matrix} has zero norm")]
    DegenerateVector {
        /// Which matrix held the vector (`"queries"` or `"prototypes"`).
        matrix: &'static str,
        /// Row index of the vector; 0 when [`cosine`](crate::predictions::cosine)
        /// compares two single vectors.
        row: usize,
    },

    /// Embedding store failure: missing, corrupt or mismatched artifact.
    #[error("embedding cache: {0}")]
    Cache(String),

    /// Network or download failure. Retry may help.
    #[error("{0}")]
    Download(String),

    /// Tokenization failure. Check input text.
    #[error("{0}")]
    Tokenization(String),

    /// Device initialization failure. Fall back to CPU.
    #[error("{0}")]
    Device(String),

    /// Invalid or unreadable configuration.
    #[error("config: {0}")]
    Config(String),

    /// Dataset or word-vector file could not be parsed.
    #[error("dataset: {0}")]
    Dataset(String),

    /// Invalid call parameters, e.g. `k == 0`.
    #[error("{0}")]
    InvalidParams(String),

    /// Internal error. Report if seen.
    #[error("{0}")]
    Unexpected(String),
}

impl FewshotError {
    pub(crate) fn shape(
        step: &'static str,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        FewshotError::ShapeMismatch {
            step,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl From<hf_hub::api::sync::ApiError> for FewshotError {
    fn from(value: hf_hub::api::sync::ApiError) -> Self {
        FewshotError::Download(format!("HuggingFace API error: {}", value))
    }
}

impl From<candle_core::Error> for FewshotError {
    fn from(value: candle_core::Error) -> Self {
        FewshotError::Unexpected(value.to_string())
    }
}

impl From<std::io::Error> for FewshotError {
    fn from(value: std::io::Error) -> Self {
        FewshotError::Unexpected(value.to_string())
    }
}

impl From<serde_json::Error> for FewshotError {
    fn from(value: serde_json::Error) -> Self {
        FewshotError::Dataset(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_mismatch_names_step_and_shapes() {
        let err = FewshotError::shape("learn_projection", "4 rows", "3 rows");
        let msg = err.to_string();
        assert!(msg.contains("learn_projection"));
        assert!(msg.contains("4 rows"));
        assert!(msg.contains("3 rows"));
    }

    #[test]
    fn degenerate_vector_names_matrix_and_row() {
        let err = FewshotError::DegenerateVector {
            matrix: "prototypes",
            row: 2,
        };
        assert_eq!(
            err.to_string(),
            "cosine similarity: row 2 of prototypes has zero norm"
        );
    }
}
