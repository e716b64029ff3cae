//! Embedding matrices, the encoder and vocabulary seams, and the on-disk store.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use candle_fewshot::embeddings::{CacheKey, CachePolicy, EmbeddingStore, TextEncoder};
//! use candle_fewshot::models::SentenceEncoderBuilder;
//!
//! # fn main() -> candle_fewshot::error::Result<()> {
//! let encoder = SentenceEncoderBuilder::new("deepset/sentence_bert").build()?;
//! let store = EmbeddingStore::new("data", CachePolicy::ReadWrite);
//!
//! let texts = ["The team won the final", "Stocks rallied on Monday"];
//! let key = CacheKey::new("AGNews", "sbert_embeddings", &texts);
//!
//! // Encoded once, loaded from disk on every later call
//! let embeddings = store.get_or_compute(&key, || encoder.embed(&texts))?;
//! println!("{} x {}", embeddings.rows(), embeddings.dim());
//! # Ok(())
//! # }
//! ```

pub(crate) mod matrix;
pub(crate) mod store;

pub use matrix::EmbeddingMatrix;
pub use store::{CacheKey, CachePolicy, EmbeddingStore};

use crate::error::Result;

/// Maps texts to rows of an [`EmbeddingMatrix`] in one semantic space.
pub trait TextEncoder {
    /// Short identifier used in cache artifact names, e.g. `"sbert"`.
    fn name(&self) -> &str;

    /// Embed `texts`, one row per text, in input order.
    fn embed(&self, texts: &[&str]) -> Result<EmbeddingMatrix>;
}

/// A word-vector space whose vocabulary is ordered by descending frequency.
pub trait VocabularySource {
    /// Short identifier used in cache artifact names, e.g. `"w2v"`.
    fn name(&self) -> &str;

    /// Embeddings and surface forms of the `k` most frequent words.
    fn top_k_words(&self, k: usize) -> Result<(EmbeddingMatrix, Vec<String>)>;
}
