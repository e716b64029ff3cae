//! Zero-shot text classification with sentence embeddings, powered by
//! [Candle](https://github.com/huggingface/candle).
//!
//! Documents are labeled by cosine similarity between their sentence
//! embeddings and the embeddings of the category names. A least-squares map
//! from sentence-embedding space into word-vector space, learned from the
//! most frequent words of a word2vec model, can be applied first; the
//! [`experiment`] module sweeps over vocabulary sizes and scores both.

#![deny(missing_docs)]

// ============ Internal API ============

pub(crate) mod loaders;
pub(crate) mod stats;

// ============ Public API ============

pub mod config;
pub mod dataset;
pub mod embeddings;
pub mod error;
pub mod experiment;
pub mod metrics;
pub mod models;
pub mod predictions;
pub mod projection;

pub use config::ExperimentConfig;
pub use dataset::Dataset;
pub use embeddings::{EmbeddingMatrix, TextEncoder, VocabularySource};
pub use error::{FewshotError, Result};
pub use experiment::{ExperimentContext, ExperimentReport};
pub use stats::StepStats;
