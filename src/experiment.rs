//! The zero-shot experiment: a cosine baseline, then a sweep of learned
//! projections into word-vector space.
//!
//! Documents and category names are embedded together by the sentence
//! encoder (names last) and cached as one matrix. For each vocabulary size
//! the most frequent words are embedded by both the sentence encoder and the
//! word-vector model, a least-squares map between the two is learned, and
//! documents and label names are compared after mapping both through it.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ExperimentConfig;
use crate::dataset::Dataset;
use crate::embeddings::{CacheKey, EmbeddingMatrix, EmbeddingStore, TextEncoder, VocabularySource};
use crate::error::{FewshotError, Result};
use crate::metrics::{accuracy, best_labels, topk_accuracy, weighted_f1};
use crate::models::{SentenceEncoder, SentenceEncoderBuilder, WordVectors};
use crate::predictions::{predict, predict_with_projection, PredictionResult};
use crate::projection::learn_projection_with;
use crate::stats::StepStats;

/// Scores of one prediction run against the gold labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores {
    /// Top-1 accuracy.
    pub accuracy: f64,
    /// Share of documents whose gold label is among the top `k`.
    pub topk_accuracy: f64,
    /// Support-weighted F1 of the top-1 labels.
    pub weighted_f1: f64,
}

impl Scores {
    /// Score `predictions` against `gold`.
    pub fn compute(gold: &[usize], predictions: &[PredictionResult]) -> Result<Self> {
        Ok(Self {
            accuracy: accuracy(gold, predictions)?,
            topk_accuracy: topk_accuracy(gold, predictions)?,
            weighted_f1: weighted_f1(gold, &best_labels(predictions)?)?,
        })
    }
}

/// Result of one vocabulary size in the sweep.
///
/// Exactly one of `scores` and `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectionOutcome {
    /// Requested number of anchor words.
    pub vocabulary_size: usize,
    /// Anchor words actually used; smaller when the vocabulary is.
    pub anchors: Option<usize>,
    /// Rank the solver kept.
    pub rank: Option<usize>,
    /// Scores after projection.
    pub scores: Option<Scores>,
    /// Why this size failed.
    pub error: Option<String>,
    /// Timing of the whole iteration.
    pub stats: Option<StepStats>,
}

/// Everything one run produced, ready for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    /// Dataset identifier.
    pub dataset: String,
    /// Number of scored documents.
    pub documents: usize,
    /// Category names in label order.
    pub labels: Vec<String>,
    /// Labels kept per prediction.
    pub top_k: usize,
    /// Sentence encoder name.
    pub encoder: String,
    /// Word-vector source name.
    pub vocabulary: String,
    /// Scores without projection.
    pub baseline: Scores,
    /// Time to embed (or load) documents and labels.
    pub embedding_stats: StepStats,
    /// Time to predict and score the baseline.
    pub baseline_stats: StepStats,
    /// One entry per vocabulary size, in sweep order.
    pub projections: Vec<ProjectionOutcome>,
}

impl ExperimentReport {
    /// Weighted F1 per vocabulary size; `None` where the size failed.
    pub fn weighted_f1_series(&self) -> Vec<Option<f64>> {
        self.projections
            .iter()
            .map(|p| p.scores.map(|s| s.weighted_f1))
            .collect()
    }

    /// Top-k accuracy per vocabulary size; `None` where the size failed.
    pub fn topk_accuracy_series(&self) -> Vec<Option<f64>> {
        self.projections
            .iter()
            .map(|p| p.scores.map(|s| s.topk_accuracy))
            .collect()
    }
}

/// Configuration plus the collaborators one run needs.
pub struct ExperimentContext<E, V> {
    config: ExperimentConfig,
    encoder: E,
    vocabulary: V,
    store: EmbeddingStore,
}

impl ExperimentContext<SentenceEncoder, WordVectors> {
    /// Load the sentence encoder and word vectors named by `config`.
    pub fn from_config(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        let encoder = SentenceEncoderBuilder::from_config(&config.encoder).build()?;
        let vocabulary = WordVectors::from_config(&config)?;
        Self::new(config, encoder, vocabulary)
    }
}

impl<E: TextEncoder, V: VocabularySource> ExperimentContext<E, V> {
    /// Assemble a context; the store is rooted at `config.data_dir`.
    pub fn new(config: ExperimentConfig, encoder: E, vocabulary: V) -> Result<Self> {
        config.validate()?;
        let store = EmbeddingStore::new(&config.data_dir, config.cache.policy);
        Ok(Self {
            config,
            encoder,
            vocabulary,
            store,
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// The sentence encoder.
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// The embedding store used for every matrix.
    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    /// Run the baseline and the projection sweep over `dataset`.
    ///
    /// # Errors
    ///
    /// Embedding the dataset and the baseline are fatal. A failing
    /// vocabulary size is recorded in its [`ProjectionOutcome`] and the sweep
    /// moves on.
    pub fn run(&self, dataset: &Dataset) -> Result<ExperimentReport> {
        let k = self.config.top_k;
        let label_count = dataset.labels().len();

        let timer = StepStats::start();
        let texts = dataset.texts_with_labels();
        let key = CacheKey::new(
            dataset.id(),
            &format!("{}_embeddings", self.encoder.name()),
            &texts,
        );
        let all = self
            .store
            .get_or_compute(&key, || self.encoder.embed(&texts))?;
        let embedding_stats = timer.finish(texts.len());
        let (documents, labels) = all.split_labels(dataset.len(), label_count)?;

        let timer = StepStats::start();
        let predictions = predict(&documents, &labels, k)?;
        let baseline = Scores::compute(dataset.gold(), &predictions)?;
        let baseline_stats = timer.finish(documents.rows());
        info!(
            accuracy = baseline.accuracy,
            topk_accuracy = baseline.topk_accuracy,
            weighted_f1 = baseline.weighted_f1,
            "baseline scored"
        );

        let projections = self
            .config
            .vocabulary_sizes
            .iter()
            .map(|&size| {
                let timer = StepStats::start();
                match self.run_projection(dataset, size, &documents, &labels) {
                    Ok((scores, anchors, rank)) => {
                        info!(
                            size,
                            rank,
                            weighted_f1 = scores.weighted_f1,
                            topk_accuracy = scores.topk_accuracy,
                            "projection scored"
                        );
                        ProjectionOutcome {
                            vocabulary_size: size,
                            anchors: Some(anchors),
                            rank: Some(rank),
                            scores: Some(scores),
                            error: None,
                            stats: Some(timer.finish(anchors)),
                        }
                    }
                    Err(e) => {
                        warn!(size, error = %e, "projection failed, continuing with next size");
                        ProjectionOutcome {
                            vocabulary_size: size,
                            anchors: None,
                            rank: None,
                            scores: None,
                            error: Some(e.to_string()),
                            stats: None,
                        }
                    }
                }
            })
            .collect();

        Ok(ExperimentReport {
            dataset: dataset.id().to_string(),
            documents: dataset.len(),
            labels: dataset.labels().names().to_vec(),
            top_k: k,
            encoder: self.encoder.name().to_string(),
            vocabulary: self.vocabulary.name().to_string(),
            baseline,
            embedding_stats,
            baseline_stats,
            projections,
        })
    }

    /// Scores, anchor count and rank for one vocabulary size.
    fn run_projection(
        &self,
        dataset: &Dataset,
        size: usize,
        documents: &EmbeddingMatrix,
        labels: &EmbeddingMatrix,
    ) -> Result<(Scores, usize, usize)> {
        let (word_vectors, words) = self.vocabulary.top_k_words(size)?;
        if words.len() != word_vectors.rows() {
            return Err(FewshotError::shape(
                "vocabulary",
                format!("{} word vectors", words.len()),
                format!("{} rows", word_vectors.rows()),
            ));
        }

        let stem = format!(
            "{}_embeddings_for_top{size}_{}_words",
            self.encoder.name(),
            self.vocabulary.name()
        );
        let key = CacheKey::new(dataset.id(), &stem, &words);
        let anchors = self.store.get_or_compute(&key, || {
            let refs: Vec<&str> = words.iter().map(String::as_str).collect();
            self.encoder.embed(&refs)
        })?;

        let word_vectors = word_vectors.to_device(anchors.device())?;
        let projection = learn_projection_with(&anchors, &word_vectors, self.config.projection)?;

        // Label names are mapped too, so both sides are compared in word-vector space
        let projected_labels = projection.apply(labels)?;
        let predictions =
            predict_with_projection(documents, &projected_labels, &projection, self.config.top_k)?;
        let scores = Scores::compute(dataset.gold(), &predictions)?;
        Ok((scores, words.len(), projection.rank()))
    }
}
