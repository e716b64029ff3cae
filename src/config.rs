//! Experiment configuration.
//!
//! Load from a TOML file or start from `Default::default()`, which mirrors
//! the AG News experiment. Environment variables override either.
//!
//! # TOML Structure
//!
//! ```toml
//! data_dir = "data"
//! dataset = "AGNews"
//! top_k = 3
//! vocabulary_sizes = [1000, 10000, 100000]
//!
//! [encoder]
//! repo = "deepset/sentence_bert"
//! name = "sbert"
//! batch_size = 32
//! max_length = 512
//! device = "cpu"            # or { cuda = 0 }
//!
//! [word_vectors]
//! path = "GoogleNews-vectors-negative300.bin"
//! name = "w2v"
//! limit = 500000
//!
//! [projection]
//! solver = "minimum-norm"   # or "ridge" with alpha = 0.1
//!
//! [cache]
//! policy = "read-write"     # "read-only", "refresh"
//!
//! [corpus]
//! file = "test.jsonl"
//! categories = ["World", "Sports", "Business", "Science and Technology"]
//! ```
//!
//! Invalid values are errors; nothing is silently replaced by a default.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::embeddings::CachePolicy;
use crate::error::{FewshotError, Result};
use crate::models::DeviceRequest;
use crate::projection::SolverPolicy;

/// Root configuration for one experiment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Directory holding datasets, word vectors and cached embeddings.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Dataset identifier; also the cache subdirectory.
    #[serde(default = "default_dataset")]
    pub dataset: String,

    /// Labels kept per prediction.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Anchor vocabulary sizes, strictly ascending.
    #[serde(default = "default_vocabulary_sizes")]
    pub vocabulary_sizes: Vec<usize>,

    /// Sentence encoder settings.
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Word-vector model settings.
    #[serde(default)]
    pub word_vectors: WordVectorConfig,

    /// Least-squares solver policy.
    #[serde(default)]
    pub projection: SolverPolicy,

    /// Embedding store settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Labeled corpus settings.
    #[serde(default)]
    pub corpus: CorpusConfig,
}

/// Sentence encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Hugging Face Hub repository of a BERT-family model.
    pub repo: String,
    /// Short name used in cache artifact names.
    pub name: String,
    /// Texts per forward pass.
    pub batch_size: usize,
    /// Tokens kept per text.
    pub max_length: usize,
    /// Device to run on.
    pub device: DeviceRequest,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            repo: "deepset/sentence_bert".to_string(),
            name: "sbert".to_string(),
            batch_size: 32,
            max_length: 512,
            device: DeviceRequest::Cpu,
        }
    }
}

/// Word-vector model settings.
///
/// The file is read from `path` (relative paths resolve against `data_dir`),
/// or downloaded from the Hub when `repo` is set. With neither, the path is
/// [`DEFAULT_WORD_VECTORS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WordVectorConfig {
    /// Local word2vec file, binary (`.bin`) or text.
    pub path: Option<PathBuf>,
    /// Hub repository to download `filename` from instead.
    pub repo: Option<String>,
    /// File inside `repo`.
    pub filename: Option<String>,
    /// Short name used in cache artifact names.
    pub name: String,
    /// Read only the first `limit` (most frequent) words.
    pub limit: Option<usize>,
}

impl Default for WordVectorConfig {
    fn default() -> Self {
        Self {
            path: None,
            repo: None,
            filename: None,
            name: "w2v".to_string(),
            limit: Some(500_000),
        }
    }
}

/// Word-vector file used when `[word_vectors]` names no source.
pub const DEFAULT_WORD_VECTORS: &str = "GoogleNews-vectors-negative300.bin";

/// Embedding store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Treatment of existing artifacts.
    #[serde(default)]
    pub policy: CachePolicy,
}

/// Labeled corpus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// JSON-lines file under `<data_dir>/<dataset>/`.
    pub file: String,
    /// Category names; position `i` is label `i`.
    pub categories: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            file: "test.jsonl".to_string(),
            categories: ["World", "Sports", "Business", "Science and Technology"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_dataset() -> String {
    "AGNews".to_string()
}

fn default_top_k() -> usize {
    3
}

fn default_vocabulary_sizes() -> Vec<usize> {
    vec![1_000, 10_000, 100_000]
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dataset: default_dataset(),
            top_k: default_top_k(),
            vocabulary_sizes: default_vocabulary_sizes(),
            encoder: EncoderConfig::default(),
            word_vectors: WordVectorConfig::default(),
            projection: SolverPolicy::default(),
            cache: CacheConfig::default(),
            corpus: CorpusConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// [`FewshotError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FewshotError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|e| {
            FewshotError::Config(format!("failed to parse TOML in '{}': {e}", path.display()))
        })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| FewshotError::Config(format!("failed to parse TOML: {e}")))
    }

    /// Apply environment overrides.
    ///
    /// | Variable | Config Path |
    /// |----------|-------------|
    /// | `FEWSHOT_DATA_DIR` | `data_dir` |
    /// | `FEWSHOT_DATASET` | `dataset` |
    /// | `FEWSHOT_DEVICE` | `encoder.device` (`cpu`, `cuda:N`) |
    ///
    /// # Errors
    ///
    /// [`FewshotError::Config`] if `FEWSHOT_DEVICE` is not a valid device.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(val) = env::var("FEWSHOT_DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("FEWSHOT_DATASET") {
            self.dataset = val;
        }
        if let Ok(val) = env::var("FEWSHOT_DEVICE") {
            self.encoder.device = val
                .parse()
                .map_err(|e| FewshotError::Config(format!("FEWSHOT_DEVICE: {e}")))?;
        }
        Ok(self)
    }

    /// Validate all values, returning the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.dataset.trim().is_empty() {
            return Err(FewshotError::Config("dataset must not be empty".into()));
        }
        if self.top_k == 0 {
            return Err(FewshotError::Config("top_k must be at least 1".into()));
        }
        if self.vocabulary_sizes.is_empty() {
            return Err(FewshotError::Config(
                "vocabulary_sizes must not be empty".into(),
            ));
        }
        if self.vocabulary_sizes.contains(&0) {
            return Err(FewshotError::Config(
                "vocabulary_sizes must be positive".into(),
            ));
        }
        if self.vocabulary_sizes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(FewshotError::Config(format!(
                "vocabulary_sizes must be strictly ascending, got {:?}",
                self.vocabulary_sizes
            )));
        }

        if self.encoder.repo.trim().is_empty() {
            return Err(FewshotError::Config("[encoder] repo must not be empty".into()));
        }
        if self.encoder.batch_size == 0 || self.encoder.max_length == 0 {
            return Err(FewshotError::Config(
                "[encoder] batch_size and max_length must be positive".into(),
            ));
        }

        let wv = &self.word_vectors;
        match (&wv.path, &wv.repo, &wv.filename) {
            (_, None, _) | (None, Some(_), Some(_)) => {}
            (Some(_), Some(_), _) => {
                return Err(FewshotError::Config(
                    "[word_vectors] set either path or repo, not both".into(),
                ))
            }
            _ => {
                return Err(FewshotError::Config(
                    "[word_vectors] repo needs a filename".into(),
                ))
            }
        }
        if let (Some(limit), Some(&largest)) = (wv.limit, self.vocabulary_sizes.last()) {
            if limit < largest {
                return Err(FewshotError::Config(format!(
                    "[word_vectors] limit {limit} is below the largest vocabulary size {largest}"
                )));
            }
        }

        if let SolverPolicy::Ridge { alpha } = self.projection {
            if !(alpha.is_finite() && alpha >= 0.0) {
                return Err(FewshotError::Config(format!(
                    "[projection] ridge alpha must be finite and >= 0, got {alpha}"
                )));
            }
        }

        if self.corpus.categories.is_empty() {
            return Err(FewshotError::Config(
                "[corpus] categories must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Directory of the dataset's files and cached embeddings.
    pub fn dataset_dir(&self) -> PathBuf {
        self.data_dir.join(&self.dataset)
    }

    /// Path of the labeled corpus file.
    pub fn corpus_path(&self) -> PathBuf {
        self.dataset_dir().join(&self.corpus.file)
    }

    /// Local word-vector path, resolved against `data_dir`. `None` when the
    /// vectors come from a Hub repo.
    pub fn word_vectors_path(&self) -> Option<PathBuf> {
        let wv = &self.word_vectors;
        let path = match (&wv.path, &wv.repo) {
            (Some(path), _) => path.clone(),
            (None, None) => PathBuf::from(DEFAULT_WORD_VECTORS),
            (None, Some(_)) => return None,
        };
        Some(if path.is_absolute() {
            path
        } else {
            self.data_dir.join(path)
        })
    }
}
