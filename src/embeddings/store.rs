//! Disk-backed memoization of embedding matrices.
//!
//! Artifacts live at `<root>/<dataset_id>/<stem>-<xxh64>.safetensors`, where the
//! hash covers every input text in order. Identical inputs therefore map to the
//! same file across runs, and any change to the texts maps to a new one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::{safetensors, Device};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use xxhash_rust::xxh64::Xxh64;

use super::EmbeddingMatrix;
use crate::error::{FewshotError, Result};

const TENSOR_NAME: &str = "embeddings";

/// How the store treats existing artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Load when present, otherwise compute and persist.
    #[default]
    ReadWrite,
    /// Load only; a missing artifact is an error.
    ReadOnly,
    /// Always recompute and overwrite.
    Refresh,
}

/// Identity of one persisted embedding matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    dataset_id: String,
    stem: String,
    content_hash: u64,
    rows: usize,
}

impl CacheKey {
    /// Key for embedding `texts` under `dataset_id`, named by `stem`.
    pub fn new<S: AsRef<str>>(dataset_id: &str, stem: &str, texts: &[S]) -> Self {
        let mut hasher = Xxh64::new(0);
        for text in texts {
            let bytes = text.as_ref().as_bytes();
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        Self {
            dataset_id: dataset_id.to_string(),
            stem: stem.to_string(),
            content_hash: hasher.digest(),
            rows: texts.len(),
        }
    }

    /// File name of the artifact, without directory.
    pub fn file_name(&self) -> String {
        format!("{}-{:016x}.safetensors", self.stem, self.content_hash)
    }

    /// Number of rows the artifact must hold.
    pub fn rows(&self) -> usize {
        self.rows
    }
}

/// Memoizes embedding matrices on disk.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    root: PathBuf,
    policy: CachePolicy,
    device: Device,
}

impl EmbeddingStore {
    /// Store rooted at `root`; artifacts are loaded onto the CPU.
    pub fn new(root: impl Into<PathBuf>, policy: CachePolicy) -> Self {
        Self {
            root: root.into(),
            policy,
            device: Device::Cpu,
        }
    }

    /// Place loaded and computed matrices on `device` instead of the CPU.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Full path of the artifact for `key`.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(&key.dataset_id).join(key.file_name())
    }

    /// Return the matrix for `key`, calling `compute` only when it is not on disk.
    ///
    /// A present but unreadable artifact is an error, not a cache miss; rerun
    /// with [`CachePolicy::Refresh`] to rebuild it.
    pub fn get_or_compute<F>(&self, key: &CacheKey, compute: F) -> Result<EmbeddingMatrix>
    where
        F: FnOnce() -> Result<EmbeddingMatrix>,
    {
        let path = self.path_for(key);

        match self.policy {
            CachePolicy::Refresh => {}
            _ if path.exists() => {
                debug!(path = %path.display(), "embedding cache hit");
                return self.load(key, &path);
            }
            CachePolicy::ReadOnly => {
                return Err(FewshotError::Cache(format!(
                    "'{}' not found and the store is read-only",
                    path.display()
                )));
            }
            CachePolicy::ReadWrite => {}
        }

        info!(path = %path.display(), rows = key.rows, "computing embeddings");
        let embeddings = compute()?.to_device(&self.device)?;
        if embeddings.rows() != key.rows {
            return Err(FewshotError::shape(
                "embedding store",
                format!("{} rows", key.rows),
                format!("{} rows", embeddings.rows()),
            ));
        }
        self.persist(&embeddings, &path)?;
        Ok(embeddings)
    }

    fn load(&self, key: &CacheKey, path: &Path) -> Result<EmbeddingMatrix> {
        let mut tensors = safetensors::load(path, &self.device).map_err(|e| {
            FewshotError::Cache(format!("failed to read '{}': {e}", path.display()))
        })?;
        let tensor = tensors.remove(TENSOR_NAME).ok_or_else(|| {
            FewshotError::Cache(format!(
                "'{}' has no '{TENSOR_NAME}' tensor",
                path.display()
            ))
        })?;
        let embeddings = EmbeddingMatrix::new(tensor)
            .map_err(|e| FewshotError::Cache(format!("'{}': {e}", path.display())))?;
        if embeddings.rows() != key.rows {
            return Err(FewshotError::Cache(format!(
                "'{}' holds {} rows, expected {}",
                path.display(),
                embeddings.rows(),
                key.rows
            )));
        }
        Ok(embeddings)
    }

    fn persist(&self, embeddings: &EmbeddingMatrix, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tensors = HashMap::from([(TENSOR_NAME, embeddings.tensor().clone())]);

        // Write beside the target and rename so readers never see a partial file
        let temp_path = path.with_extension("tmp");
        safetensors::save(&tensors, &temp_path).map_err(|e| {
            FewshotError::Cache(format!("failed to write '{}': {e}", temp_path.display()))
        })?;
        std::fs::rename(&temp_path, path)?;

        debug!(path = %path.display(), "embeddings persisted");
        Ok(())
    }
}
