//! Hugging Face Hub file loading.
//!
//! - [`HfLoader`] fetches one file from a model repository, retrying when
//!   another process holds the Hub cache lock.
//! - [`TokenizerLoader`] fetches and parses a `tokenizer.json`.
//!
//! Downloads land in the standard Hub cache (`HF_HOME`), so only the first
//! call touches the network.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use hf_hub::api::sync::ApiBuilder;
use tokenizers::Tokenizer;
use tracing::{debug, warn};

use crate::error::{FewshotError, Result};

const MAX_ATTEMPTS: u32 = 3;

/// One file in a Hub model repository.
#[derive(Debug, Clone)]
pub struct HfLoader {
    pub repo: String,
    pub filename: String,
}

impl HfLoader {
    pub fn new(repo: &str, filename: &str) -> Self {
        Self {
            repo: repo.into(),
            filename: filename.into(),
        }
    }

    /// Download (or find in the local cache) and return the local path.
    pub fn load(&self) -> Result<PathBuf> {
        let api = ApiBuilder::new()
            .with_progress(false)
            .build()
            .map_err(|e| FewshotError::Download(e.to_string()))?;
        let repo = api.model(self.repo.clone());

        let mut attempt = 0;
        loop {
            match repo.get(&self.filename) {
                Ok(path) => {
                    debug!(repo = %self.repo, file = %self.filename, "hub file ready");
                    return Ok(path);
                }
                Err(e) => {
                    let msg = e.to_string();
                    attempt += 1;
                    if msg.contains("Lock acquisition failed") && attempt < MAX_ATTEMPTS {
                        let wait = Duration::from_millis(100 * (1 << attempt));
                        warn!(repo = %self.repo, file = %self.filename, ?wait, "hub cache locked, retrying");
                        thread::sleep(wait);
                        continue;
                    }
                    return Err(FewshotError::Download(format!(
                        "{}/{}: {msg}",
                        self.repo, self.filename
                    )));
                }
            }
        }
    }

    /// Like [`load`](Self::load), trying each filename in turn.
    ///
    /// Used for repositories that ship either `model.safetensors` or
    /// `pytorch_model.bin`.
    pub fn load_first(repo: &str, filenames: &[&str]) -> Result<PathBuf> {
        let mut last = None;
        for name in filenames {
            match HfLoader::new(repo, name).load() {
                Ok(path) => return Ok(path),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or_else(|| {
            FewshotError::InvalidParams(format!("no candidate files given for {repo}"))
        }))
    }
}

#[derive(Debug, Clone)]
pub struct TokenizerLoader {
    pub tokenizer_file_loader: HfLoader,
}

impl TokenizerLoader {
    pub fn new(repo: &str, filename: &str) -> Self {
        Self {
            tokenizer_file_loader: HfLoader::new(repo, filename),
        }
    }

    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.tokenizer_file_loader.load()?;
        Tokenizer::from_file(path)
            .map_err(|e| FewshotError::Tokenization(format!("Failed to load tokenizer: {e}")))
    }
}
