//! BERT sentence encoder with attention-masked mean pooling.
//!
//! Uses `candle_transformers::models::bert` for the network. Weights are
//! shared through the [global model cache](super::cache::global_cache), so
//! building several encoders for the same repository and device loads the
//! weights once.

use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::bert::BertProcessing;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use super::cache::{global_cache, ModelOptions};
use super::device::DeviceRequest;
use crate::config::EncoderConfig;
use crate::embeddings::{EmbeddingMatrix, TextEncoder};
use crate::error::{FewshotError, Result};
use crate::loaders::{HfLoader, TokenizerLoader};

struct BertWeights {
    model: BertModel,
    hidden_size: usize,
}

#[derive(Debug, Clone)]
struct WeightsKey<'a> {
    repo: &'a str,
    device: &'a Device,
}

impl ModelOptions for WeightsKey<'_> {
    fn cache_key(&self) -> String {
        format!("bert:{}-{:?}", self.repo, self.device.location())
    }
}

/// Sentence embeddings from a BERT-family Hub model.
pub struct SentenceEncoder {
    weights: Arc<BertWeights>,
    tokenizer: Tokenizer,
    device: Device,
    name: String,
    batch_size: usize,
    pad_id: u32,
}

impl SentenceEncoder {
    /// Embedding dimension (the model's hidden size).
    pub fn dim(&self) -> usize {
        self.weights.hidden_size
    }

    /// Device the model runs on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Tensor> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| FewshotError::Tokenization(format!("Tokenization error: {e}")))?;

        let max_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
        let mut ids: Vec<u32> = Vec::with_capacity(texts.len() * max_len);
        let mut mask: Vec<u32> = Vec::with_capacity(texts.len() * max_len);
        for encoding in &encodings {
            let mut row_ids = encoding.get_ids().to_vec();
            let mut row_mask = encoding.get_attention_mask().to_vec();
            row_ids.resize(max_len, self.pad_id);
            row_mask.resize(max_len, 0);
            ids.extend(row_ids);
            mask.extend(row_mask);
        }

        let shape = (texts.len(), max_len);
        let input_ids = Tensor::from_vec(ids, shape, &self.device)?;
        let attention_mask = Tensor::from_vec(mask, shape, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self
            .weights
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // Mean over real tokens only
        let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?;
        Ok(summed.broadcast_div(&counts)?)
    }
}

impl TextEncoder for SentenceEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn embed(&self, texts: &[&str]) -> Result<EmbeddingMatrix> {
        if texts.is_empty() {
            return EmbeddingMatrix::from_vec(Vec::new(), 0, self.dim(), &self.device);
        }

        let batches = texts.len().div_ceil(self.batch_size);
        let mut pooled = Vec::with_capacity(batches);
        for (i, chunk) in texts.chunks(self.batch_size).enumerate() {
            debug!(batch = i + 1, of = batches, size = chunk.len(), "encoding batch");
            pooled.push(self.embed_batch(chunk)?);
        }
        EmbeddingMatrix::new(Tensor::cat(&pooled, 0)?)
    }
}

/// Configures and loads a [`SentenceEncoder`].
///
/// ```rust,no_run
/// use candle_fewshot::models::SentenceEncoderBuilder;
///
/// # fn main() -> candle_fewshot::error::Result<()> {
/// let encoder = SentenceEncoderBuilder::new("deepset/sentence_bert")
///     .cuda(0)
///     .batch_size(64)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SentenceEncoderBuilder {
    repo: String,
    name: String,
    batch_size: usize,
    max_length: usize,
    device_request: DeviceRequest,
}

impl SentenceEncoderBuilder {
    /// Builder for `repo` with default settings, on the CPU.
    pub fn new(repo: impl Into<String>) -> Self {
        let defaults = EncoderConfig::default();
        Self {
            repo: repo.into(),
            name: defaults.name,
            batch_size: defaults.batch_size,
            max_length: defaults.max_length,
            device_request: DeviceRequest::Cpu,
        }
    }

    /// Builder with every setting taken from `config`.
    pub fn from_config(config: &EncoderConfig) -> Self {
        Self {
            repo: config.repo.clone(),
            name: config.name.clone(),
            batch_size: config.batch_size,
            max_length: config.max_length,
            device_request: config.device,
        }
    }

    /// Name used in cache artifact names.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Texts per forward pass.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Tokens kept per text, special tokens included.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Run on the CPU.
    pub fn cpu(mut self) -> Self {
        self.device_request = DeviceRequest::Cpu;
        self
    }

    /// Run on CUDA device `index`.
    pub fn cuda(mut self, index: usize) -> Self {
        self.device_request = DeviceRequest::Cuda(index);
        self
    }

    /// Run on the requested device.
    pub fn device(mut self, request: DeviceRequest) -> Self {
        self.device_request = request;
        self
    }

    /// Resolve the device, then load (or reuse) the weights and the tokenizer.
    pub fn build(self) -> Result<SentenceEncoder> {
        if self.batch_size == 0 || self.max_length == 0 {
            return Err(FewshotError::InvalidParams(
                "batch_size and max_length must be positive".into(),
            ));
        }

        let device = self.device_request.resolve()?;
        let key = WeightsKey {
            repo: &self.repo,
            device: &device,
        }
        .cache_key();
        let weights = global_cache().get_or_create(&key, || load_weights(&self.repo, &device))?;

        let mut tokenizer = load_tokenizer(&self.repo)?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: self.max_length,
                ..Default::default()
            }))
            .map_err(|e| FewshotError::Tokenization(e.to_string()))?;
        let pad_id = tokenizer
            .get_padding()
            .map(|p| p.pad_id)
            .or_else(|| tokenizer.token_to_id("[PAD]"))
            .unwrap_or(0);

        info!(repo = %self.repo, device = %self.device_request, dim = weights.hidden_size, "sentence encoder ready");

        Ok(SentenceEncoder {
            weights,
            tokenizer,
            device,
            name: self.name,
            batch_size: self.batch_size,
            pad_id,
        })
    }
}

fn load_weights(repo: &str, device: &Device) -> Result<BertWeights> {
    let config_path = HfLoader::new(repo, "config.json").load()?;
    let weights_path = HfLoader::load_first(repo, &["model.safetensors", "pytorch_model.bin"])?;

    let config: Config = serde_json::from_str(&std::fs::read_to_string(&config_path)?)
        .map_err(|e| FewshotError::Unexpected(format!("{repo}/config.json: {e}")))?;

    let vb = if weights_path.extension().is_some_and(|e| e == "safetensors") {
        unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)? }
    } else {
        VarBuilder::from_pth(&weights_path, DType::F32, device)?
    };

    Ok(BertWeights {
        model: BertModel::load(vb, &config)?,
        hidden_size: config.hidden_size,
    })
}

/// `tokenizer.json` when the repository has one, otherwise a WordPiece
/// tokenizer assembled from `vocab.txt`.
fn load_tokenizer(repo: &str) -> Result<Tokenizer> {
    if let Ok(tokenizer) = TokenizerLoader::new(repo, "tokenizer.json").load() {
        return Ok(tokenizer);
    }
    debug!(repo, "no tokenizer.json, building WordPiece from vocab.txt");

    let vocab_path = HfLoader::new(repo, "vocab.txt").load()?;
    let wordpiece = WordPiece::from_file(&vocab_path.to_string_lossy())
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| FewshotError::Tokenization(format!("{repo}/vocab.txt: {e}")))?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    let special = |token: &str| {
        tokenizer
            .token_to_id(token)
            .ok_or_else(|| FewshotError::Tokenization(format!("{repo}: vocabulary lacks {token}")))
    };
    let cls = special("[CLS]")?;
    let sep = special("[SEP]")?;

    tokenizer
        .with_normalizer(Some(BertNormalizer::new(true, true, None, true)))
        .with_pre_tokenizer(Some(BertPreTokenizer))
        .with_post_processor(Some(BertProcessing::new(
            ("[SEP]".to_string(), sep),
            ("[CLS]".to_string(), cls),
        )));
    Ok(tokenizer)
}
