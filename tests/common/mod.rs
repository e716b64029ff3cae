//! Deterministic in-memory encoder and vocabulary for offline tests.

#![allow(dead_code)]

use std::cell::Cell;

use candle_core::Device;
use candle_fewshot::embeddings::{EmbeddingMatrix, TextEncoder, VocabularySource};
use candle_fewshot::error::{FewshotError, Result};

const GROUPS: [&[&str]; 3] = [
    &["world", "war", "government", "election"],
    &["sports", "team", "game", "match"],
    &["business", "market", "stock", "profit"],
];

/// Counts keywords per topic group, plus a constant bias dimension so no
/// text embeds to the zero vector.
pub struct KeywordEncoder {
    pub calls: Cell<usize>,
}

impl KeywordEncoder {
    pub fn new() -> Self {
        Self {
            calls: Cell::new(0),
        }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0, 0.0, 0.0, 0.1];
        for token in text.split_whitespace() {
            let token = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            for (g, words) in GROUPS.iter().enumerate() {
                if words.contains(&token.as_str()) {
                    v[g] += 1.0;
                }
            }
        }
        v
    }
}

impl TextEncoder for KeywordEncoder {
    fn name(&self) -> &str {
        "kw"
    }

    fn embed(&self, texts: &[&str]) -> Result<EmbeddingMatrix> {
        self.calls.set(self.calls.get() + 1);
        let rows: Vec<Vec<f32>> = texts.iter().map(|t| Self::vector(t)).collect();
        if rows.is_empty() {
            return EmbeddingMatrix::from_vec(Vec::new(), 0, 4, &Device::Cpu);
        }
        EmbeddingMatrix::from_rows(&rows, &Device::Cpu)
    }
}

/// Eight words in a 3-d topic space; asking for more than eight fails.
pub struct ToyVocabulary;

impl ToyVocabulary {
    pub const WORDS: [(&'static str, [f32; 3]); 8] = [
        ("world", [1.0, 0.0, 0.0]),
        ("sports", [0.0, 1.0, 0.0]),
        ("business", [0.0, 0.0, 1.0]),
        ("the", [0.0, 0.0, 0.0]),
        ("war", [0.9, 0.1, 0.0]),
        ("team", [0.1, 0.9, 0.0]),
        ("market", [0.0, 0.1, 0.9]),
        ("game", [0.0, 1.0, 0.1]),
    ];
}

impl VocabularySource for ToyVocabulary {
    fn name(&self) -> &str {
        "toy"
    }

    fn top_k_words(&self, k: usize) -> Result<(EmbeddingMatrix, Vec<String>)> {
        if k > Self::WORDS.len() {
            return Err(FewshotError::InvalidParams(format!(
                "toy vocabulary has {} words, asked for {k}",
                Self::WORDS.len()
            )));
        }
        let rows: Vec<Vec<f32>> = Self::WORDS[..k].iter().map(|(_, v)| v.to_vec()).collect();
        let words = Self::WORDS[..k].iter().map(|(w, _)| w.to_string()).collect();
        Ok((EmbeddingMatrix::from_rows(&rows, &Device::Cpu)?, words))
    }
}

pub fn matrix(rows: &[Vec<f32>]) -> EmbeddingMatrix {
    EmbeddingMatrix::from_rows(rows, &Device::Cpu).unwrap()
}
