//! Word2vec vectors in the binary or text format of the word2vec C tool.
//!
//! Both formats start with a `"<vocab_size> <dim>"` header and list words in
//! descending corpus frequency, which is the order [`top_k_words`] relies on.
//!
//! [`top_k_words`]: VocabularySource::top_k_words

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use candle_core::Device;
use tracing::{info, warn};

use crate::config::ExperimentConfig;
use crate::embeddings::{EmbeddingMatrix, VocabularySource};
use crate::error::{FewshotError, Result};
use crate::loaders::HfLoader;

/// Largest vector dimension accepted in a header.
const MAX_DIM: usize = 1 << 16;

/// Upper bound on values preallocated from a file header.
const PREALLOC_VALUES: usize = 1 << 24;

/// File layout of a word2vec model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordVectorFormat {
    /// Word, a space, then `dim` little-endian `f32` values.
    Binary,
    /// Word and `dim` decimal values separated by whitespace, one per line.
    Text,
}

impl WordVectorFormat {
    /// `.bin` files are binary, everything else is text.
    pub fn from_path(path: &Path) -> Self {
        if path.extension().is_some_and(|e| e == "bin") {
            WordVectorFormat::Binary
        } else {
            WordVectorFormat::Text
        }
    }
}

/// An in-memory word-vector table, most frequent word first.
#[derive(Debug, Clone)]
pub struct WordVectors {
    name: String,
    words: Vec<String>,
    vectors: Vec<f32>,
    dim: usize,
    device: Device,
}

impl WordVectors {
    /// Build from words and equal-length vectors, already frequency ordered.
    pub fn from_pairs(name: &str, pairs: Vec<(String, Vec<f32>)>) -> Result<Self> {
        let dim = pairs.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut words = Vec::with_capacity(pairs.len());
        let mut vectors = Vec::with_capacity(pairs.len() * dim);
        for (word, vector) in pairs {
            if vector.len() != dim {
                return Err(FewshotError::shape(
                    "word vectors",
                    format!("{dim} values per word"),
                    format!("{} values for '{word}'", vector.len()),
                ));
            }
            words.push(word);
            vectors.extend(vector);
        }
        Ok(Self {
            name: name.to_string(),
            words,
            vectors,
            dim,
            device: Device::Cpu,
        })
    }

    /// Read a word2vec file, keeping at most `limit` words.
    pub fn load(path: impl AsRef<Path>, limit: Option<usize>) -> Result<Self> {
        let path = path.as_ref();
        let format = WordVectorFormat::from_path(path);
        let file = File::open(path).map_err(|e| {
            FewshotError::Dataset(format!("cannot open word vectors '{}': {e}", path.display()))
        })?;
        let vectors = Self::read(BufReader::new(file), format, limit)
            .map_err(|e| FewshotError::Dataset(format!("{}: {e}", path.display())))?;
        info!(
            path = %path.display(),
            words = vectors.len(),
            dim = vectors.dim(),
            "word vectors loaded"
        );
        Ok(vectors)
    }

    /// Load the model described by `config.word_vectors`.
    pub fn from_config(config: &ExperimentConfig) -> Result<Self> {
        let wv = &config.word_vectors;
        let path = match (config.word_vectors_path(), &wv.repo, &wv.filename) {
            (Some(path), _, _) => path,
            (None, Some(repo), Some(filename)) => HfLoader::new(repo, filename).load()?,
            _ => {
                return Err(FewshotError::Config(
                    "[word_vectors] repo needs a filename".into(),
                ))
            }
        };
        Ok(Self::load(path, wv.limit)?.with_name(&wv.name))
    }

    /// Parse from any reader. Errors carry no path; [`load`](Self::load) adds it.
    pub fn read<R: BufRead>(
        mut reader: R,
        format: WordVectorFormat,
        limit: Option<usize>,
    ) -> std::result::Result<Self, String> {
        let mut header = String::new();
        reader
            .read_line(&mut header)
            .map_err(|e| format!("reading header: {e}"))?;
        let (count, dim) = parse_header(&header)?;
        let wanted = limit.map_or(count, |l| l.min(count));
        let total = wanted
            .checked_mul(dim)
            .ok_or_else(|| format!("header size {count} x {dim} overflows"))?;

        // Trust the header only up to a bound; truncated files fail while reading
        let mut words = Vec::with_capacity(wanted.min(PREALLOC_VALUES / dim));
        let mut vectors = Vec::with_capacity(total.min(PREALLOC_VALUES));
        match format {
            WordVectorFormat::Binary => {
                let mut word = Vec::new();
                let mut raw = vec![0u8; dim * 4];
                for i in 0..wanted {
                    word.clear();
                    reader
                        .read_until(b' ', &mut word)
                        .map_err(|e| format!("reading word {i}: {e}"))?;
                    if word.last() != Some(&b' ') {
                        return Err(format!("file ends after {i} of {wanted} words"));
                    }
                    // Vectors may be followed by a newline before the next word
                    let text = String::from_utf8_lossy(&word[..word.len() - 1]);
                    words.push(text.trim_start_matches('\n').to_string());

                    reader
                        .read_exact(&mut raw)
                        .map_err(|e| format!("reading vector {i}: {e}"))?;
                    vectors.extend(
                        raw.chunks_exact(4)
                            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
                    );
                }
            }
            WordVectorFormat::Text => {
                let mut line = String::new();
                for i in 0..wanted {
                    line.clear();
                    let n = reader
                        .read_line(&mut line)
                        .map_err(|e| format!("reading line {}: {e}", i + 2))?;
                    if n == 0 {
                        return Err(format!("file ends after {i} of {wanted} words"));
                    }
                    let mut fields = line.split_whitespace();
                    let word = fields
                        .next()
                        .ok_or_else(|| format!("line {} is empty", i + 2))?;
                    let before = vectors.len();
                    for field in fields {
                        let value: f32 = field
                            .parse()
                            .map_err(|_| format!("line {}: bad value '{field}'", i + 2))?;
                        vectors.push(value);
                    }
                    if vectors.len() - before != dim {
                        return Err(format!(
                            "line {}: expected {dim} values, got {}",
                            i + 2,
                            vectors.len() - before
                        ));
                    }
                    words.push(word.to_string());
                }
            }
        }

        Ok(Self {
            name: "w2v".to_string(),
            words,
            vectors,
            dim,
            device: Device::Cpu,
        })
    }

    /// Rename the source used in cache artifact names.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Device the returned matrices are placed on.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Number of words held.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether no words are held.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Vector dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Words in frequency order.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Vector of `word`, if it is in the table.
    pub fn vector(&self, word: &str) -> Option<&[f32]> {
        let i = self.words.iter().position(|w| w == word)?;
        Some(&self.vectors[i * self.dim..(i + 1) * self.dim])
    }
}

impl VocabularySource for WordVectors {
    fn name(&self) -> &str {
        &self.name
    }

    /// The `k` most frequent words, or the whole table when it is smaller.
    fn top_k_words(&self, k: usize) -> Result<(EmbeddingMatrix, Vec<String>)> {
        if k == 0 {
            return Err(FewshotError::InvalidParams(
                "top_k_words: k must be at least 1".into(),
            ));
        }
        if self.is_empty() {
            return Err(FewshotError::EmptyInput("word vectors"));
        }
        let take = if k > self.len() {
            warn!(requested = k, available = self.len(), "vocabulary smaller than requested, using all words");
            self.len()
        } else {
            k
        };

        let matrix = EmbeddingMatrix::from_vec(
            self.vectors[..take * self.dim].to_vec(),
            take,
            self.dim,
            &self.device,
        )?;
        Ok((matrix, self.words[..take].to_vec()))
    }
}

fn parse_header(header: &str) -> std::result::Result<(usize, usize), String> {
    let mut parts = header.split_whitespace().map(str::parse::<usize>);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(count)), Some(Ok(dim)), None) if dim > 0 && dim <= MAX_DIM => Ok((count, dim)),
        (Some(Ok(_)), Some(Ok(dim)), None) if dim > MAX_DIM => {
            Err(format!("vector dimension {dim} exceeds {MAX_DIM}"))
        }
        _ => Err(format!(
            "expected '<vocab_size> <dim>' header, got '{}'",
            header.trim_end()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn binary_model(words: &[(&str, [f32; 2])]) -> Vec<u8> {
        let mut out = format!("{} 2\n", words.len()).into_bytes();
        for (word, vector) in words {
            out.extend_from_slice(word.as_bytes());
            out.push(b' ');
            for v in vector {
                out.extend_from_slice(&v.to_le_bytes());
            }
            out.push(b'\n');
        }
        out
    }

    #[test]
    fn reads_binary_in_file_order() {
        let bytes = binary_model(&[("the", [1.0, 0.0]), ("game", [0.0, 1.0]), ("stock", [0.5, -0.5])]);
        let wv = WordVectors::read(Cursor::new(bytes), WordVectorFormat::Binary, None).unwrap();
        assert_eq!(wv.words(), &["the", "game", "stock"]);
        assert_eq!(wv.vector("stock"), Some(&[0.5f32, -0.5][..]));
    }

    #[test]
    fn limit_keeps_most_frequent() {
        let bytes = binary_model(&[("a", [1.0, 1.0]), ("b", [2.0, 2.0]), ("c", [3.0, 3.0])]);
        let wv = WordVectors::read(Cursor::new(bytes), WordVectorFormat::Binary, Some(2)).unwrap();
        assert_eq!(wv.words(), &["a", "b"]);
    }

    #[test]
    fn truncated_binary_fails() {
        let mut bytes = binary_model(&[("a", [1.0, 1.0]), ("b", [2.0, 2.0])]);
        bytes.truncate(bytes.len() - 6);
        let err = WordVectors::read(Cursor::new(bytes), WordVectorFormat::Binary, None).unwrap_err();
        assert!(err.contains("vector 1"), "{err}");
    }

    #[test]
    fn reads_text_format() {
        let text = "2 3\nworld 0.1 0.2 0.3\nsports -1 0 1\n";
        let wv = WordVectors::read(Cursor::new(text), WordVectorFormat::Text, None).unwrap();
        assert_eq!(wv.dim(), 3);
        assert_eq!(wv.vector("sports"), Some(&[-1.0f32, 0.0, 1.0][..]));
    }

    #[test]
    fn text_row_with_wrong_width_fails() {
        let text = "1 3\nworld 0.1 0.2\n";
        let err = WordVectors::read(Cursor::new(text), WordVectorFormat::Text, None).unwrap_err();
        assert!(err.contains("expected 3 values"));
    }

    #[test]
    fn bad_header_fails() {
        assert!(WordVectors::read(Cursor::new("hello\n"), WordVectorFormat::Text, None).is_err());
    }

    #[test]
    fn oversized_header_fails_while_reading() {
        let bytes = b"999999999999999 300\nabc ".to_vec();
        let err = WordVectors::read(Cursor::new(bytes), WordVectorFormat::Binary, None).unwrap_err();
        assert!(err.contains("vector 0"), "{err}");
    }

    #[test]
    fn overflowing_header_fails() {
        let header = format!("{} 2\n", usize::MAX);
        let err = WordVectors::read(Cursor::new(header), WordVectorFormat::Binary, None).unwrap_err();
        assert!(err.contains("overflows"), "{err}");

        let header = format!("1 {}\n", usize::MAX / 2);
        let err = WordVectors::read(Cursor::new(header), WordVectorFormat::Text, None).unwrap_err();
        assert!(err.contains("exceeds"), "{err}");
    }

    #[test]
    fn top_k_words_slices_and_truncates() {
        let wv = WordVectors::from_pairs(
            "w2v",
            vec![
                ("a".into(), vec![1.0, 0.0]),
                ("b".into(), vec![0.0, 1.0]),
                ("c".into(), vec![1.0, 1.0]),
            ],
        )
        .unwrap();

        let (matrix, words) = wv.top_k_words(2).unwrap();
        assert_eq!(words, vec!["a", "b"]);
        assert_eq!(matrix.to_rows().unwrap(), vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

        let (matrix, words) = wv.top_k_words(10).unwrap();
        assert_eq!(matrix.rows(), 3);
        assert_eq!(words.len(), 3);

        assert!(matches!(wv.top_k_words(0), Err(FewshotError::InvalidParams(_))));
    }

    #[test]
    fn load_picks_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let mut file = File::create(&path).unwrap();
        file.write_all(&binary_model(&[("news", [0.25, 0.75])])).unwrap();
        drop(file);

        let wv = WordVectors::load(&path, None).unwrap().with_name("tiny");
        assert_eq!(wv.name(), "tiny");
        assert_eq!(wv.vector("news"), Some(&[0.25f32, 0.75][..]));

        let missing = WordVectors::load(dir.path().join("absent.txt"), None);
        assert!(matches!(missing, Err(FewshotError::Dataset(_))));
    }
}
