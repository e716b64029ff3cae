//! Labeled text corpora in JSON-lines form.
//!
//! One object per line with a `text` field and a `label` field that is
//! either a category index or a category name:
//!
//! ```text
//! {"text": "Wall St. Bears Claw Back Into the Black", "label": 2}
//! {"text": "Olympic team wins gold", "label": "Sports"}
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::config::ExperimentConfig;
use crate::error::{FewshotError, Result};
use crate::predictions::LabelSet;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLabel {
    Index(usize),
    Name(String),
}

#[derive(Deserialize)]
struct RawRecord {
    text: String,
    label: RawLabel,
}

/// Documents, their gold label indices and the category names.
#[derive(Debug, Clone)]
pub struct Dataset {
    id: String,
    texts: Vec<String>,
    gold: Vec<usize>,
    labels: LabelSet,
}

impl Dataset {
    /// Validate and assemble a dataset.
    ///
    /// # Errors
    ///
    /// - [`FewshotError::EmptyInput`] with no documents or no labels.
    /// - [`FewshotError::ShapeMismatch`] when `texts` and `gold` differ in length.
    /// - [`FewshotError::Dataset`] for a gold index outside `labels`.
    pub fn new(
        id: impl Into<String>,
        texts: Vec<String>,
        gold: Vec<usize>,
        labels: LabelSet,
    ) -> Result<Self> {
        if texts.is_empty() {
            return Err(FewshotError::EmptyInput("dataset"));
        }
        if labels.is_empty() {
            return Err(FewshotError::EmptyInput("dataset labels"));
        }
        if texts.len() != gold.len() {
            return Err(FewshotError::shape(
                "dataset",
                format!("{} gold labels", texts.len()),
                format!("{} gold labels", gold.len()),
            ));
        }
        if let Some((i, &g)) = gold.iter().enumerate().find(|(_, &g)| g >= labels.len()) {
            return Err(FewshotError::Dataset(format!(
                "document {i} has label {g}, only {} categories",
                labels.len()
            )));
        }
        Ok(Self {
            id: id.into(),
            texts,
            gold,
            labels,
        })
    }

    /// Read a JSON-lines file. Blank lines are skipped.
    pub fn load_jsonl(path: impl AsRef<Path>, id: &str, labels: LabelSet) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            FewshotError::Dataset(format!("cannot open '{}': {e}", path.display()))
        })?;

        let mut texts = Vec::new();
        let mut gold = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: RawRecord = serde_json::from_str(&line).map_err(|e| {
                FewshotError::Dataset(format!("{}:{}: {e}", path.display(), n + 1))
            })?;
            let label = match record.label {
                RawLabel::Index(i) => i,
                RawLabel::Name(name) => labels.index_of(&name).ok_or_else(|| {
                    FewshotError::Dataset(format!(
                        "{}:{}: unknown category '{name}'",
                        path.display(),
                        n + 1
                    ))
                })?,
            };
            texts.push(record.text);
            gold.push(label);
        }

        let dataset = Self::new(id, texts, gold, labels)?;
        info!(path = %path.display(), documents = dataset.len(), categories = dataset.labels.len(), "dataset loaded");
        Ok(dataset)
    }

    /// Load the corpus named by `config`.
    pub fn from_config(config: &ExperimentConfig) -> Result<Self> {
        Self::load_jsonl(
            config.corpus_path(),
            &config.dataset,
            LabelSet::new(config.corpus.categories.iter().cloned()),
        )
    }

    /// Dataset identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Document texts in file order.
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// Gold label index per document.
    pub fn gold(&self) -> &[usize] {
        &self.gold
    }

    /// Category names; index `i` is label `i`.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Whether there are no documents.
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Documents followed by category names, the order they are embedded in.
    pub fn texts_with_labels(&self) -> Vec<&str> {
        self.texts
            .iter()
            .chain(self.labels.names())
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn labels() -> LabelSet {
        LabelSet::new(["World", "Sports", "Business"])
    }

    #[test]
    fn loads_index_and_name_labels() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"text": "Rebels seize capital", "label": 0}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"text": "Cup final tonight", "label": "Sports"}}"#).unwrap();

        let ds = Dataset::load_jsonl(file.path(), "tiny", labels()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.gold(), &[0, 1]);
        assert_eq!(
            ds.texts_with_labels(),
            vec!["Rebels seize capital", "Cup final tonight", "World", "Sports", "Business"]
        );
    }

    #[test]
    fn unknown_category_names_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"text": "x", "label": "Weather"}}"#).unwrap();
        let err = Dataset::load_jsonl(file.path(), "tiny", labels()).unwrap_err();
        assert!(err.to_string().contains(":1: unknown category 'Weather'"));
    }

    #[test]
    fn out_of_range_index_fails() {
        let err = Dataset::new("d", vec!["a".into()], vec![3], labels()).unwrap_err();
        assert!(matches!(err, FewshotError::Dataset(_)));
    }

    #[test]
    fn empty_corpus_fails() {
        let file = NamedTempFile::new().unwrap();
        assert!(matches!(
            Dataset::load_jsonl(file.path(), "d", labels()),
            Err(FewshotError::EmptyInput("dataset"))
        ));
    }
}
