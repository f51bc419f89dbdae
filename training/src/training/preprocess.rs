//! Turn a corpus of change records into frozen vocabularies and feature rows.
//!
//! For each record:
//! 1. Build the text, struct and diff views over the corpus-wide feature keys
//! 2. Derive the label (inferring CREATE/EDIT when the record does not say)
//!
//! Then fit the TF-IDF model over all text views, pad struct rows to one
//! width, and index the labels.

use cfgwatch_classifier::feature_extraction::{extract_features, pad_rows, DIFF_DIM};
use cfgwatch_classifier::{
    label_distribution, FeatureKeys, LabelIndex, LabelScheme, TfidfVectorizer,
};
use cfgwatch_core::{CfgWatchError, Corpus, FieldMap, Result};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Feature rows and frozen vocabularies for one training run.
#[derive(Debug, Clone)]
pub struct PreparedCorpus {
    pub feature_keys: FeatureKeys,
    pub vectorizer: TfidfVectorizer,
    pub label_index: LabelIndex,
    pub texts: Vec<String>,
    pub text_vectors: Vec<Vec<f32>>,
    /// Presence rows, padded to `struct_dim`.
    pub structs: Vec<Vec<f32>>,
    pub diffs: Vec<Vec<f32>>,
    pub labels: Vec<String>,
    pub struct_dim: usize,
    pub diff_dim: usize,
}

impl PreparedCorpus {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn text_dim(&self) -> usize {
        self.vectorizer.len()
    }

    /// Records per label, sorted by label.
    pub fn label_distribution(&self) -> BTreeMap<String, usize> {
        label_distribution(&self.labels)
    }

    /// Label index of every record.
    pub fn label_indices(&self) -> Result<Vec<usize>> {
        self.label_index.encode(&self.labels)
    }
}

/// Extract features and labels for the whole corpus.
///
/// # Errors
///
/// Fails if a record declares an operation other than CREATE or EDIT.
pub fn preprocess(
    corpus: &Corpus,
    field_map: &FieldMap,
    default_vendor: &str,
    max_text_features: usize,
) -> Result<PreparedCorpus> {
    let feature_keys = FeatureKeys::from_records(&corpus.samples);
    info!(
        canonical_fields = feature_keys.len(),
        samples = corpus.len(),
        "Identified canonical fields for struct vector"
    );

    let scheme = LabelScheme::new(field_map, default_vendor);
    let mut texts = Vec::with_capacity(corpus.len());
    let mut structs = Vec::with_capacity(corpus.len());
    let mut diffs = Vec::with_capacity(corpus.len());
    let mut labels = Vec::with_capacity(corpus.len());

    for (i, record) in corpus.samples.iter().enumerate() {
        let label = scheme.label_for(record).map_err(|e| match e {
            CfgWatchError::Label(msg) => CfgWatchError::Label(format!("sample {i}: {msg}")),
            other => other,
        })?;
        let triple = extract_features(record, &feature_keys);
        debug!(sample = i, label = %label, "Extracted features");

        texts.push(triple.text);
        structs.push(triple.structure);
        diffs.push(triple.diff);
        labels.push(label);
    }

    let struct_dim = pad_rows(&mut structs).max(feature_keys.len());
    for row in structs.iter_mut() {
        row.resize(struct_dim, 0.0);
    }

    let vectorizer = TfidfVectorizer::fit(&texts, max_text_features);
    let text_vectors = vectorizer.transform_all(&texts);
    info!(vocabulary = vectorizer.len(), "Vectorized text with TF-IDF");

    let label_index = LabelIndex::from_labels(&labels);

    Ok(PreparedCorpus {
        feature_keys,
        vectorizer,
        label_index,
        texts,
        text_vectors,
        structs,
        diffs,
        labels,
        struct_dim,
        diff_dim: DIFF_DIM,
    })
}
