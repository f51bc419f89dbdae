//! Reference inference over an export artifact.
//!
//! [`ArtifactClassifier`] uses nothing but the artifact: the persisted
//! feature keys, TF-IDF vocabulary and weights, and a plain `f32` forward
//! pass. It is what a detection layer calls to turn a captured change into a
//! label and a confidence score.

use cfgwatch_core::{ChangeRecord, Result};
use serde::Serialize;
use tracing::debug;

use crate::artifact::ExportArtifact;
use crate::feature_extraction::{extract_features, FeatureKeys};
use crate::labels::LabelIndex;
use crate::params::{softmax, ModelDims, ModelParameters};
use crate::tfidf::TfidfVectorizer;

/// A classified change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    pub label_index: usize,
    /// Softmax probability of `label`.
    pub confidence: f32,
    /// Probability per label index.
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Whether the prediction clears the notification threshold.
    pub fn is_actionable(&self, min_confidence: f64) -> bool {
        f64::from(self.confidence) >= min_confidence
    }
}

/// Dependency-light classifier rebuilt from an [`ExportArtifact`].
#[derive(Debug, Clone)]
pub struct ArtifactClassifier {
    keys: FeatureKeys,
    vectorizer: TfidfVectorizer,
    params: ModelParameters,
    labels: LabelIndex,
    dims: ModelDims,
}

impl ArtifactClassifier {
    /// Validate the artifact and take ownership of its parts.
    pub fn new(artifact: ExportArtifact) -> Result<Self> {
        artifact.validate()?;
        let dims = artifact.dims();
        debug!(
            labels = dims.num_classes,
            vocabulary = dims.text_dim,
            struct_dim = dims.struct_dim,
            "Loaded artifact classifier"
        );
        Ok(Self {
            keys: artifact.feature_keys(),
            vectorizer: artifact.vectorizer()?,
            labels: artifact.label_index()?,
            dims,
            params: artifact.model,
        })
    }

    /// Label probabilities for one record.
    pub fn probabilities(&self, record: &ChangeRecord) -> Vec<f32> {
        let triple = extract_features(record, &self.keys);
        let text = self.vectorizer.transform(&triple.text);
        let mut structure = triple.structure;
        // Persisted struct_dim may exceed the key count; pad, never truncate.
        structure.resize(self.dims.struct_dim.max(structure.len()), 0.0);
        softmax(&self.params.logits(&text, &structure, &triple.diff))
    }

    /// Most probable label, or `None` when the artifact has no labels.
    pub fn classify(&self, record: &ChangeRecord) -> Option<Prediction> {
        let probabilities = self.probabilities(record);
        let (label_index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((i, p)),
            })?;
        let label = self.labels.label(label_index)?.to_string();
        Some(Prediction {
            label,
            label_index,
            confidence,
            probabilities,
        })
    }

    pub fn labels(&self) -> &LabelIndex {
        &self.labels
    }

    pub fn feature_keys(&self) -> &FeatureKeys {
        &self.keys
    }

    pub fn dims(&self) -> &ModelDims {
        &self.dims
    }
}
