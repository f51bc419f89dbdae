//! Portable export artifact.
//!
//! A single JSON document holding everything an independent inference engine
//! needs: the feature-key vocabulary, the TF-IDF vocabulary and weights, the
//! learned parameters, and the label table. Nothing in it refers back to the
//! training run.
//!
//! ```text
//! {
//!   "tfidf":    { "vocab": [..], "idf": [..] },
//!   "model":    { "txt_mlp":    { "l1_weight", "l1_bias", "l2_weight", "l2_bias" },
//!                 "struct_mlp": { .. }, "diff_mlp": { .. },
//!                 "fc":         { "weight", "bias" } },
//!   "metadata": { "labels": { "0": "ADDRESS CREATE", .. },
//!                 "struct_dim", "diff_dim", "feature_keys",
//!                 "hidden_dim", "weight_layout" }
//! }
//! ```
//!
//! Every weight matrix is `[out_features][in_features]`; see
//! [`WEIGHT_LAYOUT`].

use cfgwatch_core::{CfgWatchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::feature_extraction::{FeatureKeys, DIFF_DIM};
use crate::labels::LabelIndex;
use crate::params::{ModelDims, ModelParameters};
use crate::tfidf::TfidfVectorizer;

/// Matrix convention written into every artifact.
pub const WEIGHT_LAYOUT: &str = "row-major [out_features][in_features]; y = W x + b";

/// Lexical model section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfSection {
    pub vocab: Vec<String>,
    pub idf: Vec<f64>,
}

impl From<&TfidfVectorizer> for TfidfSection {
    fn from(v: &TfidfVectorizer) -> Self {
        Self {
            vocab: v.vocabulary().to_vec(),
            idf: v.idf().to_vec(),
        }
    }
}

/// Label and feature-layout metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// `index -> label`.
    pub labels: BTreeMap<usize, String>,
    pub struct_dim: usize,
    pub diff_dim: usize,
    pub feature_keys: Vec<String>,
    /// Expert width. Older artifacts omit it; it is then read off the weights.
    #[serde(default)]
    pub hidden_dim: Option<usize>,
    #[serde(default = "default_weight_layout")]
    pub weight_layout: String,
}

fn default_weight_layout() -> String {
    WEIGHT_LAYOUT.to_string()
}

/// The complete, immutable result of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub tfidf: TfidfSection,
    pub model: ModelParameters,
    pub metadata: ArtifactMetadata,
}

impl ExportArtifact {
    /// Assemble and validate an artifact from frozen training state.
    pub fn new(
        vectorizer: &TfidfVectorizer,
        params: ModelParameters,
        labels: &LabelIndex,
        feature_keys: &FeatureKeys,
        struct_dim: usize,
    ) -> Result<Self> {
        let artifact = Self {
            tfidf: TfidfSection::from(vectorizer),
            metadata: ArtifactMetadata {
                labels: labels.to_inverted(),
                struct_dim,
                diff_dim: DIFF_DIM,
                feature_keys: feature_keys.as_slice().to_vec(),
                hidden_dim: Some(params.txt_mlp.l1_bias.len()),
                weight_layout: WEIGHT_LAYOUT.to_string(),
            },
            model: params,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Classifier dimensions implied by the artifact.
    pub fn dims(&self) -> ModelDims {
        ModelDims {
            text_dim: self.tfidf.vocab.len(),
            struct_dim: self.metadata.struct_dim,
            diff_dim: self.metadata.diff_dim,
            hidden_dim: self
                .metadata
                .hidden_dim
                .unwrap_or(self.model.txt_mlp.l1_bias.len()),
            num_classes: self.metadata.labels.len(),
        }
    }

    /// Check every cross-section invariant.
    ///
    /// Vocabulary, IDF and text-expert widths agree; `struct_dim` matches the
    /// struct expert and covers every feature key; `diff_dim` is 200; labels
    /// are densely indexed and match the fusion layer's outputs; the weight
    /// layout is the one this crate writes.
    pub fn validate(&self) -> Result<()> {
        if self.tfidf.vocab.len() != self.tfidf.idf.len() {
            return Err(CfgWatchError::Artifact(format!(
                "tfidf.vocab has {} terms but tfidf.idf has {} weights",
                self.tfidf.vocab.len(),
                self.tfidf.idf.len()
            )));
        }
        if self.metadata.diff_dim != DIFF_DIM {
            return Err(CfgWatchError::Artifact(format!(
                "metadata.diff_dim is {}, expected {DIFF_DIM}",
                self.metadata.diff_dim
            )));
        }
        if self.metadata.struct_dim < self.metadata.feature_keys.len() {
            return Err(CfgWatchError::Artifact(format!(
                "metadata.struct_dim {} is smaller than the {} feature keys",
                self.metadata.struct_dim,
                self.metadata.feature_keys.len()
            )));
        }
        if self.metadata.weight_layout != WEIGHT_LAYOUT {
            return Err(CfgWatchError::Artifact(format!(
                "Unsupported weight layout '{}'",
                self.metadata.weight_layout
            )));
        }
        LabelIndex::from_inverted(&self.metadata.labels)
            .map_err(|e| CfgWatchError::Artifact(e.to_string()))?;
        self.model
            .check_dims(&self.dims())
            .map_err(|e| CfgWatchError::Artifact(e.to_string()))
    }

    pub fn label_index(&self) -> Result<LabelIndex> {
        LabelIndex::from_inverted(&self.metadata.labels)
    }

    pub fn feature_keys(&self) -> FeatureKeys {
        FeatureKeys::from_persisted(self.metadata.feature_keys.clone())
    }

    pub fn vectorizer(&self) -> Result<TfidfVectorizer> {
        TfidfVectorizer::from_parts(self.tfidf.vocab.clone(), self.tfidf.idf.clone())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Write the artifact, creating parent directories. Returns bytes written.
    pub fn write(&self, path: &Path) -> Result<usize> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = self.to_json()?;
        std::fs::write(path, &json).map_err(|e| {
            CfgWatchError::Artifact(format!("Failed to write {}: {e}", path.display()))
        })?;
        Ok(json.len())
    }

    /// Read and validate an artifact.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CfgWatchError::Artifact(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: Self = serde_json::from_str(json)?;
        artifact.validate()?;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn artifact() -> ExportArtifact {
        let vectorizer = TfidfVectorizer::fit(&["name obj1 status enable", "name obj1"], 2000);
        let keys = FeatureKeys::from_persisted(vec!["name".into(), "status".into()]);
        let labels = LabelIndex::from_labels(["ADDRESS EDIT", "ADDRESS CREATE"]);
        let dims = ModelDims {
            text_dim: vectorizer.len(),
            struct_dim: keys.len(),
            diff_dim: DIFF_DIM,
            hidden_dim: 4,
            num_classes: labels.len(),
        };
        let params = ModelParameters::initialize(&dims, 11);
        ExportArtifact::new(&vectorizer, params, &labels, &keys, keys.len()).unwrap()
    }

    #[test]
    fn test_dimensions_agree() {
        let a = artifact();
        assert_eq!(a.tfidf.vocab.len(), a.tfidf.idf.len());
        assert_eq!(a.tfidf.vocab.len(), a.model.txt_mlp.l1_weight[0].len());
        assert_eq!(a.metadata.struct_dim, a.model.struct_mlp.l1_weight[0].len());
        assert_eq!(a.metadata.diff_dim, 200);
        assert_eq!(a.metadata.hidden_dim, Some(4));
    }

    #[test]
    fn test_json_layout() {
        let a = artifact();
        let value: Value = serde_json::from_str(&a.to_json().unwrap()).unwrap();
        assert!(value["tfidf"]["vocab"].is_array());
        assert!(value["model"]["txt_mlp"]["l1_weight"].is_array());
        assert!(value["model"]["fc"]["bias"].is_array());
        assert_eq!(value["metadata"]["labels"]["0"], "ADDRESS CREATE");
        assert_eq!(value["metadata"]["labels"]["1"], "ADDRESS EDIT");
        assert_eq!(value["metadata"]["diff_dim"], 200);
        assert_eq!(value["metadata"]["weight_layout"], WEIGHT_LAYOUT);
    }

    #[test]
    fn test_write_and_load() {
        let a = artifact();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("model_data.json");
        let bytes = a.write(&path).unwrap();
        assert!(bytes > 0);
        let loaded = ExportArtifact::load(&path).unwrap();
        assert_eq!(loaded.metadata, a.metadata);
        assert_eq!(loaded.tfidf, a.tfidf);
        assert_eq!(loaded.dims(), a.dims());
    }

    #[test]
    fn test_rejects_idf_mismatch() {
        let mut a = artifact();
        a.tfidf.idf.pop();
        assert!(matches!(a.validate(), Err(CfgWatchError::Artifact(_))));
    }

    #[test]
    fn test_rejects_wrong_diff_dim() {
        let mut a = artifact();
        a.metadata.diff_dim = 128;
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_rejects_transposed_weights() {
        let mut a = artifact();
        let w = &a.model.struct_mlp.l1_weight;
        let transposed: Vec<Vec<f32>> = (0..w[0].len())
            .map(|c| w.iter().map(|row| row[c]).collect())
            .collect();
        a.model.struct_mlp.l1_weight = transposed;
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_rejects_label_gap() {
        let mut a = artifact();
        let label = a.metadata.labels.remove(&1).unwrap();
        a.metadata.labels.insert(2, label);
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_missing_optional_metadata_defaults() {
        let a = artifact();
        let mut value: Value = serde_json::from_str(&a.to_json().unwrap()).unwrap();
        let meta = value["metadata"].as_object_mut().unwrap();
        meta.remove("hidden_dim");
        meta.remove("weight_layout");
        let loaded = ExportArtifact::from_json(&value.to_string()).unwrap();
        assert_eq!(loaded.dims().hidden_dim, 4);
    }
}
