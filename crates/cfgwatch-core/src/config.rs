//! Pipeline configuration.
//!
//! Every field has a default so a partial YAML document (or none at all) is
//! a valid configuration.

use crate::{CfgWatchError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Corpus document with a `samples` array.
    pub corpus_path: PathBuf,
    /// Vendor field map used for operation inference. Optional.
    pub field_map_path: Option<PathBuf>,
    /// Where the export artifact is written.
    pub output_path: PathBuf,
    /// Vendor assumed for records that do not name one.
    pub default_vendor: String,
    pub features: FeatureSettings,
    pub model: ModelSettings,
    pub training: TrainingSettings,
    pub inference: InferenceSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from("data.json"),
            field_map_path: None,
            output_path: PathBuf::from("model_data.json"),
            default_vendor: "fortigate".to_string(),
            features: FeatureSettings::default(),
            model: ModelSettings::default(),
            training: TrainingSettings::default(),
            inference: InferenceSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject values that would make training meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.features.max_text_features == 0 {
            return Err(CfgWatchError::Config(
                "features.max_text_features must be greater than 0".to_string(),
            ));
        }
        if self.model.hidden_dim == 0 {
            return Err(CfgWatchError::Config(
                "model.hidden_dim must be greater than 0".to_string(),
            ));
        }
        if self.training.batch_size == 0 {
            return Err(CfgWatchError::Config(
                "training.batch_size must be greater than 0".to_string(),
            ));
        }
        if !(self.training.learning_rate.is_finite() && self.training.learning_rate > 0.0) {
            return Err(CfgWatchError::Config(format!(
                "training.learning_rate must be a positive number, got {}",
                self.training.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.inference.min_confidence) {
            return Err(CfgWatchError::Config(format!(
                "inference.min_confidence must be within [0, 1], got {}",
                self.inference.min_confidence
            )));
        }
        Ok(())
    }
}

/// Feature extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    /// Cap on the TF-IDF vocabulary.
    pub max_text_features: usize,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            max_text_features: 2000,
        }
    }
}

/// Classifier shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Width each expert projects its view into.
    pub hidden_dim: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { hidden_dim: 128 }
    }
}

/// Optimizer and loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    /// Seeds parameter initialization and per-epoch shuffling.
    pub seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            batch_size: 4,
            epochs: 25,
            seed: 42,
        }
    }
}

/// Settings for consumers of a trained artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// Predictions below this confidence are not forwarded for notification.
    pub min_confidence: f64,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            min_confidence: 0.4,
        }
    }
}
