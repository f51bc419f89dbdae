//! Training loop for the multi-expert classifier.
//!
//! Plain supervised training over the whole prepared corpus: Adam, fixed
//! learning rate, fixed batch size and epoch count, reshuffled every epoch.
//! There is no validation split and no early stopping; after the last epoch
//! the model is evaluated on the training set and its parameters are
//! snapshotted for export.

use crate::training::data::{BatchIterator, TrainingDataset};
use crate::training::metrics::{compute_classification_metrics, ClassificationMetrics};
use crate::training::preprocess::PreparedCorpus;
use candle_core::{Device, D};
use candle_nn::{Optimizer, VarMap};
use cfgwatch_classifier::{
    ModelDims, ModelParameters, MultiExpertClassifier, DEFAULT_HIDDEN_DIM,
};
use cfgwatch_core::{CfgWatchError, PipelineConfig, Result};
use tracing::{info, warn};

const PROGRESS_WIDTH: usize = 20;

/// Training configuration.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub lr: f64,
    pub batch_size: usize,
    pub epochs: usize,
    /// Drives parameter initialization and per-epoch shuffling.
    pub seed: u64,
    pub hidden_dim: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            batch_size: 4,
            epochs: 25,
            seed: 42,
            hidden_dim: DEFAULT_HIDDEN_DIM,
        }
    }
}

impl From<&PipelineConfig> for TrainConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            lr: config.training.learning_rate,
            batch_size: config.training.batch_size,
            epochs: config.training.epochs,
            seed: config.training.seed,
            hidden_dim: config.model.hidden_dim,
        }
    }
}

/// Per-epoch metrics logged during training.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    /// Mean batch loss over the epoch.
    pub train_loss: f64,
}

/// Everything a training run produces.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub params: ModelParameters,
    pub dims: ModelDims,
    pub history: Vec<EpochMetrics>,
    /// Training-set evaluation. `None` when no sample was available.
    pub evaluation: Option<ClassificationMetrics>,
}

impl TrainingOutcome {
    pub fn initial_loss(&self) -> Option<f64> {
        self.history.first().map(|m| m.train_loss)
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.history.last().map(|m| m.train_loss)
    }

    /// Relative loss reduction from the first to the last epoch, in percent.
    pub fn improvement_pct(&self) -> Option<f64> {
        let (first, last) = (self.initial_loss()?, self.final_loss()?);
        (first > 0.0).then(|| (first - last) / first * 100.0)
    }
}

/// Dimensions of the classifier trained on `prepared`.
pub fn model_dims(prepared: &PreparedCorpus, hidden_dim: usize) -> ModelDims {
    ModelDims {
        text_dim: prepared.text_dim(),
        struct_dim: prepared.struct_dim,
        diff_dim: prepared.diff_dim,
        hidden_dim,
        num_classes: prepared.label_index.len(),
    }
}

/// Train a classifier on the prepared corpus.
///
/// An empty corpus skips optimization and returns the seeded initial
/// parameters with an empty history.
pub fn train(config: &TrainConfig, prepared: &PreparedCorpus) -> Result<TrainingOutcome> {
    let dims = model_dims(prepared, config.hidden_dim);
    let initial = ModelParameters::initialize(&dims, config.seed);
    info!(
        text_dim = dims.text_dim,
        struct_dim = dims.struct_dim,
        diff_dim = dims.diff_dim,
        hidden_dim = dims.hidden_dim,
        num_classes = dims.num_classes,
        parameters = dims.parameter_count(),
        "Initialized multi-expert classifier"
    );

    if prepared.is_empty() {
        warn!("Corpus has no samples; exporting untrained parameters");
        return Ok(TrainingOutcome {
            params: initial,
            dims,
            history: Vec::new(),
            evaluation: None,
        });
    }
    if dims.num_classes == 1 {
        warn!(
            label = prepared.label_index.labels()[0].as_str(),
            "Corpus has a single label; classifier is trivial"
        );
    }

    let device = Device::Cpu;
    let dataset = TrainingDataset::from_prepared(prepared, &device)?;

    let mut varmap = VarMap::new();
    let model = MultiExpertClassifier::new_trainable(&mut varmap, &initial, dims, &device)?;

    let mut optimizer = candle_nn::AdamW::new(
        varmap.all_vars(),
        candle_nn::ParamsAdamW {
            lr: config.lr,
            weight_decay: 0.0,
            ..Default::default()
        },
    )
    .map_err(|e| CfgWatchError::Model(format!("Failed to create optimizer: {e}")))?;

    info!(
        lr = config.lr,
        batch_size = config.batch_size,
        epochs = config.epochs,
        seed = config.seed,
        samples = dataset.len(),
        "Starting training"
    );

    let mut batch_iter = BatchIterator::new(&dataset, config.batch_size);
    let mut history: Vec<EpochMetrics> = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        batch_iter.reshuffle(config.seed, epoch);

        let mut epoch_loss = 0.0;
        let mut batch_count = 0;

        while let Some(batch) = batch_iter.next_batch()? {
            let logits = model
                .forward_logits(&batch.text, &batch.structure, &batch.diff)
                .map_err(|e| CfgWatchError::Model(format!("Forward pass failed: {e}")))?;

            let loss = candle_nn::loss::cross_entropy(&logits, &batch.labels)
                .map_err(|e| CfgWatchError::Model(format!("Loss computation failed: {e}")))?;

            optimizer
                .backward_step(&loss)
                .map_err(|e| CfgWatchError::Model(format!("Backward step failed: {e}")))?;

            let loss_val = loss
                .to_scalar::<f32>()
                .map_err(|e| CfgWatchError::Model(format!("Loss scalar failed: {e}")))?
                as f64;
            epoch_loss += loss_val;
            batch_count += 1;
        }

        let avg_loss = if batch_count > 0 {
            epoch_loss / batch_count as f64
        } else {
            0.0
        };

        let reference = history.first().map_or(avg_loss, |m| m.train_loss);
        info!(
            "epoch {:3}/{} | loss={:.4} | {}",
            epoch + 1,
            config.epochs,
            avg_loss,
            progress_bar(avg_loss, reference),
        );

        history.push(EpochMetrics {
            epoch: epoch + 1,
            train_loss: avg_loss,
        });
    }

    let evaluation = evaluate(&model, &dataset, prepared.label_index.labels())?;
    info!("Training-set evaluation: {evaluation}");

    let outcome = TrainingOutcome {
        params: model.parameters()?,
        dims,
        history,
        evaluation: Some(evaluation),
    };
    if let (Some(first), Some(last)) = (outcome.initial_loss(), outcome.final_loss()) {
        info!(
            initial_loss = first,
            final_loss = last,
            improvement_pct = outcome.improvement_pct().unwrap_or(0.0),
            "Training complete"
        );
    }

    Ok(outcome)
}

/// Bar proportional to `loss / reference`, capped at [`PROGRESS_WIDTH`].
fn progress_bar(loss: f64, reference: f64) -> String {
    let len = if reference > 0.0 {
        ((loss / reference) * PROGRESS_WIDTH as f64).round() as usize
    } else {
        0
    };
    "█".repeat(len.min(PROGRESS_WIDTH))
}

fn evaluate(
    model: &MultiExpertClassifier,
    dataset: &TrainingDataset,
    label_names: &[String],
) -> Result<ClassificationMetrics> {
    let logits = model
        .forward_logits(&dataset.text, &dataset.structure, &dataset.diff)
        .map_err(|e| CfgWatchError::Model(format!("Evaluation forward failed: {e}")))?;

    let preds: Vec<u32> = logits
        .argmax(D::Minus1)
        .and_then(|t| t.to_vec1())
        .map_err(|e| CfgWatchError::Model(format!("argmax failed: {e}")))?;
    let labels = dataset.label_vec()?;

    let preds: Vec<usize> = preds.into_iter().map(|p| p as usize).collect();
    let labels: Vec<usize> = labels.into_iter().map(|l| l as usize).collect();
    Ok(compute_classification_metrics(&preds, &labels, label_names))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_config_default() {
        let cfg = TrainConfig::default();
        assert!((cfg.lr - 1e-3).abs() < 1e-12);
        assert_eq!(cfg.batch_size, 4);
        assert_eq!(cfg.epochs, 25);
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.hidden_dim, 128);
    }

    #[test]
    fn test_train_config_from_pipeline() {
        let mut pipeline = PipelineConfig::default();
        pipeline.training.epochs = 3;
        pipeline.training.seed = 9;
        pipeline.model.hidden_dim = 16;
        let cfg = TrainConfig::from(&pipeline);
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.seed, 9);
        assert_eq!(cfg.hidden_dim, 16);
    }

    #[test]
    fn test_progress_bar_scales() {
        assert_eq!(progress_bar(1.0, 1.0).chars().count(), PROGRESS_WIDTH);
        assert_eq!(progress_bar(0.5, 1.0).chars().count(), PROGRESS_WIDTH / 2);
        assert_eq!(progress_bar(3.0, 1.0).chars().count(), PROGRESS_WIDTH);
        assert!(progress_bar(0.0, 0.0).is_empty());
    }

    #[test]
    fn test_improvement_pct() {
        let dims = ModelDims {
            text_dim: 1,
            struct_dim: 1,
            diff_dim: 200,
            hidden_dim: 2,
            num_classes: 2,
        };
        let outcome = TrainingOutcome {
            params: ModelParameters::initialize(&dims, 1),
            dims,
            history: vec![
                EpochMetrics { epoch: 1, train_loss: 0.8 },
                EpochMetrics { epoch: 2, train_loss: 0.2 },
            ],
            evaluation: None,
        };
        assert!((outcome.improvement_pct().unwrap() - 75.0).abs() < 1e-9);
    }
}
