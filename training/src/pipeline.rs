//! End-to-end operations behind the `train-classifier` subcommands.

use crate::training::export::{build_artifact, write_artifact};
use crate::training::preprocess::{preprocess, PreparedCorpus};
use crate::training::trainer::{train, TrainConfig, TrainingOutcome};
use cfgwatch_classifier::{
    check_alignment, AlignmentReport, ArtifactClassifier, ExportArtifact, FeatureKeys, Prediction,
};
use cfgwatch_core::{CfgWatchError, ChangeRecord, Corpus, FieldMap, PipelineConfig, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

/// Output of one training run.
pub struct TrainingRun {
    pub prepared: PreparedCorpus,
    pub outcome: TrainingOutcome,
    pub artifact: ExportArtifact,
}

/// Preprocess, train and package an in-memory corpus. Nothing is written.
pub fn train_corpus(
    corpus: &Corpus,
    field_map: &FieldMap,
    config: &PipelineConfig,
) -> Result<TrainingRun> {
    config.validate()?;

    let prepared = preprocess(
        corpus,
        field_map,
        &config.default_vendor,
        config.features.max_text_features,
    )?;
    for (label, count) in prepared.label_distribution() {
        info!(label = %label, count, "Label distribution");
    }
    if prepared.label_index.len() == 1 {
        warn!("Only one distinct label in corpus");
    }

    let outcome = train(&TrainConfig::from(config), &prepared)?;
    let artifact = build_artifact(&prepared, outcome.params.clone())?;

    Ok(TrainingRun {
        prepared,
        outcome,
        artifact,
    })
}

/// Full pipeline: load the corpus and field map named by `config`, train,
/// evaluate, and write the artifact to `config.output_path`.
pub fn run(config: &PipelineConfig) -> Result<TrainingRun> {
    info!(path = %config.corpus_path.display(), "Loading corpus");
    let corpus = Corpus::load(&config.corpus_path)?;
    info!(samples = corpus.len(), "Loaded corpus");

    let field_map = match &config.field_map_path {
        Some(path) => FieldMap::load_or_empty(path)?,
        None => FieldMap::default(),
    };

    let run = train_corpus(&corpus, &field_map, config)?;
    write_artifact(&run.artifact, &config.output_path)?;
    Ok(run)
}

/// Write the sorted feature-key vocabulary of a corpus as a pretty JSON array.
pub fn extract_keys(corpus_path: &Path, output: &Path) -> Result<FeatureKeys> {
    let corpus = Corpus::load(corpus_path)?;
    let keys = FeatureKeys::from_records(&corpus.samples);
    std::fs::write(output, serde_json::to_string_pretty(&keys)?)?;
    info!(keys = keys.len(), path = %output.display(), "Extracted feature keys");
    Ok(keys)
}

/// Read feature keys from either a JSON array of strings or an export artifact.
pub fn load_feature_keys(path: &Path) -> Result<FeatureKeys> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        CfgWatchError::Artifact(format!("Failed to read {}: {e}", path.display()))
    })?;
    let value: Value = serde_json::from_str(&contents)?;
    if value.is_array() {
        let keys: Vec<String> = serde_json::from_value(value)?;
        return Ok(FeatureKeys::from_persisted(keys));
    }
    let artifact: ExportArtifact = serde_json::from_value(value)?;
    artifact.validate()?;
    Ok(artifact.feature_keys())
}

/// Compare a field map against a model's feature keys and write the report.
pub fn alignment_report(
    field_map_path: &Path,
    keys_path: &Path,
    output: &Path,
) -> Result<AlignmentReport> {
    let field_map = FieldMap::load(field_map_path)?;
    let keys = load_feature_keys(keys_path)?;
    let report = check_alignment(&field_map, &keys);

    std::fs::write(output, report.to_string())?;
    if report.is_aligned() {
        info!(keys = keys.len(), "Field map is aligned with model keys");
    } else {
        warn!(
            objects = report.gaps.len(),
            path = %output.display(),
            "Field map has canonical fields unknown to the model"
        );
    }
    Ok(report)
}

/// Classify a single record JSON file against an artifact.
pub fn predict(artifact_path: &Path, record_path: &Path) -> Result<Option<Prediction>> {
    let classifier = ArtifactClassifier::new(ExportArtifact::load(artifact_path)?)?;
    let contents = std::fs::read_to_string(record_path).map_err(|e| {
        CfgWatchError::Corpus(format!("Failed to read record {}: {e}", record_path.display()))
    })?;
    let record: ChangeRecord = serde_json::from_str(&contents)?;
    Ok(classifier.classify(&record))
}
