//! Assemble and write the export artifact.

use crate::training::preprocess::PreparedCorpus;
use cfgwatch_classifier::{ExportArtifact, ModelParameters};
use cfgwatch_core::Result;
use std::path::Path;
use tracing::info;

/// Bundle the frozen vocabularies of `prepared` with trained parameters.
pub fn build_artifact(
    prepared: &PreparedCorpus,
    params: ModelParameters,
) -> Result<ExportArtifact> {
    ExportArtifact::new(
        &prepared.vectorizer,
        params,
        &prepared.label_index,
        &prepared.feature_keys,
        prepared.struct_dim,
    )
}

/// Write `artifact` to `path` and log its size.
pub fn write_artifact(artifact: &ExportArtifact, path: &Path) -> Result<usize> {
    let bytes = artifact.write(path)?;
    info!(
        path = %path.display(),
        size_kb = %format!("{:.1}", bytes as f64 / 1024.0),
        labels = artifact.metadata.labels.len(),
        "Exported model artifact"
    );
    Ok(bytes)
}
