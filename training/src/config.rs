//! YAML loading for [`PipelineConfig`].

use cfgwatch_core::PipelineConfig;
use std::path::Path;

/// Load and validate a pipeline configuration from a YAML file.
///
/// Every field is optional; missing fields take their defaults.
pub fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
    let config: PipelineConfig = serde_yaml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;
    Ok(config)
}

/// Confidence threshold for `predict`: the flag if given, else the config
/// file's `inference.min_confidence`, else the default.
pub fn resolve_min_confidence(config: Option<&Path>, flag: Option<f64>) -> anyhow::Result<f64> {
    let threshold = match (flag, config) {
        (Some(v), _) => v,
        (None, Some(path)) => load_config(path)?.inference.min_confidence,
        (None, None) => PipelineConfig::default().inference.min_confidence,
    };
    if !(0.0..=1.0).contains(&threshold) {
        anyhow::bail!("min_confidence must be within [0, 1], got {threshold}");
    }
    Ok(threshold)
}
