//! Field-map vs. feature-key consistency check.
//!
//! Reports canonical fields that the vendor field map promises for an object
//! type but that the trained model never saw as a feature key. Such fields
//! are invisible to the struct and text views.

use cfgwatch_core::FieldMap;
use std::collections::BTreeSet;

use crate::feature_extraction::FeatureKeys;

/// Canonical fields missing from the model for one `vendor.object_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentGap {
    pub vendor: String,
    pub object_type: String,
    pub missing: Vec<String>,
}

/// Result of [`check_alignment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentReport {
    pub model_key_count: usize,
    pub gaps: Vec<AlignmentGap>,
}

impl AlignmentReport {
    pub fn is_aligned(&self) -> bool {
        self.gaps.is_empty()
    }
}

impl std::fmt::Display for AlignmentReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Model has {} keys.", self.model_key_count)?;
        for gap in &self.gaps {
            write!(
                f,
                "\n[{}.{}] Extra fields (in map, not in model): {}",
                gap.vendor,
                gap.object_type,
                gap.missing.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Compare every object type's canonical fields against the model's keys.
pub fn check_alignment(field_map: &FieldMap, keys: &FeatureKeys) -> AlignmentReport {
    let known: BTreeSet<&str> = keys.iter().collect();
    let gaps = field_map
        .iter()
        .filter_map(|(vendor, object_type, cfg)| {
            let missing: BTreeSet<&str> = cfg
                .canonical_fields
                .iter()
                .map(String::as_str)
                .filter(|f| !known.contains(f))
                .collect();
            (!missing.is_empty()).then(|| AlignmentGap {
                vendor: vendor.to_string(),
                object_type: object_type.to_string(),
                missing: missing.into_iter().map(str::to_string).collect(),
            })
        })
        .collect();

    AlignmentReport {
        model_key_count: known.len(),
        gaps,
    }
}
