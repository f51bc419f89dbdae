//! Feature views for change records.
//!
//! A record becomes three views, all laid out by a frozen [`FeatureKeys`]
//! vocabulary:
//!
//! | View   | Shape                  | Content                                     |
//! |--------|------------------------|---------------------------------------------|
//! | text   | string                 | `key value...` tokens for present keys      |
//! | struct | `[len(feature_keys)]`  | 1 if the after-value is not blank, else 0   |
//! | diff   | `[DIFF_DIM]`           | 1 at `abs(stable_hash(field)) % DIFF_DIM`   |
//!
//! Only the order of `feature_keys` decides token order and axis meaning; the
//! order of keys inside a record's `after` map never does.

use cfgwatch_core::{is_blank_value, ChangeRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::stable_hash::diff_bucket;

/// Width of the hashed diff view. Fixed regardless of vocabulary size.
pub const DIFF_DIM: usize = 200;

/// The canonical key vocabulary: every `after`-state key seen in the
/// training corpus, sorted lexicographically.
///
/// Built once per training run and never mutated afterwards. The struct view
/// has exactly one axis per key, in this order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureKeys(Vec<String>);

impl FeatureKeys {
    /// Collect the sorted union of `after` keys across `records`.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ChangeRecord>) -> Self {
        let keys: BTreeSet<&str> = records
            .into_iter()
            .filter_map(ChangeRecord::after)
            .flat_map(|after| after.keys().map(String::as_str))
            .collect();
        Self(keys.into_iter().map(str::to_string).collect())
    }

    /// Rebuild the vocabulary persisted in an artifact, keeping its order verbatim.
    pub fn from_persisted(keys: Vec<String>) -> Self {
        Self(keys)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|k| k == key)
    }
}

/// The three feature views of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTriple {
    pub text: String,
    pub structure: Vec<f32>,
    pub diff: Vec<f32>,
}

/// Extract all three views from a record.
///
/// A record without `data.after` yields an empty text view and an all-zero
/// struct view; this never fails.
pub fn extract_features(record: &ChangeRecord, keys: &FeatureKeys) -> FeatureTriple {
    let after = record.after();
    FeatureTriple {
        text: text_view(after, keys),
        structure: struct_view(after, keys),
        diff: diff_view(record.changed_fields()),
    }
}

/// Space-joined `key value...` tokens for each vocabulary key present in `after`.
pub fn text_view(after: Option<&Map<String, Value>>, keys: &FeatureKeys) -> String {
    let Some(after) = after else {
        return String::new();
    };

    let mut tokens: Vec<String> = Vec::new();
    for key in keys.iter() {
        let Some(value) = after.get(key) else {
            continue;
        };
        tokens.push(key.to_string());
        match value {
            Value::Array(items) => tokens.extend(items.iter().map(value_token)),
            other => tokens.push(value_token(other)),
        }
    }
    tokens.join(" ")
}

/// Presence fingerprint over the vocabulary.
pub fn struct_view(after: Option<&Map<String, Value>>, keys: &FeatureKeys) -> Vec<f32> {
    keys.iter()
        .map(|key| match after.and_then(|a| a.get(key)) {
            Some(value) if !is_blank_value(value) => 1.0,
            _ => 0.0,
        })
        .collect()
}

/// Hashed bitmap of changed field names. Colliding fields share a bucket.
pub fn diff_view<'a>(changed_fields: impl IntoIterator<Item = &'a str>) -> Vec<f32> {
    let mut bits = vec![0.0_f32; DIFF_DIM];
    for field in changed_fields {
        if field.is_empty() {
            continue;
        }
        bits[diff_bucket(field, DIFF_DIM)] = 1.0;
    }
    bits
}

/// Stringify one value for the text view.
///
/// Strings are verbatim, booleans `True`/`False`, null `None`; numbers and
/// nested structures use their compact JSON form.
pub fn value_token(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

/// Right-pad every row with zeros to the widest row.
///
/// Returns the common width. Rows are never truncated.
pub fn pad_rows(rows: &mut [Vec<f32>]) -> usize {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in rows.iter_mut() {
        row.resize(width, 0.0);
    }
    width
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
