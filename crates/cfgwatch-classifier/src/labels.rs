//! Class labels: `"<OBJECT_TYPE> <OPERATION>"`.
//!
//! The label index is built from the sorted set of labels seen in the
//! training corpus. Indices are therefore stable across retraining on the
//! same corpus but shift when a corpus gains or loses a label.

use cfgwatch_core::{
    is_blank_value, is_truthy, CfgWatchError, ChangeRecord, FieldMap, Operation, Result,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Object type used when a record does not declare one.
pub const UNKNOWN_OBJECT_TYPE: &str = "unknown";

/// Derives labels for records, inferring the operation when it is absent.
#[derive(Debug, Clone)]
pub struct LabelScheme<'a> {
    field_map: &'a FieldMap,
    default_vendor: &'a str,
}

impl<'a> LabelScheme<'a> {
    pub fn new(field_map: &'a FieldMap, default_vendor: &'a str) -> Self {
        Self {
            field_map,
            default_vendor,
        }
    }

    /// Label string for one record.
    ///
    /// # Errors
    ///
    /// Returns [`CfgWatchError::Label`] when the record declares an operation
    /// other than CREATE or EDIT.
    pub fn label_for(&self, record: &ChangeRecord) -> Result<String> {
        let object_type = record
            .metadata
            .object_type
            .as_deref()
            .unwrap_or(UNKNOWN_OBJECT_TYPE)
            .to_uppercase();
        let operation = self.operation_for(record)?;
        Ok(format!("{object_type} {operation}"))
    }

    /// Declared operation, or the inferred one when none (or an empty one) is given.
    pub fn operation_for(&self, record: &ChangeRecord) -> Result<Operation> {
        match record.metadata.operation.as_deref() {
            Some(op) if !op.is_empty() => op.parse(),
            _ => Ok(self.infer_operation(record)),
        }
    }

    /// Infer CREATE vs EDIT from the before-state.
    ///
    /// When the field map names an identity field and the before-state has
    /// it, that field alone decides. Otherwise an empty (or all-empty)
    /// before-state means CREATE.
    pub fn infer_operation(&self, record: &ChangeRecord) -> Operation {
        let vendor = record
            .metadata
            .vendor
            .as_deref()
            .unwrap_or(self.default_vendor);
        let object_type = record.metadata.object_type.as_deref().unwrap_or("");
        let before = record.before();

        if let Some(identity) = self.field_map.identity_field(vendor, object_type) {
            if let Some(value) = before.and_then(|b| b.get(identity)) {
                return if is_truthy(value) {
                    Operation::Edit
                } else {
                    Operation::Create
                };
            }
        }

        if before_is_blank(before) {
            Operation::Create
        } else {
            Operation::Edit
        }
    }
}

fn before_is_blank(before: Option<&Map<String, Value>>) -> bool {
    before.map_or(true, |b| b.values().all(is_blank_value))
}

/// Bijective label <-> index table, frozen after training.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelIndex {
    labels: Vec<String>,
}

impl LabelIndex {
    /// Build from observed labels: distinct values, sorted, densely indexed.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let distinct: BTreeSet<String> = labels
            .into_iter()
            .map(|l| l.as_ref().to_string())
            .collect();
        Self {
            labels: distinct.into_iter().collect(),
        }
    }

    /// Rebuild from a persisted `index -> label` table.
    ///
    /// # Errors
    ///
    /// Fails if indices are not exactly `0..n` or a label repeats.
    pub fn from_inverted(table: &BTreeMap<usize, String>) -> Result<Self> {
        let mut labels = Vec::with_capacity(table.len());
        for (expected, (index, label)) in table.iter().enumerate() {
            if *index != expected {
                return Err(CfgWatchError::Label(format!(
                    "Label indices are not dense: expected {expected}, found {index}"
                )));
            }
            labels.push(label.clone());
        }
        let distinct: BTreeSet<&String> = labels.iter().collect();
        if distinct.len() != labels.len() {
            return Err(CfgWatchError::Label(
                "Label table maps two indices to the same label".to_string(),
            ));
        }
        Ok(Self { labels })
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.binary_search_by(|l| l.as_str().cmp(label)).ok()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// `label -> index`, the training-time view.
    pub fn to_index_map(&self) -> BTreeMap<String, usize> {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i))
            .collect()
    }

    /// `index -> label`, the form persisted in the artifact.
    pub fn to_inverted(&self) -> BTreeMap<usize, String> {
        self.labels.iter().cloned().enumerate().collect()
    }

    /// Index every label, failing on one that is not in the table.
    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|l| {
                self.index_of(l.as_ref()).ok_or_else(|| {
                    CfgWatchError::Label(format!("Unknown label '{}'", l.as_ref()))
                })
            })
            .collect()
    }
}

/// Count of records per label, sorted by label.
pub fn label_distribution<S: AsRef<str>>(labels: &[S]) -> BTreeMap<String, usize> {
    let mut dist = BTreeMap::new();
    for label in labels {
        *dist.entry(label.as_ref().to_string()).or_insert(0) += 1;
    }
    dist
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
