//! Core types, configuration, and errors for cfgwatch
//!
//! This crate contains the change-record data model, the vendor field map,
//! and the error type shared by the classifier and training crates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

pub mod config;

pub use config::{
    FeatureSettings, InferenceSettings, ModelSettings, PipelineConfig, TrainingSettings,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error types for cfgwatch.
#[derive(thiserror::Error, Debug)]
pub enum CfgWatchError {
    /// The input corpus is missing, unreadable, or malformed.
    #[error("Corpus error: {0}")]
    Corpus(String),

    /// A label could not be derived or looked up.
    #[error("Label error: {0}")]
    Label(String),

    /// Feature extraction or lexical model error.
    #[error("Feature error: {0}")]
    Features(String),

    /// Tensor or model construction error.
    #[error("Model error: {0}")]
    Model(String),

    /// The export artifact is inconsistent or could not be written.
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization / deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias for `std::result::Result<T, CfgWatchError>`.
pub type Result<T> = std::result::Result<T, CfgWatchError>;

// ---------------------------------------------------------------------------
// Change records
// ---------------------------------------------------------------------------

/// Descriptive metadata attached to a captured change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Kind of configuration object, e.g. `address` or `policy`.
    #[serde(default)]
    pub object_type: Option<String>,
    /// Explicit operation, when the capture layer knew it.
    #[serde(default)]
    pub operation: Option<String>,
    /// Device vendor, used for identity-field lookup.
    #[serde(default)]
    pub vendor: Option<String>,
    /// Anything else the capture layer recorded.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Before/after field snapshots of the changed object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordData {
    #[serde(default)]
    pub before: Option<Map<String, Value>>,
    #[serde(default)]
    pub after: Option<Map<String, Value>>,
}

/// One modified field reported by the capture layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldChange {
    #[serde(default)]
    pub field: Option<String>,
    /// Old/new values and other per-change details.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FieldChange {
    /// Create a change entry for a single field name.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            extra: Map::new(),
        }
    }
}

/// A captured configuration change. Immutable input to the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(default)]
    pub metadata: RecordMetadata,
    #[serde(default)]
    pub data: RecordData,
    #[serde(default)]
    pub changes: Vec<FieldChange>,
}

impl ChangeRecord {
    /// The after-state snapshot, if the record carries one.
    pub fn after(&self) -> Option<&Map<String, Value>> {
        self.data.after.as_ref()
    }

    /// The before-state snapshot, if the record carries one.
    pub fn before(&self) -> Option<&Map<String, Value>> {
        self.data.before.as_ref()
    }

    /// Names of changed fields, skipping entries without a usable name.
    pub fn changed_fields(&self) -> impl Iterator<Item = &str> {
        self.changes
            .iter()
            .filter_map(|c| c.field.as_deref())
            .filter(|f| !f.is_empty())
    }
}

/// The training corpus document: `{"samples": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    pub samples: Vec<ChangeRecord>,
}

impl Corpus {
    /// Load a corpus from a JSON file. Fails before any record is processed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CfgWatchError::Corpus(format!("Failed to read corpus {}: {e}", path.display()))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            CfgWatchError::Corpus(format!("Failed to parse corpus {}: {e}", path.display()))
        })
    }

    /// Parse a corpus from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| CfgWatchError::Corpus(format!("Failed to parse corpus: {e}")))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Whether a change created an object or edited an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Edit,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Edit => "EDIT",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = CfgWatchError;

    /// Parse an operation case-insensitively. Anything other than
    /// CREATE or EDIT is a data-quality error.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "EDIT" => Ok(Self::Edit),
            other => Err(CfgWatchError::Label(format!(
                "Unsupported operation '{other}' (expected CREATE or EDIT)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Vendor field map
// ---------------------------------------------------------------------------

/// Per-object-type entry of the vendor field map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectFieldConfig {
    /// Field whose before-value distinguishes creation from editing.
    #[serde(default)]
    pub identity_field: Option<String>,
    /// Normalized field names this object type is expected to carry.
    #[serde(default)]
    pub canonical_fields: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `vendor -> object_type -> config`, supplied by the capture layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap(pub BTreeMap<String, BTreeMap<String, ObjectFieldConfig>>);

impl FieldMap {
    /// Load a field map from JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Load a field map if the file exists; a missing file yields an empty map.
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn object(&self, vendor: &str, object_type: &str) -> Option<&ObjectFieldConfig> {
        self.0.get(vendor).and_then(|objects| objects.get(object_type))
    }

    pub fn identity_field(&self, vendor: &str, object_type: &str) -> Option<&str> {
        self.object(vendor, object_type)
            .and_then(|c| c.identity_field.as_deref())
            .filter(|f| !f.is_empty())
    }

    /// Iterate `(vendor, object_type, config)` in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &ObjectFieldConfig)> {
        self.0.iter().flat_map(|(vendor, objects)| {
            objects
                .iter()
                .map(move |(object_type, cfg)| (vendor.as_str(), object_type.as_str(), cfg))
        })
    }
}

// ---------------------------------------------------------------------------
// Value predicates
// ---------------------------------------------------------------------------

/// True for null, `false`, numeric zero, `[]` and `""`: the values that count
/// as absent in a presence fingerprint and in a blank before-state. Objects,
/// including `{}`, always count as present.
pub fn is_blank_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}

/// General truthiness: null, `false`, zero, `""`, `[]` and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
