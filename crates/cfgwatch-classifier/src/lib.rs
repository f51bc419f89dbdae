//! Change classification for cfgwatch
//!
//! Turns captured before/after configuration changes into feature views,
//! classifies them with a three-expert fusion network, and defines the
//! portable artifact that carries a trained model to other runtimes.
//!
//! # Modules
//!
//! - [`stable_hash`]: cross-runtime string hash behind the diff view
//! - [`feature_extraction`]: text, struct and diff views over a frozen key vocabulary
//! - [`tfidf`]: lexical model for the text view
//! - [`labels`]: label derivation and the label index
//! - [`expert_classifier`]: candle implementation of the fusion network
//! - [`params`]: plain-data parameters shared by training and inference
//! - [`artifact`]: the export document
//! - [`inference`]: classification straight from an artifact
//! - [`alignment`]: field-map vs. feature-key consistency report

pub mod alignment;
pub mod artifact;
pub mod expert_classifier;
pub mod feature_extraction;
pub mod inference;
pub mod labels;
pub mod params;
pub mod stable_hash;
pub mod tfidf;

pub use alignment::{check_alignment, AlignmentGap, AlignmentReport};
pub use artifact::{ExportArtifact, WEIGHT_LAYOUT};
pub use expert_classifier::{MultiExpertClassifier, DEFAULT_HIDDEN_DIM};
pub use feature_extraction::{extract_features, FeatureKeys, FeatureTriple, DIFF_DIM};
pub use inference::{ArtifactClassifier, Prediction};
pub use labels::{label_distribution, LabelIndex, LabelScheme};
pub use params::{ModelDims, ModelParameters};
pub use stable_hash::{diff_bucket, stable_hash};
pub use tfidf::TfidfVectorizer;
