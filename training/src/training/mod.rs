//! Classifier training pipeline.
//!
//! Preprocesses a corpus of change records into the three feature views,
//! trains the multi-expert classifier (text, struct and diff experts fused by
//! one linear layer), evaluates it on the training set, and writes the export
//! artifact.

pub mod data;
pub mod export;
pub mod metrics;
pub mod preprocess;
pub mod trainer;
