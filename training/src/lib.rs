//! Training pipeline for the cfgwatch change classifier.
//!
//! - [`training`] preprocesses a corpus, trains the multi-expert classifier
//!   and packages the export artifact
//! - [`pipeline`] wires those steps into the operations the
//!   `train-classifier` binary exposes
//! - [`config`] loads the YAML pipeline configuration

pub mod config;
pub mod pipeline;
pub mod training;
