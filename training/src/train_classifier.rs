//! CLI entry point for the change-classifier pipeline.
//!
//! Subcommands:
//!   train            -- Preprocess a corpus, train the classifier, export the artifact
//!   keys             -- Extract the feature-key vocabulary from a corpus
//!   check-alignment  -- Report field-map canonical fields unknown to a model
//!   predict          -- Classify one change record with an exported artifact

use anyhow::Context;
use cfgwatch_core::PipelineConfig;
use cfgwatch_training::config::{load_config, resolve_min_confidence};
use cfgwatch_training::pipeline;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "train-classifier", about = "Configuration-change classifier pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train the multi-expert classifier and write the export artifact.
    Train {
        /// YAML pipeline configuration. Flags below override it.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to the training corpus (JSON with a `samples` array).
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Vendor field map used for CREATE/EDIT inference.
        #[arg(long)]
        field_map: Option<PathBuf>,

        /// Output path for the export artifact.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Learning rate.
        #[arg(long)]
        lr: Option<f64>,

        /// Mini-batch size.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Training epochs.
        #[arg(long)]
        epochs: Option<usize>,

        /// Random seed for initialization and shuffling.
        #[arg(long)]
        seed: Option<u64>,

        /// Width of each expert's hidden representation.
        #[arg(long)]
        hidden_dim: Option<usize>,

        /// Maximum TF-IDF vocabulary size.
        #[arg(long)]
        max_text_features: Option<usize>,
    },

    /// Write the sorted feature-key vocabulary of a corpus.
    Keys {
        #[arg(long, default_value = "data.json")]
        corpus: PathBuf,

        #[arg(long, default_value = "extracted_keys.json")]
        output: PathBuf,
    },

    /// Compare a vendor field map against a model's feature keys.
    CheckAlignment {
        #[arg(long, default_value = "vendor_field_map.json")]
        field_map: PathBuf,

        /// Keys JSON array or export artifact.
        #[arg(long, default_value = "extracted_keys.json")]
        keys: PathBuf,

        #[arg(long, default_value = "alignment_report.txt")]
        output: PathBuf,
    },

    /// Classify a single change record.
    Predict {
        #[arg(long, default_value = "model_data.json")]
        artifact: PathBuf,

        /// JSON file holding one change record.
        #[arg(long)]
        record: PathBuf,

        /// YAML pipeline configuration supplying `inference.min_confidence`.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Minimum confidence for a prediction to be actionable. Overrides the config.
        #[arg(long)]
        min_confidence: Option<f64>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Train {
            config,
            corpus,
            field_map,
            output,
            lr,
            batch_size,
            epochs,
            seed,
            hidden_dim,
            max_text_features,
        } => {
            let mut cfg = match config {
                Some(path) => load_config(&path)?,
                None => PipelineConfig::default(),
            };
            if let Some(v) = corpus {
                cfg.corpus_path = v;
            }
            if field_map.is_some() {
                cfg.field_map_path = field_map;
            }
            if let Some(v) = output {
                cfg.output_path = v;
            }
            if let Some(v) = lr {
                cfg.training.learning_rate = v;
            }
            if let Some(v) = batch_size {
                cfg.training.batch_size = v;
            }
            if let Some(v) = epochs {
                cfg.training.epochs = v;
            }
            if let Some(v) = seed {
                cfg.training.seed = v;
            }
            if let Some(v) = hidden_dim {
                cfg.model.hidden_dim = v;
            }
            if let Some(v) = max_text_features {
                cfg.features.max_text_features = v;
            }

            let run = pipeline::run(&cfg).context("Training pipeline failed")?;
            if let Some(eval) = &run.outcome.evaluation {
                println!("\n{eval}");
            }
            println!("Model saved to: {}", cfg.output_path.display());
        }

        Command::Keys { corpus, output } => {
            let keys = pipeline::extract_keys(&corpus, &output)?;
            println!("Extracted {} keys to {}", keys.len(), output.display());
        }

        Command::CheckAlignment {
            field_map,
            keys,
            output,
        } => {
            let report = pipeline::alignment_report(&field_map, &keys, &output)?;
            println!("{report}");
            println!("Report written to {}", output.display());
        }

        Command::Predict {
            artifact,
            record,
            config,
            min_confidence,
        } => {
            let min_confidence = resolve_min_confidence(config.as_deref(), min_confidence)?;
            match pipeline::predict(&artifact, &record)? {
                Some(pred) => {
                    let verdict = if pred.is_actionable(min_confidence) {
                        "actionable"
                    } else {
                        "below threshold"
                    };
                    println!(
                        "{} (confidence={:.4}, {verdict})",
                        pred.label, pred.confidence
                    );
                }
                None => println!("Artifact has no labels; nothing to predict"),
            }
        }
    }
    Ok(())
}
