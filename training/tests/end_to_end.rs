//! End-to-end training scenarios over small in-memory corpora.

use candle_core::Device;
use cfgwatch_classifier::{ArtifactClassifier, ExportArtifact, MultiExpertClassifier, DIFF_DIM};
use cfgwatch_core::{ChangeRecord, Corpus, FieldMap, PipelineConfig};
use cfgwatch_training::pipeline::{self, train_corpus};
use serde_json::json;

fn two_address_samples() -> Corpus {
    serde_json::from_value(json!({"samples": [
        {
            "metadata": {"object_type": "address"},
            "data": {"before": {}, "after": {"name": "obj1", "status": "enable"}},
            "changes": [{"field": "name"}]
        },
        {
            "metadata": {"object_type": "address"},
            "data": {
                "before": {"name": "obj1", "status": "enable"},
                "after": {"name": "obj1", "status": "disable"}
            },
            "changes": [{"field": "status"}]
        }
    ]}))
    .unwrap()
}

fn mixed_corpus() -> Corpus {
    let mut samples = Vec::new();
    for i in 0..6 {
        samples.push(json!({
            "metadata": {"object_type": "address", "vendor": "fortigate"},
            "data": {"before": {}, "after": {"name": format!("net{i}"), "subnet": "10.0.0.0/24"}},
            "changes": [{"field": "name"}, {"field": "subnet"}]
        }));
        samples.push(json!({
            "metadata": {"object_type": "policy", "vendor": "fortigate", "operation": "edit"},
            "data": {
                "before": {"policyid": i, "action": "deny"},
                "after": {"policyid": i, "action": "accept", "srcintf": "port1"}
            },
            "changes": [{"field": "action"}]
        }));
    }
    serde_json::from_value(json!({ "samples": samples })).unwrap()
}

fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.model.hidden_dim = 16;
    config
}

#[test]
fn test_two_sample_scenario_learns() {
    let config = PipelineConfig::default();
    let run = train_corpus(&two_address_samples(), &FieldMap::default(), &config).unwrap();

    let index = run.prepared.label_index.to_index_map();
    assert_eq!(index.len(), 2);
    assert_eq!(index["ADDRESS CREATE"], 0);
    assert_eq!(index["ADDRESS EDIT"], 1);

    let history = &run.outcome.history;
    assert_eq!(history.len(), 25);
    assert!(history[24].train_loss < history[0].train_loss);

    let eval = run.outcome.evaluation.as_ref().unwrap();
    assert_eq!(eval.total, 2);
}

#[test]
fn test_artifact_dimensions_agree() {
    let run = train_corpus(&mixed_corpus(), &FieldMap::default(), &small_config()).unwrap();
    let a = &run.artifact;

    assert_eq!(a.tfidf.vocab.len(), a.tfidf.idf.len());
    assert_eq!(a.tfidf.vocab.len(), a.model.txt_mlp.l1_weight[0].len());
    assert_eq!(a.metadata.struct_dim, a.model.struct_mlp.l1_weight[0].len());
    assert_eq!(a.metadata.diff_dim, DIFF_DIM);
    assert_eq!(a.model.diff_mlp.l1_weight[0].len(), DIFF_DIM);
    assert_eq!(a.model.fc.bias.len(), a.metadata.labels.len());
    assert_eq!(
        a.metadata.feature_keys,
        vec!["action", "name", "policyid", "srcintf", "subnet"]
    );

    let labels: Vec<&str> = a.metadata.labels.values().map(String::as_str).collect();
    assert_eq!(labels, vec!["ADDRESS CREATE", "POLICY EDIT"]);
}

#[test]
fn test_same_seed_same_artifact() {
    let config = small_config();
    let a = train_corpus(&mixed_corpus(), &FieldMap::default(), &config).unwrap();
    let b = train_corpus(&mixed_corpus(), &FieldMap::default(), &config).unwrap();
    assert_eq!(a.artifact.to_json().unwrap(), b.artifact.to_json().unwrap());

    let mut other = small_config();
    other.training.seed = 7;
    let c = train_corpus(&mixed_corpus(), &FieldMap::default(), &other).unwrap();
    assert_ne!(a.artifact.model, c.artifact.model);
}

#[test]
fn test_artifact_classifier_matches_candle_model() {
    let run = train_corpus(&mixed_corpus(), &FieldMap::default(), &small_config()).unwrap();
    let artifact = run.artifact.clone();
    let dims = artifact.dims();
    let candle_model =
        MultiExpertClassifier::from_parameters(&artifact.model, dims, &Device::Cpu).unwrap();
    let classifier = ArtifactClassifier::new(artifact).unwrap();

    let corpus = mixed_corpus();
    for (i, record) in corpus.samples.iter().enumerate() {
        let expected = candle_model
            .predict_proba(
                &run.prepared.text_vectors[i],
                &run.prepared.structs[i],
                &run.prepared.diffs[i],
            )
            .unwrap();
        let got = classifier.probabilities(record);
        for (e, g) in expected.iter().zip(got.iter()) {
            assert!((e - g).abs() < 1e-4, "sample {i}: {e} vs {g}");
        }
    }
}

#[test]
fn test_trained_model_separates_labels() {
    let mut config = small_config();
    config.training.epochs = 60;
    config.training.learning_rate = 1e-2;
    let run = train_corpus(&mixed_corpus(), &FieldMap::default(), &config).unwrap();
    let classifier = ArtifactClassifier::new(run.artifact).unwrap();

    let create: ChangeRecord = serde_json::from_value(json!({
        "metadata": {"object_type": "address"},
        "data": {"before": {}, "after": {"name": "net9", "subnet": "10.0.0.0/24"}},
        "changes": [{"field": "name"}, {"field": "subnet"}]
    }))
    .unwrap();
    let pred = classifier.classify(&create).unwrap();
    assert_eq!(pred.label, "ADDRESS CREATE");
}

#[test]
fn test_zero_sample_corpus() {
    let run = train_corpus(&Corpus::default(), &FieldMap::default(), &small_config()).unwrap();
    assert!(run.outcome.history.is_empty());
    assert!(run.outcome.evaluation.is_none());
    assert!(run.artifact.metadata.labels.is_empty());
    assert!(run.artifact.tfidf.vocab.is_empty());
    assert_eq!(run.artifact.metadata.struct_dim, 0);

    let json = run.artifact.to_json().unwrap();
    let reloaded = ExportArtifact::from_json(&json).unwrap();
    let classifier = ArtifactClassifier::new(reloaded).unwrap();
    assert!(classifier.classify(&ChangeRecord::default()).is_none());
}

#[test]
fn test_single_label_corpus() {
    let corpus: Corpus = serde_json::from_value(json!({"samples": [
        {"metadata": {"object_type": "vip"}, "data": {"after": {"name": "v1", "extip": "1.2.3.4"}}},
        {"metadata": {"object_type": "vip"}, "data": {"after": {"name": "v2", "extip": "1.2.3.5"}}}
    ]}))
    .unwrap();
    let run = train_corpus(&corpus, &FieldMap::default(), &small_config()).unwrap();
    assert_eq!(run.prepared.label_index.labels(), &["VIP CREATE"]);
    assert!(run.outcome.history.iter().all(|m| m.train_loss.abs() < 1e-6));

    let classifier = ArtifactClassifier::new(run.artifact).unwrap();
    let pred = classifier.classify(&corpus.samples[0]).unwrap();
    assert_eq!(pred.label, "VIP CREATE");
    assert!((pred.confidence - 1.0).abs() < 1e-6);
}

#[test]
fn test_records_without_after_state_train() {
    let corpus: Corpus = serde_json::from_value(json!({"samples": [
        {"metadata": {"object_type": "address"}, "changes": [{"field": "name"}]},
        {"metadata": {"object_type": "policy", "operation": "EDIT"}}
    ]}))
    .unwrap();
    let run = train_corpus(&corpus, &FieldMap::default(), &small_config()).unwrap();

    assert_eq!(run.prepared.text_dim(), 0);
    assert_eq!(run.prepared.struct_dim, 0);
    assert_eq!(run.outcome.history.len(), 25);
    assert!(run.outcome.history.iter().all(|m| m.train_loss.is_finite()));
    assert_eq!(run.artifact.metadata.labels.len(), 2);

    let reloaded = ExportArtifact::from_json(&run.artifact.to_json().unwrap()).unwrap();
    assert_eq!(reloaded, run.artifact);
    let classifier = ArtifactClassifier::new(reloaded).unwrap();
    let pred = classifier.classify(&corpus.samples[0]).unwrap();
    assert!(["ADDRESS CREATE", "POLICY EDIT"].contains(&pred.label.as_str()));
}

#[test]
fn test_identity_field_decides_operation() {
    let field_map: FieldMap = serde_json::from_value(json!({
        "fortigate": {"address": {"identity_field": "name", "canonical_fields": ["name"]}}
    }))
    .unwrap();
    // `before` is non-empty, but the identity field is blank: CREATE.
    let corpus: Corpus = serde_json::from_value(json!({"samples": [
        {
            "metadata": {"object_type": "address"},
            "data": {"before": {"name": "", "comment": "x"}, "after": {"name": "obj1"}}
        }
    ]}))
    .unwrap();
    let run = train_corpus(&corpus, &field_map, &small_config()).unwrap();
    assert_eq!(run.prepared.labels, vec!["ADDRESS CREATE"]);
}

#[test]
fn test_run_writes_artifact_file() {
    let dir = tempfile::tempdir().unwrap();
    let corpus_path = dir.path().join("data.json");
    std::fs::write(
        &corpus_path,
        serde_json::to_string(&two_address_samples()).unwrap(),
    )
    .unwrap();

    let mut config = small_config();
    config.corpus_path = corpus_path;
    config.field_map_path = Some(dir.path().join("missing_map.json"));
    config.output_path = dir.path().join("out").join("model_data.json");
    config.training.epochs = 2;

    let run = pipeline::run(&config).unwrap();
    let loaded = ExportArtifact::load(&config.output_path).unwrap();
    assert_eq!(loaded, run.artifact);
}
