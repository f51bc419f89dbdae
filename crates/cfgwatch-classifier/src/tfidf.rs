//! TF-IDF lexical model over text views.
//!
//! Fit once over the whole corpus, then frozen. Column `i` of every
//! transformed vector is weighted by `idf[i]` and corresponds to
//! `vocabulary[i]`.
//!
//! - Tokens: lower-cased runs of two or more word characters.
//! - IDF: `ln((1 + n_docs) / (1 + df)) + 1`.
//! - Rows: raw term counts times IDF, then L2-normalized.
//! - Over the cap, terms are kept by corpus count (ties broken by term) and
//!   the kept vocabulary is ordered alphabetically.

use cfgwatch_core::{CfgWatchError, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("token regex"));

/// Split a document into lower-cased tokens.
pub fn tokenize(document: &str) -> Vec<String> {
    let lowered = document.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Frozen TF-IDF vocabulary and weights.
#[derive(Clone)]
pub struct TfidfVectorizer {
    vocabulary: Vec<String>,
    idf: Vec<f64>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for TfidfVectorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TfidfVectorizer")
            .field("vocabulary_size", &self.vocabulary.len())
            .finish()
    }
}

impl TfidfVectorizer {
    /// Fit over `documents`, keeping at most `max_features` terms.
    ///
    /// An empty corpus (or one with no tokens) yields an empty vocabulary.
    pub fn fit<S: AsRef<str>>(documents: &[S], max_features: usize) -> Self {
        let n_docs = documents.len();
        let mut corpus_counts: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let tokens = tokenize(doc.as_ref());
            let mut seen: HashSet<&str> = HashSet::new();
            for token in &tokens {
                *corpus_counts.entry(token.clone()).or_insert(0) += 1;
                if seen.insert(token.as_str()) {
                    *doc_freq.entry(token.clone()).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(String, usize)> = corpus_counts.into_iter().collect();
        ranked.sort_by(|(ta, ca), (tb, cb)| cb.cmp(ca).then_with(|| ta.cmp(tb)));
        let distinct_terms = ranked.len();
        ranked.truncate(max_features);
        debug!(
            documents = n_docs,
            distinct_terms,
            kept = ranked.len(),
            "Fitted TF-IDF vocabulary"
        );

        let mut vocabulary: Vec<String> = ranked.into_iter().map(|(t, _)| t).collect();
        vocabulary.sort();

        let idf = vocabulary
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0);
                ((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0
            })
            .collect();

        Self::build(vocabulary, idf)
    }

    /// Rebuild a vectorizer from persisted vocabulary and IDF weights.
    pub fn from_parts(vocabulary: Vec<String>, idf: Vec<f64>) -> Result<Self> {
        if vocabulary.len() != idf.len() {
            return Err(CfgWatchError::Features(format!(
                "TF-IDF vocabulary has {} terms but {} idf weights",
                vocabulary.len(),
                idf.len()
            )));
        }
        let vectorizer = Self::build(vocabulary, idf);
        if vectorizer.index.len() != vectorizer.vocabulary.len() {
            return Err(CfgWatchError::Features(
                "TF-IDF vocabulary contains duplicate terms".to_string(),
            ));
        }
        Ok(vectorizer)
    }

    fn build(vocabulary: Vec<String>, idf: Vec<f64>) -> Self {
        let index = vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        Self {
            vocabulary,
            idf,
            index,
        }
    }

    /// Transform one document into a dense row over the frozen vocabulary.
    /// Unseen terms contribute nothing.
    pub fn transform(&self, document: &str) -> Vec<f32> {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for token in tokenize(document) {
            if let Some(&col) = self.index.get(&token) {
                *counts.entry(col).or_insert(0.0) += 1.0;
            }
        }

        let mut weighted: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(col, tf)| (col, tf * self.idf[col]))
            .collect();
        let norm = weighted.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, w) in weighted.iter_mut() {
                *w /= norm;
            }
        }

        let mut row = vec![0.0_f32; self.vocabulary.len()];
        for (col, w) in weighted {
            row[col] = w as f32;
        }
        row
    }

    /// Transform every document.
    pub fn transform_all<S: AsRef<str>>(&self, documents: &[S]) -> Vec<Vec<f32>> {
        documents.iter().map(|d| self.transform(d.as_ref())).collect()
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        // Single-character tokens are dropped.
        assert_eq!(
            tokenize("Name obj1 status Enable a 10.0.0.1"),
            vec!["name", "obj1", "status", "enable", "10"]
        );
        assert_eq!(tokenize("True None"), vec!["true", "none"]);
    }

    #[test]
    fn test_fit_vocabulary_is_alphabetical() {
        let docs = ["status enable name obj1", "status disable name obj1"];
        let v = TfidfVectorizer::fit(&docs, 2000);
        assert_eq!(v.vocabulary(), &["disable", "enable", "name", "obj1", "status"]);
        assert_eq!(v.idf().len(), v.len());
    }

    #[test]
    fn test_idf_values() {
        let docs = ["alpha beta", "alpha gamma"];
        let v = TfidfVectorizer::fit(&docs, 2000);
        let idf: HashMap<&str, f64> = v
            .vocabulary()
            .iter()
            .map(String::as_str)
            .zip(v.idf().iter().copied())
            .collect();
        // alpha in both docs: ln(3/3)+1 = 1
        assert!((idf["alpha"] - 1.0).abs() < 1e-12);
        // beta in one doc: ln(3/2)+1
        assert!((idf["beta"] - ((3.0_f64 / 2.0).ln() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_max_features_keeps_most_frequent() {
        let docs = ["aa aa aa bb bb cc", "aa bb dd"];
        let v = TfidfVectorizer::fit(&docs, 2);
        assert_eq!(v.vocabulary(), &["aa", "bb"]);
        // cc and dd tie on count 1; the tie goes to the lexically smaller term.
        let v = TfidfVectorizer::fit(&docs, 3);
        assert_eq!(v.vocabulary(), &["aa", "bb", "cc"]);
    }

    #[test]
    fn test_transform_is_l2_normalized() {
        let docs = ["name obj1 status enable", "name obj2 status disable"];
        let v = TfidfVectorizer::fit(&docs, 2000);
        let row = v.transform(docs[0]);
        assert_eq!(row.len(), v.len());
        let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_transform_unseen_terms_contribute_zero() {
        let v = TfidfVectorizer::fit(&["name obj1"], 2000);
        let row = v.transform("completely unknown words");
        assert!(row.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_fit_empty_corpus() {
        let docs: [&str; 0] = [];
        let v = TfidfVectorizer::fit(&docs, 2000);
        assert!(v.is_empty());
        assert!(v.transform("anything").is_empty());
    }

    #[test]
    fn test_from_parts_rejects_length_mismatch() {
        let err = TfidfVectorizer::from_parts(vec!["aa".into()], vec![1.0, 2.0]);
        assert!(err.is_err());
        let ok = TfidfVectorizer::from_parts(vec!["aa".into()], vec![1.0]).unwrap();
        assert_eq!(ok.transform("AA aa"), vec![1.0]);
    }
}
