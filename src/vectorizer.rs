//! # TF-IDF Vectorizer
//! Bag-of-words term weighting fitted on the training corpus.
//!
//! - Tokens: runs of `[a-z0-9]` of length >= 2 taken from normalized text.
//! - Indonesian stopwords (bundled list) never enter the vocabulary.
//! - Vocabulary capped at `max_features` by corpus term frequency
//!   (ties broken alphabetically, so fitting is deterministic).
//! - Smooth IDF: `ln((1 + n) / (1 + df)) + 1`; rows are L2-normalized.
//! - Out-of-vocabulary terms contribute nothing.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::normalize::NormalizedText;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    include_str!("../stopwords_id.txt")
        .lines()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .collect()
});

pub const DEFAULT_MAX_FEATURES: usize = 5000;

/// Sparse, fixed-dimension feature vector. `entries` are sorted by column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    dim: usize,
    entries: Vec<(usize, f64)>,
}

impl FeatureVector {
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vectorizer {
    max_features: usize,
    /// term → column index (columns assigned in alphabetical term order)
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl Vectorizer {
    pub fn fit(corpus: &[NormalizedText], max_features: usize) -> Self {
        let mut term_freq: HashMap<&str, u64> = HashMap::new();
        let mut doc_freq: HashMap<&str, u64> = HashMap::new();

        for doc in corpus {
            let mut seen = HashSet::new();
            for tok in content_tokens(doc.as_str()) {
                *term_freq.entry(tok).or_default() += 1;
                if seen.insert(tok) {
                    *doc_freq.entry(tok).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, u64)> = term_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_features);

        let mut terms: Vec<&str> = ranked.into_iter().map(|(t, _)| t).collect();
        terms.sort_unstable();

        let n_docs = corpus.len() as f64;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(terms.len());
        for (col, term) in terms.into_iter().enumerate() {
            let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
            idf.push(((1.0 + n_docs) / (1.0 + df)).ln() + 1.0);
            vocabulary.insert(term.to_string(), col);
        }

        Self {
            max_features,
            vocabulary,
            idf,
        }
    }

    pub fn transform(&self, text: &NormalizedText) -> FeatureVector {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for tok in tokens(text.as_str()) {
            if let Some(&col) = self.vocabulary.get(tok) {
                *counts.entry(col).or_default() += 1.0;
            }
        }

        let mut entries: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(col, tf)| (col, tf * self.idf[col]))
            .collect();

        let norm = entries.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, v) in entries.iter_mut() {
                *v /= norm;
            }
        }

        FeatureVector {
            dim: self.dim(),
            entries,
        }
    }

    /// Vocabulary size, i.e. the dimension of every produced vector.
    pub fn dim(&self) -> usize {
        self.idf.len()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.vocabulary.contains_key(term)
    }

    /// Every vocabulary column must address an idf weight.
    pub(crate) fn check_consistency(&self) -> std::result::Result<(), String> {
        match self.vocabulary.iter().find(|(_, &col)| col >= self.idf.len()) {
            Some((term, col)) => Err(format!(
                "term {term:?} maps to column {col} but only {} idf weights exist",
                self.idf.len()
            )),
            None => Ok(()),
        }
    }
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

fn tokens(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() >= 2)
}

fn content_tokens(s: &str) -> impl Iterator<Item = &str> {
    tokens(s).filter(|t| !is_stopword(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn corpus(docs: &[&str]) -> Vec<NormalizedText> {
        docs.iter().map(|d| normalize(d)).collect()
    }

    #[test]
    fn stopwords_and_single_chars_are_excluded() {
        let v = Vectorizer::fit(&corpus(&["banjir di jakarta dan bekasi", "a b c banjir"]), 100);
        assert!(v.contains("banjir"));
        assert!(v.contains("jakarta"));
        assert!(!v.contains("di"));
        assert!(!v.contains("dan"));
        assert!(!v.contains("a"));
    }

    #[test]
    fn vocabulary_is_capped_by_term_frequency() {
        let docs = corpus(&["vaksin vaksin vaksin chip", "vaksin chip gempa", "gempa"]);
        let v = Vectorizer::fit(&docs, 2);
        assert_eq!(v.dim(), 2);
        assert!(v.contains("vaksin"));
        // chip and gempa tie at 2; alphabetical tiebreak keeps "chip"
        assert!(v.contains("chip"));
        assert!(!v.contains("gempa"));
    }

    #[test]
    fn fitting_is_deterministic() {
        let docs = corpus(&["satu dua tiga", "tiga empat lima", "lima enam"]);
        assert_eq!(Vectorizer::fit(&docs, 3), Vectorizer::fit(&docs, 3));
    }

    #[test]
    fn out_of_vocabulary_terms_are_dropped() {
        let v = Vectorizer::fit(&corpus(&["hoaks vaksin", "berita resmi"]), 100);
        let fv = v.transform(&normalize("kata asing sekali"));
        assert_eq!(fv.dim(), v.dim());
        assert!(fv.is_zero());
    }

    #[test]
    fn rows_are_l2_normalized() {
        let v = Vectorizer::fit(&corpus(&["hoaks vaksin chip", "berita resmi vaksin"]), 100);
        let fv = v.transform(&normalize("hoaks hoaks vaksin"));
        let norm: f64 = fv.entries().iter().map(|(_, x)| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
        assert!(fv.entries().iter().all(|&(col, _)| col < v.dim()));
    }

    #[test]
    fn rarer_terms_get_higher_idf() {
        let v = Vectorizer::fit(&corpus(&["vaksin chip", "vaksin resmi", "vaksin baru"]), 100);
        let fv = v.transform(&normalize("vaksin chip"));
        let weight = |t: &str| {
            let col = v.vocabulary[t];
            fv.entries().iter().find(|(c, _)| *c == col).map(|(_, x)| *x).unwrap()
        };
        assert!(weight("chip") > weight("vaksin"));
    }
}
