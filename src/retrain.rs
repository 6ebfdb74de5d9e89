// src/retrain.rs
//! Feedback-driven retraining: base corpus + feedback log → new artifact generation.
//!
//! Single writer: the job holds `<artifacts>/.retrain.lock` for its whole run and
//! a second concurrent attempt fails fast with `RetrainInProgress`. Any failure
//! leaves the previously committed pair untouched.

use std::path::Path;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::artifacts::{ArtifactPair, ArtifactStore};
use crate::classifier::{Class, Classifier, DEFAULT_ALPHA};
use crate::corpus::{load_base_corpus, load_feedback_log, merge_dedup, TrainingRow};
use crate::error::{Error, Result};
use crate::metrics::ensure_metrics_described;
use crate::normalize::NormalizedText;
use crate::vectorizer::{Vectorizer, DEFAULT_MAX_FEATURES};

#[derive(Debug, Clone, PartialEq)]
pub struct RetrainOptions {
    pub max_features: usize,
    pub alpha: f64,
    /// Share of the merged corpus held out for accuracy evaluation; 0 disables it.
    pub holdout_fraction: f64,
}

impl Default for RetrainOptions {
    fn default() -> Self {
        Self {
            max_features: DEFAULT_MAX_FEATURES,
            alpha: DEFAULT_ALPHA,
            holdout_fraction: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrainReport {
    pub generation: u64,
    pub base_rows: usize,
    pub base_skipped: usize,
    pub feedback_used: usize,
    pub feedback_excluded: usize,
    pub duplicates_collapsed: usize,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub hoax_rows: usize,
    pub vocabulary_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holdout_accuracy: Option<f64>,
}

/// Rebuild the pair from scratch and commit it as the next generation.
/// With no committed generation yet this bootstraps generation 1.
pub fn retrain(
    base_corpus: &Path,
    feedback_log: &Path,
    store: &ArtifactStore,
    opts: &RetrainOptions,
) -> Result<(ArtifactPair, RetrainReport)> {
    ensure_metrics_described();
    let started = Instant::now();

    let result = run_locked(base_corpus, feedback_log, store, opts);
    histogram!("retrain_duration_ms").record(started.elapsed().as_secs_f64() * 1000.0);

    match &result {
        Ok((pair, report)) => {
            counter!("retrain_runs_total").increment(1);
            gauge!("artifact_generation").set(pair.generation as f64);
            info!(
                target: "retrain",
                generation = report.generation,
                total = report.total_rows,
                valid = report.valid_rows,
                hoax = report.hoax_rows,
                feedback_used = report.feedback_used,
                duplicates = report.duplicates_collapsed,
                vocab = report.vocabulary_size,
                holdout_accuracy = ?report.holdout_accuracy,
                "retrain committed"
            );
        }
        Err(e) => {
            counter!("retrain_failures_total", "kind" => e.kind()).increment(1);
            warn!(target: "retrain", error = %e, "retrain failed; previous artifacts kept");
        }
    }
    result
}

fn run_locked(
    base_corpus: &Path,
    feedback_log: &Path,
    store: &ArtifactStore,
    opts: &RetrainOptions,
) -> Result<(ArtifactPair, RetrainReport)> {
    let mut lock = store.retrain_lock()?;
    let _guard = lock.try_acquire()?;

    let base = load_base_corpus(base_corpus)?;
    let feedback = load_feedback_log(feedback_log)?;
    if feedback.excluded > 0 {
        counter!("retrain_feedback_excluded_total").increment(feedback.excluded as u64);
    }

    let base_rows = base.rows.len();
    let feedback_used = feedback.rows.len();
    let (rows, duplicates_collapsed) = merge_dedup(base.rows, feedback.rows);

    let valid_rows = rows.iter().filter(|r| r.class == Class::Valid).count();
    let hoax_rows = rows.len() - valid_rows;
    let distinct = usize::from(valid_rows > 0) + usize::from(hoax_rows > 0);
    if distinct < 2 {
        return Err(Error::DegenerateTraining { distinct });
    }

    let holdout_accuracy = if opts.holdout_fraction > 0.0 {
        holdout_accuracy(&rows, opts)?
    } else {
        None
    };

    let (vectorizer, classifier) = fit_pair(&rows, opts)?;
    let vocabulary_size = vectorizer.dim();
    let pair = store.commit(vectorizer, classifier)?;

    let report = RetrainReport {
        generation: pair.generation,
        base_rows,
        base_skipped: base.skipped,
        feedback_used,
        feedback_excluded: feedback.excluded,
        duplicates_collapsed,
        total_rows: rows.len(),
        valid_rows,
        hoax_rows,
        vocabulary_size,
        holdout_accuracy,
    };
    Ok((pair, report))
}

fn fit_pair(rows: &[TrainingRow], opts: &RetrainOptions) -> Result<(Vectorizer, Classifier)> {
    let texts: Vec<NormalizedText> = rows.iter().map(|r| r.text.clone()).collect();
    let classes: Vec<Class> = rows.iter().map(|r| r.class).collect();
    let vectorizer = Vectorizer::fit(&texts, opts.max_features);
    let vectors: Vec<_> = texts.iter().map(|t| vectorizer.transform(t)).collect();
    let classifier = Classifier::fit(&vectors, &classes, opts.alpha)?;
    Ok((vectorizer, classifier))
}

/// Deterministic split by text hash; the evaluation pair is thrown away.
fn holdout_accuracy(rows: &[TrainingRow], opts: &RetrainOptions) -> Result<Option<f64>> {
    let (test, train): (Vec<TrainingRow>, Vec<TrainingRow>) = rows
        .iter()
        .cloned()
        .partition(|r| in_holdout(&r.text, opts.holdout_fraction));

    let train_classes = train.iter().any(|r| r.class == Class::Valid) as usize
        + train.iter().any(|r| r.class == Class::Hoax) as usize;
    if test.is_empty() || train_classes < 2 {
        warn!(
            target: "retrain",
            train = train.len(),
            test = test.len(),
            "holdout split unusable, skipping evaluation"
        );
        return Ok(None);
    }

    let (vectorizer, classifier) = fit_pair(&train, opts)?;
    let mut correct = 0usize;
    for row in &test {
        let score = classifier.predict_proba(&vectorizer.transform(&row.text))?;
        let predicted = if score.prob_valid() >= 0.5 {
            Class::Valid
        } else {
            Class::Hoax
        };
        if predicted == row.class {
            correct += 1;
        }
    }
    Ok(Some(correct as f64 / test.len() as f64))
}

fn in_holdout(text: &NormalizedText, fraction: f64) -> bool {
    let digest = Sha256::digest(text.as_str().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let bucket = u64::from_be_bytes(head) as f64 / u64::MAX as f64;
    bucket < fraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let p = dir.join(name);
        fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn bootstraps_first_generation_without_feedback() {
        let tmp = tempfile::tempdir().unwrap();
        let base = write(
            tmp.path(),
            "base.csv",
            "text,label\npemerintah umumkan anggaran,0\nvaksin berisi chip,1\n",
        );
        let store = ArtifactStore::new(tmp.path().join("artifacts"));
        let (pair, report) = retrain(
            &base,
            &tmp.path().join("missing.csv"),
            &store,
            &RetrainOptions::default(),
        )
        .unwrap();
        assert_eq!(pair.generation, 1);
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.feedback_used, 0);
        assert_eq!(store.current_generation().unwrap(), Some(1));
    }

    #[test]
    fn single_label_corpus_is_degenerate() {
        let tmp = tempfile::tempdir().unwrap();
        let base = write(tmp.path(), "base.csv", "text,label\nsatu dua,1\ntiga empat,1\n");
        let store = ArtifactStore::new(tmp.path().join("artifacts"));
        let err = retrain(&base, &tmp.path().join("fb.csv"), &store, &RetrainOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::DegenerateTraining { distinct: 1 }));
        assert_eq!(store.current_generation().unwrap(), None);
    }

    #[test]
    fn holdout_split_is_deterministic() {
        let t = crate::normalize::normalize("banjir jakarta hari ini");
        assert_eq!(in_holdout(&t, 0.3), in_holdout(&t, 0.3));
        assert!(!in_holdout(&t, 0.0));
    }

    #[test]
    fn holdout_reports_accuracy_when_split_is_usable() {
        let tmp = tempfile::tempdir().unwrap();
        let mut csv = String::from("text,label\n");
        for i in 0..40 {
            csv.push_str(&format!("pemerintah resmi umumkan anggaran nomor{i},0\n"));
            csv.push_str(&format!("viral chip vaksin zombie nomor{i},1\n"));
        }
        let base = write(tmp.path(), "base.csv", &csv);
        let store = ArtifactStore::new(tmp.path().join("artifacts"));
        let opts = RetrainOptions {
            holdout_fraction: 0.5,
            ..RetrainOptions::default()
        };
        let (_, report) = retrain(&base, &tmp.path().join("fb.csv"), &store, &opts).unwrap();
        let acc = report.holdout_accuracy.expect("80 rows split in half has both sides");
        assert!((0.0..=1.0).contains(&acc));
        assert_eq!(report.total_rows, 80);
    }
}
