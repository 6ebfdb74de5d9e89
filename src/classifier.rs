//! Multinomial naive Bayes over TF-IDF features, two classes (VALID = 0, HOAX = 1).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vectorizer::FeatureVector;

pub const DEFAULT_ALPHA: f64 = 1.0;

/// Training class. Numeric values match the corpus label column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Class {
    Valid,
    Hoax,
}

impl Class {
    pub fn from_label(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Valid),
            1 => Some(Self::Hoax),
            _ => None,
        }
    }

    pub fn label(self) -> u8 {
        self.index() as u8
    }

    fn index(self) -> usize {
        match self {
            Self::Valid => 0,
            Self::Hoax => 1,
        }
    }
}

/// Class membership probabilities. `prob_valid + prob_hoax == 1` always holds;
/// the only way to build one is from the VALID probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    prob_valid: f64,
    prob_hoax: f64,
}

impl ScoreResult {
    /// Non-finite input is treated as 0.0.
    pub fn from_valid(prob_valid: f64) -> Self {
        let p = if prob_valid.is_finite() {
            prob_valid.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            prob_valid: p,
            prob_hoax: 1.0 - p,
        }
    }

    pub fn prob_valid(&self) -> f64 {
        self.prob_valid
    }

    pub fn prob_hoax(&self) -> f64 {
        self.prob_hoax
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    alpha: f64,
    n_features: usize,
    class_count: [u64; 2],
    class_log_prior: [f64; 2],
    /// `[class][feature]` smoothed log P(feature | class)
    feature_log_prob: [Vec<f64>; 2],
}

impl Classifier {
    /// Fit on vectors produced by one vectorizer. Refuses single-class data.
    pub fn fit(vectors: &[FeatureVector], classes: &[Class], alpha: f64) -> Result<Self> {
        debug_assert_eq!(vectors.len(), classes.len());

        let mut class_count = [0u64; 2];
        for c in classes {
            class_count[c.index()] += 1;
        }
        let distinct = class_count.iter().filter(|&&n| n > 0).count();
        if distinct < 2 {
            return Err(Error::DegenerateTraining { distinct });
        }

        let n_features = vectors.first().map(FeatureVector::dim).unwrap_or(0);
        if let Some(bad) = vectors.iter().find(|v| v.dim() != n_features) {
            return Err(Error::Artifacts(format!(
                "mixed feature dimensions in training batch ({} vs {})",
                bad.dim(),
                n_features
            )));
        }

        let mut feature_count = [vec![0.0f64; n_features], vec![0.0f64; n_features]];
        for (v, c) in vectors.iter().zip(classes) {
            let row = &mut feature_count[c.index()];
            for &(col, x) in v.entries() {
                row[col] += x;
            }
        }

        let total = (class_count[0] + class_count[1]) as f64;
        let class_log_prior = [
            (class_count[0] as f64 / total).ln(),
            (class_count[1] as f64 / total).ln(),
        ];

        let alpha = if alpha.is_finite() && alpha > 0.0 {
            alpha
        } else {
            DEFAULT_ALPHA
        };
        let feature_log_prob = feature_count.map(|row| {
            let denom = (row.iter().sum::<f64>() + alpha * n_features as f64).ln();
            row.into_iter()
                .map(|fc| (fc + alpha).ln() - denom)
                .collect::<Vec<f64>>()
        });

        Ok(Self {
            alpha,
            n_features,
            class_count,
            class_log_prior,
            feature_log_prob,
        })
    }

    /// Posterior class probabilities. The vector must come from the vectorizer of
    /// the same generation; a dimension mismatch is reported, never guessed around.
    pub fn predict_proba(&self, v: &FeatureVector) -> Result<ScoreResult> {
        if v.dim() != self.n_features {
            return Err(Error::Artifacts(format!(
                "feature dimension {} does not match classifier dimension {}",
                v.dim(),
                self.n_features
            )));
        }

        let jll = |c: usize| {
            self.class_log_prior[c]
                + v.entries()
                    .iter()
                    .map(|&(col, x)| x * self.feature_log_prob[c][col])
                    .sum::<f64>()
        };
        let (valid, hoax) = (jll(0), jll(1));

        // Logistic of the log-odds; stable for large magnitudes.
        let prob_valid = 1.0 / (1.0 + (hoax - valid).exp());
        Ok(ScoreResult::from_valid(prob_valid))
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn class_count(&self, c: Class) -> u64 {
        self.class_count[c.index()]
    }

    pub(crate) fn check_consistency(&self) -> std::result::Result<(), String> {
        for (c, row) in self.feature_log_prob.iter().enumerate() {
            if row.len() != self.n_features {
                return Err(format!(
                    "class {c} has {} feature weights, expected {}",
                    row.len(),
                    self.n_features
                ));
            }
        }
        Ok(())
    }
}
