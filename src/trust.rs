//! # Source Trust
//!
//! Configurable allow-list of authoritative news domains plus a fixed additive
//! bias applied to the VALID probability when an article comes from one of them.
//!
//! - Matching is a case-insensitive substring test on the URL.
//! - The bias only ever raises `prob_valid` (clamped to 1.0); `prob_hoax` is
//!   recomputed so the pair still sums to 1.
//! - Includes a built-in `default_seed()` with the Indonesian mainstream outlets.
//!
//! Trust biases the score, it never overrides the label on its own.

use serde::Deserialize;

use crate::classifier::ScoreResult;

pub const DEFAULT_TRUST_BIAS: f64 = 0.15;

/// Allow-list and bias, loaded from `[trust]` in the detector config or defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrustConfig {
    #[serde(default = "default_bias")]
    pub bias: f64,
    #[serde(default = "default_domains")]
    pub domains: Vec<String>,
}

fn default_bias() -> f64 {
    DEFAULT_TRUST_BIAS
}

fn default_domains() -> Vec<String> {
    [
        "cnnindonesia.com",
        "kompas.com",
        "tempo.co",
        "antaranews.com",
        "detik.com",
        "liputan6.com",
        "beritasatu.com",
        "bbc.com",
        "cnbcindonesia.com",
        "republika.co.id",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl TrustConfig {
    pub fn default_seed() -> Self {
        Self {
            bias: DEFAULT_TRUST_BIAS,
            domains: default_domains(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrustAdjuster {
    bias: f64,
    domains: Vec<String>,
}

impl TrustAdjuster {
    pub fn new(cfg: &TrustConfig) -> Self {
        let bias = if cfg.bias.is_finite() {
            cfg.bias.clamp(0.0, 1.0)
        } else {
            DEFAULT_TRUST_BIAS
        };
        let mut domains: Vec<String> = cfg
            .domains
            .iter()
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        domains.sort();
        domains.dedup();
        Self { bias, domains }
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// True if `url` contains any allow-listed domain.
    pub fn is_trusted(&self, url: Option<&str>) -> bool {
        let Some(url) = url else {
            return false;
        };
        let u = url.trim().to_ascii_lowercase();
        if u.is_empty() {
            return false;
        }
        self.domains.iter().any(|d| u.contains(d.as_str()))
    }

    /// Apply the trust bias. Untrusted or absent URLs leave the score untouched.
    pub fn adjust(&self, score: ScoreResult, url: Option<&str>) -> ScoreResult {
        if !self.is_trusted(url) {
            return score;
        }
        ScoreResult::from_valid((score.prob_valid() + self.bias).min(1.0))
    }
}

impl Default for TrustAdjuster {
    fn default() -> Self {
        Self::new(&TrustConfig::default_seed())
    }
}
