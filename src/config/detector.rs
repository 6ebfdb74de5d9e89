// src/config/detector.rs
//! Detector configuration (`config/detector.toml`).
//!
//! Every key is optional; a missing file yields the built-in defaults so the
//! service can boot on a fresh checkout. A handful of env vars override the
//! values that operators tune most often.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::classifier::DEFAULT_ALPHA;
use crate::decision::{DecisionPolicy, DEFAULT_UPPER_THRESHOLD, DEFAULT_VALID_THRESHOLD};
use crate::retrain::RetrainOptions;
use crate::trust::{TrustAdjuster, TrustConfig, DEFAULT_TRUST_BIAS};
use crate::vectorizer::DEFAULT_MAX_FEATURES;

pub const DEFAULT_DETECTOR_CONFIG_PATH: &str = "config/detector.toml";
pub const ENV_DETECTOR_CONFIG_PATH: &str = "DETECTOR_CONFIG_PATH";

const ENV_TRUST_BIAS: &str = "DETECTOR_TRUST_BIAS";
const ENV_POLICY: &str = "DETECTOR_POLICY";
const ENV_VALID_THRESHOLD: &str = "DETECTOR_VALID_THRESHOLD";
const ENV_UPPER_THRESHOLD: &str = "DETECTOR_UPPER_THRESHOLD";

const MAX_HOLDOUT_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub trust: TrustConfig,
    pub policy: PolicySection,
    pub training: TrainingSection,
    pub paths: PathsSection,
    pub fetch: FetchSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Binary,
    Dual,
}

impl PolicyKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Some(Self::Binary),
            "dual" => Some(Self::Dual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub kind: PolicyKind,
    pub valid_threshold: f64,
    pub upper_threshold: f64,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            kind: PolicyKind::Binary,
            valid_threshold: DEFAULT_VALID_THRESHOLD,
            upper_threshold: DEFAULT_UPPER_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    pub max_features: usize,
    pub alpha: f64,
    pub holdout_fraction: f64,
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            max_features: DEFAULT_MAX_FEATURES,
            alpha: DEFAULT_ALPHA,
            holdout_fraction: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub artifacts_dir: PathBuf,
    pub base_corpus: PathBuf,
    pub feedback_log: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            base_corpus: PathBuf::from("data/datasetUMPOHoax.csv"),
            feedback_log: PathBuf::from("data/laporan_kesalahan.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub timeout_secs: u64,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl DetectorConfig {
    /// Resolve the path from `DETECTOR_CONFIG_PATH` (or the default) and load it.
    /// A missing file is not an error.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = env::var(ENV_DETECTOR_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DETECTOR_CONFIG_PATH));

        let mut cfg = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            tracing::info!(path = %path.display(), "detector config not found, using defaults");
            Self::default()
        };
        cfg.apply_env();
        Ok(cfg)
    }

    /// Parse a TOML file without env overrides.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading detector config {}", path.display()))?;
        Self::from_toml_str(&data)
            .with_context(|| format!("parsing detector config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: DetectorConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn sanitize(&mut self) {
        if !self.trust.bias.is_finite() {
            self.trust.bias = DEFAULT_TRUST_BIAS;
        }
        self.trust.bias = self.trust.bias.clamp(0.0, 1.0);
        if !self.policy.valid_threshold.is_finite() {
            self.policy.valid_threshold = DEFAULT_VALID_THRESHOLD;
        }
        self.policy.valid_threshold = self.policy.valid_threshold.clamp(0.0, 1.0);
        if !self.policy.upper_threshold.is_finite() {
            self.policy.upper_threshold = DEFAULT_UPPER_THRESHOLD;
        }
        self.policy.upper_threshold = self.policy.upper_threshold.clamp(0.5, 1.0);
        if self.training.max_features == 0 {
            self.training.max_features = DEFAULT_MAX_FEATURES;
        }
        if !(self.training.alpha.is_finite() && self.training.alpha > 0.0) {
            self.training.alpha = DEFAULT_ALPHA;
        }
        if !self.training.holdout_fraction.is_finite() {
            self.training.holdout_fraction = 0.0;
        }
        self.training.holdout_fraction = self
            .training
            .holdout_fraction
            .clamp(0.0, MAX_HOLDOUT_FRACTION);
        if self.fetch.timeout_secs == 0 {
            self.fetch.timeout_secs = FetchSection::default().timeout_secs;
        }
    }

    /// Env overrides; unparsable values are ignored.
    fn apply_env(&mut self) {
        if let Some(b) = parse_unit_env(env::var(ENV_TRUST_BIAS).ok()) {
            self.trust.bias = b;
        }
        if let Some(k) = env::var(ENV_POLICY).ok().as_deref().and_then(PolicyKind::parse) {
            self.policy.kind = k;
        }
        if let Some(t) = parse_unit_env(env::var(ENV_VALID_THRESHOLD).ok()) {
            self.policy.valid_threshold = t;
        }
        if let Some(t) = parse_unit_env(env::var(ENV_UPPER_THRESHOLD).ok()) {
            self.policy.upper_threshold = t.max(0.5);
        }
    }

    pub fn trust_adjuster(&self) -> TrustAdjuster {
        TrustAdjuster::new(&self.trust)
    }

    pub fn decision_policy(&self) -> DecisionPolicy {
        match self.policy.kind {
            PolicyKind::Binary => DecisionPolicy::binary(self.policy.valid_threshold),
            PolicyKind::Dual => DecisionPolicy::dual(self.policy.upper_threshold),
        }
    }

    pub fn retrain_options(&self) -> RetrainOptions {
        RetrainOptions {
            max_features: self.training.max_features,
            alpha: self.training.alpha,
            holdout_fraction: self.training.holdout_fraction,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }
}

fn parse_unit_env(raw: Option<String>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}
