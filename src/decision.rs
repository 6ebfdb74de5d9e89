//! decision.rs: Final label, decision policy and explainability.
//!
//! Two policy shapes are supported:
//! - binary: VALID if `prob_valid >= valid_threshold`, else HOAX;
//! - dual: VALID / HOAX only when one side reaches `upper_threshold`,
//!   otherwise UNCERTAIN.
//!
//! Pozn.: UNCERTAIN je plnohodnotný výsledek, ne chyba.

use serde::{Deserialize, Serialize};

use crate::classifier::ScoreResult;

pub const DEFAULT_VALID_THRESHOLD: f64 = 0.40;
pub const DEFAULT_UPPER_THRESHOLD: f64 = 0.60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Valid,
    Hoax,
    Uncertain,
}

impl Label {
    /// Wire spelling (`VALID`, `HOAX`, `UNCERTAIN`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Hoax => "HOAX",
            Self::Uncertain => "UNCERTAIN",
        }
    }

    /// Spelling used in the feedback log (matches the user-facing labels).
    pub fn log_str(self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Hoax => "Hoaks",
            Self::Uncertain => "Uncertain",
        }
    }
}

/// Reason shown next to the label (explainability).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub message: String,
    pub kind: ReasonKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    Threshold,
    SourceTrust,
    Advisory,
}

impl Reason {
    pub fn new(kind: ReasonKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

/// Terminal output of the pipeline. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub label: Label,
    pub prob_valid: f64,
    pub prob_hoax: f64,
    pub trusted_source: bool,
    /// Trusted outlet but HOAX label: the caller should ask for manual verification.
    pub trusted_but_flagged_hoax: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<Reason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionPolicy {
    Binary { valid_threshold: f64 },
    Dual { upper_threshold: f64 },
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::binary(DEFAULT_VALID_THRESHOLD)
    }
}

impl DecisionPolicy {
    pub fn binary(valid_threshold: f64) -> Self {
        Self::Binary {
            valid_threshold: sanitize(valid_threshold, 0.0, DEFAULT_VALID_THRESHOLD),
        }
    }

    /// `upper_threshold` is kept in [0.5, 1.0] so VALID and HOAX can never both qualify.
    pub fn dual(upper_threshold: f64) -> Self {
        Self::Dual {
            upper_threshold: sanitize(upper_threshold, 0.5, DEFAULT_UPPER_THRESHOLD),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Binary { .. } => "binary",
            Self::Dual { .. } => "dual",
        }
    }

    pub fn decide(&self, score: ScoreResult, trusted_source: bool) -> Decision {
        let (pv, ph) = (score.prob_valid(), score.prob_hoax());

        let (label, rule) = match *self {
            Self::Binary { valid_threshold } => {
                if pv >= valid_threshold {
                    (Label::Valid, format!("prob_valid {pv:.2} >= {valid_threshold:.2}"))
                } else {
                    (Label::Hoax, format!("prob_valid {pv:.2} < {valid_threshold:.2}"))
                }
            }
            Self::Dual { upper_threshold } => {
                if pv >= upper_threshold {
                    (Label::Valid, format!("prob_valid {pv:.2} >= {upper_threshold:.2}"))
                } else if ph >= upper_threshold {
                    (Label::Hoax, format!("prob_hoax {ph:.2} >= {upper_threshold:.2}"))
                } else {
                    (
                        Label::Uncertain,
                        format!("neither side reached {upper_threshold:.2} (valid {pv:.2}, hoax {ph:.2})"),
                    )
                }
            }
        };

        let mut reasons = vec![Reason::new(ReasonKind::Threshold, rule)];
        if trusted_source {
            reasons.push(Reason::new(
                ReasonKind::SourceTrust,
                "Source is on the trusted-outlet allow-list",
            ));
        }

        let trusted_but_flagged_hoax = trusted_source && label == Label::Hoax;
        if trusted_but_flagged_hoax {
            reasons.push(Reason::new(
                ReasonKind::Advisory,
                "Flagged as hoax despite a trusted source; verify manually",
            ));
        }

        Decision {
            label,
            prob_valid: pv,
            prob_hoax: ph,
            trusted_source,
            trusted_but_flagged_hoax,
            reasons,
        }
    }
}

fn sanitize(x: f64, min: f64, fallback: f64) -> f64 {
    if x.is_finite() {
        x.clamp(min, 1.0)
    } else {
        fallback
    }
}
