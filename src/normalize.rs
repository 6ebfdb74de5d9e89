//! Text normalization shared by inference and corpus building.
//!
//! Output alphabet: `a-z`, `0-9`, single spaces, `,` and `.`. The same function
//! feeds the vectorizer at request time and keys deduplication at retrain time,
//! so the two paths can never drift apart.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical text produced by [`normalize`]. Only constructible through it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lower-case, drop everything outside the allowed alphabet, collapse whitespace, trim.
/// Total, deterministic and idempotent.
pub fn normalize(raw: &str) -> NormalizedText {
    let kept: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|&c| is_allowed(c))
        .collect();

    NormalizedText(kept.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Normalize an article the way both the pipeline and the feedback corpus see it:
/// title, one space, body.
pub fn normalize_article(title: &str, body: &str) -> NormalizedText {
    normalize(&format!("{title} {body}"))
}

#[inline]
fn is_allowed(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, ' ' | ',' | '.')
}
