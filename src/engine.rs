//! # Decision Engine
//! Normalizer → vectorizer → classifier → trust adjuster → decision policy.
//!
//! Stateless apart from reading the active artifact pair, so any number of
//! requests can run in parallel. Each request pins one generation for its
//! whole run; a concurrent swap only affects later requests.

use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::artifacts::ArtifactHandle;
use crate::decision::{Decision, DecisionPolicy};
use crate::error::{Error, Result};
use crate::fetch::PageFetcher;
use crate::normalize::normalize_article;
use crate::trust::TrustAdjuster;

/// One news item. Built per request, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub body: String,
    pub source_url: Option<String>,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        source_url: Option<String>,
    ) -> Result<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(Error::InvalidArticle("title is required".into()));
        }
        Ok(Self {
            title,
            body: body.into(),
            source_url: source_url.filter(|u| !u.trim().is_empty()),
        })
    }
}

/// Request shape: a title plus at least one body source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleInput {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    #[serde(flatten)]
    pub decision: Decision,
    /// Artifact generation that produced the scores.
    pub generation: u64,
    /// Anonymized id of the normalized text (safe to log).
    pub text_id: String,
}

pub struct Detector {
    artifacts: ArtifactHandle,
    trust: TrustAdjuster,
    policy: DecisionPolicy,
}

impl Detector {
    pub fn new(artifacts: ArtifactHandle, trust: TrustAdjuster, policy: DecisionPolicy) -> Self {
        Self {
            artifacts,
            trust,
            policy,
        }
    }

    pub fn artifacts(&self) -> &ArtifactHandle {
        &self.artifacts
    }

    pub fn trust(&self) -> &TrustAdjuster {
        &self.trust
    }

    /// Classify an article with the currently active pair.
    pub fn detect(&self, article: &Article) -> Result<Detection> {
        let pair = self.artifacts.current()?;
        let text = normalize_article(&article.title, &article.body);

        let features = pair.vectorizer.transform(&text);
        let raw = pair.classifier.predict_proba(&features)?;

        let url = article.source_url.as_deref();
        let trusted = self.trust.is_trusted(url);
        let adjusted = self.trust.adjust(raw, url);
        let decision = self.policy.decide(adjusted, trusted);

        let text_id = anon_hash(text.as_str());
        counter!("detect_requests_total", "label" => decision.label.as_str()).increment(1);
        tracing::debug!(
            target: "detect",
            id = %text_id,
            generation = pair.generation,
            raw_valid = raw.prob_valid(),
            adj_valid = adjusted.prob_valid(),
            trusted,
            label = ?decision.label,
            "article classified"
        );

        Ok(Detection {
            decision,
            generation: pair.generation,
            text_id,
        })
    }

    /// Turn request input into an article, fetching the body when only a URL is given.
    /// Fetch failures are terminal for the request.
    pub async fn resolve(&self, input: ArticleInput, fetcher: &dyn PageFetcher) -> Result<Article> {
        let ArticleInput { title, url, body } = input;
        let url = url.filter(|u| !u.trim().is_empty());
        let body = body.filter(|b| !b.trim().is_empty());

        match (body, url) {
            (Some(body), url) => Article::new(title, body, url),
            (None, Some(url)) => {
                if title.trim().is_empty() {
                    return Err(Error::InvalidArticle("title is required".into()));
                }
                let body = fetcher.fetch(&url).await?;
                Article::new(title, body, Some(url))
            }
            (None, None) => Err(Error::InvalidArticle(
                "either a URL or body text is required".into(),
            )),
        }
    }

    pub async fn detect_input(
        &self,
        input: ArticleInput,
        fetcher: &dyn PageFetcher,
    ) -> Result<(Article, Detection)> {
        let article = self.resolve(input, fetcher).await?;
        let detection = self.detect(&article)?;
        Ok((article, detection))
    }
}

/// Short sha256-derived id; lets logs correlate requests without raw text.
pub(crate) fn anon_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
