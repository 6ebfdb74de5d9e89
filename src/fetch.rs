// src/fetch.rs
//! Page fetcher: URL → article body text. No policy, no retries.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::error::{Error, Result};

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// reqwest-backed fetcher extracting `<p>` paragraph text.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hoax-detector/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Fetch(format!("http client init: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "fetch", error = ?e, url, "page fetch failed");
                return Err(Error::Fetch(format!("GET {url}: {e}")));
            }
        };
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("GET {url}: HTTP {status}")));
        }
        let html = resp
            .text()
            .await
            .map_err(|e| Error::Fetch(format!("GET {url}: reading body: {e}")))?;

        let text = extract_paragraphs(&html);
        if text.is_empty() {
            return Err(Error::Fetch(format!("GET {url}: no paragraph text found")));
        }
        Ok(text)
    }
}

/// Concatenate the text of every `<p>` element: tags stripped, entities decoded,
/// whitespace collapsed.
pub fn extract_paragraphs(html: &str) -> String {
    static RE_P: OnceCell<Regex> = OnceCell::new();
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_DROP: OnceCell<Regex> = OnceCell::new();
    let re_p = RE_P.get_or_init(|| Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p\s*>").expect("paragraph regex"));
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let re_drop = RE_DROP
        .get_or_init(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)\s*>").expect("script regex"));

    let cleaned = re_drop.replace_all(html, " ");
    let mut parts = Vec::new();
    for caps in re_p.captures_iter(&cleaned) {
        let inner = re_tags.replace_all(&caps[1], " ");
        let decoded = html_escape::decode_html_entities(&inner).to_string();
        let text = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            parts.push(text);
        }
    }
    parts.join(" ")
}

/// Canned responses keyed by URL; unknown URLs fail like an unreachable host.
#[derive(Debug, Default, Clone)]
pub struct StaticFetcher {
    pages: HashMap<String, std::result::Result<String, String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.pages.insert(url.into(), Ok(text.into()));
        self
    }

    pub fn with_failure(mut self, url: impl Into<String>, reason: impl Into<String>) -> Self {
        self.pages.insert(url.into(), Err(reason.into()));
        self
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        match self.pages.get(url) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(reason)) => Err(Error::Fetch(reason.clone())),
            None => Err(Error::Fetch(format!("no page for {url}"))),
        }
    }
}
