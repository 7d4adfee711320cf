//! Book text sources: Project Gutenberg over HTTP, or a local file.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::debug;

use crate::errors::{BookreelError, CapabilityError};
use crate::ports::TextSource;

/// Cleans raw book text: CRLF becomes LF and underscores (Gutenberg's
/// italics markers) become spaces.
#[must_use]
pub fn normalize_source_text(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('_', " ")
}

/// Extracts readable text from an HTML page, one block element per line.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next());

    let text = match body {
        Some(body) => element_text(&body),
        None => document.root_element().text().collect(),
    };

    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn element_text(element: &ElementRef<'_>) -> String {
    let mut text = String::new();

    for node in element.children() {
        if let Some(child) = ElementRef::wrap(node) {
            let tag = child.value().name();
            if matches!(tag, "script" | "style" | "noscript" | "head") {
                continue;
            }
            let block = matches!(
                tag,
                "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "br" | "li" | "pre"
            );
            if block && !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&element_text(&child));
            if block {
                text.push('\n');
            }
        } else if let Some(fragment) = node.value().as_text() {
            text.push_str(fragment);
        }
    }

    text
}

/// Fetches book text over HTTP.
///
/// Plain-text responses are used as-is; HTML pages are reduced to text.
#[derive(Debug, Clone)]
pub struct GutenbergSource {
    http: reqwest::Client,
}

impl GutenbergSource {
    /// Creates a source with a request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`BookreelError::Config`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, BookreelError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bookreel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BookreelError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl TextSource for GutenbergSource {
    async fn fetch(&self, locator: &str) -> Result<String, CapabilityError> {
        let response = self
            .http
            .get(locator)
            .send()
            .await
            .map_err(|e| CapabilityError::other(format!("request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(CapabilityError::rate_limited(format!("{locator} returned 429")));
        }
        if !status.is_success() {
            return Err(CapabilityError::other(format!("{locator} returned {status}")));
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/html") || ct.contains("application/xhtml"));
        let body = response
            .text()
            .await
            .map_err(|e| CapabilityError::other(format!("cannot read body: {e}")))?;

        debug!(locator, bytes = body.len(), is_html, "Fetched book text");
        let text = if is_html { html_to_text(&body) } else { body };
        Ok(normalize_source_text(&text))
    }
}

/// Reads book text from a local file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTextSource;

#[async_trait]
impl TextSource for FileTextSource {
    async fn fetch(&self, locator: &str) -> Result<String, CapabilityError> {
        let raw = tokio::fs::read_to_string(locator)
            .await
            .map_err(|e| CapabilityError::other(format!("cannot read {locator}: {e}")))?;
        Ok(normalize_source_text(&raw))
    }
}

/// Returns true if `locator` should be fetched over HTTP.
#[must_use]
pub fn is_remote(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}
