//! Page fetching.
//!
//! The [`PageFetcher`] trait decouples the loop from how pages are obtained.
//! Tests use static fetchers that serve canned pages.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::core::html_text::visible_text;
use crate::io::config::FetchConfig;

/// A fetched quiz page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// URL the page was requested with.
    pub url: String,
    /// Raw response body.
    pub body: String,
    /// Visible text derived from the body.
    pub text: String,
}

/// Abstraction over page retrieval.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Page>;
}

/// Fetcher that issues plain HTTP GETs.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
    max_chars: usize,
}

impl HttpPageFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build fetch client")?;
        Ok(Self {
            client,
            max_chars: config.max_chars,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Page> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url} returned {status}"));
        }
        let body = response
            .text()
            .await
            .with_context(|| format!("read body of {url}"))?;
        let text = visible_text(&body, self.max_chars);
        debug!(body_bytes = body.len(), text_chars = text.len(), "page fetched");
        Ok(Page {
            url: url.to_string(),
            body,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_returns_body_and_visible_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quiz-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body><p>What is 2+2?</p></body></html>"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpPageFetcher::new(&FetchConfig::default()).expect("client");
        let url = format!("{}/quiz-1", server.uri());
        let page = fetcher.fetch(&url).await.expect("fetch");

        assert_eq!(page.url, url);
        assert!(page.body.contains("<p>"));
        assert_eq!(page.text, "What is 2+2?");
    }

    #[tokio::test]
    async fn fetch_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpPageFetcher::new(&FetchConfig::default()).expect("client");
        let err = fetcher
            .fetch(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
